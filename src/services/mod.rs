pub mod brain_extraction;
pub mod c3d;
pub mod dataset_description;
pub mod dataset_scanner;
pub mod neck_trim;
pub mod origin_reset;
pub mod qc;

pub use brain_extraction::HdBet;
pub use c3d::C3d;
pub use dataset_description::Provenance;
pub use dataset_scanner::{DatasetScanner, ScanResult};
pub use neck_trim::{NeckTrimmer, TrimOutputs};
pub use origin_reset::OriginReset;
pub use qc::{QcReport, QcService};
