pub mod geometry;
pub mod inclusion_filter;
pub mod output_set;
pub mod staging;
pub mod work_item;

pub use geometry::ImageGeometry;
pub use inclusion_filter::InclusionFilter;
pub use output_set::{OutputSet, OUTPUT_SET_VERSION};
pub use staging::{EntryLayout, InvalidEntry, StagingDir, StagingEntry, StagingSidecar, STAGING_SCHEMA_VERSION};
pub use work_item::WorkItem;
