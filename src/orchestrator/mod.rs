pub mod assembler;
pub mod extractor;
pub mod selector;
pub mod summary;

pub use assembler::Assembler;
pub use extractor::BatchExtractor;
pub use selector::Selector;
pub use summary::RunSummary;
