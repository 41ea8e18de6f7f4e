pub mod assemble_flow;
pub mod item_ctx;
pub mod stage_flow;

pub use assemble_flow::AssembleFlow;
pub use item_ctx::{ItemCtx, ItemOutcome};
pub use stage_flow::StageFlow;
