//! 规则兜底：无模型后端时按正则选择工具

pub mod classifier;
pub mod turn;

pub use classifier::{FallbackClassifier, ToolRequest};
pub use turn::{run_fallback_turn, GUIDANCE};
