//! 核心层：错误分类与协作式取消

pub mod cancel;
pub mod error;

pub use cancel::CancelSignal;
pub use error::{AgentError, FrameError, JournalError, StoreError, ToolError};
