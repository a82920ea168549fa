//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;
pub mod types;

pub use mock::{ScriptedLlmClient, ScriptedRound};
pub use openai::OpenAiClient;
pub use traits::{DeltaStream, LlmClient, LlmError};
pub use types::{
    Message, ModelDelta, ModelRequest, Role, ToolCallFragment, ToolCallRecord, ToolSpec,
};
