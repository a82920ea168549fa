//! 错误类型
//!
//! 每层一个 thiserror 枚举：编排层 AgentError、工具层 ToolError、存储层 StoreError、
//! 动作日志 JournalError、SSE 分帧 FrameError。所有错误都作为值返回，不会让宿主进程崩溃。

use thiserror::Error;

use crate::llm::LlmError;

/// 编排层错误：模型后端、取消、超时
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Turn cancelled: {0}")]
    Cancelled(String),

    #[error("Model round timed out after {0}s")]
    RoundTimeout(u64),

    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 工具执行错误（由 Dispatcher 捕获并转为 error 状态块，不会中止本轮）
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 存储后端错误（SQLite / 内存实现）
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// 动作日志错误：仅表示基础设施故障；冲突等业务结果走 UndoOutcome
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Journal unavailable: {0}")]
    Unavailable(#[from] StoreError),
}

/// SSE 分帧错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("SSE frame exceeds {limit} bytes without a terminating blank line")]
    Oversized { limit: usize },
}
