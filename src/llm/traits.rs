//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：每轮请求返回增量流（文本 + 工具调用片段）。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::llm::{ModelDelta, ModelRequest};

/// 模型后端错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<ModelDelta, LlmError>> + Send>>;

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 写入 trace 的模型名
    fn model_name(&self) -> &str;

    /// 发起一轮流式请求
    async fn stream_round(&self, request: &ModelRequest) -> Result<DeltaStream, LlmError>;
}
