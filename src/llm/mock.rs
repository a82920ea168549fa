//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本逐轮返回增量；脚本用完后回显最后一条 User 消息，便于本地跑通整个 Turn。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::core::CancelSignal;
use crate::llm::{
    DeltaStream, LlmClient, LlmError, ModelDelta, ModelRequest, Role, ToolCallFragment,
};

/// 一轮脚本
#[derive(Debug, Clone, Default)]
pub struct ScriptedRound {
    pub deltas: Vec<ModelDelta>,
    /// 返回前等待（模拟慢响应）
    pub delay: Option<Duration>,
    /// 流末尾追加的错误
    pub error: Option<LlmError>,
    /// 响应到达后触发取消（模拟用户在工具执行前按下停止）
    pub cancel: Option<(CancelSignal, String)>,
}

impl ScriptedRound {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            deltas: vec![ModelDelta::Text(text.into())],
            ..Self::default()
        }
    }

    /// (call_id, tool, arguments)
    pub fn tool_calls(calls: &[(&str, &str, &str)]) -> Self {
        Self {
            deltas: calls
                .iter()
                .map(|(id, name, args)| {
                    ModelDelta::ToolCall(ToolCallFragment {
                        id: id.to_string(),
                        name: name.to_string(),
                        arguments: args.to_string(),
                    })
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing(error: LlmError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn cancel_on_reply(mut self, signal: CancelSignal, reason: impl Into<String>) -> Self {
        self.cancel = Some((signal, reason.into()));
        self
    }
}

/// 脚本化客户端：记录调用次数与收到的请求
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    rounds: Mutex<VecDeque<ScriptedRound>>,
    requests: Mutex<Vec<ModelRequest>>,
    calls: AtomicUsize,
}

impl ScriptedLlmClient {
    pub fn new(rounds: Vec<ScriptedRound>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_round(&self, request: &ModelRequest) -> ScriptedRound {
        let scripted = self.rounds.lock().ok().and_then(|mut r| r.pop_front());
        scripted.unwrap_or_else(|| {
            let last_user = request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .unwrap_or("(no input)");
            ScriptedRound::text(format!("Echo from Mock: {last_user}"))
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn stream_round(&self, request: &ModelRequest) -> Result<DeltaStream, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut r) = self.requests.lock() {
            r.push(request.clone());
        }
        let round = self.next_round(request);

        if let Some(delay) = round.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((signal, reason)) = &round.cancel {
            signal.cancel(reason.clone());
        }

        let mut items: Vec<Result<ModelDelta, LlmError>> =
            round.deltas.into_iter().map(Ok).collect();
        if let Some(e) = round.error {
            items.push(Err(e));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::llm::Message;

    #[tokio::test]
    async fn test_exhausted_script_echoes_user() {
        let client = ScriptedLlmClient::new(vec![]);
        let request = ModelRequest {
            messages: vec![Message::system("sys"), Message::user("hello")],
            tools: vec![],
        };
        let deltas: Vec<_> = client.stream_round(&request).await.unwrap().collect().await;
        assert_eq!(
            deltas,
            vec![Ok(ModelDelta::Text("Echo from Mock: hello".into()))]
        );
        assert_eq!(client.call_count(), 1);
    }
}
