//! OpenAI 兼容 API 客户端
//!
//! 直接用 reqwest 调用 `{base_url}/chat/completions`（stream = true），按 SSE 帧解析增量；
//! 工具调用参数按 index 累积，到 finish_reason 或 [DONE] 时整体产出。
//! 支持 OpenAI、DeepSeek、自建代理等任意兼容端点。

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::llm::{
    DeltaStream, LlmClient, LlmError, Message, ModelDelta, ModelRequest, Role, ToolCallFragment,
};
use crate::stream::FrameSplitter;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        request_timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    fn request_body(&self, request: &ModelRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(to_wire_message).collect();
        let mut body = json!({
            "model": self.model,
            "stream": true,
            "messages": messages,
        });
        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
        }
        body
    }
}

fn to_wire_message(m: &Message) -> Value {
    let role = match m.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut v = json!({ "role": role, "content": m.content });
    if !m.tool_calls.is_empty() {
        v["tool_calls"] = m
            .tool_calls
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "type": "function",
                    "function": { "name": c.name, "arguments": c.arguments },
                })
            })
            .collect();
    }
    if let Some(id) = &m.tool_call_id {
        v["tool_call_id"] = json!(id);
    }
    v
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_round(&self, request: &ModelRequest) -> Result<DeltaStream, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.http.post(&url).json(&self.request_body(request));
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!("{status}: {body}")));
        }

        let bytes = Box::pin(response.bytes_stream());
        let deltas = stream::unfold(
            (bytes, FrameSplitter::new(), ChunkAccumulator::default(), false),
            |(mut bytes, mut frames, mut acc, done)| async move {
                if done {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        let mut out = Vec::new();
                        for frame in frames.push(&chunk) {
                            match frame {
                                Ok(frame) => out.extend(acc.process(&frame.data)),
                                Err(e) => out.push(Err(LlmError::Stream(e.to_string()))),
                            }
                        }
                        Some((out, (bytes, frames, acc, false)))
                    }
                    Some(Err(e)) => Some((
                        vec![Err(LlmError::Stream(format!("stream read error: {e}")))],
                        (bytes, frames, acc, true),
                    )),
                    None => {
                        let mut out = Vec::new();
                        if let Some(frame) = frames.finish() {
                            out.extend(acc.process(&frame.data));
                        }
                        out.extend(acc.flush());
                        Some((out, (bytes, frames, acc, true)))
                    }
                }
            },
        )
        .flat_map(stream::iter);

        Ok(Box::pin(deltas))
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: Option<u32>,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// 跨 SSE 帧累积工具调用片段
#[derive(Debug, Default)]
struct ChunkAccumulator {
    /// index → (id, name, arguments)
    pending: BTreeMap<u32, (Option<String>, String, String)>,
}

impl ChunkAccumulator {
    fn process(&mut self, data: &str) -> Vec<Result<ModelDelta, LlmError>> {
        let data = data.trim();
        if data.is_empty() {
            return Vec::new();
        }
        if data == "[DONE]" {
            return self.flush();
        }
        let chunk: ChatChunk = match serde_json::from_str(data) {
            Ok(c) => c,
            Err(e) => {
                return vec![Err(LlmError::Stream(format!(
                    "failed to parse SSE chunk: {e}"
                )))]
            }
        };

        let mut out = Vec::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                out.push(Ok(ModelDelta::Text(content)));
            }
            for tc in choice.delta.tool_calls.unwrap_or_default() {
                let entry = self
                    .pending
                    .entry(tc.index.unwrap_or(0))
                    .or_insert_with(|| (None, String::new(), String::new()));
                if tc.id.is_some() {
                    entry.0 = tc.id;
                }
                if let Some(f) = tc.function {
                    if let Some(n) = f.name {
                        entry.1.push_str(&n);
                    }
                    if let Some(a) = f.arguments {
                        entry.2.push_str(&a);
                    }
                }
            }
            if choice.finish_reason.is_some() {
                out.extend(self.flush());
            }
        }
        out
    }

    fn flush(&mut self) -> Vec<Result<ModelDelta, LlmError>> {
        std::mem::take(&mut self.pending)
            .into_values()
            .map(|(id, name, arguments)| {
                // 不带 id 的后端按 index 编号会在各轮间重复，这里补全局唯一 id
                Ok(ModelDelta::ToolCall(ToolCallFragment {
                    id: id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
                    name,
                    arguments,
                }))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_tool_call_across_chunks() {
        let mut acc = ChunkAccumulator::default();
        let first = acc.process(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"log_activity","arguments":"{\"name\":"}}]}}]}"#,
        );
        assert!(first.is_empty());
        let second = acc.process(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Run\",\"minutes\":30}"}}]},"finish_reason":"tool_calls"}]}"#,
        );
        assert_eq!(
            second,
            vec![Ok(ModelDelta::ToolCall(ToolCallFragment {
                id: "call_a".into(),
                name: "log_activity".into(),
                arguments: r#"{"name":"Run","minutes":30}"#.into(),
            }))]
        );
        assert!(acc.process("[DONE]").is_empty());
    }

    #[test]
    fn test_missing_call_ids_are_unique_across_rounds() {
        let chunk = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"today_summary","arguments":"{}"}}]},"finish_reason":"tool_calls"}]}"#;
        let mut ids = Vec::new();
        for _ in 0..2 {
            let mut acc = ChunkAccumulator::default();
            let out = acc.process(chunk);
            let Some(Ok(ModelDelta::ToolCall(call))) = out.into_iter().next() else {
                panic!("expected a tool call");
            };
            assert_eq!(call.name, "today_summary");
            assert!(call.id.starts_with("call_"));
            ids.push(call.id);
        }
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_text_and_bad_chunk() {
        let mut acc = ChunkAccumulator::default();
        assert_eq!(
            acc.process(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#),
            vec![Ok(ModelDelta::Text("Hi".into()))]
        );
        assert!(matches!(acc.process("{oops").as_slice(), [Err(LlmError::Stream(_))]));
    }

    #[test]
    fn test_wire_message_shapes() {
        let m = Message::tool("call_1", "{}");
        let v = to_wire_message(&m);
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "call_1");
    }
}
