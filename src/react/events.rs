//! Turn 过程事件：按派发顺序推送给调用方，经 SSE 编码后输出

use serde::{Deserialize, Serialize};

use crate::tools::Block;

/// 本轮执行轨迹（随 final 事件一起返回）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnTrace {
    /// 按首次出现顺序记录的工具名（同一 call id 只记一次）
    pub tools_used: Vec<String>,
    /// 模型名；走规则兜底时为 None
    pub model: Option<String>,
    pub fallback_used: bool,
    pub hit_tool_limit: bool,
}

/// 单个过程事件（type 字段与 SSE 的 event 行一致）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// Turn 开始
    Start { turn_id: String },
    /// 首次见到某个工具调用
    ToolStart { call_id: String, tool: String },
    /// 某次调用的最终结果块
    ToolResult {
        call_id: String,
        tool: String,
        blocks: Vec<Block>,
    },
    /// Turn 成功结束
    Final {
        assistant_text: String,
        blocks: Vec<Block>,
        trace: TurnTrace,
    },
    /// Turn 失败，或读取端收到无法解析的帧
    Error { message: String },
}

impl TurnEvent {
    /// SSE event 行使用的类型名
    pub fn event_type(&self) -> &'static str {
        match self {
            TurnEvent::Start { .. } => "start",
            TurnEvent::ToolStart { .. } => "tool_start",
            TurnEvent::ToolResult { .. } => "tool_result",
            TurnEvent::Final { .. } => "final",
            TurnEvent::Error { .. } => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        TurnEvent::Error {
            message: message.into(),
        }
    }
}
