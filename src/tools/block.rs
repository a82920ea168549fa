//! 结果块：工具返回给 UI 的结构化片段，本 crate 不做进一步解释

use serde::{Deserialize, Serialize};

use crate::activity::{Activity, ActivityCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Status {
        tone: Tone,
        text: String,
    },
    Activity {
        activity: Activity,
    },
    ActivityList {
        title: String,
        activities: Vec<Activity>,
        total_minutes: u32,
    },
    Suggestion {
        category: ActivityCategory,
        reason: String,
    },
    /// 撤销入口（UI 据此渲染「撤销」按钮）
    Undo {
        action_id: String,
        turn_id: String,
    },
}

impl Block {
    pub fn status(tone: Tone, text: impl Into<String>) -> Self {
        Block::Status {
            tone,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::status(Tone::Info, text)
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::status(Tone::Success, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::status(Tone::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::status(Tone::Error, text)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Block::Status { tone: Tone::Error, .. })
    }
}
