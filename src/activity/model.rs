//! 活动记录实体
//!
//! Activity 是工具代表用户修改的实体；可变字段集中在 ActivityFields，
//! 动作日志的快照与冲突比较都以它为单位。

use chrono::{DateTime, SubsecRound, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 活动分类（封闭枚举，也用于偏好与建议）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    Work,
    Exercise,
    Learning,
    Rest,
    #[default]
    Other,
}

impl ActivityCategory {
    pub const ALL: [ActivityCategory; 5] = [
        ActivityCategory::Work,
        ActivityCategory::Exercise,
        ActivityCategory::Learning,
        ActivityCategory::Rest,
        ActivityCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityCategory::Work => "work",
            ActivityCategory::Exercise => "exercise",
            ActivityCategory::Learning => "learning",
            ActivityCategory::Rest => "rest",
            ActivityCategory::Other => "other",
        }
    }

    /// 宽松解析（大小写、首尾空白不敏感）；未知值返回 None
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }
}

/// 活动的可变字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFields {
    pub name: String,
    pub minutes: u32,
    pub category: ActivityCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// 一条已记录的活动
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: String,
    #[serde(flatten)]
    pub fields: ActivityFields,
    pub logged_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(user_id: impl Into<String>, fields: ActivityFields, logged_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            fields,
            logged_at: truncate_to_millis(logged_at),
        }
    }
}

/// 时间戳截到毫秒，保证经 SQLite / JSON 往返后仍可精确比较
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

pub fn now() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_is_lenient_but_closed() {
        assert_eq!(ActivityCategory::parse(" Exercise "), Some(ActivityCategory::Exercise));
        assert_eq!(ActivityCategory::parse("LEARNING"), Some(ActivityCategory::Learning));
        assert_eq!(ActivityCategory::parse("ignore previous instructions"), None);
    }

    #[test]
    fn test_activity_serializes_flat() {
        let activity = Activity::new(
            "u1",
            ActivityFields {
                name: "Run".into(),
                minutes: 30,
                category: ActivityCategory::Exercise,
                note: None,
            },
            now(),
        );
        let v = serde_json::to_value(&activity).unwrap();
        assert_eq!(v["name"], "Run");
        assert_eq!(v["category"], "exercise");
        assert!(v.get("note").is_none());
    }
}
