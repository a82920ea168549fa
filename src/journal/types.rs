//! 动作日志数据模型
//!
//! AgentAction 写入后不可变，唯一允许的状态迁移是 active → undone（终态）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::ActivityFields;

/// 可撤销的动作种类（与产生它的工具同名）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    LogActivity,
    UpdateActivity,
    DeleteActivity,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::LogActivity => "log_activity",
            ActionKind::UpdateActivity => "update_activity",
            ActionKind::DeleteActivity => "delete_activity",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "log_activity" => Some(ActionKind::LogActivity),
            "update_activity" => Some(ActionKind::UpdateActivity),
            "delete_activity" => Some(ActionKind::DeleteActivity),
            _ => None,
        }
    }
}

/// 变更前快照：按动作种类区分的 tagged union，每个变体只声明自己需要比较/恢复的字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSnapshot {
    /// 新建：实体此刻应仍为 created，撤销即删除
    LogActivity { created: ActivityFields },
    /// 修改：实体此刻应为 after，撤销即恢复 before
    UpdateActivity {
        before: ActivityFields,
        after: ActivityFields,
    },
    /// 删除：实体此刻应不存在，撤销即按原 id 重建
    DeleteActivity {
        before: ActivityFields,
        logged_at: DateTime<Utc>,
    },
}

impl ActionSnapshot {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionSnapshot::LogActivity { .. } => ActionKind::LogActivity,
            ActionSnapshot::UpdateActivity { .. } => ActionKind::UpdateActivity,
            ActionSnapshot::DeleteActivity { .. } => ActionKind::DeleteActivity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Active,
    Undone,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Active => "active",
            ActionStatus::Undone => "undone",
        }
    }
}

/// 一条持久化的智能体动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAction {
    pub id: String,
    pub user_id: String,
    pub turn_id: String,
    pub action_kind: ActionKind,
    pub affected_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_snapshot: Option<ActionSnapshot>,
    /// 旧版写入方使用的字段：实体「当前应有」的字段值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_snapshot: Option<ActivityFields>,
    pub performed_at: DateTime<Utc>,
    pub status: ActionStatus,
}

impl AgentAction {
    /// 权威快照：before_snapshot 优先；否则从旧版 expected_snapshot 推导。
    /// 旧版字段只够撤销新建动作（其余种类缺少变更前的值）。
    pub fn effective_snapshot(&self) -> Option<ActionSnapshot> {
        if let Some(snapshot) = &self.before_snapshot {
            return Some(snapshot.clone());
        }
        match (self.action_kind, &self.expected_snapshot) {
            (ActionKind::LogActivity, Some(expected)) => Some(ActionSnapshot::LogActivity {
                created: expected.clone(),
            }),
            _ => None,
        }
    }
}

/// 待写入的动作（id / status 由日志分配）
#[derive(Debug, Clone)]
pub struct NewAction {
    pub user_id: String,
    pub turn_id: String,
    pub action_kind: ActionKind,
    pub affected_ids: Vec<String>,
    pub snapshot: ActionSnapshot,
    pub performed_at: DateTime<Utc>,
}

/// 撤销被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoRejection {
    /// 动作不存在 / 不属于调用者 / affected_ids 不是合法引用 / 快照不可用
    InvalidAction,
    /// 目标实体已不存在
    MissingTarget,
    /// 目标实体在动作之后被其他修改改动过
    Conflict,
}

impl UndoRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            UndoRejection::InvalidAction => "invalid_action",
            UndoRejection::MissingTarget => "missing_target",
            UndoRejection::Conflict => "conflict",
        }
    }
}

impl std::fmt::Display for UndoRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条撤销的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    Undone,
    Rejected(UndoRejection),
}

impl UndoOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, UndoOutcome::Undone)
    }
}

/// 整个 Turn 撤销的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnUndoOutcome {
    Undone {
        turn_id: String,
        undone_count: usize,
    },
    /// 预检失败，未做任何修改；action_id 为首个失败的动作
    Rejected {
        action_id: String,
        reason: UndoRejection,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityCategory;

    fn fields() -> ActivityFields {
        ActivityFields {
            name: "Read".into(),
            minutes: 15,
            category: ActivityCategory::Learning,
            note: None,
        }
    }

    fn action(kind: ActionKind) -> AgentAction {
        AgentAction {
            id: "a1".into(),
            user_id: "u".into(),
            turn_id: "t".into(),
            action_kind: kind,
            affected_ids: vec![],
            before_snapshot: None,
            expected_snapshot: Some(fields()),
            performed_at: Utc::now(),
            status: ActionStatus::Active,
        }
    }

    #[test]
    fn test_legacy_expected_snapshot_resolves_for_creation_only() {
        assert_eq!(
            action(ActionKind::LogActivity).effective_snapshot(),
            Some(ActionSnapshot::LogActivity { created: fields() })
        );
        assert_eq!(action(ActionKind::UpdateActivity).effective_snapshot(), None);
    }

    #[test]
    fn test_snapshot_is_tagged_by_kind() {
        let snap = ActionSnapshot::LogActivity { created: fields() };
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["kind"], "log_activity");
        let back: ActionSnapshot = serde_json::from_value(v).unwrap();
        assert_eq!(back.kind(), ActionKind::LogActivity);
    }
}
