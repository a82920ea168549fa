//! SQLite 持久化：活动表 + 动作日志表
//!
//! rusqlite 同步连接，放在 Mutex 中供 async trait 调用（锁不跨 await）。
//! 时间戳按毫秒整数存储，保证排序与往返比较精确。

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::activity::{Activity, ActivityCategory, ActivityFields, ActivityStore};
use crate::core::StoreError;
use crate::journal::{ActionKind, ActionStatus, ActionStore, AgentAction};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS activities (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    minutes INTEGER NOT NULL,
    category TEXT NOT NULL,
    note TEXT,
    logged_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activities_user_time
    ON activities(user_id, logged_at);

CREATE TABLE IF NOT EXISTS agent_actions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    turn_id TEXT NOT NULL,
    action_kind TEXT NOT NULL,
    affected_ids TEXT NOT NULL,
    before_snapshot TEXT,
    expected_snapshot TEXT,
    performed_at INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'active'
);

CREATE INDEX IF NOT EXISTS idx_agent_actions_turn
    ON agent_actions(turn_id, performed_at);
";

/// 同一连接同时实现 ActivityStore 与 ActionStore
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    /// 内存数据库（测试）
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".to_string()))
    }
}

type ActivityRow = (String, String, String, u32, String, Option<String>, i64);

fn activity_from_row(row: ActivityRow) -> Result<Activity, StoreError> {
    let (id, user_id, name, minutes, category, note, logged_at) = row;
    let corrupt = |reason: &str| StoreError::Corrupt {
        id: id.clone(),
        reason: reason.to_string(),
    };
    Ok(Activity {
        id: Uuid::parse_str(&id).map_err(|_| corrupt("invalid uuid"))?,
        user_id,
        fields: ActivityFields {
            name,
            minutes,
            category: ActivityCategory::parse(&category).ok_or_else(|| corrupt("unknown category"))?,
            note,
        },
        logged_at: from_millis(logged_at).ok_or_else(|| corrupt("invalid logged_at"))?,
    })
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

#[async_trait]
impl ActivityStore for SqliteStore {
    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<Activity>, StoreError> {
        let row: Option<ActivityRow> = self
            .conn()?
            .query_row(
                "SELECT id, user_id, name, minutes, category, note, logged_at
                 FROM activities WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), user_id],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                        r.get(6)?,
                    ))
                },
            )
            .optional()?;
        row.map(activity_from_row).transpose()
    }

    async fn insert(&self, activity: &Activity) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT INTO activities (id, user_id, name, minutes, category, note, logged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                activity.id.to_string(),
                activity.user_id,
                activity.fields.name,
                activity.fields.minutes,
                activity.fields.category.as_str(),
                activity.fields.note,
                activity.logged_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    async fn update_fields(
        &self,
        user_id: &str,
        id: Uuid,
        fields: &ActivityFields,
    ) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute(
            "UPDATE activities SET name = ?1, minutes = ?2, category = ?3, note = ?4
             WHERE id = ?5 AND user_id = ?6",
            params![
                fields.name,
                fields.minutes,
                fields.category.as_str(),
                fields.note,
                id.to_string(),
                user_id,
            ],
        )?;
        Ok(changed > 0)
    }

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute(
            "DELETE FROM activities WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), user_id],
        )?;
        Ok(changed > 0)
    }

    async fn list_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Activity>, StoreError> {
        let rows: Vec<ActivityRow> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT id, user_id, name, minutes, category, note, logged_at
                 FROM activities
                 WHERE user_id = ?1 AND logged_at >= ?2 AND logged_at < ?3
                 ORDER BY logged_at ASC",
            )?;
            let mapped = stmt.query_map(
                params![user_id, from.timestamp_millis(), to.timestamp_millis()],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                        r.get(6)?,
                    ))
                },
            )?;
            let rows = mapped.collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter().map(activity_from_row).collect()
    }
}

type ActionRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    String,
);

const ACTION_COLUMNS: &str = "id, user_id, turn_id, action_kind, affected_ids, before_snapshot, \
     expected_snapshot, performed_at, status";

fn map_action_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<ActionRow> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(6)?,
        r.get(7)?,
        r.get(8)?,
    ))
}

fn action_from_row(row: ActionRow) -> Result<AgentAction, StoreError> {
    let (id, user_id, turn_id, kind, affected, before, expected, performed_at, status) = row;
    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.clone(),
        reason,
    };
    let action_kind =
        ActionKind::parse(&kind).ok_or_else(|| corrupt(format!("unknown action kind {kind}")))?;
    let affected_ids: Vec<String> =
        serde_json::from_str(&affected).map_err(|e| corrupt(e.to_string()))?;
    let before_snapshot = before
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| corrupt(e.to_string()))?;
    let expected_snapshot = expected
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| corrupt(e.to_string()))?;
    let status = match status.as_str() {
        "active" => ActionStatus::Active,
        "undone" => ActionStatus::Undone,
        other => return Err(corrupt(format!("unknown status {other}"))),
    };
    Ok(AgentAction {
        performed_at: from_millis(performed_at)
            .ok_or_else(|| corrupt("invalid performed_at".to_string()))?,
        id,
        user_id,
        turn_id,
        action_kind,
        affected_ids,
        before_snapshot,
        expected_snapshot,
        status,
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Backend(e.to_string()))
}

#[async_trait]
impl ActionStore for SqliteStore {
    async fn insert(&self, action: &AgentAction) -> Result<(), StoreError> {
        let affected = to_json(&action.affected_ids)?;
        let before = action.before_snapshot.as_ref().map(to_json).transpose()?;
        let expected = action.expected_snapshot.as_ref().map(to_json).transpose()?;
        self.conn()?.execute(
            "INSERT INTO agent_actions
             (id, user_id, turn_id, action_kind, affected_ids, before_snapshot,
              expected_snapshot, performed_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                action.id,
                action.user_id,
                action.turn_id,
                action.action_kind.as_str(),
                affected,
                before,
                expected,
                action.performed_at.timestamp_millis(),
                action.status.as_str(),
            ],
        )?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<AgentAction>, StoreError> {
        let row = self
            .conn()?
            .query_row(
                &format!("SELECT {ACTION_COLUMNS} FROM agent_actions WHERE id = ?1"),
                params![id],
                map_action_row,
            )
            .optional()?;
        row.map(action_from_row).transpose()
    }

    async fn list_for_turn(&self, turn_id: &str) -> Result<Vec<AgentAction>, StoreError> {
        let rows: Vec<ActionRow> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACTION_COLUMNS} FROM agent_actions
                 WHERE turn_id = ?1 ORDER BY performed_at ASC, seq ASC"
            ))?;
            let mapped = stmt.query_map(params![turn_id], map_action_row)?;
            let rows = mapped.collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter().map(action_from_row).collect()
    }

    async fn mark_undone(&self, id: &str) -> Result<(), StoreError> {
        self.conn()?.execute(
            "UPDATE agent_actions SET status = 'undone' WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }
}
