//! 变更类工具：记录、修改、删除活动
//!
//! 修改成功后写一条动作日志，附带撤销入口；日志写入失败不影响工具本身的成功，
//! 只追加一条「无法撤销」提示。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::activity::{now, Activity, ActivityCategory, ActivityFields, ActivityStore};
use crate::core::ToolError;
use crate::journal::{ActionKind, ActionSnapshot, NewAction};
use crate::tools::{Block, BlockSink, Tool, ToolContext, ToolName, ToolOutput};

const MAX_NAME_LEN: usize = 120;
const MAX_NOTE_LEN: usize = 500;
const MAX_MINUTES: u32 = 24 * 60;

pub const UNDO_UNAVAILABLE: &str = "Undo is unavailable for this action.";

fn check_name(name: &str) -> Result<(), ToolError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ToolError::InvalidArguments("name must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(ToolError::InvalidArguments(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn check_minutes(minutes: u32) -> Result<(), ToolError> {
    if minutes == 0 || minutes > MAX_MINUTES {
        return Err(ToolError::InvalidArguments(format!(
            "minutes must be between 1 and {MAX_MINUTES}"
        )));
    }
    Ok(())
}

fn check_note(note: Option<&str>) -> Result<(), ToolError> {
    match note {
        Some(n) if n.chars().count() > MAX_NOTE_LEN => Err(ToolError::InvalidArguments(format!(
            "note must be at most {MAX_NOTE_LEN} characters"
        ))),
        _ => Ok(()),
    }
}

fn parse_activity_id(raw: &str) -> Result<Uuid, ToolError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ToolError::InvalidArguments(format!("activity_id is not a valid id: {raw}")))
}

/// 写动作日志：成功时追加撤销入口，失败时追加提示并记 warn
async fn record_or_notice(
    ctx: &ToolContext,
    kind: ActionKind,
    activity_id: Uuid,
    snapshot: ActionSnapshot,
    blocks: &mut Vec<Block>,
) -> Option<String> {
    let new = NewAction {
        user_id: ctx.user_id.clone(),
        turn_id: ctx.turn_id.clone(),
        action_kind: kind,
        affected_ids: vec![activity_id.to_string()],
        snapshot,
        performed_at: now(),
    };
    match ctx.journal.record(new).await {
        Ok(action_id) => {
            blocks.push(Block::Undo {
                action_id: action_id.clone(),
                turn_id: ctx.turn_id.clone(),
            });
            Some(action_id)
        }
        Err(e) => {
            tracing::warn!(
                kind = kind.as_str(),
                activity_id = %activity_id,
                error = %e,
                "failed to record action; undo unavailable"
            );
            blocks.push(Block::warning(UNDO_UNAVAILABLE));
            None
        }
    }
}

// ---------- log_activity ----------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LogActivityInput {
    /// 活动名称，例如 "Running"
    pub name: String,
    /// 时长（分钟），1..=1440
    pub minutes: u32,
    #[serde(default)]
    pub category: Option<ActivityCategory>,
    #[serde(default)]
    pub note: Option<String>,
}

pub struct LogActivityTool;

#[async_trait]
impl Tool for LogActivityTool {
    type Input = LogActivityInput;

    fn name(&self) -> ToolName {
        ToolName::LogActivity
    }

    fn description(&self) -> &str {
        "Log an activity the user did today. Args: name, minutes (1-1440), optional category (work|exercise|learning|rest|other) and note."
    }

    fn validate(&self, input: &LogActivityInput) -> Result<(), ToolError> {
        check_name(&input.name)?;
        check_minutes(input.minutes)?;
        check_note(input.note.as_deref())
    }

    async fn execute(
        &self,
        input: LogActivityInput,
        ctx: &ToolContext,
        _sink: &BlockSink,
    ) -> Result<ToolOutput, ToolError> {
        let fields = ActivityFields {
            name: input.name.trim().to_string(),
            minutes: input.minutes,
            category: input.category.unwrap_or_default(),
            note: input.note,
        };
        let activity = Activity::new(ctx.user_id.clone(), fields.clone(), ctx.now);
        ctx.activities.insert(&activity).await?;

        let summary = format!("Logged {} min of {}", fields.minutes, fields.name);
        let mut blocks = vec![
            Block::success(summary.clone()),
            Block::Activity {
                activity: activity.clone(),
            },
        ];
        let action_id = record_or_notice(
            ctx,
            ActionKind::LogActivity,
            activity.id,
            ActionSnapshot::LogActivity { created: fields },
            &mut blocks,
        )
        .await;

        Ok(ToolOutput {
            summary,
            blocks,
            output_for_model: json!({
                "status": "logged",
                "activity": activity,
                "undo_available": action_id.is_some(),
            }),
        })
    }
}

// ---------- update_activity ----------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateActivityInput {
    pub activity_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub minutes: Option<u32>,
    #[serde(default)]
    pub category: Option<ActivityCategory>,
    #[serde(default)]
    pub note: Option<String>,
}

pub struct UpdateActivityTool;

#[async_trait]
impl Tool for UpdateActivityTool {
    type Input = UpdateActivityInput;

    fn name(&self) -> ToolName {
        ToolName::UpdateActivity
    }

    fn description(&self) -> &str {
        "Change fields of a previously logged activity. Args: activity_id plus at least one of name, minutes, category, note."
    }

    fn validate(&self, input: &UpdateActivityInput) -> Result<(), ToolError> {
        parse_activity_id(&input.activity_id)?;
        if input.name.is_none()
            && input.minutes.is_none()
            && input.category.is_none()
            && input.note.is_none()
        {
            return Err(ToolError::InvalidArguments(
                "at least one field to change is required".into(),
            ));
        }
        if let Some(name) = &input.name {
            check_name(name)?;
        }
        if let Some(minutes) = input.minutes {
            check_minutes(minutes)?;
        }
        check_note(input.note.as_deref())
    }

    async fn execute(
        &self,
        input: UpdateActivityInput,
        ctx: &ToolContext,
        _sink: &BlockSink,
    ) -> Result<ToolOutput, ToolError> {
        let id = parse_activity_id(&input.activity_id)?;
        let current = ctx
            .activities
            .get(&ctx.user_id, id)
            .await?
            .ok_or_else(|| ToolError::NotFound(format!("activity {id}")))?;

        let before = current.fields.clone();
        let mut after = before.clone();
        if let Some(name) = input.name {
            after.name = name.trim().to_string();
        }
        if let Some(minutes) = input.minutes {
            after.minutes = minutes;
        }
        if let Some(category) = input.category {
            after.category = category;
        }
        if input.note.is_some() {
            after.note = input.note;
        }

        if after == before {
            return Ok(ToolOutput {
                summary: "Nothing to change".into(),
                blocks: vec![Block::info(format!("{} is already up to date.", before.name))],
                output_for_model: json!({ "status": "unchanged", "activity": current }),
            });
        }

        if !ctx.activities.update_fields(&ctx.user_id, id, &after).await? {
            return Err(ToolError::NotFound(format!("activity {id}")));
        }
        let updated = Activity {
            fields: after.clone(),
            ..current
        };

        let summary = format!("Updated {}", after.name);
        let mut blocks = vec![
            Block::success(summary.clone()),
            Block::Activity {
                activity: updated.clone(),
            },
        ];
        let action_id = record_or_notice(
            ctx,
            ActionKind::UpdateActivity,
            id,
            ActionSnapshot::UpdateActivity { before, after },
            &mut blocks,
        )
        .await;

        Ok(ToolOutput {
            summary,
            blocks,
            output_for_model: json!({
                "status": "updated",
                "activity": updated,
                "undo_available": action_id.is_some(),
            }),
        })
    }
}

// ---------- delete_activity ----------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DeleteActivityInput {
    pub activity_id: String,
}

pub struct DeleteActivityTool;

#[async_trait]
impl Tool for DeleteActivityTool {
    type Input = DeleteActivityInput;

    fn name(&self) -> ToolName {
        ToolName::DeleteActivity
    }

    fn description(&self) -> &str {
        "Delete a previously logged activity. Args: activity_id."
    }

    fn validate(&self, input: &DeleteActivityInput) -> Result<(), ToolError> {
        parse_activity_id(&input.activity_id).map(|_| ())
    }

    async fn execute(
        &self,
        input: DeleteActivityInput,
        ctx: &ToolContext,
        _sink: &BlockSink,
    ) -> Result<ToolOutput, ToolError> {
        let id = parse_activity_id(&input.activity_id)?;
        let current = ctx
            .activities
            .get(&ctx.user_id, id)
            .await?
            .ok_or_else(|| ToolError::NotFound(format!("activity {id}")))?;

        if !ctx.activities.delete(&ctx.user_id, id).await? {
            return Err(ToolError::NotFound(format!("activity {id}")));
        }

        let summary = format!("Deleted {}", current.fields.name);
        let mut blocks = vec![Block::success(summary.clone())];
        let action_id = record_or_notice(
            ctx,
            ActionKind::DeleteActivity,
            id,
            ActionSnapshot::DeleteActivity {
                before: current.fields.clone(),
                logged_at: current.logged_at,
            },
            &mut blocks,
        )
        .await;

        Ok(ToolOutput {
            summary,
            blocks,
            output_for_model: json!({
                "status": "deleted",
                "activity_id": id.to_string(),
                "undo_available": action_id.is_some(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::activity::InMemoryActivityStore;
    use crate::core::StoreError;
    use crate::journal::{ActionJournal, ActionStore, AgentAction, InMemoryActionStore, UndoOutcome};
    use crate::tools::{ToolDispatcher, ToolRegistry};

    /// 总是写入失败的动作存储
    struct BrokenActionStore;

    #[async_trait]
    impl ActionStore for BrokenActionStore {
        async fn insert(&self, _action: &AgentAction) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }

        async fn get(&self, _id: &str) -> Result<Option<AgentAction>, StoreError> {
            Ok(None)
        }

        async fn list_for_turn(&self, _turn_id: &str) -> Result<Vec<AgentAction>, StoreError> {
            Ok(vec![])
        }

        async fn mark_undone(&self, _id: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn ctx_with(actions: Arc<dyn ActionStore>) -> ToolContext {
        let activities = Arc::new(InMemoryActivityStore::new());
        ToolContext {
            user_id: "u1".into(),
            turn_id: "t1".into(),
            now: now(),
            journal: Arc::new(ActionJournal::new(actions, activities.clone())),
            activities,
        }
    }

    fn dispatcher() -> ToolDispatcher {
        ToolDispatcher::new(ToolRegistry::with_default_tools(), 5)
    }

    fn undo_action_id(blocks: &[Block]) -> Option<String> {
        blocks.iter().find_map(|b| match b {
            Block::Undo { action_id, .. } => Some(action_id.clone()),
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_log_then_undo() {
        let ctx = ctx_with(Arc::new(InMemoryActionStore::new()));
        let out = dispatcher()
            .execute("log_activity", json!({"name": "Run", "minutes": 30, "category": "exercise"}), &ctx)
            .await;
        assert!(out.is_ok());
        assert_eq!(out.output_for_model["status"], "logged");
        let action_id = undo_action_id(&out.blocks).unwrap();

        let today = ctx
            .activities
            .list_between("u1", ctx.now - chrono::Duration::days(1), ctx.now + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(today.len(), 1);

        let outcome = ctx.journal.undo_one("u1", &action_id).await.unwrap();
        assert_eq!(outcome, UndoOutcome::Undone);
        assert!(ctx.activities.get("u1", today[0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_journal_failure_degrades_to_notice() {
        let ctx = ctx_with(Arc::new(BrokenActionStore));
        let out = dispatcher()
            .execute("log_activity", json!({"name": "Nap", "minutes": 20}), &ctx)
            .await;
        assert!(out.is_ok());
        assert!(out.blocks.contains(&Block::warning(UNDO_UNAVAILABLE)));
        assert!(undo_action_id(&out.blocks).is_none());
        assert_eq!(out.output_for_model["undo_available"], false);
    }

    #[tokio::test]
    async fn test_log_rejects_out_of_range_minutes() {
        let ctx = ctx_with(Arc::new(InMemoryActionStore::new()));
        let d = dispatcher();
        for bad in [json!({"name": "x", "minutes": 0}), json!({"name": " ", "minutes": 5}), json!({"name": "x", "minutes": 2000})] {
            let out = d.execute("log_activity", bad, &ctx).await;
            assert_eq!(out.output_for_model["error"], "invalid_arguments");
        }
    }

    #[tokio::test]
    async fn test_update_and_delete_are_journaled() {
        let ctx = ctx_with(Arc::new(InMemoryActionStore::new()));
        let d = dispatcher();
        let logged = d
            .execute("log_activity", json!({"name": "Read", "minutes": 15}), &ctx)
            .await;
        let id = logged.output_for_model["activity"]["id"].as_str().unwrap().to_string();

        let unchanged = d
            .execute("update_activity", json!({"activity_id": id, "minutes": 15}), &ctx)
            .await;
        assert_eq!(unchanged.output_for_model["status"], "unchanged");
        assert!(undo_action_id(&unchanged.blocks).is_none());

        let updated = d
            .execute("update_activity", json!({"activity_id": id, "minutes": 45}), &ctx)
            .await;
        assert_eq!(updated.output_for_model["activity"]["minutes"], 45);

        let deleted = d
            .execute("delete_activity", json!({"activity_id": id}), &ctx)
            .await;
        assert_eq!(deleted.output_for_model["status"], "deleted");

        let actions = ctx.journal.list_for_turn("u1", "t1").await.unwrap();
        let kinds: Vec<ActionKind> = actions.iter().map(|a| a.action_kind).collect();
        assert_eq!(
            kinds,
            vec![ActionKind::LogActivity, ActionKind::UpdateActivity, ActionKind::DeleteActivity]
        );
    }

    #[tokio::test]
    async fn test_update_requires_a_field_and_valid_id() {
        let ctx = ctx_with(Arc::new(InMemoryActionStore::new()));
        let d = dispatcher();
        let no_field = d
            .execute("update_activity", json!({"activity_id": Uuid::new_v4().to_string()}), &ctx)
            .await;
        assert_eq!(no_field.output_for_model["error"], "invalid_arguments");

        let bad_id = d
            .execute("delete_activity", json!({"activity_id": "not-a-uuid"}), &ctx)
            .await;
        assert_eq!(bad_id.output_for_model["error"], "invalid_arguments");

        let missing = d
            .execute("delete_activity", json!({"activity_id": Uuid::new_v4().to_string()}), &ctx)
            .await;
        assert_eq!(missing.output_for_model["error"], "execution_failed");
    }
}
