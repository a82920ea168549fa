//! 动作日志：记录 + 乐观并发撤销
//!
//! 撤销单条：加载 → 已撤销则幂等成功 → 解析 affected_ids → 读取目标 → 逐字段比较快照 →
//! 执行逆操作并标记 undone。
//!
//! 撤销整轮：先对所有动作做预检（只检查不修改），任一失败则整体放弃、零副作用；
//! 全部通过后按 performed_at 从新到旧依次撤销。预检与应用之间仍有一个很窄的竞争窗口，
//! 应用阶段不重新检查。
//!
//! 逆操作已落地但标记 undone 失败时，实体处于「已撤销」状态而动作仍为 active；
//! 重试时若更新 / 删除动作的目标恰好等于撤销后的状态，只补标记，不再重复执行。

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::activity::{Activity, ActivityFields, ActivityStore};
use crate::core::JournalError;
use crate::journal::{
    ActionSnapshot, ActionStatus, ActionStore, AgentAction, NewAction, TurnUndoOutcome,
    UndoOutcome, UndoRejection,
};

/// 解析后的单条撤销计划
#[derive(Debug, Clone)]
struct UndoPlan {
    target: Uuid,
    snapshot: ActionSnapshot,
}

/// 动作日志：动作存储 + 被修改的实体存储
pub struct ActionJournal {
    actions: Arc<dyn ActionStore>,
    activities: Arc<dyn ActivityStore>,
}

impl ActionJournal {
    pub fn new(actions: Arc<dyn ActionStore>, activities: Arc<dyn ActivityStore>) -> Self {
        Self {
            actions,
            activities,
        }
    }

    /// 记录一条动作，返回 action id。
    /// 调用方应在自身修改成功之后调用；失败时调用方仍报告成功，只提示「无法撤销」。
    pub async fn record(&self, new: NewAction) -> Result<String, JournalError> {
        let action = AgentAction {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            turn_id: new.turn_id,
            action_kind: new.action_kind,
            affected_ids: new.affected_ids,
            before_snapshot: Some(new.snapshot),
            expected_snapshot: None,
            performed_at: new.performed_at,
            status: ActionStatus::Active,
        };
        self.actions.insert(&action).await?;
        tracing::debug!(
            action_id = %action.id,
            turn_id = %action.turn_id,
            kind = action.action_kind.as_str(),
            "action recorded"
        );
        Ok(action.id)
    }

    /// 调用者在某 Turn 中的动作（按 performed_at 升序）
    pub async fn list_for_turn(
        &self,
        user_id: &str,
        turn_id: &str,
    ) -> Result<Vec<AgentAction>, JournalError> {
        let actions = self.actions.list_for_turn(turn_id).await?;
        Ok(actions.into_iter().filter(|a| a.user_id == user_id).collect())
    }

    /// 撤销单条动作
    pub async fn undo_one(&self, user_id: &str, action_id: &str) -> Result<UndoOutcome, JournalError> {
        // 不存在与不属于调用者返回同一结果，不泄露存在性
        let action = match self.actions.get(action_id).await? {
            Some(a) if a.user_id == user_id => a,
            _ => return Ok(UndoOutcome::Rejected(UndoRejection::InvalidAction)),
        };
        if action.status == ActionStatus::Undone {
            return Ok(UndoOutcome::Undone);
        }

        let plan = match plan_undo(&action) {
            Ok(p) => p,
            Err(reason) => return Ok(UndoOutcome::Rejected(reason)),
        };
        let current = self.current_fields(user_id, plan.target).await?;
        let step = match check_snapshot(&plan.snapshot, current.as_ref()) {
            Ok(step) => step,
            Err(reason) => {
                tracing::info!(action_id, reason = reason.as_str(), "undo rejected");
                return Ok(UndoOutcome::Rejected(reason));
            }
        };

        self.revert(user_id, &action.id, &plan, step).await?;
        tracing::info!(action_id, kind = action.action_kind.as_str(), "action undone");
        Ok(UndoOutcome::Undone)
    }

    /// 撤销整个 Turn（全有或全无）
    pub async fn undo_turn(
        &self,
        user_id: &str,
        turn_id: &str,
    ) -> Result<TurnUndoOutcome, JournalError> {
        let actions: Vec<AgentAction> = self
            .list_for_turn(user_id, turn_id)
            .await?
            .into_iter()
            .filter(|a| a.status == ActionStatus::Active)
            .collect();

        // 预检：从新到旧，在「已撤销更新动作」的投影状态上检查，不做任何修改
        let mut projected: HashMap<Uuid, Option<ActivityFields>> = HashMap::new();
        let mut plans: Vec<(String, UndoPlan, Step)> = Vec::with_capacity(actions.len());
        for action in actions.iter().rev() {
            let plan = match plan_undo(action) {
                Ok(p) => p,
                Err(reason) => return Ok(rejected(turn_id, action, reason)),
            };
            let current = match projected.get(&plan.target) {
                Some(state) => state.clone(),
                None => self.current_fields(user_id, plan.target).await?,
            };
            let step = match check_snapshot(&plan.snapshot, current.as_ref()) {
                Ok(step) => step,
                Err(reason) => return Ok(rejected(turn_id, action, reason)),
            };
            projected.insert(plan.target, state_after_undo(&plan.snapshot));
            plans.push((action.id.clone(), plan, step));
        }

        // 应用：plans 已是从新到旧的顺序（后面的动作可能依赖前面动作创建的状态）
        for (action_id, plan, step) in &plans {
            self.revert(user_id, action_id, plan, *step).await?;
        }
        tracing::info!(turn_id, undone = plans.len(), "turn undone");
        Ok(TurnUndoOutcome::Undone {
            turn_id: turn_id.to_string(),
            undone_count: plans.len(),
        })
    }

    async fn current_fields(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<Option<ActivityFields>, JournalError> {
        Ok(self.activities.get(user_id, id).await?.map(|a| a.fields))
    }

    /// 执行逆操作（如需要）并标记 undone
    async fn revert(
        &self,
        user_id: &str,
        action_id: &str,
        plan: &UndoPlan,
        step: Step,
    ) -> Result<(), JournalError> {
        match step {
            Step::Apply => self.apply(user_id, plan).await?,
            Step::MarkOnly => {
                tracing::info!(action_id, "inverse already applied, marking undone")
            }
        }
        if let Err(e) = self.actions.mark_undone(action_id).await {
            tracing::error!(
                action_id,
                target_id = %plan.target,
                error = %e,
                "inverse applied but action could not be marked undone"
            );
            return Err(e.into());
        }
        Ok(())
    }

    /// 执行逆操作
    async fn apply(&self, user_id: &str, plan: &UndoPlan) -> Result<(), JournalError> {
        let hit = match &plan.snapshot {
            ActionSnapshot::LogActivity { .. } => {
                self.activities.delete(user_id, plan.target).await?
            }
            ActionSnapshot::UpdateActivity { before, .. } => {
                self.activities
                    .update_fields(user_id, plan.target, before)
                    .await?
            }
            ActionSnapshot::DeleteActivity { before, logged_at } => {
                let restored = Activity {
                    id: plan.target,
                    user_id: user_id.to_string(),
                    fields: before.clone(),
                    logged_at: *logged_at,
                };
                self.activities.insert(&restored).await?;
                true
            }
        };
        if !hit {
            tracing::warn!(target_id = %plan.target, "undo target changed between check and apply");
        }
        Ok(())
    }
}

fn rejected(turn_id: &str, action: &AgentAction, reason: UndoRejection) -> TurnUndoOutcome {
    tracing::info!(
        turn_id,
        action_id = %action.id,
        reason = reason.as_str(),
        "turn undo rejected in pre-flight"
    );
    TurnUndoOutcome::Rejected {
        action_id: action.id.clone(),
        reason,
    }
}

/// 解析 affected_ids 与权威快照；任一 id 不是合法引用即 invalid_action
fn plan_undo(action: &AgentAction) -> Result<UndoPlan, UndoRejection> {
    let ids = action
        .affected_ids
        .iter()
        .map(|raw| Uuid::parse_str(raw))
        .collect::<Result<Vec<Uuid>, _>>()
        .map_err(|_| UndoRejection::InvalidAction)?;
    let [target] = ids.as_slice() else {
        return Err(UndoRejection::InvalidAction);
    };
    let snapshot = action
        .effective_snapshot()
        .ok_or(UndoRejection::InvalidAction)?;
    if snapshot.kind() != action.action_kind {
        return Err(UndoRejection::InvalidAction);
    }
    Ok(UndoPlan {
        target: *target,
        snapshot,
    })
}

/// 检查通过后的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// 执行逆操作
    Apply,
    /// 目标已是撤销后的状态（上次撤销只完成了一半），只补标记
    MarkOnly,
}

/// 冲突检查；current 为 None 表示实体不存在
fn check_snapshot(
    snapshot: &ActionSnapshot,
    current: Option<&ActivityFields>,
) -> Result<Step, UndoRejection> {
    let expected = match snapshot {
        ActionSnapshot::LogActivity { created } => created,
        ActionSnapshot::UpdateActivity { before, after } => {
            return match current {
                None => Err(UndoRejection::MissingTarget),
                Some(live) if live == after => Ok(Step::Apply),
                Some(live) if live == before => Ok(Step::MarkOnly),
                Some(_) => Err(UndoRejection::Conflict),
            };
        }
        ActionSnapshot::DeleteActivity { before, .. } => {
            return match current {
                None => Ok(Step::Apply),
                Some(live) if live == before => Ok(Step::MarkOnly),
                Some(_) => Err(UndoRejection::Conflict),
            };
        }
    };
    match current {
        None => Err(UndoRejection::MissingTarget),
        Some(live) if live == expected => Ok(Step::Apply),
        Some(_) => Err(UndoRejection::Conflict),
    }
}

/// 撤销后实体的状态（预检投影用）
fn state_after_undo(snapshot: &ActionSnapshot) -> Option<ActivityFields> {
    match snapshot {
        ActionSnapshot::LogActivity { .. } => None,
        ActionSnapshot::UpdateActivity { before, .. } => Some(before.clone()),
        ActionSnapshot::DeleteActivity { before, .. } => Some(before.clone()),
    }
}
