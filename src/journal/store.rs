//! 动作日志持久化抽象
//!
//! 由存储层提供；内存实现用于测试与无数据库运行，SQLite 实现见 crate::storage。

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::StoreError;
use crate::journal::{ActionStatus, AgentAction};

#[async_trait]
pub trait ActionStore: Send + Sync {
    async fn insert(&self, action: &AgentAction) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<AgentAction>, StoreError>;

    /// 某 Turn 的全部动作，按 performed_at 升序（相同时间保持写入顺序）
    async fn list_for_turn(&self, turn_id: &str) -> Result<Vec<AgentAction>, StoreError>;

    /// active → undone；已是 undone 时无操作
    async fn mark_undone(&self, id: &str) -> Result<(), StoreError>;
}

/// 内存实现：按写入顺序保存
#[derive(Debug, Default)]
pub struct InMemoryActionStore {
    actions: RwLock<Vec<AgentAction>>,
}

impl InMemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActionStore for InMemoryActionStore {
    async fn insert(&self, action: &AgentAction) -> Result<(), StoreError> {
        let mut actions = self.actions.write().await;
        if actions.iter().any(|a| a.id == action.id) {
            return Err(StoreError::Backend(format!("action {} already exists", action.id)));
        }
        actions.push(action.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<AgentAction>, StoreError> {
        let actions = self.actions.read().await;
        Ok(actions.iter().find(|a| a.id == id).cloned())
    }

    async fn list_for_turn(&self, turn_id: &str) -> Result<Vec<AgentAction>, StoreError> {
        let actions = self.actions.read().await;
        let mut out: Vec<AgentAction> = actions
            .iter()
            .filter(|a| a.turn_id == turn_id)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.performed_at);
        Ok(out)
    }

    async fn mark_undone(&self, id: &str) -> Result<(), StoreError> {
        let mut actions = self.actions.write().await;
        if let Some(a) = actions.iter_mut().find(|a| a.id == id) {
            a.status = ActionStatus::Undone;
        }
        Ok(())
    }
}
