//! 活动存储抽象
//!
//! 真实部署中由外部存储层提供；这里给出 trait 与内存实现（测试、无数据库运行），
//! SQLite 实现见 crate::storage::SqliteStore。所有查询都按 user_id 隔离。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::activity::{Activity, ActivityFields};
use crate::core::StoreError;

#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// 按 id 读取；不属于该用户时视同不存在
    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<Activity>, StoreError>;

    /// 插入（撤销删除时会以原 id 重建）
    async fn insert(&self, activity: &Activity) -> Result<(), StoreError>;

    /// 覆盖可变字段；返回是否命中
    async fn update_fields(
        &self,
        user_id: &str,
        id: Uuid,
        fields: &ActivityFields,
    ) -> Result<bool, StoreError>;

    /// 删除；返回是否命中
    async fn delete(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError>;

    /// [from, to) 区间内的活动，按 logged_at 升序
    async fn list_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Activity>, StoreError>;
}

/// 内存实现
#[derive(Debug, Default)]
pub struct InMemoryActivityStore {
    items: RwLock<HashMap<Uuid, Activity>>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<Activity>, StoreError> {
        let items = self.items.read().await;
        Ok(items.get(&id).filter(|a| a.user_id == user_id).cloned())
    }

    async fn insert(&self, activity: &Activity) -> Result<(), StoreError> {
        let mut items = self.items.write().await;
        if items.contains_key(&activity.id) {
            return Err(StoreError::Backend(format!(
                "activity {} already exists",
                activity.id
            )));
        }
        items.insert(activity.id, activity.clone());
        Ok(())
    }

    async fn update_fields(
        &self,
        user_id: &str,
        id: Uuid,
        fields: &ActivityFields,
    ) -> Result<bool, StoreError> {
        let mut items = self.items.write().await;
        match items.get_mut(&id) {
            Some(a) if a.user_id == user_id => {
                a.fields = fields.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<bool, StoreError> {
        let mut items = self.items.write().await;
        let owned = items.get(&id).is_some_and(|a| a.user_id == user_id);
        if owned {
            items.remove(&id);
        }
        Ok(owned)
    }

    async fn list_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Activity>, StoreError> {
        let items = self.items.read().await;
        let mut out: Vec<Activity> = items
            .values()
            .filter(|a| a.user_id == user_id && a.logged_at >= from && a.logged_at < to)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.logged_at);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{now, ActivityCategory};

    fn fields(name: &str) -> ActivityFields {
        ActivityFields {
            name: name.to_string(),
            minutes: 20,
            category: ActivityCategory::Work,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_other_users_rows_are_invisible() {
        let store = InMemoryActivityStore::new();
        let a = Activity::new("alice", fields("Write"), now());
        store.insert(&a).await.unwrap();

        assert!(store.get("bob", a.id).await.unwrap().is_none());
        assert!(!store.delete("bob", a.id).await.unwrap());
        assert!(!store.update_fields("bob", a.id, &fields("x")).await.unwrap());
        assert_eq!(store.get("alice", a.id).await.unwrap(), Some(a));
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let store = InMemoryActivityStore::new();
        let a = Activity::new("alice", fields("Write"), now());
        store.insert(&a).await.unwrap();
        assert!(store.insert(&a).await.is_err());
    }
}
