//! 活动实体与存储

pub mod model;
pub mod store;

pub use model::{now, truncate_to_millis, Activity, ActivityCategory, ActivityFields};
pub use store::{ActivityStore, InMemoryActivityStore};
