//! 动作日志：每次变更类工具调用一条记录，支持单条与整轮撤销（冲突检测）

pub mod action_journal;
pub mod store;
pub mod types;

pub use action_journal::ActionJournal;
pub use store::{ActionStore, InMemoryActionStore};
pub use types::{
    ActionKind, ActionSnapshot, ActionStatus, AgentAction, NewAction, TurnUndoOutcome,
    UndoOutcome, UndoRejection,
};
