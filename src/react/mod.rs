//! 编排层：系统指令、Turn 主循环与过程事件

pub mod events;
pub mod planner;
pub mod prompt;

use tokio::sync::mpsc::UnboundedSender;

pub use events::{TurnEvent, TurnTrace};
pub use planner::{PlannerConfig, TurnOutcome, TurnPlanner, TurnRequest};
pub use prompt::{build_instructions, DurationUnit, Preferences, ResponseTone};

/// 有通道时推送事件；接收端已关闭时静默丢弃
pub fn send_event(tx: Option<&UnboundedSender<TurnEvent>>, event: TurnEvent) {
    if let Some(t) = tx {
        let _ = t.send(event);
    }
}
