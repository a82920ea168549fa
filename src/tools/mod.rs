//! 工具箱：封闭的活动工具集合、注册表与调度器

pub mod activity_log;
pub mod block;
pub mod executor;
pub mod registry;
pub mod schema;
pub mod summary;

pub use activity_log::{DeleteActivityTool, LogActivityTool, UpdateActivityTool, UNDO_UNAVAILABLE};
pub use block::{Block, Tone};
pub use executor::{ExecutionStatus, ToolDispatcher, ToolExecution};
pub use registry::{BlockSink, DynTool, Tool, ToolContext, ToolName, ToolOutput, ToolRegistry};
pub use schema::input_schema;
pub use summary::{SuggestFocusTool, TodaySummaryTool};
