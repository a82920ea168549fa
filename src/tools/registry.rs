//! 工具注册表
//!
//! 工具集合是封闭的（ToolName 枚举），启动时注册，按名查找；未知名称直接失败，不做反射。
//! 每个工具声明带 JsonSchema 的输入类型，DynTool 负责先校验再调用，处理器永远拿不到未校验的参数。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::activity::ActivityStore;
use crate::core::ToolError;
use crate::journal::ActionJournal;
use crate::llm::ToolSpec;
use crate::tools::schema::input_schema;
use crate::tools::Block;

/// 封闭的工具名集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    LogActivity,
    UpdateActivity,
    DeleteActivity,
    TodaySummary,
    SuggestFocus,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::LogActivity,
        ToolName::UpdateActivity,
        ToolName::DeleteActivity,
        ToolName::TodaySummary,
        ToolName::SuggestFocus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::LogActivity => "log_activity",
            ToolName::UpdateActivity => "update_activity",
            ToolName::DeleteActivity => "delete_activity",
            ToolName::TodaySummary => "today_summary",
            ToolName::SuggestFocus => "suggest_focus",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.as_str() == raw)
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工具调用上下文：调用者身份、所属 Turn、时间与共享存储
#[derive(Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub turn_id: String,
    /// 「今天」等相对时间的基准
    pub now: DateTime<Utc>,
    pub activities: Arc<dyn ActivityStore>,
    pub journal: Arc<ActionJournal>,
}

/// 工具最终结果三元组；只有 output_for_model 会回到模型上下文
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub summary: String,
    pub blocks: Vec<Block>,
    pub output_for_model: Value,
}

/// 中间结果通道：处理器可多次 emit 累积快照（每次是截至目前的完整块列表），
/// 最终由 Dispatcher 与返回值对账，只产出一份
#[derive(Debug, Default)]
pub struct BlockSink {
    snapshots: Mutex<Vec<Vec<Block>>>,
}

impl BlockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, blocks: Vec<Block>) {
        if let Ok(mut s) = self.snapshots.lock() {
            s.push(blocks);
        }
    }

    pub fn emitted_count(&self) -> usize {
        self.snapshots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn last(&self) -> Option<Vec<Block>> {
        self.snapshots.lock().ok().and_then(|s| s.last().cloned())
    }
}

/// 工具 trait：强类型输入 + 可选业务校验 + 异步执行
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    type Input: DeserializeOwned + JsonSchema + Send + 'static;

    fn name(&self) -> ToolName;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 结构之外的校验（取值范围、非空等）
    fn validate(&self, _input: &Self::Input) -> Result<(), ToolError> {
        Ok(())
    }

    async fn execute(
        &self,
        input: Self::Input,
        ctx: &ToolContext,
        sink: &BlockSink,
    ) -> Result<ToolOutput, ToolError>;
}

/// 类型擦除后的工具，供注册表存放
#[async_trait]
pub trait DynTool: Send + Sync {
    fn tool_name(&self) -> ToolName;

    fn tool_description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    /// 校验原始参数后调用；校验失败返回 ToolError::InvalidArguments，处理器不会被调用
    async fn invoke(
        &self,
        raw_arguments: Value,
        ctx: &ToolContext,
        sink: &BlockSink,
    ) -> Result<ToolOutput, ToolError>;
}

#[async_trait]
impl<T: Tool> DynTool for T {
    fn tool_name(&self) -> ToolName {
        self.name()
    }

    fn tool_description(&self) -> &str {
        self.description()
    }

    fn parameters_schema(&self) -> Value {
        input_schema::<T::Input>()
    }

    async fn invoke(
        &self,
        raw_arguments: Value,
        ctx: &ToolContext,
        sink: &BlockSink,
    ) -> Result<ToolOutput, ToolError> {
        let input: T::Input = serde_json::from_value(raw_arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        self.validate(&input)?;
        self.execute(input, ctx, sink).await
    }
}

/// 工具注册表：按 ToolName 存储 Arc<dyn DynTool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolName, Arc<dyn DynTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部内置工具
    pub fn with_default_tools() -> Self {
        use crate::tools::{
            DeleteActivityTool, LogActivityTool, SuggestFocusTool, TodaySummaryTool,
            UpdateActivityTool,
        };
        let mut registry = Self::new();
        registry.register(LogActivityTool);
        registry.register(UpdateActivityTool);
        registry.register(DeleteActivityTool);
        registry.register(TodaySummaryTool);
        registry.register(SuggestFocusTool);
        registry
    }

    pub fn register(&mut self, tool: impl DynTool + 'static) {
        self.tools.insert(tool.tool_name(), Arc::new(tool));
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn DynTool>> {
        self.tools.get(&name).cloned()
    }

    /// 按名称字符串查找；不在封闭集合内或未注册都返回 None
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn DynTool>> {
        ToolName::parse(name).and_then(|n| self.get(n))
    }

    /// 已注册工具的规格（顺序固定，便于缓存 prompt）
    pub fn specs(&self) -> Vec<ToolSpec> {
        ToolName::ALL
            .into_iter()
            .filter_map(|n| self.tools.get(&n))
            .map(|tool| ToolSpec {
                name: tool.tool_name().as_str().to_string(),
                description: tool.tool_description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_name_is_closed_set() {
        for name in ToolName::ALL {
            assert_eq!(ToolName::parse(name.as_str()), Some(name));
        }
        assert_eq!(ToolName::parse("rm_rf"), None);
        assert_eq!(ToolName::parse("Log_Activity"), None);
    }

    #[test]
    fn test_default_registry_specs() {
        let registry = ToolRegistry::with_default_tools();
        let specs = registry.specs();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "log_activity",
                "update_activity",
                "delete_activity",
                "today_summary",
                "suggest_focus"
            ]
        );
        let log = &specs[0];
        assert_eq!(log.parameters["type"], "object");
        assert!(log.parameters["properties"].get("minutes").is_some());
        assert!(registry.lookup("unknown").is_none());
    }

    #[test]
    fn test_sink_keeps_last_snapshot() {
        let sink = BlockSink::new();
        assert!(sink.last().is_none());
        sink.emit(vec![Block::info("a")]);
        sink.emit(vec![Block::info("a"), Block::info("b")]);
        assert_eq!(sink.emitted_count(), 2);
        assert_eq!(sink.last().unwrap().len(), 2);
    }
}
