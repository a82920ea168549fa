//! 工具调度器
//!
//! 持有 ToolRegistry 与单次调用超时。execute(name, args, ctx) 永不返回错误：
//! 未知工具、参数校验失败、处理器报错 / panic / 超时都转为同一种结构化失败结果
//! （error 状态块 + output_for_model.error），一个工具失败不会中止整个 Turn。
//! 每次调用输出一条结构化审计日志。

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::core::ToolError;
use crate::llm::ToolSpec;
use crate::tools::{Block, BlockSink, DynTool, ToolContext, ToolOutput, ToolRegistry};

/// 单次调用的结局分类（审计与 output_for_model.error 使用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Ok,
    UnsupportedTool,
    InvalidArguments,
    ExecutionFailed,
    Timeout,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Ok => "ok",
            ExecutionStatus::UnsupportedTool => "unsupported_tool",
            ExecutionStatus::InvalidArguments => "invalid_arguments",
            ExecutionStatus::ExecutionFailed => "execution_failed",
            ExecutionStatus::Timeout => "timeout",
        }
    }
}

/// 一次工具调用的最终结果（块已与中间快照对账，不含重复）
#[derive(Debug, Clone)]
pub struct ToolExecution {
    pub tool: String,
    pub status: ExecutionStatus,
    pub summary: String,
    pub blocks: Vec<Block>,
    pub output_for_model: Value,
}

impl ToolExecution {
    /// 统一的失败形状
    pub fn failure(tool: &str, status: ExecutionStatus, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            tool: tool.to_string(),
            status,
            summary: format!("{tool} failed"),
            blocks: vec![Block::error(message.clone())],
            output_for_model: json!({
                "error": status.as_str(),
                "message": message,
            }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatus::Ok
    }
}

/// 工具调度器：查找 → 校验 → 带超时执行 → 对账中间块 → 审计
pub struct ToolDispatcher {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    /// 参数文本无法解析为 JSON 时由调用方直接生成失败结果（处理器不会被调用）
    pub fn invalid_arguments(&self, name: &str, turn_id: &str, message: &str) -> ToolExecution {
        let execution = ToolExecution::failure(
            name,
            ExecutionStatus::InvalidArguments,
            format!("Invalid arguments for {name}: {message}"),
        );
        audit(name, turn_id, &execution, Instant::now(), String::new());
        execution
    }

    pub async fn execute(&self, name: &str, raw_arguments: Value, ctx: &ToolContext) -> ToolExecution {
        let start = Instant::now();
        let args_preview = args_preview(&raw_arguments);

        let execution = match self.registry.lookup(name) {
            None => ToolExecution::failure(
                name,
                ExecutionStatus::UnsupportedTool,
                format!("Unsupported tool: {name}"),
            ),
            Some(tool) => {
                let sink = BlockSink::new();
                let call = AssertUnwindSafe(tool.invoke(raw_arguments, ctx, &sink)).catch_unwind();
                match timeout(self.timeout, call).await {
                    Ok(Ok(Ok(output))) => reconcile(name, output, &sink),
                    Ok(Ok(Err(ToolError::InvalidArguments(msg)))) => ToolExecution::failure(
                        name,
                        ExecutionStatus::InvalidArguments,
                        format!("Invalid arguments for {name}: {msg}"),
                    ),
                    Ok(Ok(Err(e))) => {
                        ToolExecution::failure(name, ExecutionStatus::ExecutionFailed, e.to_string())
                    }
                    Ok(Err(panic)) => ToolExecution::failure(
                        name,
                        ExecutionStatus::ExecutionFailed,
                        format!("Tool {name} crashed: {}", panic_message(panic.as_ref())),
                    ),
                    Err(_) => ToolExecution::failure(
                        name,
                        ExecutionStatus::Timeout,
                        format!("Tool {name} timed out after {}s", self.timeout.as_secs()),
                    ),
                }
            }
        };

        audit(name, &ctx.turn_id, &execution, start, args_preview);
        execution
    }
}

/// 每次调用一条结构化审计日志
fn audit(name: &str, turn_id: &str, execution: &ToolExecution, start: Instant, args_preview: String) {
    let audit = json!({
        "event": "tool_audit",
        "tool": name,
        "turn_id": turn_id,
        "ok": execution.is_ok(),
        "outcome": execution.status.as_str(),
        "duration_ms": start.elapsed().as_millis() as u64,
        "args_preview": args_preview,
    });
    tracing::info!(audit = %audit, "tool");
}

/// 最终块 = 返回值中的块；处理器只通过 sink 产出时取最后一次快照。两者不会拼接。
fn reconcile(name: &str, output: ToolOutput, sink: &BlockSink) -> ToolExecution {
    let emitted = sink.emitted_count();
    let blocks = if output.blocks.is_empty() {
        sink.last().unwrap_or_default()
    } else {
        output.blocks
    };
    if emitted > 0 {
        tracing::debug!(tool = name, partials = emitted, "reconciled streamed blocks");
    }
    ToolExecution {
        tool: name.to_string(),
        status: ExecutionStatus::Ok,
        summary: output.summary,
        blocks,
        output_for_model: output.output_for_model,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
