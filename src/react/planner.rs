//! Turn 编排器
//!
//! 流式请求模型 -> 收集工具调用（同一轮内按 call id 去重）-> 依次经 Dispatcher 执行 -> 结果回填 -> 下一轮，
//! 直到某轮没有工具调用或达到轮数上限。每个挂起点都受取消信号和单轮超时约束。
//! 取消不会回滚已提交的工具效果（撤销走动作日志）。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;

use crate::core::{AgentError, CancelSignal};
use crate::llm::{LlmClient, Message, ModelDelta, ModelRequest, ToolCallFragment, ToolCallRecord};
use crate::react::prompt::{build_instructions, Preferences};
use crate::react::{send_event, TurnEvent, TurnTrace};
use crate::tools::{Block, ToolContext, ToolDispatcher};

/// 默认每个 Turn 最多的工具轮数
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;
pub const DEFAULT_ROUND_TIMEOUT_SECS: u64 = 30;

/// Turn 结果；失败时保留已经产生的块
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Ok {
        assistant_text: String,
        blocks: Vec<Block>,
        trace: TurnTrace,
    },
    Error {
        error_message: String,
        blocks: Vec<Block>,
        trace: TurnTrace,
    },
}

impl TurnOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, TurnOutcome::Ok { .. })
    }

    pub fn blocks(&self) -> &[Block] {
        match self {
            TurnOutcome::Ok { blocks, .. } | TurnOutcome::Error { blocks, .. } => blocks,
        }
    }

    pub fn trace(&self) -> &TurnTrace {
        match self {
            TurnOutcome::Ok { trace, .. } | TurnOutcome::Error { trace, .. } => trace,
        }
    }

    /// 对应的终止事件（final / error）
    pub fn to_event(&self) -> TurnEvent {
        match self {
            TurnOutcome::Ok {
                assistant_text,
                blocks,
                trace,
            } => TurnEvent::Final {
                assistant_text: assistant_text.clone(),
                blocks: blocks.clone(),
                trace: trace.clone(),
            },
            TurnOutcome::Error { error_message, .. } => TurnEvent::error(error_message.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    pub max_tool_rounds: usize,
    pub round_timeout: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            round_timeout: Duration::from_secs(DEFAULT_ROUND_TIMEOUT_SECS),
        }
    }
}

/// 单个 Turn 的输入
pub struct TurnRequest<'a> {
    /// 调用者身份、turn_id 与共享存储
    pub context: ToolContext,
    pub user_text: String,
    /// 之前的对话（不含 system）
    pub history: Vec<Message>,
    pub preferences: Preferences,
    pub cancel: CancelSignal,
    /// 可选：事件推送通道
    pub event_tx: Option<&'a UnboundedSender<TurnEvent>>,
}

impl<'a> TurnRequest<'a> {
    pub fn new(context: ToolContext, user_text: impl Into<String>, cancel: CancelSignal) -> Self {
        Self {
            context,
            user_text: user_text.into(),
            history: Vec::new(),
            preferences: Preferences::default(),
            cancel,
            event_tx: None,
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<TurnEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }
}

/// 跨轮累积的 Turn 状态
#[derive(Default)]
struct TurnState {
    trace: TurnTrace,
    blocks: Vec<Block>,
}

/// 一轮模型输出（工具调用已去重）
struct RoundOutput {
    text: String,
    calls: Vec<ToolCallFragment>,
}

pub struct TurnPlanner {
    llm: Arc<dyn LlmClient>,
    dispatcher: Arc<ToolDispatcher>,
    config: PlannerConfig,
}

impl TurnPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, dispatcher: Arc<ToolDispatcher>, config: PlannerConfig) -> Self {
        Self {
            llm,
            dispatcher,
            config,
        }
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    pub async fn run(&self, request: TurnRequest<'_>) -> TurnOutcome {
        let TurnRequest {
            context,
            user_text,
            history,
            preferences,
            cancel,
            event_tx,
        } = request;

        send_event(
            event_tx,
            TurnEvent::Start {
                turn_id: context.turn_id.clone(),
            },
        );

        let mut state = TurnState {
            trace: TurnTrace {
                model: Some(self.llm.model_name().to_string()),
                ..TurnTrace::default()
            },
            ..TurnState::default()
        };

        if cancel.is_cancelled() {
            return finish(fail(AgentError::Cancelled(cancel.reason()), state), event_tx);
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(build_instructions(&preferences, context.now)));
        messages.extend(history);
        messages.push(Message::user(user_text));
        let tools = self.dispatcher.tool_specs();

        let mut assistant_text = String::new();
        let mut rounds = 0;
        loop {
            if rounds >= self.config.max_tool_rounds {
                tracing::warn!(
                    turn_id = %context.turn_id,
                    rounds,
                    "tool round limit reached"
                );
                state.trace.hit_tool_limit = true;
                state.blocks.push(Block::warning(format!(
                    "Step limit reached: stopped after {rounds} tool rounds."
                )));
                break;
            }

            let model_request = ModelRequest {
                messages: messages.clone(),
                tools: tools.clone(),
            };
            let collected = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(AgentError::Cancelled(cancel.reason())),
                r = timeout(
                    self.config.round_timeout,
                    self.collect_round(&model_request, &mut state, event_tx),
                ) => match r {
                    Ok(r) => r,
                    Err(_) => Err(AgentError::RoundTimeout(self.config.round_timeout.as_secs())),
                },
            };
            let round = match collected {
                Ok(round) => round,
                Err(e) => return finish(fail(e, state), event_tx),
            };

            // 整轮收齐后、执行任何工具前再检查一次取消
            if cancel.is_cancelled() {
                return finish(fail(AgentError::Cancelled(cancel.reason()), state), event_tx);
            }

            if round.calls.is_empty() {
                assistant_text = round.text;
                break;
            }
            rounds += 1;
            assistant_text = round.text.clone();

            messages.push(Message::assistant_with_calls(
                round.text,
                round
                    .calls
                    .iter()
                    .map(|c| ToolCallRecord {
                        id: c.id.clone(),
                        name: c.name.clone(),
                        arguments: c.arguments.clone(),
                    })
                    .collect(),
            ));

            for call in round.calls {
                if cancel.is_cancelled() {
                    return finish(fail(AgentError::Cancelled(cancel.reason()), state), event_tx);
                }
                let execution = match parse_arguments(&call.arguments) {
                    Ok(args) => self.dispatcher.execute(&call.name, args, &context).await,
                    Err(msg) => self
                        .dispatcher
                        .invalid_arguments(&call.name, &context.turn_id, &msg),
                };
                send_event(
                    event_tx,
                    TurnEvent::ToolResult {
                        call_id: call.id.clone(),
                        tool: call.name.clone(),
                        blocks: execution.blocks.clone(),
                    },
                );
                messages.push(Message::tool(call.id, execution.output_for_model.to_string()));
                state.blocks.extend(execution.blocks);
            }
        }

        tracing::info!(
            turn_id = %context.turn_id,
            tools = ?state.trace.tools_used,
            hit_tool_limit = state.trace.hit_tool_limit,
            "turn finished"
        );
        finish(
            TurnOutcome::Ok {
                assistant_text,
                blocks: state.blocks,
                trace: state.trace,
            },
            event_tx,
        )
    }

    /// 读完一轮增量流；本轮新出现的 call id 立即推送 tool_start。
    /// 去重范围只在本轮：不带 id 的后端每轮都会从 call_0 重新编号。
    async fn collect_round(
        &self,
        request: &ModelRequest,
        state: &mut TurnState,
        event_tx: Option<&UnboundedSender<TurnEvent>>,
    ) -> Result<RoundOutput, AgentError> {
        let mut stream = self.llm.stream_round(request).await?;
        let mut output = RoundOutput {
            text: String::new(),
            calls: Vec::new(),
        };
        let mut seen_calls = HashSet::new();
        while let Some(delta) = stream.next().await {
            match delta? {
                ModelDelta::Text(t) => output.text.push_str(&t),
                ModelDelta::ToolCall(call) => {
                    if !seen_calls.insert(call.id.clone()) {
                        tracing::debug!(call_id = %call.id, "duplicate tool call fragment ignored");
                        continue;
                    }
                    send_event(
                        event_tx,
                        TurnEvent::ToolStart {
                            call_id: call.id.clone(),
                            tool: call.name.clone(),
                        },
                    );
                    state.trace.tools_used.push(call.name.clone());
                    output.calls.push(call);
                }
            }
        }
        Ok(output)
    }
}

/// 空参数视为 {}；非 JSON 返回错误说明
fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw).map_err(|e| format!("arguments are not valid JSON ({e})"))
}

fn fail(error: AgentError, state: TurnState) -> TurnOutcome {
    tracing::warn!(error = %error, "turn aborted");
    TurnOutcome::Error {
        error_message: error.to_string(),
        blocks: state.blocks,
        trace: state.trace,
    }
}

fn finish(outcome: TurnOutcome, event_tx: Option<&UnboundedSender<TurnEvent>>) -> TurnOutcome {
    send_event(event_tx, outcome.to_event());
    outcome
}
