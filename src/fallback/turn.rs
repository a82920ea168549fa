//! 无模型时的 Turn：规则分类 -> 同一个 Dispatcher -> 同样的事件序列
//!
//! trace.fallback_used 恒为 true（包括未命中的情况）。

use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentError, CancelSignal};
use crate::fallback::FallbackClassifier;
use crate::react::{send_event, TurnEvent, TurnOutcome, TurnTrace};
use crate::tools::{Block, ToolContext, ToolDispatcher};

pub const GUIDANCE: &str = "I can log activities (\"log 30 min of reading\"), show today's summary, or suggest what to work on next.";

const FALLBACK_CALL_ID: &str = "fallback-1";

pub async fn run_fallback_turn(
    classifier: &FallbackClassifier,
    dispatcher: &ToolDispatcher,
    context: &ToolContext,
    user_text: &str,
    cancel: &CancelSignal,
    event_tx: Option<&UnboundedSender<TurnEvent>>,
) -> TurnOutcome {
    send_event(
        event_tx,
        TurnEvent::Start {
            turn_id: context.turn_id.clone(),
        },
    );
    let mut trace = TurnTrace {
        fallback_used: true,
        ..TurnTrace::default()
    };

    if cancel.is_cancelled() {
        let outcome = TurnOutcome::Error {
            error_message: AgentError::Cancelled(cancel.reason()).to_string(),
            blocks: Vec::new(),
            trace,
        };
        send_event(event_tx, outcome.to_event());
        return outcome;
    }

    let outcome = match classifier.classify(user_text) {
        None => {
            tracing::debug!(turn_id = %context.turn_id, "no fallback intent matched");
            TurnOutcome::Ok {
                assistant_text: GUIDANCE.to_string(),
                blocks: vec![Block::info(GUIDANCE)],
                trace,
            }
        }
        Some(request) => {
            let tool = request.tool.as_str();
            send_event(
                event_tx,
                TurnEvent::ToolStart {
                    call_id: FALLBACK_CALL_ID.to_string(),
                    tool: tool.to_string(),
                },
            );
            trace.tools_used.push(tool.to_string());

            let execution = dispatcher.execute(tool, request.arguments, context).await;
            send_event(
                event_tx,
                TurnEvent::ToolResult {
                    call_id: FALLBACK_CALL_ID.to_string(),
                    tool: tool.to_string(),
                    blocks: execution.blocks.clone(),
                },
            );
            TurnOutcome::Ok {
                assistant_text: execution.summary,
                blocks: execution.blocks,
                trace,
            }
        }
    };

    send_event(event_tx, outcome.to_event());
    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::activity::{now, InMemoryActivityStore};
    use crate::journal::{ActionJournal, InMemoryActionStore};
    use crate::tools::ToolRegistry;

    fn context() -> ToolContext {
        let activities = Arc::new(InMemoryActivityStore::new());
        ToolContext {
            user_id: "u1".into(),
            turn_id: "t1".into(),
            now: now(),
            journal: Arc::new(ActionJournal::new(
                Arc::new(InMemoryActionStore::new()),
                activities.clone(),
            )),
            activities,
        }
    }

    #[tokio::test]
    async fn test_no_match_still_marks_fallback() {
        let dispatcher = ToolDispatcher::new(ToolRegistry::with_default_tools(), 5);
        let outcome = run_fallback_turn(
            &FallbackClassifier::new(),
            &dispatcher,
            &context(),
            "tell me a joke",
            &CancelSignal::new(),
            None,
        )
        .await;
        assert!(outcome.is_ok());
        assert!(outcome.trace().fallback_used);
        assert!(outcome.trace().tools_used.is_empty());
        assert_eq!(outcome.blocks(), &[Block::info(GUIDANCE)]);
    }

    #[tokio::test]
    async fn test_match_dispatches_and_journals() {
        let dispatcher = ToolDispatcher::new(ToolRegistry::with_default_tools(), 5);
        let ctx = context();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = run_fallback_turn(
            &FallbackClassifier::new(),
            &dispatcher,
            &ctx,
            "log 25 min of reading",
            &CancelSignal::new(),
            Some(&tx),
        )
        .await;

        assert!(outcome.trace().fallback_used);
        assert_eq!(outcome.trace().tools_used, vec!["log_activity"]);
        assert!(outcome.blocks().iter().any(|b| matches!(b, Block::Undo { .. })));
        assert_eq!(ctx.journal.list_for_turn("u1", "t1").await.unwrap().len(), 1);

        let mut types = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            types.push(ev.event_type());
        }
        assert_eq!(types, vec!["start", "tool_start", "tool_result", "final"]);
    }
}
