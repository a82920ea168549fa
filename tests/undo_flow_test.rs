//! 端到端：模型驱动的 Turn -> SQLite 动作日志 -> SSE 往返 -> 撤销与冲突检测

use std::sync::Arc;

use steward::activity::{ActivityCategory, ActivityFields, ActivityStore, InMemoryActivityStore};
use steward::config::AppConfig;
use steward::core::CancelSignal;
use steward::journal::{ActionStore, InMemoryActionStore, TurnUndoOutcome, UndoOutcome, UndoRejection};
use steward::llm::{LlmClient, ScriptedLlmClient, ScriptedRound};
use steward::react::{TurnEvent, TurnOutcome};
use steward::storage::SqliteStore;
use steward::stream::{encode_event, TurnEventReader};
use steward::{Agent, TurnInput};
use tokio::sync::mpsc;
use uuid::Uuid;

fn input(turn_id: &str, text: &str) -> TurnInput {
    TurnInput {
        user_id: "alice".into(),
        turn_id: turn_id.into(),
        text: text.into(),
        ..TurnInput::default()
    }
}

#[tokio::test]
async fn test_model_turn_persists_and_undoes_with_conflict_detection() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("steward.db")).unwrap());
    let activities: Arc<dyn ActivityStore> = store.clone();
    let actions: Arc<dyn ActionStore> = store.clone();

    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![
        ScriptedRound::tool_calls(&[
            ("c1", "log_activity", r#"{"name":"Run","minutes":30,"category":"exercise"}"#),
            ("c2", "log_activity", r#"{"name":"Read","minutes":20,"category":"learning"}"#),
        ]),
        ScriptedRound::text("Logged both."),
    ]));
    let agent = Agent::new(activities.clone(), actions, Some(llm), &AppConfig::default());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = agent
        .run_turn(input("turn-a", "I ran and read"), CancelSignal::new(), Some(&tx))
        .await;
    assert!(matches!(outcome, TurnOutcome::Ok { .. }));

    // 事件经 SSE 编码后按 7 字节分包读回，内容不变
    let mut sent = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        sent.push(ev);
    }
    let wire: Vec<u8> = sent.iter().map(encode_event).collect::<String>().into_bytes();
    let mut reader = TurnEventReader::new();
    let mut received = Vec::new();
    for chunk in wire.chunks(7) {
        received.extend(reader.push(chunk));
    }
    assert_eq!(received, sent);
    assert!(matches!(received.last(), Some(TurnEvent::Final { .. })));

    let recorded = agent.list_actions("alice", "turn-a").await.unwrap();
    assert_eq!(recorded.len(), 2);
    let run_id = Uuid::parse_str(&recorded[0].affected_ids[0]).unwrap();
    let read_id = Uuid::parse_str(&recorded[1].affected_ids[0]).unwrap();

    // 用户在别处改了 Run：整轮撤销被拒绝，且什么都不改
    let edited = ActivityFields {
        name: "Run".into(),
        minutes: 45,
        category: ActivityCategory::Exercise,
        note: None,
    };
    assert!(activities.update_fields("alice", run_id, &edited).await.unwrap());
    let rejected = agent.undo_turn("alice", "turn-a").await.unwrap();
    assert_eq!(
        rejected,
        TurnUndoOutcome::Rejected {
            action_id: recorded[0].id.clone(),
            reason: UndoRejection::Conflict,
        }
    );
    assert!(activities.get("alice", read_id).await.unwrap().is_some());

    // 未冲突的那条仍可单独撤销，且重复撤销是幂等的
    assert_eq!(
        agent.undo_action("alice", &recorded[1].id).await.unwrap(),
        UndoOutcome::Undone
    );
    assert_eq!(
        agent.undo_action("alice", &recorded[1].id).await.unwrap(),
        UndoOutcome::Undone
    );
    assert!(activities.get("alice", read_id).await.unwrap().is_none());

    // 其他用户不能撤销
    assert_eq!(
        agent.undo_action("mallory", &recorded[0].id).await.unwrap(),
        UndoOutcome::Rejected(UndoRejection::InvalidAction)
    );
}

#[tokio::test]
async fn test_fallback_turns_share_dispatcher_and_journal() {
    let activities: Arc<dyn ActivityStore> = Arc::new(InMemoryActivityStore::new());
    let actions: Arc<dyn ActionStore> = Arc::new(InMemoryActionStore::new());
    let agent = Agent::new(activities, actions, None, &AppConfig::default());

    let logged = agent
        .run_turn(input("t1", "log 30 min of running"), CancelSignal::new(), None)
        .await;
    assert_eq!(logged.trace().tools_used, vec!["log_activity"]);

    let recap = agent
        .run_turn(input("t2", "daily recap"), CancelSignal::new(), None)
        .await;
    assert_eq!(recap.trace().tools_used, vec!["today_summary"]);
    assert!(recap.trace().fallback_used);

    let undone = agent.undo_turn("alice", "t1").await.unwrap();
    assert_eq!(
        undone,
        TurnUndoOutcome::Undone {
            turn_id: "t1".into(),
            undone_count: 1
        }
    );
    // 只读 Turn 没有可撤销的动作
    assert_eq!(
        agent.undo_turn("alice", "t2").await.unwrap(),
        TurnUndoOutcome::Undone {
            turn_id: "t2".into(),
            undone_count: 0
        }
    );
}
