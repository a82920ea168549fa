//! Steward 命令行入口
//!
//! 逐行读取 stdin，每行作为一个 Turn；过程事件以 SSE 帧写到 stdout，日志写到 stderr。
//! 命令：/undo <turn_id>、/undo-action <action_id>、/actions <turn_id>、/quit。Ctrl+C 取消当前 Turn。

use std::collections::HashMap;
use std::io::Write;

use anyhow::Context;
use steward::agent::{Agent, TurnInput};
use steward::config::load_config;
use steward::core::CancelSignal;
use steward::llm::Message;
use steward::react::TurnOutcome;
use steward::stream::encode_event;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    steward::observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let agent = Agent::from_config(&cfg).context("Failed to create agent")?;
    let user_id = std::env::var("STEWARD_USER").unwrap_or_else(|_| "local".to_string());

    tracing::info!(
        user = %user_id,
        model = agent.uses_model(),
        "steward ready; type a message, /undo <turn>, /undo-action <id>, /actions <turn> or /quit"
    );

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();
        match cmd {
            "/quit" | "/exit" => break,
            "/undo" | "/undo-action" | "/actions" => {
                println!("{}", journal_command(&agent, &user_id, cmd, arg).await);
            }
            _ => {
                let turn_id = uuid::Uuid::new_v4().to_string();
                let input = TurnInput {
                    user_id: user_id.clone(),
                    turn_id,
                    text: line.to_string(),
                    history: history.clone(),
                    preferences: HashMap::new(),
                };
                let outcome = run_turn(&agent, input).await?;
                history.push(Message::user(line));
                if let TurnOutcome::Ok { assistant_text, .. } = &outcome {
                    history.push(Message::assistant(assistant_text.clone()));
                }
            }
        }
    }

    Ok(())
}

/// 动作日志命令；失败只输出错误，不结束会话
async fn journal_command(agent: &Agent, user_id: &str, cmd: &str, arg: &str) -> String {
    let result = match cmd {
        "/undo" => agent.undo_turn(user_id, arg).await.map(|r| format!("{r:?}")),
        "/undo-action" => agent.undo_action(user_id, arg).await.map(|r| format!("{r:?}")),
        _ => agent
            .list_actions(user_id, arg)
            .await
            .map(|actions| serde_json::to_string_pretty(&actions).unwrap_or_default()),
    };
    match result {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(command = cmd, arg, error = %e, "journal command failed");
            format!("error: {e}")
        }
    }
}

/// 跑一个 Turn，边执行边输出事件帧；Ctrl+C 触发取消
async fn run_turn(agent: &Agent, input: TurnInput) -> anyhow::Result<TurnOutcome> {
    let cancel = CancelSignal::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut stdout = std::io::stdout();

    let turn = agent.run_turn(input, cancel.clone(), Some(&tx));
    tokio::pin!(turn);
    let outcome = loop {
        tokio::select! {
            outcome = &mut turn => break outcome,
            Some(event) = rx.recv() => {
                stdout.write_all(encode_event(&event).as_bytes())?;
                stdout.flush()?;
            }
            _ = tokio::signal::ctrl_c() => cancel.cancel("Cancelled by user (Ctrl+C)"),
        }
    };
    while let Ok(event) = rx.try_recv() {
        stdout.write_all(encode_event(&event).as_bytes())?;
    }
    stdout.flush()?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use steward::activity::{ActivityStore, InMemoryActivityStore};
    use steward::config::AppConfig;
    use steward::core::StoreError;
    use steward::journal::{ActionStore, AgentAction};

    use super::*;

    /// 始终不可用的动作存储
    struct OfflineActions;

    #[async_trait]
    impl ActionStore for OfflineActions {
        async fn insert(&self, _action: &AgentAction) -> Result<(), StoreError> {
            Err(StoreError::Backend("offline".into()))
        }

        async fn get(&self, _id: &str) -> Result<Option<AgentAction>, StoreError> {
            Err(StoreError::Backend("offline".into()))
        }

        async fn list_for_turn(&self, _turn_id: &str) -> Result<Vec<AgentAction>, StoreError> {
            Err(StoreError::Backend("offline".into()))
        }

        async fn mark_undone(&self, _id: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_journal_failures_are_reported_not_fatal() {
        let activities: Arc<dyn ActivityStore> = Arc::new(InMemoryActivityStore::new());
        let actions: Arc<dyn ActionStore> = Arc::new(OfflineActions);
        let agent = Agent::new(activities, actions, None, &AppConfig::default());

        for cmd in ["/undo", "/undo-action", "/actions"] {
            let out = journal_command(&agent, "local", cmd, "t1").await;
            assert!(out.starts_with("error: "), "{cmd}: {out}");
            assert!(out.contains("offline"));
        }
    }
}
