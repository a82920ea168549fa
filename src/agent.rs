//! Headless Agent 运行时
//!
//! 组装存储、动作日志、工具调度器与（可选）模型后端，供 CLI / HTTP 等前端调用：
//! run_turn 跑一个 Turn（有模型走 TurnPlanner，否则走规则兜底），
//! undo_action / undo_turn / list_actions 暴露动作日志。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;

use crate::activity::{now, ActivityStore, InMemoryActivityStore};
use crate::config::{AppConfig, LlmProvider};
use crate::core::{AgentError, CancelSignal, JournalError};
use crate::fallback::{run_fallback_turn, FallbackClassifier};
use crate::journal::{
    ActionJournal, ActionStore, AgentAction, InMemoryActionStore, TurnUndoOutcome, UndoOutcome,
};
use crate::llm::{LlmClient, Message, OpenAiClient, ScriptedLlmClient};
use crate::react::{PlannerConfig, Preferences, TurnEvent, TurnOutcome, TurnPlanner, TurnRequest};
use crate::storage::SqliteStore;
use crate::tools::{ToolContext, ToolDispatcher, ToolRegistry};

/// 单个 Turn 的调用参数
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub user_id: String,
    pub turn_id: String,
    pub text: String,
    pub history: Vec<Message>,
    /// 原始偏好键值（tone / duration_unit / focus），运行前清洗
    pub preferences: HashMap<String, String>,
}

pub struct Agent {
    planner: Option<TurnPlanner>,
    dispatcher: Arc<ToolDispatcher>,
    classifier: FallbackClassifier,
    journal: Arc<ActionJournal>,
    activities: Arc<dyn ActivityStore>,
}

impl Agent {
    pub fn new(
        activities: Arc<dyn ActivityStore>,
        actions: Arc<dyn ActionStore>,
        llm: Option<Arc<dyn LlmClient>>,
        cfg: &AppConfig,
    ) -> Self {
        let dispatcher = Arc::new(ToolDispatcher::new(
            ToolRegistry::with_default_tools(),
            cfg.tools.tool_timeout_secs,
        ));
        let planner_config = PlannerConfig {
            max_tool_rounds: cfg.agent.max_tool_rounds,
            round_timeout: Duration::from_secs(cfg.agent.round_timeout_secs),
        };
        let planner = llm.map(|llm| TurnPlanner::new(llm, dispatcher.clone(), planner_config));

        Self {
            planner,
            dispatcher,
            classifier: FallbackClassifier::new(),
            journal: Arc::new(ActionJournal::new(actions, activities.clone())),
            activities,
        }
    }

    /// 按配置构建：database_path 决定 SQLite / 内存存储，llm.provider 决定模型后端
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let (activities, actions): (Arc<dyn ActivityStore>, Arc<dyn ActionStore>) =
            match &cfg.app.database_path {
                Some(path) => {
                    let store = Arc::new(
                        SqliteStore::open(path).map_err(|e| AgentError::ConfigError(e.to_string()))?,
                    );
                    tracing::info!(path = %path.display(), "using SQLite storage");
                    let activities: Arc<dyn ActivityStore> = store.clone();
                    let actions: Arc<dyn ActionStore> = store;
                    (activities, actions)
                }
                None => {
                    tracing::info!("using in-memory storage");
                    let activities: Arc<dyn ActivityStore> = Arc::new(InMemoryActivityStore::new());
                    let actions: Arc<dyn ActionStore> = Arc::new(InMemoryActionStore::new());
                    (activities, actions)
                }
            };
        let llm = create_llm_from_config(cfg)?;
        Ok(Self::new(activities, actions, llm, cfg))
    }

    /// 是否接入了模型后端
    pub fn uses_model(&self) -> bool {
        self.planner.is_some()
    }

    pub async fn run_turn(
        &self,
        input: TurnInput,
        cancel: CancelSignal,
        event_tx: Option<&UnboundedSender<TurnEvent>>,
    ) -> TurnOutcome {
        let context = ToolContext {
            user_id: input.user_id,
            turn_id: input.turn_id,
            now: now(),
            activities: self.activities.clone(),
            journal: self.journal.clone(),
        };

        match &self.planner {
            Some(planner) => {
                let mut request = TurnRequest::new(context, input.text, cancel)
                    .with_history(input.history)
                    .with_preferences(Preferences::from_raw(&input.preferences));
                if let Some(tx) = event_tx {
                    request = request.with_event_tx(tx);
                }
                planner.run(request).await
            }
            None => {
                run_fallback_turn(
                    &self.classifier,
                    &self.dispatcher,
                    &context,
                    &input.text,
                    &cancel,
                    event_tx,
                )
                .await
            }
        }
    }

    pub async fn undo_action(&self, user_id: &str, action_id: &str) -> Result<UndoOutcome, JournalError> {
        self.journal.undo_one(user_id, action_id).await
    }

    pub async fn undo_turn(&self, user_id: &str, turn_id: &str) -> Result<TurnUndoOutcome, JournalError> {
        self.journal.undo_turn(user_id, turn_id).await
    }

    pub async fn list_actions(
        &self,
        user_id: &str,
        turn_id: &str,
    ) -> Result<Vec<AgentAction>, JournalError> {
        self.journal.list_for_turn(user_id, turn_id).await
    }
}

/// 根据配置选择模型后端；provider = none 时返回 None（走规则兜底）
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Option<Arc<dyn LlmClient>>, AgentError> {
    match cfg.llm.provider {
        LlmProvider::None => {
            tracing::info!("No LLM provider configured, using rule-based fallback");
            Ok(None)
        }
        LlmProvider::Mock => {
            tracing::warn!("Using Mock LLM");
            Ok(Some(Arc::new(ScriptedLlmClient::new(Vec::new()))))
        }
        LlmProvider::Openai => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            let client = OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                cfg.llm.api_key.as_deref(),
                cfg.llm.timeouts.request,
            )?;
            Ok(Some(Arc::new(client)))
        }
    }
}
