//! 协作式取消
//!
//! CancelSignal = CancellationToken + 取消原因。沿调用链显式传递，在每个挂起边界
//! （模型调用前、工具执行前）检查；不做隐式中断。

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

const DEFAULT_REASON: &str = "Cancelled by user";

/// 单个 Turn 的取消信号，可克隆，所有克隆共享同一状态
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 作为外部 token 的子信号：外部取消时本信号随之取消（如进程级关闭）
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// 触发取消；只保留第一次给出的原因
    pub fn cancel(&self, reason: impl Into<String>) {
        if let Ok(mut slot) = self.reason.lock() {
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 取消原因；父 token 触发但未给原因时返回默认文案
    pub fn reason(&self) -> String {
        self.reason
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| DEFAULT_REASON.to_string())
    }

    /// 等待取消
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
