//! 钱包事件中继
//!
//! 钱包侧的 `walletChanged` / `walletNetworkChanged` 通知经由 mpsc 通道送达，
//! 每个事件恰好转换为一次 `SessionManager::reset()`。
//! 连接后以钱包报告的网络为准，记录为下一次初始化的首选网络。

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::service::session_manager::SessionManager;

// ============ 事件类型定义 ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WalletEvent {
    /// 当前钱包账户变化
    WalletChanged,
    /// 钱包切换到另一个网络
    WalletNetworkChanged { chain_id: u64 },
}

impl WalletEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            WalletEvent::WalletChanged => "WalletChanged",
            WalletEvent::WalletNetworkChanged { .. } => "WalletNetworkChanged",
        }
    }
}

// ============ 中继 ============

pub struct WalletEventRelay {
    manager: Arc<SessionManager>,
    preferred: Mutex<Option<u64>>,
}

impl WalletEventRelay {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self {
            manager,
            preferred: Mutex::new(None),
        }
    }

    /// 钱包最近一次报告的网络；未报告过时为 None
    pub fn preferred_network(&self) -> Option<u64> {
        match self.preferred.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// 下一次初始化应使用的网络：钱包报告优先，其次是注册表默认网络
    pub fn next_network(&self) -> u64 {
        self.preferred_network()
            .unwrap_or_else(|| self.manager.registry().default_network().chain_id)
    }

    pub fn handle(&self, event: WalletEvent) {
        if let WalletEvent::WalletNetworkChanged { chain_id } = event {
            let mut preferred = match self.preferred.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *preferred = Some(chain_id);

            if !self.manager.registry().is_supported(chain_id) {
                tracing::warn!(chain_id, "Wallet switched to an unsupported network");
            }
        }

        tracing::info!(event = event.event_type(), "Wallet event received, resetting session");
        self.manager.reset();
    }

    /// 处理事件直到发送端全部关闭
    pub async fn run(&self, mut events: mpsc::Receiver<WalletEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        tracing::debug!("Wallet event channel closed");
    }
}
