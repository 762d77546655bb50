//! 会话管理器
//!
//! 单写者状态机：同一时刻最多一个初始化在进行，并发调用直接拒绝（不排队）。
//! 锁只在状态读写时持有，绝不跨越 `.await`。
//!
//! ```text
//! initialize: 解析网络 -> 派生账户 -> 构造赞助客户端 -> Ready
//!             任一步失败 -> Failed（不暴露半初始化的会话）
//! reset:      任意状态 -> Uninitialized，作废当前会话
//! ```
//!
//! 初始化在独立任务中执行，调用方放弃等待也会写入 Ready 或 Failed。

use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    domain::{
        network::NetworkRegistry,
        session::{Session, SessionStatus},
    },
    error::{CoreError, CoreResult},
    metrics,
    service::{
        account_derivation::AccountDeriver, sponsor_gateway::GatewayFactory, wallet::WalletHandle,
    },
};

enum Phase {
    Uninitialized,
    Initializing,
    Ready(Arc<Session>),
    Failed(CoreError),
}

impl Phase {
    fn status(&self) -> SessionStatus {
        match self {
            Phase::Uninitialized => SessionStatus::Uninitialized,
            Phase::Initializing => SessionStatus::Initializing,
            Phase::Ready(_) => SessionStatus::Ready,
            Phase::Failed(_) => SessionStatus::Failed,
        }
    }
}

struct ManagerState {
    phase: Phase,
    /// 每次开始初始化或 reset 都递增；用于丢弃被 reset 取代的初始化结果
    generation: u64,
}

fn lock_state(state: &Mutex<ManagerState>) -> MutexGuard<'_, ManagerState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(), // 避免因锁污染导致 panic
    }
}

pub struct SessionManager {
    registry: Arc<NetworkRegistry>,
    deriver: Arc<dyn AccountDeriver>,
    gateways: Arc<dyn GatewayFactory>,
    state: Arc<Mutex<ManagerState>>,
}

impl SessionManager {
    pub fn new(
        registry: Arc<NetworkRegistry>,
        deriver: Arc<dyn AccountDeriver>,
        gateways: Arc<dyn GatewayFactory>,
    ) -> Self {
        Self {
            registry,
            deriver,
            gateways,
            state: Arc::new(Mutex::new(ManagerState {
                phase: Phase::Uninitialized,
                generation: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        lock_state(&self.state)
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().phase.status()
    }

    /// 仅在 Ready 时返回会话
    pub fn session(&self) -> Option<Arc<Session>> {
        match &self.lock().phase {
            Phase::Ready(session) => Some(session.clone()),
            _ => None,
        }
    }

    /// Failed 状态下的原始错误
    pub fn last_error(&self) -> Option<CoreError> {
        match &self.lock().phase {
            Phase::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// 初始化会话
    ///
    /// - `Initializing` 期间再次调用返回 `AlreadyInitializing`
    /// - `Ready` 期间任何调用都返回 `AlreadyReady`：管理器无法判断钱包是否已更换，
    ///   调用方须先 `reset()`
    /// - 初始化期间发生 `reset()` 时结果被丢弃，返回 `SessionInvalidated`
    pub async fn initialize(
        &self,
        wallet: Arc<dyn WalletHandle>,
        chain_id: u64,
    ) -> CoreResult<Arc<Session>> {
        let generation = {
            let mut state = self.lock();
            match &state.phase {
                Phase::Initializing => {
                    tracing::warn!(chain_id, "Initialization rejected: already initializing");
                    return Err(CoreError::AlreadyInitializing);
                }
                Phase::Ready(session) => {
                    let active = session.network().chain_id;
                    tracing::warn!(
                        active,
                        requested = chain_id,
                        "Initialization rejected: session already ready"
                    );
                    return Err(CoreError::AlreadyReady {
                        active,
                        requested: chain_id,
                    });
                }
                Phase::Uninitialized | Phase::Failed(_) => {}
            }

            state.generation += 1;
            state.phase = Phase::Initializing;
            state.generation
        };

        tracing::info!(chain_id, generation, "Session initializing");

        let task = InitTask {
            registry: self.registry.clone(),
            deriver: self.deriver.clone(),
            gateways: self.gateways.clone(),
            state: self.state.clone(),
            generation,
            chain_id,
        };

        match tokio::spawn(task.run(wallet)).await {
            Ok(result) => result,
            Err(join_err) => {
                let err = CoreError::DerivationFailed(format!(
                    "initialization task aborted: {}",
                    join_err
                ));
                let mut state = self.lock();
                if state.generation == generation {
                    state.phase = Phase::Failed(err.clone());
                    metrics::inc_session_init(false);
                }
                tracing::error!(chain_id, error = %join_err, "Session initialization task aborted");
                Err(err)
            }
        }
    }

    /// 强制回到 Uninitialized 并作废当前会话
    ///
    /// 钱包或网络变化时必须调用；已持有旧会话的进行中发送不受影响。
    pub fn reset(&self) {
        let mut state = self.lock();
        let previous = state.phase.status();

        if let Phase::Ready(session) = &state.phase {
            session.revoke();
        }

        state.phase = Phase::Uninitialized;
        state.generation += 1;

        tracing::info!(
            previous = %previous,
            generation = state.generation,
            "Session reset"
        );
    }
}

/// 一次初始化的执行体，完成后按代数写回状态
struct InitTask {
    registry: Arc<NetworkRegistry>,
    deriver: Arc<dyn AccountDeriver>,
    gateways: Arc<dyn GatewayFactory>,
    state: Arc<Mutex<ManagerState>>,
    generation: u64,
    chain_id: u64,
}

impl InitTask {
    async fn run(self, wallet: Arc<dyn WalletHandle>) -> CoreResult<Arc<Session>> {
        let chain_id = self.chain_id;
        let generation = self.generation;
        let result = self.build_session(wallet.as_ref()).await;

        let mut state = lock_state(&self.state);
        if state.generation != generation {
            tracing::warn!(
                chain_id,
                generation,
                current = state.generation,
                "Discarding initialization result: session was reset"
            );
            return Err(CoreError::SessionInvalidated);
        }

        match result {
            Ok(session) => {
                let session = Arc::new(session);
                state.phase = Phase::Ready(session.clone());
                metrics::inc_session_init(true);
                tracing::info!(
                    chain_id,
                    session_id = %session.id(),
                    account = %format!("{:?}", session.smart_account().address),
                    "Session ready"
                );
                Ok(session)
            }
            Err(err) => {
                state.phase = Phase::Failed(err.clone());
                metrics::inc_session_init(false);
                tracing::warn!(
                    chain_id,
                    error = %err,
                    code = %err.code(),
                    "Session initialization failed"
                );
                Err(err)
            }
        }
    }

    async fn build_session(&self, wallet: &dyn WalletHandle) -> CoreResult<Session> {
        let chain_id = self.chain_id;
        let network = self.registry.resolve(chain_id)?.clone();

        if !wallet.is_capable() {
            return Err(CoreError::WalletIncapable {
                chain_id,
                reason: "wallet does not expose a compatible signing client".to_string(),
            });
        }

        let chain_reader = wallet
            .chain_read_client(&network)
            .await
            .map_err(|e| CoreError::DerivationFailed(format!("chain read client: {}", e)))?;

        let smart_account = self
            .deriver
            .derive(wallet, &network, chain_reader.as_ref())
            .await?;
        let sponsor = self.gateways.connect(&network)?;

        Ok(Session::new(network, chain_reader, smart_account, sponsor))
    }
}
