//! 赞助交易发送器
//!
//! ```text
//! Idle -> Submitting -> AwaitingReceipt -> Confirmed
//!         Submitting -> Failed
//!                       AwaitingReceipt -> Failed
//! Confirmed/Failed -> Idle (下一次 send)
//! ```
//!
//! 同一会话同一时刻只允许一笔发送（不论由哪个发送器发起）；失败只报告不重试。
//! 发送开始后即使会话被 reset，本次发送仍使用启动时的会话跑完。

use std::sync::{Arc, Mutex, MutexGuard};

use ethers::types::{Address, H256, U256};

use crate::{
    domain::{
        intent::{TransactionIntent, ValidatedIntent},
        session::{SendClaim, Session},
        transaction_status::{SubmitterPhase, TransactionOutcome},
        user_operation::{decode_nonce, encode_execute, encode_get_nonce, UserOperation},
    },
    error::{CoreError, CoreResult},
    infrastructure::log_redact::redact_address,
    metrics,
    service::session_manager::SessionManager,
};

fn lock_outcome(state: &Mutex<TransactionOutcome>) -> MutexGuard<'_, TransactionOutcome> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(), // 避免因锁污染导致 panic
    }
}

pub struct TransactionSubmitter {
    state: Arc<Mutex<TransactionOutcome>>,
}

impl Default for TransactionSubmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionSubmitter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TransactionOutcome::idle())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TransactionOutcome> {
        lock_outcome(&self.state)
    }

    pub fn phase(&self) -> SubmitterPhase {
        self.lock().phase()
    }

    /// 当前（或最近一次）发送结果的快照
    pub fn outcome(&self) -> TransactionOutcome {
        self.lock().clone()
    }

    /// 使用管理器当前的就绪会话发送
    pub async fn send_via(
        &self,
        manager: &SessionManager,
        intent: TransactionIntent,
    ) -> CoreResult<TransactionOutcome> {
        match manager.session() {
            Some(session) => self.send(&session, intent).await,
            None => {
                let status = manager.status();
                tracing::warn!(status = %status, "Send rejected: no ready session");
                Err(CoreError::SessionNotReady(status.to_string()))
            }
        }
    }

    /// 发送一笔赞助交易
    ///
    /// 返回 `Err` 只表示请求在开始前被拒绝（会话未就绪、意图非法、已有发送进行中），
    /// 此时不会触达赞助服务。开始后的任何失败都体现在返回结果的 `Failed` 状态里。
    ///
    /// 发送在独立任务中执行：调用方放弃等待（drop、超时）不会中断它，
    /// 结果照常写入 `outcome()`。
    pub async fn send(
        &self,
        session: &Arc<Session>,
        intent: TransactionIntent,
    ) -> CoreResult<TransactionOutcome> {
        if !session.is_ready() {
            tracing::warn!(session_id = %session.id(), "Send rejected: session revoked");
            return Err(CoreError::SessionNotReady(session.status().to_string()));
        }

        let validated = intent.validate().map_err(|e| {
            tracing::warn!(error = %e, "Send rejected: invalid intent");
            e
        })?;

        let claim = {
            let mut state = self.lock();
            if state.phase().is_in_flight() {
                tracing::warn!(phase = %state.phase(), "Send rejected: another send in progress");
                return Err(CoreError::SendInProgress);
            }
            let Some(claim) = session.try_claim_send() else {
                tracing::warn!(
                    session_id = %session.id(),
                    "Send rejected: session already has a send in flight"
                );
                return Err(CoreError::SendInProgress);
            };
            *state = TransactionOutcome::idle();
            state.advance(SubmitterPhase::Submitting);
            claim
        };

        tracing::info!(
            chain_id = session.network().chain_id,
            session_id = %session.id(),
            to = %redact_address(&format!("{:?}", validated.to)),
            value = %validated.value,
            "Sponsored send started"
        );

        let drive = SendDrive {
            state: self.state.clone(),
            claim,
            intent: validated,
        };

        match tokio::spawn(drive.run()).await {
            Ok(outcome) => Ok(outcome),
            Err(join_err) => {
                let mut state = self.lock();
                if !state.phase().is_final() {
                    tracing::error!(error = %join_err, "Send task aborted");
                    state.fail(CoreError::SponsorUnavailable(format!(
                        "send task aborted: {}",
                        join_err
                    )));
                    metrics::inc_send_outcome("failed");
                }
                Ok(state.clone())
            }
        }
    }
}

/// 一次发送的执行体；持有会话发送槽直到写入终态
struct SendDrive {
    state: Arc<Mutex<TransactionOutcome>>,
    claim: SendClaim,
    intent: ValidatedIntent,
}

impl SendDrive {
    async fn run(self) -> TransactionOutcome {
        let session = self.claim.session().clone();
        let chain_id = session.network().chain_id;

        let operation_hash = match submit_operation(&session, &self.intent).await {
            Ok(hash) => hash,
            Err(err) => return self.finish_failed(chain_id, err),
        };

        {
            let mut state = lock_outcome(&self.state);
            state.operation_hash = Some(operation_hash);
            state.advance(SubmitterPhase::AwaitingReceipt);
        }
        tracing::info!(chain_id, operation_hash = ?operation_hash, "User operation submitted");

        match session.sponsor().wait_for_receipt(operation_hash).await {
            Ok(receipt) if receipt.success => {
                let mut state = lock_outcome(&self.state);
                tracing::info!(
                    chain_id,
                    operation_hash = ?operation_hash,
                    transaction_hash = ?receipt.receipt.transaction_hash,
                    block_number = %receipt.receipt.block_number,
                    "Sponsored transaction confirmed"
                );
                state.receipt = Some(receipt);
                state.advance(SubmitterPhase::Confirmed);
                metrics::inc_send_outcome("confirmed");
                state.clone()
            }
            Ok(_) => self.finish_failed(
                chain_id,
                CoreError::OperationReverted {
                    user_op_hash: format!("{:?}", operation_hash),
                },
            ),
            Err(err) => self.finish_failed(chain_id, err),
        }
    }

    fn finish_failed(&self, chain_id: u64, err: CoreError) -> TransactionOutcome {
        let mut state = lock_outcome(&self.state);
        tracing::warn!(
            chain_id,
            phase = %state.phase(),
            code = %err.code(),
            error = %err,
            "Sponsored send failed"
        );
        state.fail(err);
        metrics::inc_send_outcome("failed");
        state.clone()
    }
}

/// 构造、定价、赞助、签名并提交，返回操作哈希
async fn submit_operation(session: &Session, intent: &ValidatedIntent) -> CoreResult<H256> {
    let network = session.network();
    let account = session.smart_account();
    let sponsor = session.sponsor();

    let nonce = resolve_nonce(session).await?;
    let call_data = encode_execute(intent.to, intent.value, &intent.data);

    let mut operation = UserOperation::new(account.address, nonce, call_data);
    if !account.deployed {
        operation = operation.with_factory(account.factory, account.factory_data.clone());
    }

    let fees = sponsor.estimate_fees(network).await?;
    operation.apply_fees(&fees);

    let sponsorship = sponsor.sponsor(&operation).await?;
    operation.apply_sponsorship(&sponsorship);

    let hash = operation.hash(&account.entry_point, network.chain_id);
    operation.signature = account
        .signer()
        .sign_message(hash.as_bytes())
        .await
        .map_err(|e| CoreError::WalletIncapable {
            chain_id: network.chain_id,
            reason: format!("signing failed: {}", e),
        })?;

    sponsor.submit(&operation).await
}

/// 未部署账户的 nonce 恒为 0；否则从入口合约读取
async fn resolve_nonce(session: &Session) -> CoreResult<U256> {
    let account = session.smart_account();
    if !account.deployed {
        return Ok(U256::zero());
    }

    read_nonce(session, account.entry_point.address, account.address).await
}

async fn read_nonce(session: &Session, entry_point: Address, sender: Address) -> CoreResult<U256> {
    let raw = session
        .chain_reader()
        .call(entry_point, encode_get_nonce(sender))
        .await
        .map_err(|e| CoreError::SponsorUnavailable(format!("getNonce: {}", e)))?;

    decode_nonce(&raw).ok_or_else(|| {
        CoreError::SponsorUnavailable(format!("getNonce returned {} bytes", raw.len()))
    })
}
