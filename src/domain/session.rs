//! 会话领域模型
//!
//! 会话只由 SessionManager 创建；钱包或网络变化时整体作废并丢弃，不会被原地修改。

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::{entry_point::EntryPoint, network::NetworkDescriptor},
    service::{
        sponsor_gateway::SponsorGateway,
        wallet::{ChainReader, WalletSigner},
    },
};

/// 会话状态
///
/// ```text
/// Uninitialized -> Initializing -> Ready
///                  Initializing -> Failed
/// Failed        -> Initializing        (重新调用 initialize)
/// 任意状态       -> Uninitialized       (reset)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Uninitialized => "uninitialized",
            SessionStatus::Initializing => "initializing",
            SessionStatus::Ready => "ready",
            SessionStatus::Failed => "failed",
        }
    }

    /// 是否允许开始初始化
    pub fn can_initialize(&self) -> bool {
        matches!(self, SessionStatus::Uninitialized | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 由钱包派生出的智能账户
#[derive(Clone)]
pub struct SmartAccount {
    /// 反事实（counterfactual）账户地址
    pub address: Address,
    /// 控制钱包地址
    pub owner: Address,
    pub index: u64,
    /// 派生时链上是否已有代码
    pub deployed: bool,
    pub factory: Address,
    pub factory_data: Bytes,
    pub entry_point: EntryPoint,
    signer: Arc<dyn WalletSigner>,
}

impl SmartAccount {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Address,
        owner: Address,
        index: u64,
        deployed: bool,
        factory: Address,
        factory_data: Bytes,
        entry_point: EntryPoint,
        signer: Arc<dyn WalletSigner>,
    ) -> Self {
        Self {
            address,
            owner,
            index,
            deployed,
            factory,
            factory_data,
            entry_point,
            signer,
        }
    }

    /// 控制钱包的签名客户端
    pub fn signer(&self) -> &Arc<dyn WalletSigner> {
        &self.signer
    }
}

impl fmt::Debug for SmartAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartAccount")
            .field("address", &self.address)
            .field("owner", &self.owner)
            .field("index", &self.index)
            .field("deployed", &self.deployed)
            .field("entry_point", &self.entry_point.version)
            .finish()
    }
}

/// 就绪会话
///
/// 只有完整填充后才会被暴露；`revoked` 由 reset() 置位，
/// 已经持有该会话的进行中发送不受影响，但之后的发送会被拒绝。
/// `sending` 保证同一会话同一时刻最多一笔发送，与由哪个发送器发起无关。
pub struct Session {
    id: Uuid,
    network: NetworkDescriptor,
    chain_reader: Arc<dyn ChainReader>,
    smart_account: SmartAccount,
    sponsor: Arc<dyn SponsorGateway>,
    created_at: DateTime<Utc>,
    revoked: AtomicBool,
    sending: AtomicBool,
}

impl Session {
    pub fn new(
        network: NetworkDescriptor,
        chain_reader: Arc<dyn ChainReader>,
        smart_account: SmartAccount,
        sponsor: Arc<dyn SponsorGateway>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            network,
            chain_reader,
            smart_account,
            sponsor,
            created_at: Utc::now(),
            revoked: AtomicBool::new(false),
            sending: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn network(&self) -> &NetworkDescriptor {
        &self.network
    }

    pub fn chain_reader(&self) -> &Arc<dyn ChainReader> {
        &self.chain_reader
    }

    pub fn smart_account(&self) -> &SmartAccount {
        &self.smart_account
    }

    pub fn sponsor(&self) -> &Arc<dyn SponsorGateway> {
        &self.sponsor
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 会话只有 Ready 与已作废两种可见状态
    pub fn status(&self) -> SessionStatus {
        if self.revoked.load(Ordering::Acquire) {
            SessionStatus::Uninitialized
        } else {
            SessionStatus::Ready
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == SessionStatus::Ready
    }

    pub(crate) fn revoke(&self) {
        self.revoked.store(true, Ordering::Release);
    }

    /// 是否有发送占用该会话
    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::Acquire)
    }

    /// 占用会话的发送槽；已被占用时返回 None
    pub(crate) fn try_claim_send(self: &Arc<Self>) -> Option<SendClaim> {
        self.sending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SendClaim {
                session: self.clone(),
            })
    }
}

/// 会话发送槽的占用凭证，drop 时释放
pub(crate) struct SendClaim {
    session: Arc<Session>,
}

impl SendClaim {
    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for SendClaim {
    fn drop(&mut self) {
        self.session.sending.store(false, Ordering::Release);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("chain_id", &self.network.chain_id)
            .field("smart_account", &self.smart_account)
            .field("policy_id", &self.sponsor.policy_id())
            .field("status", &self.status())
            .field("sending", &self.is_sending())
            .finish()
    }
}
