//! 核心错误分类
//!
//! 所有错误都以类型化结果返回给调用方（状态 + 错误详情），核心内部不做任何自动重试。

use serde::Serialize;
use thiserror::Error;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnsupportedNetwork,
    WalletIncapable,
    DerivationFailed,
    SponsorUnavailable,
    SponsorshipDenied,
    AlreadyInitializing,
    SessionNotReady,
    InvalidIntent,
    SendInProgress,
    SessionInvalidated,
    AlreadyReady,
    OperationReverted,
    MalformedReceipt,
    Config,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnsupportedNetwork => "unsupported_network",
            ErrorCode::WalletIncapable => "wallet_incapable",
            ErrorCode::DerivationFailed => "derivation_failed",
            ErrorCode::SponsorUnavailable => "sponsor_unavailable",
            ErrorCode::SponsorshipDenied => "sponsorship_denied",
            ErrorCode::AlreadyInitializing => "already_initializing",
            ErrorCode::SessionNotReady => "session_not_ready",
            ErrorCode::InvalidIntent => "invalid_intent",
            ErrorCode::SendInProgress => "send_in_progress",
            ErrorCode::SessionInvalidated => "session_invalidated",
            ErrorCode::AlreadyReady => "already_ready",
            ErrorCode::OperationReverted => "operation_reverted",
            ErrorCode::MalformedReceipt => "malformed_receipt",
            ErrorCode::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 核心错误类型
///
/// `Clone` 是必需的：`Failed` 状态持有原始错误，同时观察者也会拿到一份副本。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// 网络 ID 不在固定支持列表中
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(u64),

    /// 钱包无法为目标网络提供签名客户端
    #[error("wallet cannot provide a signing client for chain {chain_id}: {reason}")]
    WalletIncapable { chain_id: u64, reason: String },

    /// 智能账户派生过程中的下游 RPC 故障
    #[error("smart account derivation failed: {0}")]
    DerivationFailed(String),

    /// 赞助服务暂时不可用（可重试）
    #[error("sponsor service unavailable: {0}")]
    SponsorUnavailable(String),

    /// 赞助策略拒绝（更换策略前不可重试）
    #[error("sponsorship denied by policy {policy_id}: {reason}")]
    SponsorshipDenied { policy_id: String, reason: String },

    #[error("session initialization already in progress")]
    AlreadyInitializing,

    #[error("session is not ready (status: {0})")]
    SessionNotReady(String),

    #[error("invalid transaction intent: {0}")]
    InvalidIntent(String),

    #[error("another send is already in progress")]
    SendInProgress,

    /// 初始化过程中会话被 reset()，结果已丢弃
    #[error("session was reset while initializing")]
    SessionInvalidated,

    /// 已有就绪会话；更换钱包或网络前需先 reset()
    #[error("session already ready on chain {active} (requested {requested}); reset first")]
    AlreadyReady { active: u64, requested: u64 },

    /// 操作已上链但执行失败
    #[error("user operation {user_op_hash} reverted on chain")]
    OperationReverted { user_op_hash: String },

    #[error("malformed user operation receipt: {0}")]
    MalformedReceipt(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::UnsupportedNetwork(_) => ErrorCode::UnsupportedNetwork,
            CoreError::WalletIncapable { .. } => ErrorCode::WalletIncapable,
            CoreError::DerivationFailed(_) => ErrorCode::DerivationFailed,
            CoreError::SponsorUnavailable(_) => ErrorCode::SponsorUnavailable,
            CoreError::SponsorshipDenied { .. } => ErrorCode::SponsorshipDenied,
            CoreError::AlreadyInitializing => ErrorCode::AlreadyInitializing,
            CoreError::SessionNotReady(_) => ErrorCode::SessionNotReady,
            CoreError::InvalidIntent(_) => ErrorCode::InvalidIntent,
            CoreError::SendInProgress => ErrorCode::SendInProgress,
            CoreError::SessionInvalidated => ErrorCode::SessionInvalidated,
            CoreError::AlreadyReady { .. } => ErrorCode::AlreadyReady,
            CoreError::OperationReverted { .. } => ErrorCode::OperationReverted,
            CoreError::MalformedReceipt(_) => ErrorCode::MalformedReceipt,
            CoreError::Config(_) => ErrorCode::Config,
        }
    }

    /// 调用方再次发起同一请求是否有意义
    ///
    /// 仅作为提示提供给展示层；核心本身从不自动重试。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::SponsorUnavailable(_)
                | CoreError::DerivationFailed(_)
                | CoreError::AlreadyInitializing
                | CoreError::SendInProgress
                | CoreError::SessionInvalidated
        )
    }

    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail::from(self)
    }
}

/// 交给展示层的错误详情
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl From<&CoreError> for ErrorDetail {
    fn from(err: &CoreError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}
