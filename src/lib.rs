//! SponsorCore - 赞助交易会话核心
//!
//! 为 ERC-4337 智能账户管理会话生命周期，并通过赞助服务提交免 gas 交易

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod metrics;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use error::{CoreError, CoreResult, ErrorCode, ErrorDetail};

pub mod prelude {
    pub use crate::{
        domain::{
            NetworkDescriptor, NetworkRegistry, OutcomeStatus, Session, SessionStatus,
            SubmitterPhase, TransactionIntent, TransactionOutcome,
        },
        error::{CoreError, CoreResult, ErrorCode, ErrorDetail},
        service::{
            EcdsaAccountDeriver, HttpGatewayFactory, SessionManager, TransactionSubmitter,
            WalletEvent, WalletEventRelay, WalletHandle,
        },
    };
}
