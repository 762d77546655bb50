//! Domain 模块
//!
//! 网络、协议常量、意图、用户操作、会话与交易状态

pub mod entry_point;
pub mod intent;
pub mod network;
pub mod session;
pub mod transaction_status;
pub mod user_operation;

// Re-exports
pub use entry_point::{EntryPoint, ENTRY_POINT};
pub use intent::{TransactionIntent, ValidatedIntent};
pub use network::{NetworkDescriptor, NetworkRegistry};
pub use session::{Session, SessionStatus, SmartAccount};
pub use transaction_status::{OutcomeStatus, OutcomeView, SubmitterPhase, TransactionOutcome};
pub use user_operation::{FeeEstimate, SponsorshipData, UserOperation, UserOperationReceipt};
