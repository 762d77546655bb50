pub mod account_derivation;
pub mod session_manager;
pub mod sponsor_gateway; // 赞助/打包服务 JSON-RPC 客户端
pub mod transaction_submitter;
pub mod wallet; // 钱包协作方接口
pub mod wallet_events;

pub use account_derivation::{AccountDeriver, EcdsaAccountDeriver};
pub use session_manager::SessionManager;
pub use sponsor_gateway::{GatewayFactory, HttpGatewayFactory, PimlicoGateway, SponsorGateway};
pub use transaction_submitter::TransactionSubmitter;
pub use wallet::{ChainReader, WalletHandle, WalletSigner};
pub use wallet_events::{WalletEvent, WalletEventRelay};
