pub mod local_wallet;
pub mod log_redact;
pub mod logging;

pub use local_wallet::LocalWalletHandle;
