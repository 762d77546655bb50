//! 交易意图
//!
//! 每次发送新建一个，不持久化。校验在任何网络调用之前完成。

use ethers::{
    types::{Address, Bytes, U256},
    utils::parse_ether,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{CoreError, CoreResult},
    utils::address_validator::AddressValidator,
};

/// 展示层提交的原始意图
///
/// `value` 为最小单位（wei），使用有符号类型以便拒绝负数输入。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub recipient: String,
    pub value: i128,
    #[serde(default)]
    pub data: Bytes,
}

/// 已校验的意图
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIntent {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl TransactionIntent {
    pub fn new(recipient: impl Into<String>, value: i128) -> Self {
        Self {
            recipient: recipient.into(),
            value,
            data: Bytes::default(),
        }
    }

    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = data;
        self
    }

    /// 以 ether 小数表示金额，例如 `"0.0001"`
    pub fn from_ether(recipient: impl Into<String>, ether: &str) -> CoreResult<Self> {
        let trimmed = ether.trim();
        if trimmed.starts_with('-') {
            return Err(CoreError::InvalidIntent(format!(
                "value must be non-negative: {}",
                trimmed
            )));
        }

        let wei = parse_ether(trimmed).map_err(|e| {
            CoreError::InvalidIntent(format!("invalid ether amount {}: {}", trimmed, e))
        })?;
        if wei > U256::from(i128::MAX as u128) {
            return Err(CoreError::InvalidIntent(format!(
                "value out of range: {}",
                trimmed
            )));
        }

        Ok(Self::new(recipient, wei.as_u128() as i128))
    }

    pub fn validate(&self) -> CoreResult<ValidatedIntent> {
        let to = AddressValidator::parse_evm(&self.recipient).map_err(CoreError::InvalidIntent)?;

        if self.value < 0 {
            return Err(CoreError::InvalidIntent(format!(
                "value must be non-negative, got {}",
                self.value
            )));
        }

        Ok(ValidatedIntent {
            to,
            value: U256::from(self.value as u128),
            data: self.data.clone(),
        })
    }
}
