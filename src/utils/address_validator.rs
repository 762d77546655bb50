//! 地址验证模块
//!
//! EVM 地址格式校验，混合大小写时验证 EIP-55 checksum。

use ethers::types::Address;

/// 地址验证器
pub struct AddressValidator;

impl AddressValidator {
    /// 验证EVM地址（支持EIP-55 Checksum）
    pub fn is_valid_evm(address: &str) -> bool {
        // 1. 基本格式检查
        let Some(hex_part) = address
            .strip_prefix("0x")
            .or_else(|| address.strip_prefix("0X"))
        else {
            return false;
        };

        if hex_part.len() != 40 {
            return false;
        }

        // 2. 验证hex字符
        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return false;
        }

        // 3. 全小写或全大写不带 checksum
        let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
        let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
        if has_upper && has_lower {
            return Self::verify_eip55_checksum(hex_part);
        }

        true
    }

    /// 解析为 [`Address`]，失败时返回原因
    pub fn parse_evm(address: &str) -> Result<Address, String> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err("recipient address is empty".to_string());
        }
        if !Self::is_valid_evm(trimmed) {
            return Err(format!("recipient is not a valid EVM address: {}", trimmed));
        }

        let bytes = hex::decode(&trimmed[2..])
            .map_err(|e| format!("recipient is not valid hex: {}", e))?;
        Ok(Address::from_slice(&bytes))
    }

    /// 验证EIP-55 Checksum
    /// https://eips.ethereum.org/EIPS/eip-55
    fn verify_eip55_checksum(hex_part: &str) -> bool {
        use sha3::{Digest, Keccak256};

        let addr_lower = hex_part.to_lowercase();
        let mut hasher = Keccak256::new();
        hasher.update(addr_lower.as_bytes());
        let hash = hasher.finalize();

        for (i, ch) in hex_part.chars().enumerate() {
            if ch.is_alphabetic() {
                let hash_byte = hash[i / 2];
                let hash_nibble = if i % 2 == 0 {
                    hash_byte >> 4
                } else {
                    hash_byte & 0x0f
                };

                let should_be_uppercase = hash_nibble >= 8;
                if ch.is_uppercase() != should_be_uppercase {
                    return false;
                }
            }
        }

        true
    }
}
