//! v0.7 用户操作（UserOperation）
//!
//! RPC 使用非打包格式（camelCase JSON）；哈希按 v0.7 打包规则计算。

use ethers::{
    abi::{self, Token},
    types::{Address, Bytes, H256, U256, U64},
    utils::{id, keccak256},
};
use serde::{Deserialize, Serialize};

use crate::domain::entry_point::{root_validator_id, EntryPoint, DUMMY_SIGNATURE, KERNEL_FACTORY};

/// 非打包格式的用户操作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    pub signature: Bytes,
}

/// 手续费估算（取打包服务报价的 fast 档）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// `pimlico_getUserOperationGasPrice` 的返回
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GasPriceTiers {
    pub slow: FeeEstimate,
    pub standard: FeeEstimate,
    pub fast: FeeEstimate,
}

/// 赞助结果：gas 限额 + paymaster 字段（`pm_sponsorUserOperation`）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorshipData {
    pub paymaster: Address,
    pub paymaster_data: Bytes,
    pub paymaster_verification_gas_limit: U256,
    pub paymaster_post_op_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
}

/// 打包交易的链上收据摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceiptInfo {
    pub transaction_hash: H256,
    pub block_hash: H256,
    pub block_number: U64,
    #[serde(default)]
    pub status: Option<U64>,
}

/// `eth_getUserOperationReceipt` 的返回
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: H256,
    pub sender: Address,
    pub nonce: U256,
    pub success: bool,
    pub actual_gas_cost: U256,
    pub actual_gas_used: U256,
    pub receipt: TransactionReceiptInfo,
}

impl UserOperation {
    /// 新建未定价、未签名的操作，签名先填占位值
    pub fn new(sender: Address, nonce: U256, call_data: Bytes) -> Self {
        Self {
            sender,
            nonce,
            factory: None,
            factory_data: None,
            call_data,
            call_gas_limit: U256::zero(),
            verification_gas_limit: U256::zero(),
            pre_verification_gas: U256::zero(),
            max_fee_per_gas: U256::zero(),
            max_priority_fee_per_gas: U256::zero(),
            paymaster: None,
            paymaster_verification_gas_limit: None,
            paymaster_post_op_gas_limit: None,
            paymaster_data: None,
            signature: dummy_signature(),
        }
    }

    /// 账户未部署时附带工厂调用
    pub fn with_factory(mut self, factory: Address, factory_data: Bytes) -> Self {
        self.factory = Some(factory);
        self.factory_data = Some(factory_data);
        self
    }

    pub fn apply_fees(&mut self, fees: &FeeEstimate) {
        self.max_fee_per_gas = fees.max_fee_per_gas;
        self.max_priority_fee_per_gas = fees.max_priority_fee_per_gas;
    }

    pub fn apply_sponsorship(&mut self, sponsorship: &SponsorshipData) {
        self.paymaster = Some(sponsorship.paymaster);
        self.paymaster_data = Some(sponsorship.paymaster_data.clone());
        self.paymaster_verification_gas_limit = Some(sponsorship.paymaster_verification_gas_limit);
        self.paymaster_post_op_gas_limit = Some(sponsorship.paymaster_post_op_gas_limit);
        self.pre_verification_gas = sponsorship.pre_verification_gas;
        self.verification_gas_limit = sponsorship.verification_gas_limit;
        self.call_gas_limit = sponsorship.call_gas_limit;
    }

    /// `factory ++ factoryData`，已部署时为空
    pub fn init_code(&self) -> Vec<u8> {
        match (&self.factory, &self.factory_data) {
            (Some(factory), data) => {
                let mut out = factory.as_bytes().to_vec();
                if let Some(data) = data {
                    out.extend_from_slice(data);
                }
                out
            }
            _ => Vec::new(),
        }
    }

    /// `paymaster ++ uint128(verificationGas) ++ uint128(postOpGas) ++ paymasterData`
    pub fn paymaster_and_data(&self) -> Vec<u8> {
        let Some(paymaster) = self.paymaster else {
            return Vec::new();
        };

        let mut out = paymaster.as_bytes().to_vec();
        out.extend_from_slice(&low_128(
            self.paymaster_verification_gas_limit.unwrap_or_default(),
        ));
        out.extend_from_slice(&low_128(self.paymaster_post_op_gas_limit.unwrap_or_default()));
        if let Some(data) = &self.paymaster_data {
            out.extend_from_slice(data);
        }
        out
    }

    /// v0.7 操作哈希：`keccak(abi.encode(keccak(packed), entryPoint, chainId))`
    pub fn hash(&self, entry_point: &EntryPoint, chain_id: u64) -> H256 {
        let account_gas_limits = pack_u128_pair(self.verification_gas_limit, self.call_gas_limit);
        let gas_fees = pack_u128_pair(self.max_priority_fee_per_gas, self.max_fee_per_gas);

        let packed = abi::encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(self.init_code()).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::FixedBytes(account_gas_limits.to_vec()),
            Token::Uint(self.pre_verification_gas),
            Token::FixedBytes(gas_fees.to_vec()),
            Token::FixedBytes(keccak256(self.paymaster_and_data()).to_vec()),
        ]);

        let encoded = abi::encode(&[
            Token::FixedBytes(keccak256(packed).to_vec()),
            Token::Address(entry_point.address),
            Token::Uint(U256::from(chain_id)),
        ]);

        H256::from(keccak256(encoded))
    }
}

pub fn dummy_signature() -> Bytes {
    Bytes::from(hex::decode(DUMMY_SIGNATURE.trim_start_matches("0x")).unwrap_or_default())
}

/// 单笔调用的账户 execute 编码：`execute(bytes32 mode, bytes calldata)`
///
/// mode 全零表示单笔调用；executionCalldata 为 `to ++ uint256(value) ++ data`。
pub fn encode_execute(to: Address, value: U256, data: &Bytes) -> Bytes {
    let mut execution = to.as_bytes().to_vec();
    let mut value_word = [0u8; 32];
    value.to_big_endian(&mut value_word);
    execution.extend_from_slice(&value_word);
    execution.extend_from_slice(data);

    let mut out = id("execute(bytes32,bytes)").to_vec();
    out.extend(abi::encode(&[
        Token::FixedBytes(vec![0u8; 32]),
        Token::Bytes(execution),
    ]));
    Bytes::from(out)
}

/// Kernel 初始化调用
///
/// `initialize(bytes21 rootValidator, address hook, bytes validatorData, bytes hookData, bytes[] initConfig)`，
/// 根验证器为 ECDSA 验证器，validatorData 为 owner 地址，不挂 hook。
pub fn encode_kernel_initialize(owner: Address) -> Bytes {
    let mut out = id("initialize(bytes21,address,bytes,bytes,bytes[])").to_vec();
    out.extend(abi::encode(&[
        Token::FixedBytes(root_validator_id().to_vec()),
        Token::Address(Address::zero()),
        Token::Bytes(owner.as_bytes().to_vec()),
        Token::Bytes(Vec::new()),
        Token::Array(Vec::new()),
    ]));
    Bytes::from(out)
}

/// 元工厂部署调用：`deployWithFactory(address factory, bytes createData, bytes32 salt)`
///
/// 元工厂转调 Kernel 工厂的 `createAccount(initData, salt)`。
pub fn encode_deploy_with_factory(init_data: &Bytes, index: u64) -> Bytes {
    let mut out = id("deployWithFactory(address,bytes,bytes32)").to_vec();
    out.extend(abi::encode(&[
        Token::Address(KERNEL_FACTORY),
        Token::Bytes(init_data.to_vec()),
        Token::FixedBytes(index_salt(index).to_vec()),
    ]));
    Bytes::from(out)
}

/// 账户序号作为 `bytes32` 盐
pub fn index_salt(index: u64) -> [u8; 32] {
    let mut salt = [0u8; 32];
    U256::from(index).to_big_endian(&mut salt);
    salt
}

/// 入口合约 `getNonce(address sender, uint192 key)`，key 固定为 0
pub fn encode_get_nonce(sender: Address) -> Bytes {
    let mut out = id("getNonce(address,uint192)").to_vec();
    out.extend(abi::encode(&[Token::Address(sender), Token::Uint(U256::zero())]));
    Bytes::from(out)
}

/// 解析 `getNonce` 返回的 32 字节字
pub fn decode_nonce(raw: &[u8]) -> Option<U256> {
    if raw.len() != 32 {
        return None;
    }
    Some(U256::from_big_endian(raw))
}

fn low_128(value: U256) -> [u8; 16] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    let mut out = [0u8; 16];
    out.copy_from_slice(&word[16..]);
    out
}

fn pack_u128_pair(high: U256, low: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[..16].copy_from_slice(&low_128(high));
    out[16..].copy_from_slice(&low_128(low));
    out
}
