//! 入口合约与账户协议常量
//!
//! 派生与提交必须使用同一个入口合约版本，二者都只从这里读取。
//! 账户为 Kernel v3.1（ECDSA 根验证器），通过 FactoryStaker 部署。

use ethers::{
    types::{Address, H160, H256},
    utils::keccak256,
};
use serde::Serialize;

/// 入口合约（地址 + 版本）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntryPoint {
    pub address: Address,
    pub version: &'static str,
}

/// ERC-4337 v0.7 EntryPoint: 0x0000000071727De22E5E9d8BAf0edAc6f37da032（所有链相同）
pub const ENTRY_POINT_V07: EntryPoint = EntryPoint {
    address: H160([
        0x00, 0x00, 0x00, 0x00, 0x71, 0x72, 0x7d, 0xe2, 0x2e, 0x5e, 0x9d, 0x8b, 0xaf, 0x0e, 0xda,
        0xc6, 0xf3, 0x7d, 0xa0, 0x32,
    ]),
    version: "0.7",
};

/// 当前唯一使用的入口合约
pub const ENTRY_POINT: EntryPoint = ENTRY_POINT_V07;

/// Kernel v3.1 账户工厂（CREATE2 部署者）: 0xaac5D4240AF87249B3f71BC8E4A2cae074A3E419
pub const KERNEL_FACTORY: Address = H160([
    0xaa, 0xc5, 0xd4, 0x24, 0x0a, 0xf8, 0x72, 0x49, 0xb3, 0xf7, 0x1b, 0xc8, 0xe4, 0xa2, 0xca, 0xe0,
    0x74, 0xa3, 0xe4, 0x19,
]);

/// Kernel v3.1 账户实现: 0xBAC849bB641841b44E965fB01A4Bf5F074f84b4D
pub const KERNEL_IMPLEMENTATION: Address = H160([
    0xba, 0xc8, 0x49, 0xbb, 0x64, 0x18, 0x41, 0xb4, 0x4e, 0x96, 0x5f, 0xb0, 0x1a, 0x4b, 0xf5, 0xf0,
    0x74, 0xf8, 0x4b, 0x4d,
]);

/// 已质押的元工厂，用户操作的 `factory` 字段: 0xd703aaE79538628d27099B8c4f621bE4CCd142d5
pub const FACTORY_STAKER: Address = H160([
    0xd7, 0x03, 0xaa, 0xe7, 0x95, 0x38, 0x62, 0x8d, 0x27, 0x09, 0x9b, 0x8c, 0x4f, 0x62, 0x1b, 0xe4,
    0xcc, 0xd1, 0x42, 0xd5,
]);

/// ECDSA 验证器: 0x845ADb2C711129d4f3966735eD98a9F09fC4cE57
pub const ECDSA_VALIDATOR: Address = H160([
    0x84, 0x5a, 0xdb, 0x2c, 0x71, 0x11, 0x29, 0xd4, 0xf3, 0x96, 0x67, 0x35, 0xed, 0x98, 0xa9, 0xf0,
    0x9f, 0xc4, 0xce, 0x57,
]);

/// Kernel 验证类型：普通验证器
pub const VALIDATOR_TYPE_VALIDATOR: u8 = 0x01;

/// 每个 owner 默认使用的账户序号
pub const DEFAULT_ACCOUNT_INDEX: u64 = 0;

/// 赞助估算阶段使用的占位 ECDSA 签名（65 字节）
pub const DUMMY_SIGNATURE: &str = "0xfffffffffffffffffffffffffffffff0000000000000000000000000000000007aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa1c";

/// ERC-1967 最小代理创建码（solady LibClone）：前缀 + 实现地址 + 后缀，共 95 字节
const ERC1967_PREFIX: &str = "603d3d8160223d3973";
const ERC1967_SUFFIX: &str = concat!(
    "6009",
    "5155f3363d3d373d3d363d7f360894a13ba1a3210667c828492db98dca3e2076",
    "cc3735a920a3ca505d382bbc545af43d6000803e6038573d6000fd5b3d6000f3",
);

/// Kernel 根验证器标识：`bytes21(type ++ validator)`
pub fn root_validator_id() -> [u8; 21] {
    let mut id = [0u8; 21];
    id[0] = VALIDATOR_TYPE_VALIDATOR;
    id[1..].copy_from_slice(ECDSA_VALIDATOR.as_bytes());
    id
}

/// 账户代理创建码
pub fn account_init_code() -> Vec<u8> {
    let mut code = Vec::with_capacity(95);
    // 常量十六进制，解码不会失败
    code.extend(hex::decode(ERC1967_PREFIX).unwrap_or_default());
    code.extend_from_slice(KERNEL_IMPLEMENTATION.as_bytes());
    code.extend(hex::decode(ERC1967_SUFFIX).unwrap_or_default());
    code
}

/// CREATE2 使用的创建码哈希
pub fn account_init_code_hash() -> H256 {
    H256::from(keccak256(account_init_code()))
}
