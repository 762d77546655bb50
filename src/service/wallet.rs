//! 钱包协作方接口
//!
//! 核心只持有钱包的非拥有引用；钱包是否仍然有效由调用方负责。

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::{Address, Bytes};

use crate::domain::network::NetworkDescriptor;

// ============ 链只读客户端 ============

#[async_trait]
pub trait ChainReader: Send + Sync {
    /// 读取地址上的合约代码（未部署为空）
    async fn get_code(&self, address: Address) -> Result<Bytes>;

    /// `eth_call`
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
}

// ============ 签名客户端 ============

#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// 签名者地址（钱包公开身份）
    fn address(&self) -> Address;

    /// EIP-191 消息签名，返回 65 字节签名
    async fn sign_message(&self, message: &[u8]) -> Result<Bytes>;
}

// ============ 钱包句柄 ============

#[async_trait]
pub trait WalletHandle: Send + Sync {
    /// 钱包是否提供兼容的签名客户端
    fn is_capable(&self) -> bool;

    async fn chain_read_client(&self, network: &NetworkDescriptor) -> Result<Arc<dyn ChainReader>>;

    async fn signing_client(&self, network: &NetworkDescriptor) -> Result<Arc<dyn WalletSigner>>;
}
