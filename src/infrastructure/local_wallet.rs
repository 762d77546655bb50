//! 私钥托管的本地钱包
//!
//! 用于命令行和没有浏览器钱包的场景；链上读取走网络描述中的公共 RPC。

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{transaction::eip2718::TypedTransaction, Address, Bytes, TransactionRequest},
};

use crate::{
    domain::network::NetworkDescriptor,
    infrastructure::log_redact::redact_url_secrets,
    service::wallet::{ChainReader, WalletHandle, WalletSigner},
};

// ============ 链只读客户端 ============

pub struct EthersChainReader {
    provider: Provider<Http>,
}

impl EthersChainReader {
    pub fn connect(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url).with_context(|| {
            format!("Failed to create provider for {}", redact_url_secrets(rpc_url))
        })?;
        Ok(Self { provider })
    }
}

#[async_trait]
impl ChainReader for EthersChainReader {
    async fn get_code(&self, address: Address) -> Result<Bytes> {
        self.provider
            .get_code(address, None)
            .await
            .context("eth_getCode failed")
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.provider.call(&tx, None).await.context("eth_call failed")
    }
}

// ============ 签名客户端 ============

pub struct LocalSigner {
    wallet: LocalWallet,
}

#[async_trait]
impl WalletSigner for LocalSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Bytes> {
        let signature = self
            .wallet
            .sign_message(message)
            .await
            .context("Failed to sign message")?;
        Ok(Bytes::from(signature.to_vec()))
    }
}

// ============ 钱包句柄 ============

#[derive(Clone)]
pub struct LocalWalletHandle {
    wallet: LocalWallet,
}

impl LocalWalletHandle {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    /// 从十六进制私钥构造（可带 0x 前缀）
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let wallet: LocalWallet = private_key
            .trim()
            .parse()
            .context("OWNER_PRIVATE_KEY is not a valid secp256k1 private key")?;
        Ok(Self::new(wallet))
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }
}

impl std::fmt::Debug for LocalWalletHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWalletHandle")
            .field("address", &self.wallet.address())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WalletHandle for LocalWalletHandle {
    fn is_capable(&self) -> bool {
        true
    }

    async fn chain_read_client(&self, network: &NetworkDescriptor) -> Result<Arc<dyn ChainReader>> {
        Ok(Arc::new(EthersChainReader::connect(&network.rpc_url)?))
    }

    async fn signing_client(&self, network: &NetworkDescriptor) -> Result<Arc<dyn WalletSigner>> {
        Ok(Arc::new(LocalSigner {
            wallet: self.wallet.clone().with_chain_id(network.chain_id),
        }))
    }
}
