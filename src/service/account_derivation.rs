//! 智能账户派生
//!
//! 同一 (钱包身份, 网络, 入口合约版本) 必然得到同一地址（Kernel v3.1 工厂规则）：
//! `salt = keccak256(initData ++ bytes32(index))`，
//! `address = CREATE2(kernelFactory, salt, keccak256(erc1967_init_code))`。
//! 内部不重试，由调用方决定。

use async_trait::async_trait;
use ethers::{
    types::Address,
    utils::{get_create2_address_from_hash, keccak256},
};

use crate::{
    domain::{
        entry_point::{
            account_init_code_hash, EntryPoint, DEFAULT_ACCOUNT_INDEX, ENTRY_POINT,
            FACTORY_STAKER, KERNEL_FACTORY,
        },
        network::NetworkDescriptor,
        session::SmartAccount,
        user_operation::{encode_deploy_with_factory, encode_kernel_initialize, index_salt},
    },
    error::{CoreError, CoreResult},
    infrastructure::log_redact::redact_address,
    service::wallet::{ChainReader, WalletHandle},
};

#[async_trait]
pub trait AccountDeriver: Send + Sync {
    /// `chain_reader` 由调用方提供，派生只用它查询部署状态
    async fn derive(
        &self,
        wallet: &dyn WalletHandle,
        network: &NetworkDescriptor,
        chain_reader: &dyn ChainReader,
    ) -> CoreResult<SmartAccount>;
}

/// ECDSA 控制的智能账户派生器
#[derive(Debug, Clone)]
pub struct EcdsaAccountDeriver {
    index: u64,
    entry_point: EntryPoint,
}

impl Default for EcdsaAccountDeriver {
    fn default() -> Self {
        Self::new()
    }
}

impl EcdsaAccountDeriver {
    pub fn new() -> Self {
        Self {
            index: DEFAULT_ACCOUNT_INDEX,
            entry_point: ENTRY_POINT,
        }
    }

    /// 同一 owner 的第 N 个账户
    pub fn with_index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }

    pub fn entry_point(&self) -> EntryPoint {
        self.entry_point
    }

    /// 纯计算反事实地址，不访问网络
    pub fn counterfactual_address(&self, owner: Address) -> Address {
        counterfactual_address(&encode_kernel_initialize(owner), self.index)
    }
}

/// Kernel 工厂的实际盐：`keccak256(abi.encodePacked(initData, bytes32(index)))`
pub fn account_salt(init_data: &[u8], index: u64) -> [u8; 32] {
    let mut packed = Vec::with_capacity(init_data.len() + 32);
    packed.extend_from_slice(init_data);
    packed.extend_from_slice(&index_salt(index));
    keccak256(packed)
}

pub fn counterfactual_address(init_data: &[u8], index: u64) -> Address {
    get_create2_address_from_hash(
        KERNEL_FACTORY,
        account_salt(init_data, index),
        account_init_code_hash(),
    )
}

#[async_trait]
impl AccountDeriver for EcdsaAccountDeriver {
    async fn derive(
        &self,
        wallet: &dyn WalletHandle,
        network: &NetworkDescriptor,
        chain_reader: &dyn ChainReader,
    ) -> CoreResult<SmartAccount> {
        if !wallet.is_capable() {
            return Err(CoreError::WalletIncapable {
                chain_id: network.chain_id,
                reason: "wallet does not expose a compatible signing client".to_string(),
            });
        }

        let signer = wallet
            .signing_client(network)
            .await
            .map_err(|e| CoreError::WalletIncapable {
                chain_id: network.chain_id,
                reason: e.to_string(),
            })?;

        let owner = signer.address();
        let init_data = encode_kernel_initialize(owner);
        let address = counterfactual_address(&init_data, self.index);

        let code = chain_reader
            .get_code(address)
            .await
            .map_err(|e| CoreError::DerivationFailed(format!("eth_getCode: {}", e)))?;
        let deployed = !code.is_empty();

        tracing::info!(
            chain_id = network.chain_id,
            owner = %redact_address(&format!("{:?}", owner)),
            account = %format!("{:?}", address),
            deployed,
            entry_point_version = self.entry_point.version,
            "Smart account derived"
        );

        Ok(SmartAccount::new(
            address,
            owner,
            self.index,
            deployed,
            FACTORY_STAKER,
            encode_deploy_with_factory(&init_data, self.index),
            self.entry_point,
            signer,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use anyhow::{anyhow, Result};
    use ethers::types::Bytes;

    use super::*;
    use crate::{
        domain::network::{NetworkRegistry, BASE_SEPOLIA, POLYGON_AMOY},
        service::wallet::{ChainReader, WalletSigner},
    };

    struct FixedSigner(Address);

    #[async_trait]
    impl WalletSigner for FixedSigner {
        fn address(&self) -> Address {
            self.0
        }

        async fn sign_message(&self, _message: &[u8]) -> Result<Bytes> {
            Ok(Bytes::from(vec![0u8; 65]))
        }
    }

    struct CodeReader {
        code: Option<Bytes>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChainReader for CodeReader {
        async fn get_code(&self, _address: Address) -> Result<Bytes> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.code.clone().ok_or_else(|| anyhow!("connection refused"))
        }

        async fn call(&self, _to: Address, _data: Bytes) -> Result<Bytes> {
            Ok(Bytes::default())
        }
    }

    struct TestWallet {
        capable: bool,
        owner: Address,
        reader: Arc<CodeReader>,
    }

    #[async_trait]
    impl WalletHandle for TestWallet {
        fn is_capable(&self) -> bool {
            self.capable
        }

        async fn chain_read_client(
            &self,
            _network: &NetworkDescriptor,
        ) -> Result<Arc<dyn ChainReader>> {
            Ok(self.reader.clone())
        }

        async fn signing_client(
            &self,
            _network: &NetworkDescriptor,
        ) -> Result<Arc<dyn WalletSigner>> {
            Ok(Arc::new(FixedSigner(self.owner)))
        }
    }

    fn wallet(capable: bool, code: Option<Bytes>) -> TestWallet {
        TestWallet {
            capable,
            owner: "0x9999999999999999999999999999999999999999".parse().unwrap(),
            reader: Arc::new(CodeReader {
                code,
                calls: AtomicUsize::new(0),
            }),
        }
    }

    #[tokio::test]
    async fn test_derivation_is_deterministic() {
        let registry = NetworkRegistry::new();
        let network = registry.resolve(POLYGON_AMOY).unwrap();
        let deriver = EcdsaAccountDeriver::new();
        let w = wallet(true, Some(Bytes::default()));

        let first = deriver.derive(&w, network, w.reader.as_ref()).await.unwrap();
        let second = deriver.derive(&w, network, w.reader.as_ref()).await.unwrap();

        assert_eq!(first.address, second.address);
        assert_eq!(first.owner, w.owner);
        assert!(!first.deployed);
        assert_eq!(first.entry_point, ENTRY_POINT);
    }

    #[test]
    fn test_known_owner_address() {
        let owner: Address = "0x9999999999999999999999999999999999999999".parse().unwrap();

        let index0 = EcdsaAccountDeriver::new().counterfactual_address(owner);
        let index1 = EcdsaAccountDeriver::new()
            .with_index(1)
            .counterfactual_address(owner);

        assert_eq!(
            format!("{:?}", index0),
            "0x827ac0af3322c93dd1d500025b66d59886eea2c9"
        );
        assert_eq!(
            format!("{:?}", index1),
            "0x6b9491949a174d32c8c9c8ab5857d07869a623ff"
        );
    }

    #[tokio::test]
    async fn test_account_deploys_through_factory_staker() {
        let registry = NetworkRegistry::new();
        let network = registry.resolve(POLYGON_AMOY).unwrap();
        let w = wallet(true, Some(Bytes::default()));

        let account = EcdsaAccountDeriver::new()
            .derive(&w, network, w.reader.as_ref())
            .await
            .unwrap();

        assert_eq!(account.factory, FACTORY_STAKER);
        assert_eq!(
            account.factory_data,
            encode_deploy_with_factory(&encode_kernel_initialize(w.owner), 0)
        );
        assert_eq!(
            account.address,
            counterfactual_address(&encode_kernel_initialize(w.owner), 0)
        );
    }

    #[tokio::test]
    async fn test_different_index_gives_different_address() {
        let owner: Address = "0x9999999999999999999999999999999999999999".parse().unwrap();
        let a = EcdsaAccountDeriver::new().counterfactual_address(owner);
        let b = EcdsaAccountDeriver::new()
            .with_index(1)
            .counterfactual_address(owner);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_deployed_flag_from_code() {
        let registry = NetworkRegistry::new();
        let network = registry.resolve(BASE_SEPOLIA).unwrap();
        let w = wallet(true, Some(Bytes::from(vec![0x60, 0x80])));

        let account = EcdsaAccountDeriver::new()
            .derive(&w, network, w.reader.as_ref())
            .await
            .unwrap();
        assert!(account.deployed);
    }

    #[tokio::test]
    async fn test_incapable_wallet() {
        let registry = NetworkRegistry::new();
        let network = registry.resolve(POLYGON_AMOY).unwrap();
        let w = wallet(false, Some(Bytes::default()));

        let err = EcdsaAccountDeriver::new()
            .derive(&w, network, w.reader.as_ref())
            .await
            .unwrap_err();
        assert!(
            matches!(err, CoreError::WalletIncapable { chain_id, .. } if chain_id == POLYGON_AMOY)
        );
        assert_eq!(w.reader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rpc_fault_is_derivation_failed() {
        let registry = NetworkRegistry::new();
        let network = registry.resolve(POLYGON_AMOY).unwrap();
        let w = wallet(true, None);

        let err = EcdsaAccountDeriver::new()
            .derive(&w, network, w.reader.as_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::DerivationFailed(_)));
    }
}
