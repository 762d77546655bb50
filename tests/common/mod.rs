//! 测试辅助模块
//! 提供可计数的模拟钱包与赞助网关

#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256, U64};
use sponsorcore::{
    domain::{
        network::NetworkRegistry,
        user_operation::{
            FeeEstimate, SponsorshipData, TransactionReceiptInfo, UserOperation,
            UserOperationReceipt,
        },
        NetworkDescriptor,
    },
    error::{CoreError, CoreResult},
    service::{
        ChainReader, EcdsaAccountDeriver, GatewayFactory, SessionManager, SponsorGateway,
        WalletHandle, WalletSigner,
    },
};
use tokio::sync::Notify;

/// 测试收款地址
pub const RECIPIENT: &str = "0xcc90c7c3e3ad6e4e6bd8cf4fb10d09edc20a9506";

pub const TEST_POLICY: &str = "sp_test_policy";

pub fn owner_a() -> Address {
    Address::repeat_byte(0xa1)
}

pub fn owner_b() -> Address {
    Address::repeat_byte(0xb2)
}

pub fn operation_hash() -> H256 {
    H256::repeat_byte(0xab)
}

// ============ 模拟钱包 ============

pub struct MockChainReader {
    code: Bytes,
    nonce: U256,
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn get_code(&self, _address: Address) -> Result<Bytes> {
        Ok(self.code.clone())
    }

    async fn call(&self, _to: Address, _data: Bytes) -> Result<Bytes> {
        let mut word = [0u8; 32];
        self.nonce.to_big_endian(&mut word);
        Ok(Bytes::from(word.to_vec()))
    }
}

pub struct MockSigner {
    owner: Address,
}

#[async_trait]
impl WalletSigner for MockSigner {
    fn address(&self) -> Address {
        self.owner
    }

    async fn sign_message(&self, _message: &[u8]) -> Result<Bytes> {
        Ok(Bytes::from(vec![0x11; 65]))
    }
}

/// 确定身份的模拟钱包
pub struct MockWallet {
    pub owner: Address,
    pub capable: bool,
    pub deployed: bool,
    pub fail_reads: bool,
    /// 设置后 signing_client 会等待放行
    pub signing_gate: Option<Arc<Notify>>,
    /// signing_client 被调用时通知
    pub signing_entered: Arc<Notify>,
    pub signing_calls: AtomicUsize,
    pub read_client_calls: AtomicUsize,
}

impl MockWallet {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            capable: true,
            deployed: false,
            fail_reads: false,
            signing_gate: None,
            signing_entered: Arc::new(Notify::new()),
            signing_calls: AtomicUsize::new(0),
            read_client_calls: AtomicUsize::new(0),
        }
    }

    pub fn incapable(mut self) -> Self {
        self.capable = false;
        self
    }

    pub fn deployed(mut self) -> Self {
        self.deployed = true;
        self
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.signing_gate = Some(gate);
        self
    }

    pub fn into_handle(self) -> Arc<dyn WalletHandle> {
        Arc::new(self)
    }
}

#[async_trait]
impl WalletHandle for MockWallet {
    fn is_capable(&self) -> bool {
        self.capable
    }

    async fn chain_read_client(
        &self,
        _network: &NetworkDescriptor,
    ) -> Result<Arc<dyn ChainReader>> {
        self.read_client_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(anyhow!("rpc connection refused"));
        }

        let code = if self.deployed {
            Bytes::from(vec![0x60, 0x80, 0x60, 0x40])
        } else {
            Bytes::default()
        };
        Ok(Arc::new(MockChainReader {
            code,
            nonce: U256::from(3),
        }))
    }

    async fn signing_client(&self, _network: &NetworkDescriptor) -> Result<Arc<dyn WalletSigner>> {
        self.signing_calls.fetch_add(1, Ordering::SeqCst);
        self.signing_entered.notify_one();
        if let Some(gate) = &self.signing_gate {
            gate.notified().await;
        }
        Ok(Arc::new(MockSigner { owner: self.owner }))
    }
}

// ============ 模拟赞助网关 ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayBehavior {
    Confirm,
    DenySponsorship,
    SubmitUnavailable,
    Revert,
}

pub struct MockGateway {
    behavior: GatewayBehavior,
    pub estimate_calls: AtomicUsize,
    pub sponsor_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub receipt_calls: AtomicUsize,
    pub submitted: Mutex<Option<UserOperation>>,
    /// 设置后 wait_for_receipt 会等待放行
    receipt_gate: Option<Arc<Notify>>,
    /// wait_for_receipt 被调用时通知
    pub receipt_entered: Arc<Notify>,
}

impl MockGateway {
    pub fn new(behavior: GatewayBehavior) -> Self {
        Self {
            behavior,
            estimate_calls: AtomicUsize::new(0),
            sponsor_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            receipt_calls: AtomicUsize::new(0),
            submitted: Mutex::new(None),
            receipt_gate: None,
            receipt_entered: Arc::new(Notify::new()),
        }
    }

    pub fn with_receipt_gate(mut self, gate: Arc<Notify>) -> Self {
        self.receipt_gate = Some(gate);
        self
    }

    pub fn total_calls(&self) -> usize {
        self.estimate_calls.load(Ordering::SeqCst)
            + self.sponsor_calls.load(Ordering::SeqCst)
            + self.submit_calls.load(Ordering::SeqCst)
            + self.receipt_calls.load(Ordering::SeqCst)
    }

    pub fn last_submitted(&self) -> Option<UserOperation> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SponsorGateway for MockGateway {
    fn policy_id(&self) -> &str {
        TEST_POLICY
    }

    async fn estimate_fees(&self, _network: &NetworkDescriptor) -> CoreResult<FeeEstimate> {
        self.estimate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(FeeEstimate {
            max_fee_per_gas: U256::from(30_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_500_000_000u64),
        })
    }

    async fn sponsor(&self, _operation: &UserOperation) -> CoreResult<SponsorshipData> {
        self.sponsor_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior == GatewayBehavior::DenySponsorship {
            return Err(CoreError::SponsorshipDenied {
                policy_id: TEST_POLICY.to_string(),
                reason: "policy spend limit reached (code -32501)".to_string(),
            });
        }

        Ok(SponsorshipData {
            paymaster: Address::repeat_byte(0x77),
            paymaster_data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
            paymaster_verification_gas_limit: U256::from(60_000),
            paymaster_post_op_gas_limit: U256::from(1),
            pre_verification_gas: U256::from(50_000),
            verification_gas_limit: U256::from(400_000),
            call_gas_limit: U256::from(80_000),
        })
    }

    async fn submit(&self, operation: &UserOperation) -> CoreResult<H256> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior == GatewayBehavior::SubmitUnavailable {
            return Err(CoreError::SponsorUnavailable("HTTP 503 Service Unavailable".into()));
        }

        *self.submitted.lock().unwrap() = Some(operation.clone());
        Ok(operation_hash())
    }

    async fn wait_for_receipt(&self, hash: H256) -> CoreResult<UserOperationReceipt> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        self.receipt_entered.notify_one();
        if let Some(gate) = &self.receipt_gate {
            gate.notified().await;
        }

        let success = self.behavior != GatewayBehavior::Revert;
        Ok(UserOperationReceipt {
            user_op_hash: hash,
            sender: Address::repeat_byte(0x42),
            nonce: U256::zero(),
            success,
            actual_gas_cost: U256::from(1_000_000u64),
            actual_gas_used: U256::from(100_000u64),
            receipt: TransactionReceiptInfo {
                transaction_hash: H256::repeat_byte(0xcd),
                block_hash: H256::repeat_byte(0xef),
                block_number: U64::from(1234),
                status: Some(U64::from(success as u64)),
            },
        })
    }
}

pub struct MockGatewayFactory {
    gateway: Arc<MockGateway>,
    pub connects: AtomicUsize,
    pub connected_chains: Mutex<Vec<u64>>,
}

impl MockGatewayFactory {
    pub fn new(gateway: Arc<MockGateway>) -> Self {
        Self {
            gateway,
            connects: AtomicUsize::new(0),
            connected_chains: Mutex::new(Vec::new()),
        }
    }
}

impl GatewayFactory for MockGatewayFactory {
    fn connect(&self, network: &NetworkDescriptor) -> CoreResult<Arc<dyn SponsorGateway>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connected_chains.lock().unwrap().push(network.chain_id);
        Ok(self.gateway.clone())
    }
}

// ============ 组装 ============

pub struct Harness {
    pub manager: Arc<SessionManager>,
    pub gateway: Arc<MockGateway>,
    pub factory: Arc<MockGatewayFactory>,
}

pub fn harness(gateway: MockGateway) -> Harness {
    let gateway = Arc::new(gateway);
    let factory = Arc::new(MockGatewayFactory::new(gateway.clone()));
    let manager = Arc::new(SessionManager::new(
        Arc::new(NetworkRegistry::new()),
        Arc::new(EcdsaAccountDeriver::new()),
        factory.clone(),
    ));

    Harness {
        manager,
        gateway,
        factory,
    }
}
