//! 赞助/打包服务客户端
//!
//! 通过 `<base>/<chainId>/rpc?apikey=<key>` 访问 JSON-RPC。所有调用都没有内部重试：
//! 暂时性故障报告为 `SponsorUnavailable`，策略拒绝报告为 `SponsorshipDenied`。
//! 赞助策略 ID 在构造时固定，不能按调用更改。

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use ethers::types::H256;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    config::SponsorConfig,
    domain::{
        entry_point::{EntryPoint, ENTRY_POINT},
        network::NetworkDescriptor,
        user_operation::{
            FeeEstimate, GasPriceTiers, SponsorshipData, UserOperation, UserOperationReceipt,
        },
    },
    error::{CoreError, CoreResult},
    infrastructure::log_redact::{redact_hex_string, redact_url_secrets},
    metrics,
};

/// 打包服务返回的 paymaster 拒绝
const RPC_PAYMASTER_REJECTED: i64 = -32501;
/// paymaster 被限流或封禁
const RPC_PAYMASTER_THROTTLED: i64 = -32504;

// ============ Gateway Trait ============

#[async_trait]
pub trait SponsorGateway: Send + Sync {
    /// 构造时固定的赞助策略
    fn policy_id(&self) -> &str;

    /// 估算 gas 单价
    async fn estimate_fees(&self, network: &NetworkDescriptor) -> CoreResult<FeeEstimate>;

    /// 附加赞助策略：返回 gas 限额与 paymaster 字段
    async fn sponsor(&self, operation: &UserOperation) -> CoreResult<SponsorshipData>;

    /// 提交已签名的操作，返回操作哈希
    async fn submit(&self, operation: &UserOperation) -> CoreResult<H256>;

    /// 等待收据；唯一的超时边界在网关内部
    async fn wait_for_receipt(&self, operation_hash: H256) -> CoreResult<UserOperationReceipt>;
}

/// 为解析后的网络构造网关
pub trait GatewayFactory: Send + Sync {
    fn connect(&self, network: &NetworkDescriptor) -> CoreResult<Arc<dyn SponsorGateway>>;
}

// ============ JSON-RPC ============

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    params: serde_json::Value,
    id: u64,
}

impl<'a> JsonRpcRequest<'a> {
    fn new(method: &'a str, params: serde_json::Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// 将 JSON-RPC 错误分为“策略拒绝”和“服务不可用”
pub fn classify_rpc_error(code: i64, message: &str, policy_id: &str) -> CoreError {
    let lowered = message.to_lowercase();
    let denied = code == RPC_PAYMASTER_REJECTED
        || code == RPC_PAYMASTER_THROTTLED
        || lowered.contains("sponsorship")
        || lowered.contains("policy");

    if denied {
        CoreError::SponsorshipDenied {
            policy_id: policy_id.to_string(),
            reason: format!("{} (code {})", message, code),
        }
    } else {
        CoreError::SponsorUnavailable(format!("{} (code {})", message, code))
    }
}

/// 解析收据；缺少必需字段或哈希不匹配视为格式错误
pub fn parse_receipt(
    raw: serde_json::Value,
    expected: H256,
) -> CoreResult<UserOperationReceipt> {
    let receipt: UserOperationReceipt = serde_json::from_value(raw)
        .map_err(|e| CoreError::MalformedReceipt(e.to_string()))?;

    if receipt.user_op_hash != expected {
        return Err(CoreError::MalformedReceipt(format!(
            "receipt is for {:?}, expected {:?}",
            receipt.user_op_hash, expected
        )));
    }

    Ok(receipt)
}

// ============ HTTP 实现 ============

/// 基于 HTTP JSON-RPC 的 Pimlico 风格网关
pub struct PimlicoGateway {
    http: reqwest::Client,
    url: String,
    chain_id: u64,
    entry_point: EntryPoint,
    policy_id: String,
    poll_interval: Duration,
    receipt_timeout: Duration,
    next_id: AtomicU64,
}

impl PimlicoGateway {
    pub fn new(config: &SponsorConfig, network: &NetworkDescriptor) -> CoreResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CoreError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            url: network.bundler_url(&config.base_url, &config.api_key),
            chain_id: network.chain_id,
            entry_point: ENTRY_POINT,
            policy_id: config.policy_id.clone(),
            poll_interval: Duration::from_millis(config.receipt_poll_interval_ms),
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> CoreResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, params, id);
        let start = Instant::now();

        tracing::debug!(
            method,
            id,
            url = %redact_url_secrets(&self.url),
            "Sponsor RPC request"
        );

        let result = self.rpc_inner(&request).await;
        metrics::observe_sponsor_call(method, start.elapsed().as_millis(), result.is_ok());

        if let Err(e) = &result {
            tracing::warn!(method, id, error = %e, "Sponsor RPC request failed");
        }

        let value = result?;
        serde_json::from_value(value).map_err(|e| {
            CoreError::SponsorUnavailable(format!("unexpected {} response: {}", method, e))
        })
    }

    async fn rpc_inner(&self, request: &JsonRpcRequest<'_>) -> CoreResult<serde_json::Value> {
        let resp = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                CoreError::SponsorUnavailable(redact_url_secrets(&format!("transport: {}", e)))
            })?;

        let status = resp.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::SponsorUnavailable(format!("HTTP {}", status)));
        }

        let body: JsonRpcResponse = resp.json().await.map_err(|e| {
            CoreError::SponsorUnavailable(format!("invalid JSON-RPC body (HTTP {}): {}", status, e))
        })?;

        if let Some(err) = body.error {
            return Err(classify_rpc_error(err.code, &err.message, &self.policy_id));
        }
        if !status.is_success() {
            return Err(CoreError::SponsorUnavailable(format!("HTTP {}", status)));
        }

        Ok(body.result.unwrap_or(serde_json::Value::Null))
    }

    fn entry_point_param(&self) -> serde_json::Value {
        serde_json::Value::String(format!("{:?}", self.entry_point.address))
    }
}

#[async_trait]
impl SponsorGateway for PimlicoGateway {
    fn policy_id(&self) -> &str {
        &self.policy_id
    }

    async fn estimate_fees(&self, network: &NetworkDescriptor) -> CoreResult<FeeEstimate> {
        if network.chain_id != self.chain_id {
            return Err(CoreError::Config(format!(
                "gateway bound to chain {} asked for chain {}",
                self.chain_id, network.chain_id
            )));
        }

        let tiers: GasPriceTiers = self
            .rpc("pimlico_getUserOperationGasPrice", serde_json::json!([]))
            .await?;
        Ok(tiers.fast)
    }

    async fn sponsor(&self, operation: &UserOperation) -> CoreResult<SponsorshipData> {
        let params = serde_json::json!([
            operation,
            self.entry_point_param(),
            { "sponsorshipPolicyId": self.policy_id },
        ]);

        let data: SponsorshipData = self.rpc("pm_sponsorUserOperation", params).await?;
        tracing::info!(
            chain_id = self.chain_id,
            policy_id = %self.policy_id,
            paymaster = %format!("{:?}", data.paymaster),
            paymaster_data = %redact_hex_string(&data.paymaster_data.to_string(), 10),
            "User operation sponsored"
        );
        Ok(data)
    }

    async fn submit(&self, operation: &UserOperation) -> CoreResult<H256> {
        let params = serde_json::json!([operation, self.entry_point_param()]);
        self.rpc("eth_sendUserOperation", params).await
    }

    async fn wait_for_receipt(&self, operation_hash: H256) -> CoreResult<UserOperationReceipt> {
        let polling = async {
            loop {
                let raw: Option<serde_json::Value> = self
                    .rpc(
                        "eth_getUserOperationReceipt",
                        serde_json::json!([operation_hash]),
                    )
                    .await?;

                match raw {
                    Some(value) if !value.is_null() => {
                        return parse_receipt(value, operation_hash);
                    }
                    _ => tokio::time::sleep(self.poll_interval).await,
                }
            }
        };

        match tokio::time::timeout(self.receipt_timeout, polling).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::SponsorUnavailable(format!(
                "no receipt for {:?} after {}s",
                operation_hash,
                self.receipt_timeout.as_secs()
            ))),
        }
    }
}

/// 按配置为每个网络构造 [`PimlicoGateway`]
#[derive(Debug, Clone)]
pub struct HttpGatewayFactory {
    config: SponsorConfig,
}

impl HttpGatewayFactory {
    pub fn new(config: SponsorConfig) -> Self {
        Self { config }
    }
}

impl GatewayFactory for HttpGatewayFactory {
    fn connect(&self, network: &NetworkDescriptor) -> CoreResult<Arc<dyn SponsorGateway>> {
        Ok(Arc::new(PimlicoGateway::new(&self.config, network)?))
    }
}
