//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    str::FromStr,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::network::{NetworkRegistry, POLYGON_AMOY};

/// 默认赞助策略
pub const DEFAULT_POLICY_ID: &str = "sp_dry_dreaming_celestial";

const RPC_URL_ENV_PREFIX: &str = "RPC_URL_";

/// 读取并解析环境变量，未设置或无法解析时返回 None
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_rpc_urls() -> BTreeMap<String, String> {
    std::env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(RPC_URL_ENV_PREFIX)
                .map(|id| (id.to_string(), value))
        })
        .collect()
}

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sponsor: SponsorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

/// 赞助/打包服务配置
///
/// API key 与策略 ID 是静态配置，不随调用变化。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SponsorConfig {
    pub base_url: String,
    pub api_key: String,
    pub policy_id: String,
    pub timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
    pub receipt_timeout_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// 网络配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub default_chain_id: u64,
    /// chain id（字符串形式）到公共 RPC 端点
    #[serde(default)]
    pub rpc_urls: BTreeMap<String, String>,
}

impl Default for SponsorConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("SPONSOR_BASE_URL")
                .unwrap_or_else(|_| "https://api.pimlico.io/v2".into()),
            api_key: std::env::var("SPONSOR_API_KEY").unwrap_or_default(),
            policy_id: std::env::var("SPONSOR_POLICY_ID")
                .unwrap_or_else(|_| DEFAULT_POLICY_ID.into()),
            timeout_secs: env_parse("SPONSOR_TIMEOUT_SECS").unwrap_or(30),
            receipt_poll_interval_ms: env_parse("SPONSOR_RECEIPT_POLL_MS").unwrap_or(1000),
            receipt_timeout_secs: env_parse("SPONSOR_RECEIPT_TIMEOUT_SECS").unwrap_or(120),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            default_chain_id: env_parse("DEFAULT_CHAIN_ID").unwrap_or(POLYGON_AMOY),
            rpc_urls: env_rpc_urls(),
        }
    }
}

impl NetworkConfig {
    /// 解析 RPC 覆盖表，忽略无法解析的 chain id
    pub fn rpc_overrides(&self) -> HashMap<u64, String> {
        self.rpc_urls
            .iter()
            .filter_map(|(id, url)| id.parse::<u64>().ok().map(|id| (id, url.clone())))
            .collect()
    }

    /// 按配置构建网络注册表
    pub fn registry(&self) -> Result<NetworkRegistry> {
        let registry = NetworkRegistry::new()
            .with_rpc_overrides(&self.rpc_overrides())
            .with_default_network(self.default_chain_id)
            .with_context(|| format!("DEFAULT_CHAIN_ID {}", self.default_chain_id))?;
        Ok(registry)
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            sponsor: SponsorConfig::default(),
            logging: LoggingConfig::default(),
            network: NetworkConfig::default(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从配置文件和环境变量合并加载
    ///
    /// 文件提供基础值，已设置的环境变量逐项覆盖；文件不存在时只用环境变量。
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) if path.as_ref().exists() => {
                let mut config = Self::from_file(path)?;
                config.apply_env_overrides();
                Ok(config)
            }
            _ => Self::from_env(),
        }
    }

    /// 用已设置的环境变量覆盖当前值
    pub fn apply_env_overrides(&mut self) {
        let sponsor = &mut self.sponsor;
        if let Ok(v) = std::env::var("SPONSOR_BASE_URL") {
            sponsor.base_url = v;
        }
        if let Ok(v) = std::env::var("SPONSOR_API_KEY") {
            sponsor.api_key = v;
        }
        if let Ok(v) = std::env::var("SPONSOR_POLICY_ID") {
            sponsor.policy_id = v;
        }
        if let Some(v) = env_parse("SPONSOR_TIMEOUT_SECS") {
            sponsor.timeout_secs = v;
        }
        if let Some(v) = env_parse("SPONSOR_RECEIPT_POLL_MS") {
            sponsor.receipt_poll_interval_ms = v;
        }
        if let Some(v) = env_parse("SPONSOR_RECEIPT_TIMEOUT_SECS") {
            sponsor.receipt_timeout_secs = v;
        }

        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("LOG_FORMAT") {
            self.logging.format = v;
        }

        if let Some(v) = env_parse("DEFAULT_CHAIN_ID") {
            self.network.default_chain_id = v;
        }
        // 同一 chain id 以环境变量为准，其余文件条目保留
        self.network.rpc_urls.extend(env_rpc_urls());
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if !self.sponsor.base_url.starts_with("https://")
            && !self.sponsor.base_url.starts_with("http://")
        {
            anyhow::bail!("SPONSOR_BASE_URL must start with http:// or https://");
        }

        if self.sponsor.api_key.trim().is_empty() {
            anyhow::bail!("SPONSOR_API_KEY must be set");
        }

        if self.sponsor.policy_id.trim().is_empty() {
            anyhow::bail!("SPONSOR_POLICY_ID must not be empty");
        }

        if self.sponsor.timeout_secs == 0 || self.sponsor.receipt_timeout_secs == 0 {
            anyhow::bail!("sponsor timeouts must be greater than zero");
        }

        if self.sponsor.receipt_poll_interval_ms == 0 {
            anyhow::bail!("SPONSOR_RECEIPT_POLL_MS must be greater than zero");
        }

        // 验证日志级别
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        // 验证日志格式
        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        for id in self.network.rpc_urls.keys() {
            if id.parse::<u64>().is_err() {
                anyhow::bail!("RPC_URL_{} does not name a numeric chain id", id);
            }
        }

        if !NetworkRegistry::new().is_supported(self.network.default_chain_id) {
            anyhow::bail!(
                "DEFAULT_CHAIN_ID {} is not a supported network",
                self.network.default_chain_id
            );
        }

        Ok(())
    }
}
