//! 网络注册表
//!
//! 支持网络的固定集合，按链 ID 查找。纯函数，无副作用，无 I/O。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// 赞助/打包服务 URL 模板
pub const BUNDLER_URL_TEMPLATE: &str = "{base}/{chain_id}/rpc?apikey={key}";

pub const POLYGON_AMOY: u64 = 80002;
pub const BASE_SEPOLIA: u64 = 84532;
pub const ETHEREUM_SEPOLIA: u64 = 11155111;

/// 网络描述（不可变值）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    /// EIP-155 链 ID
    pub chain_id: u64,
    /// 展示名称
    pub name: String,
    /// 原生币符号
    pub symbol: String,
    pub is_testnet: bool,
    /// 默认公共 RPC 端点
    pub rpc_url: String,
    /// 打包服务 URL 模板，见 [`BUNDLER_URL_TEMPLATE`]
    pub bundler_url_template: String,
}

impl NetworkDescriptor {
    /// 渲染打包服务地址：`<base>/<chain_id>/rpc?apikey=<key>`
    pub fn bundler_url(&self, base: &str, api_key: &str) -> String {
        self.bundler_url_template
            .replace("{base}", base.trim_end_matches('/'))
            .replace("{chain_id}", &self.chain_id.to_string())
            .replace("{key}", api_key)
    }
}

/// 网络注册表
///
/// `ordered` 保持展示顺序（下拉框顺序），`index` 用于按 ID 查找。
#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    ordered: Vec<NetworkDescriptor>,
    index: HashMap<u64, usize>,
    default_chain_id: u64,
}

impl NetworkRegistry {
    /// 创建预配置的注册表
    pub fn new() -> Self {
        let mut registry = Self {
            ordered: Vec::new(),
            index: HashMap::new(),
            default_chain_id: POLYGON_AMOY,
        };

        registry.register_default_networks();
        registry
    }

    fn register_default_networks(&mut self) {
        // Polygon Amoy（默认选择）
        self.register(NetworkDescriptor {
            chain_id: POLYGON_AMOY,
            name: "Polygon Amoy".to_string(),
            symbol: "POL".to_string(),
            is_testnet: true,
            rpc_url: "https://rpc-amoy.polygon.technology".to_string(),
            bundler_url_template: BUNDLER_URL_TEMPLATE.to_string(),
        });

        // Base Sepolia
        self.register(NetworkDescriptor {
            chain_id: BASE_SEPOLIA,
            name: "Base Sepolia".to_string(),
            symbol: "ETH".to_string(),
            is_testnet: true,
            rpc_url: "https://sepolia.base.org".to_string(),
            bundler_url_template: BUNDLER_URL_TEMPLATE.to_string(),
        });

        // Ethereum Sepolia
        self.register(NetworkDescriptor {
            chain_id: ETHEREUM_SEPOLIA,
            name: "Ethereum Sepolia".to_string(),
            symbol: "ETH".to_string(),
            is_testnet: true,
            rpc_url: "https://rpc.sepolia.org".to_string(),
            bundler_url_template: BUNDLER_URL_TEMPLATE.to_string(),
        });
    }

    fn register(&mut self, descriptor: NetworkDescriptor) {
        let chain_id = descriptor.chain_id;
        if let Some(&pos) = self.index.get(&chain_id) {
            self.ordered[pos] = descriptor;
        } else {
            self.index.insert(chain_id, self.ordered.len());
            self.ordered.push(descriptor);
        }
    }

    /// 覆盖某个网络的公共 RPC 端点（来自配置 `RPC_URL_<chain_id>`）
    ///
    /// 仅修改已支持的网络；支持集合本身在构建时固定。
    pub fn with_rpc_overrides(mut self, overrides: &HashMap<u64, String>) -> Self {
        for (chain_id, url) in overrides {
            if let Some(&pos) = self.index.get(chain_id) {
                self.ordered[pos].rpc_url = url.clone();
            } else {
                tracing::warn!(chain_id, "Ignoring RPC override for unsupported network");
            }
        }
        self
    }

    /// 更换默认网络，必须是已支持的网络
    pub fn with_default_network(mut self, chain_id: u64) -> CoreResult<Self> {
        if !self.is_supported(chain_id) {
            return Err(CoreError::UnsupportedNetwork(chain_id));
        }
        self.default_chain_id = chain_id;
        Ok(self)
    }

    /// 按 ID 解析网络
    pub fn resolve(&self, chain_id: u64) -> CoreResult<&NetworkDescriptor> {
        self.index
            .get(&chain_id)
            .map(|&pos| &self.ordered[pos])
            .ok_or(CoreError::UnsupportedNetwork(chain_id))
    }

    pub fn is_supported(&self, chain_id: u64) -> bool {
        self.index.contains_key(&chain_id)
    }

    /// 按展示顺序列出所有支持的网络
    pub fn list_supported(&self) -> &[NetworkDescriptor] {
        &self.ordered
    }

    /// 连接钱包之前的默认选择
    pub fn default_network(&self) -> &NetworkDescriptor {
        // default_chain_id 总是在 register_default_networks 中注册
        &self.ordered[self.index[&self.default_chain_id]]
    }
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::new()
    }
}
