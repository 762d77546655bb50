//! SponsorCore 命令行入口
//! 用本地私钥初始化会话并发送一笔赞助交易

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use sponsorcore::{
    config::Config,
    domain::{OutcomeStatus, OutcomeView, TransactionIntent},
    infrastructure::{local_wallet::LocalWalletHandle, logging::init_logging},
    metrics,
    service::{EcdsaAccountDeriver, HttpGatewayFactory, SessionManager, TransactionSubmitter},
};

const DEFAULT_RECIPIENT: &str = "0xcc90c7c3e3ad6e4e6bd8cf4fb10d09edc20a9506";
const DEFAULT_VALUE_ETHER: &str = "0.0001";

const USAGE: &str = "usage: sponsorcore [--chain-id <id>] [--to <address>] [--value-ether <amount>] [--config <path>]";

#[derive(Debug, PartialEq, Eq)]
struct CliArgs {
    chain_id: Option<u64>,
    to: String,
    value_ether: String,
    config_path: Option<String>,
}

impl CliArgs {
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut parsed = CliArgs {
            chain_id: None,
            to: DEFAULT_RECIPIENT.to_string(),
            value_ether: DEFAULT_VALUE_ETHER.to_string(),
            config_path: std::env::var("CONFIG_PATH").ok(),
        };

        let mut iter = args.into_iter();
        while let Some(flag) = iter.next() {
            let mut value = || {
                iter.next()
                    .ok_or_else(|| anyhow!("missing value for {}\n{}", flag, USAGE))
            };
            match flag.as_str() {
                "--chain-id" => {
                    let raw = value()?;
                    parsed.chain_id = Some(
                        raw.parse()
                            .with_context(|| format!("--chain-id must be numeric, got {}", raw))?,
                    );
                }
                "--to" => parsed.to = value()?,
                "--value-ether" => parsed.value_ether = value()?,
                "--config" => parsed.config_path = Some(value()?),
                "-h" | "--help" => return Err(anyhow!(USAGE)),
                other => return Err(anyhow!("unknown argument {}\n{}", other, USAGE)),
            }
        }

        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载环境变量
    dotenvy::dotenv().ok();

    let args = CliArgs::parse(std::env::args().skip(1))?;

    // 2. 加载并验证配置
    let config = Config::from_env_and_file(args.config_path.as_deref())?;
    config.validate().context("Invalid configuration")?;

    // 3. 初始化日志
    init_logging(&config.logging).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    let registry = Arc::new(config.network.registry()?);
    let chain_id = args
        .chain_id
        .unwrap_or_else(|| registry.default_network().chain_id);

    // 4. 构造钱包与会话
    let private_key = std::env::var("OWNER_PRIVATE_KEY").context("OWNER_PRIVATE_KEY must be set")?;
    let wallet = Arc::new(LocalWalletHandle::from_private_key(&private_key)?);

    let manager = SessionManager::new(
        registry,
        Arc::new(EcdsaAccountDeriver::new()),
        Arc::new(HttpGatewayFactory::new(config.sponsor.clone())),
    );

    tracing::info!(chain_id, "Starting SponsorCore");

    let session = manager.initialize(wallet, chain_id).await?;
    let account = session.smart_account();
    println!("network:       {} ({})", session.network().name, chain_id);
    println!("smart account: {:?} (deployed: {})", account.address, account.deployed);

    // 5. 发送赞助交易
    let intent = TransactionIntent::from_ether(args.to, &args.value_ether)?;
    let outcome = TransactionSubmitter::new().send(&session, intent).await?;

    let view = OutcomeView::from(&outcome);
    println!("{}", serde_json::to_string_pretty(&view)?);
    tracing::debug!(metrics = %metrics::render_prometheus(), "Final metrics");

    if view.status != OutcomeStatus::Confirmed {
        let reason = outcome
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        anyhow::bail!("sponsored transaction failed: {}", reason);
    }

    Ok(())
}
