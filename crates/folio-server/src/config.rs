use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

use folio_core::{ChainKind, CoreError, WalletAddress};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub wallets: WalletsConfig,
    pub scheduler: SchedulerConfig,
    pub sources: SourcesConfig,
    pub browser: BrowserConfig,
    pub output: OutputConfig,
    pub filters: FilterConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WalletsConfig {
    #[serde(default)]
    pub solana: Vec<String>,
    #[serde(default)]
    pub evm: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub interval_minutes: u64,
    /// Run a tick immediately at startup instead of waiting one interval
    #[serde(default = "default_true")]
    pub run_on_start: bool,
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    pub solana: SourceConfig,
    pub evm: SourceConfig,
}

impl SourcesConfig {
    pub fn for_chain(&self, chain: ChainKind) -> &SourceConfig {
        match chain {
            ChainKind::Solana => &self.solana,
            ChainKind::Evm => &self.evm,
        }
    }
}

/// Per-source tuning. The two dashboards were tuned independently, so every
/// knob is exposed rather than shared.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub base_url: String,
    /// Extra attempts after the first one
    pub retries: u32,
    pub retry_delay_secs: u64,
    pub startup_timeout_secs: u64,
    /// Navigation and element-wait budget
    pub page_timeout_secs: u64,
    /// Upper bound for interactive gates (captcha, wallet unlock) before content shows
    pub interactive_wait_secs: u64,
    /// Whole-attempt budget for one wallet
    pub extraction_timeout_secs: u64,
    /// Pause after content appears, for late-rendering widgets
    pub settle_millis: u64,
    pub profile_dir: PathBuf,
}

impl SourceConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn interactive_wait(&self) -> Duration {
        Duration::from_secs(self.interactive_wait_secs)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_millis)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    /// Assets worth less than this (USD) are dropped from snapshots
    pub min_usd_value: Decimal,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("wallets.solana", Vec::<String>::new())?
            .set_default("wallets.evm", Vec::<String>::new())?
            .set_default("scheduler.interval_minutes", 15)?
            .set_default("scheduler.run_on_start", true)?
            // Solana dashboard embeds its own captcha wait, so no extra retries
            .set_default("sources.solana.enabled", true)?
            .set_default("sources.solana.base_url", "https://jup.ag")?
            .set_default("sources.solana.retries", 0)?
            .set_default("sources.solana.retry_delay_secs", 3)?
            .set_default("sources.solana.startup_timeout_secs", 30)?
            .set_default("sources.solana.page_timeout_secs", 30)?
            .set_default("sources.solana.interactive_wait_secs", 10)?
            .set_default("sources.solana.extraction_timeout_secs", 180)?
            .set_default("sources.solana.settle_millis", 3000)?
            .set_default("sources.solana.profile_dir", "profiles/solana")?
            .set_default("sources.evm.enabled", true)?
            .set_default("sources.evm.base_url", "https://debank.com")?
            .set_default("sources.evm.retries", 2)?
            .set_default("sources.evm.retry_delay_secs", 3)?
            .set_default("sources.evm.startup_timeout_secs", 30)?
            .set_default("sources.evm.page_timeout_secs", 30)?
            .set_default("sources.evm.interactive_wait_secs", 120)?
            .set_default("sources.evm.extraction_timeout_secs", 240)?
            .set_default("sources.evm.settle_millis", 3000)?
            .set_default("sources.evm.profile_dir", "profiles/evm")?
            .set_default("browser.headless", true)?
            .set_default("browser.window_width", 1920)?
            .set_default("browser.window_height", 1080)?
            .set_default("browser.extra_args", Vec::<String>::new())?
            .set_default("output.dir", "feeds")?
            .set_default("filters.min_usd_value", 5)?
            // Load from config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (FOLIO__SCHEDULER__INTERVAL_MINUTES, etc.)
            // Wallet lists accept comma separated values: FOLIO__WALLETS__EVM=0xabc...,0xdef...
            .add_source(
                Environment::with_prefix("FOLIO")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("wallets.solana")
                    .with_list_parse_key("wallets.evm")
                    .with_list_parse_key("browser.extra_args")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Classify every configured address. Any address that is malformed,
    /// listed under the wrong chain, or listed twice rejects the whole config.
    pub fn validate(&self) -> Result<WalletRoster, CoreError> {
        let mut seen = HashSet::new();
        let mut parse_list = |raw: &[String], chain: ChainKind| -> Result<Vec<WalletAddress>, CoreError> {
            let mut wallets = Vec::with_capacity(raw.len());
            for address in raw {
                let wallet = WalletAddress::parse_for(address, chain)?;
                if !seen.insert(wallet.as_str().to_string()) {
                    return Err(CoreError::InvalidWallet(format!(
                        "{} is configured more than once",
                        wallet
                    )));
                }
                wallets.push(wallet);
            }
            Ok(wallets)
        };

        let solana = parse_list(&self.wallets.solana, ChainKind::Solana)?;
        let evm = parse_list(&self.wallets.evm, ChainKind::Evm)?;
        Ok(WalletRoster { solana, evm })
    }
}

/// The validated, ordered set of configured wallets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletRoster {
    pub solana: Vec<WalletAddress>,
    pub evm: Vec<WalletAddress>,
}

impl WalletRoster {
    pub fn for_chain(&self, chain: ChainKind) -> &[WalletAddress] {
        match chain {
            ChainKind::Solana => &self.solana,
            ChainKind::Evm => &self.evm,
        }
    }

    /// Solana first, then EVM, each in configured order.
    pub fn all(&self) -> impl Iterator<Item = &WalletAddress> {
        self.solana.iter().chain(self.evm.iter())
    }

    pub fn len(&self) -> usize {
        self.solana.len() + self.evm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured addresses as strings, for error payloads.
    pub fn addresses(&self) -> Vec<String> {
        self.all().map(|w| w.to_string()).collect()
    }

    /// Look up a configured wallet by its raw address string.
    pub fn find(&self, raw: &str) -> Option<&WalletAddress> {
        let raw = raw.trim();
        self.all().find(|w| w.as_str() == raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOL: &str = "ERKdjoj6UHoPiwXv784SAnHowc4E5AJFUErWJCCFtga";
    const EVM: &str = "0xb77cb8f81a0f704e1e858eba57c67c072abbfcad";

    fn config_with(solana: &[&str], evm: &[&str]) -> AppConfig {
        let mut config = AppConfig::load().expect("defaults load");
        config.wallets.solana = solana.iter().map(|s| s.to_string()).collect();
        config.wallets.evm = evm.iter().map(|s| s.to_string()).collect();
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::load().unwrap();
        assert_eq!(config.scheduler.interval_minutes, 15);
        assert_eq!(config.sources.solana.retries, 0);
        assert_eq!(config.sources.evm.retries, 2);
        assert_eq!(config.sources.evm.interactive_wait_secs, 120);
        assert_eq!(config.sources.solana.interactive_wait_secs, 10);
        assert_eq!(config.filters.min_usd_value, Decimal::from(5));
    }

    #[test]
    fn test_validate_routes_wallets() {
        let roster = config_with(&[SOL], &[EVM]).validate().unwrap();
        assert_eq!(roster.solana.len(), 1);
        assert_eq!(roster.evm[0].chain(), ChainKind::Evm);
        assert_eq!(roster.find(EVM).map(|w| w.as_str()), Some(EVM));
        assert!(roster.find("0x0000000000000000000000000000000000000000").is_none());
    }

    #[test]
    fn test_validate_rejects_misrouted_and_short() {
        assert!(matches!(
            config_with(&[EVM], &[]).validate(),
            Err(CoreError::ChainMismatch { .. })
        ));
        assert!(matches!(
            config_with(&["tooShortToBeAnything"], &[]).validate(),
            Err(CoreError::InvalidWallet(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        assert!(config_with(&[], &[EVM, EVM]).validate().is_err());
    }
}
