//! Configuration module
//!
//! Settings are read from a TOML file, then overridden from the environment
//! (`.env` is honored through dotenvy):
//! - `RPC_URL`: RPC endpoint
//! - `PRIVATE_KEY`: base58 secret key, preferred over `wallet.keypair_path`
//! - `JITO_FEE`: relay tip in SOL (e.g. `0.003`), applied to both relay paths
//! - `NOZOMI_API_KEYS`: comma-separated API keys for the single-endpoint relay

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::pricing::{parse_ui_amount, BPS_DENOMINATOR, NATIVE_DECIMALS};
use crate::relay::{ConfirmSettings, RelayEndpoint};
use crate::retry::RetryPolicy;
use crate::rpc::solana::parse_commitment;
use crate::tx_builder::ComputeBudget;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub wallet: WalletConfig,

    #[serde(default)]
    pub trading: TradingConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// processed | confirmed | finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Path to a solana-keygen JSON keypair file
    #[serde(default)]
    pub keypair_path: Option<String>,

    /// Base58 secret key. Usually supplied through `PRIVATE_KEY`.
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Slippage tolerance (basis points)
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u64,

    #[serde(default = "default_cu_limit")]
    pub cu_limit: u32,

    /// Priority fee in micro-lamports per compute unit
    #[serde(default = "default_cu_price")]
    pub cu_price_micro_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayKind {
    Bundle,
    Single,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_relay_kind")]
    pub strategy: RelayKind,

    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,

    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    #[serde(default)]
    pub bundle: BundleRelayConfig,

    #[serde(default)]
    pub single: SingleRelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleRelayConfig {
    #[serde(default = "default_bundle_endpoints")]
    pub endpoints: Vec<RelayEndpoint>,

    #[serde(default = "default_bundle_tip_accounts")]
    pub tip_accounts: Vec<String>,

    #[serde(default = "default_tip_lamports")]
    pub tip_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleRelayConfig {
    /// Base URLs; the API key is appended verbatim
    #[serde(default = "default_single_endpoints")]
    pub endpoints: Vec<RelayEndpoint>,

    #[serde(default, skip_serializing)]
    pub api_keys: Vec<String>,

    #[serde(default = "default_single_tip_accounts")]
    pub tip_accounts: Vec<String>,

    #[serde(default = "default_tip_lamports")]
    pub tip_lamports: u64,
}

// Default value functions
fn default_rpc_url() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}
fn default_commitment() -> String {
    "confirmed".to_string()
}
fn default_rpc_timeout() -> u64 { 30 }
fn default_slippage_bps() -> u64 { 1_000 }
fn default_cu_limit() -> u32 { 130_000 }
fn default_cu_price() -> u64 { 90_000 }
fn default_max_attempts() -> u32 { 10 }
fn default_retry_delay_ms() -> u64 { 500 }
fn default_relay_kind() -> RelayKind { RelayKind::Bundle }
fn default_confirm_poll_ms() -> u64 { 400 }
fn default_confirm_timeout_secs() -> u64 { 90 }
fn default_tip_lamports() -> u64 { 1_000_000 }

fn default_bundle_endpoints() -> Vec<RelayEndpoint> {
    vec![
        RelayEndpoint::new("https://mainnet.block-engine.jito.wtf/api/v1/bundles", 0),
        RelayEndpoint::new("https://amsterdam.mainnet.block-engine.jito.wtf/api/v1/bundles", 0),
        RelayEndpoint::new("https://frankfurt.mainnet.block-engine.jito.wtf/api/v1/bundles", 0),
        RelayEndpoint::new("https://ny.mainnet.block-engine.jito.wtf/api/v1/bundles", 0),
        RelayEndpoint::new("https://tokyo.mainnet.block-engine.jito.wtf/api/v1/bundles", 1),
    ]
}

fn default_bundle_tip_accounts() -> Vec<String> {
    [
        "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
        "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
        "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
        "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
        "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
        "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
        "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
        "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_single_endpoints() -> Vec<RelayEndpoint> {
    vec![
        RelayEndpoint::new("http://ams1.nozomi.temporal.xyz/?c=", 1),
        RelayEndpoint::new("http://ewr1.nozomi.temporal.xyz/?c=", 0),
        RelayEndpoint::new("http://pit1.nozomi.temporal.xyz/?c=", 0),
        RelayEndpoint::new("http://fra2.nozomi.temporal.xyz/?c=", 0),
    ]
}

fn default_single_tip_accounts() -> Vec<String> {
    [
        "TEMPaMeCRFAS9EKF53Jd6KpHxgL47uWLcpFArU1Fanq",
        "noz3jAjPiHuBPqiSPkkugaJDkJscPuRhYnSpbi8UvC4",
        "noz3str9KXfpKknefHji8L1mPgimezaiUyCHYMDv1GE",
        "noz6uoYCDijhu1V7cutCpwxNiSovEwLdRHPwmgCGDNo",
        "noz9EPNcT7WH6Sou3sr3GGjHQYVkN3DNirpbvDkv9YJ",
        "nozc5yT15LazbLTFVZzoNZCwjh3yUtW86LoUyqsBu4L",
        "nozFrhfnNGoyqwVuwPAW4aaGqempx4PU6g6D9CJMv7Z",
        "nozievPk7HyK1Rqy1MPJwVQ7qQg2QoJGyP71oeDwbsu",
        "noznbgwYnBLDHu8wcQVCEw6kDrXkPdKkydGJGNXGvL7",
        "nozNVWs5N8mgzuD3qigrCG2UoKxZttxzZ85pvAQVrbP",
        "nozpEGbwx4BcGp6pvEdAh1JoC2CQGZdU6HbNP1v2p6P",
        "nozrhjhkCr3zXT3BiT4WCodYCUFeQvcdUkM7MqhKqge",
        "nozrwQtWhEdrA6W8dkbt9gnUaMs52PdAv5byipnadq3",
        "nozUacTVWub3cL4mJmGCYjKZTnE9RbdY5AP46iQgbPJ",
        "nozWCyTPppJjRuw2fpzDhhWbW355fzosWSzrrMYB1Qk",
        "nozWNju6dY353eMkMqURqwQEoM3SFgEKC6psLCSfUne",
        "nozxNBgWohjR75vdspfxR5H9ceC7XXH99xpxhVGt3Bb",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            commitment: default_commitment(),
            timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            slippage_bps: default_slippage_bps(),
            cu_limit: default_cu_limit(),
            cu_price_micro_lamports: default_cu_price(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            strategy: default_relay_kind(),
            confirm_poll_ms: default_confirm_poll_ms(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            bundle: BundleRelayConfig::default(),
            single: SingleRelayConfig::default(),
        }
    }
}

impl Default for BundleRelayConfig {
    fn default() -> Self {
        Self {
            endpoints: default_bundle_endpoints(),
            tip_accounts: default_bundle_tip_accounts(),
            tip_lamports: default_tip_lamports(),
        }
    }
}

impl Default for SingleRelayConfig {
    fn default() -> Self {
        Self {
            endpoints: default_single_endpoints(),
            api_keys: Vec::new(),
            tip_accounts: default_single_tip_accounts(),
            tip_lamports: default_tip_lamports(),
        }
    }
}

fn parse_pubkeys(values: &[String], what: &str) -> Result<Vec<Pubkey>, ConfigError> {
    values
        .iter()
        .map(|s| {
            Pubkey::from_str(s)
                .map_err(|e| ConfigError::Invalid(format!("{} '{}': {}", what, s, e)))
        })
        .collect()
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// File (or defaults when `path` is `None`), then `.env` and process
    /// environment overrides, then validation.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in production)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RPC_URL").filter(|v| !v.trim().is_empty()) {
            self.rpc.url = url.trim().to_string();
        }
        if let Some(key) = lookup("PRIVATE_KEY").filter(|v| !v.trim().is_empty()) {
            self.wallet.private_key = Some(key.trim().to_string());
        }
        if let Some(fee) = lookup("JITO_FEE").filter(|v| !v.trim().is_empty()) {
            let lamports = parse_ui_amount(&fee, NATIVE_DECIMALS)
                .map_err(|e| ConfigError::Invalid(format!("JITO_FEE: {}", e)))?;
            self.relay.bundle.tip_lamports = lamports;
            self.relay.single.tip_lamports = lamports;
        }
        if let Some(keys) = lookup("NOZOMI_API_KEYS") {
            self.relay.single.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.url.trim().is_empty() {
            return Err(ConfigError::Invalid("rpc.url is empty".to_string()));
        }
        parse_commitment(&self.rpc.commitment)
            .map_err(|e| ConfigError::Invalid(format!("rpc.commitment: {}", e)))?;

        if self.trading.slippage_bps > BPS_DENOMINATOR {
            return Err(ConfigError::Invalid(format!(
                "trading.slippage_bps {} exceeds {}",
                self.trading.slippage_bps, BPS_DENOMINATOR
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        match self.relay.strategy {
            RelayKind::Bundle => {
                let bundle = &self.relay.bundle;
                if !bundle.endpoints.iter().any(RelayEndpoint::is_enabled) {
                    return Err(ConfigError::Invalid(
                        "relay.bundle has no endpoint with weight > 0".to_string(),
                    ));
                }
                if self.bundle_tip_accounts()?.is_empty() {
                    return Err(ConfigError::Invalid(
                        "relay.bundle.tip_accounts is empty".to_string(),
                    ));
                }
            }
            RelayKind::Single => {
                let single = &self.relay.single;
                if !single.endpoints.iter().any(RelayEndpoint::is_enabled) {
                    return Err(ConfigError::Invalid(
                        "relay.single has no endpoint with weight > 0".to_string(),
                    ));
                }
                if single.api_keys.is_empty() {
                    return Err(ConfigError::Invalid(
                        "relay.single requires at least one API key (NOZOMI_API_KEYS)".to_string(),
                    ));
                }
                if self.single_tip_accounts()?.is_empty() {
                    return Err(ConfigError::Invalid(
                        "relay.single.tip_accounts is empty".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.delay_ms),
        )
    }

    pub fn compute_budget(&self) -> ComputeBudget {
        ComputeBudget {
            unit_limit: self.trading.cu_limit,
            unit_price: self.trading.cu_price_micro_lamports,
        }
    }

    pub fn confirm_settings(&self) -> ConfirmSettings {
        ConfirmSettings {
            poll_interval: Duration::from_millis(self.relay.confirm_poll_ms),
            timeout: Duration::from_secs(self.relay.confirm_timeout_secs),
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }

    pub fn bundle_tip_accounts(&self) -> Result<Vec<Pubkey>, ConfigError> {
        parse_pubkeys(&self.relay.bundle.tip_accounts, "relay.bundle.tip_accounts")
    }

    pub fn single_tip_accounts(&self) -> Result<Vec<Pubkey>, ConfigError> {
        parse_pubkeys(&self.relay.single.tip_accounts, "relay.single.tip_accounts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.rpc.commitment, "confirmed");
        assert_eq!(config.trading.cu_limit, 130_000);
        assert_eq!(config.trading.cu_price_micro_lamports, 90_000);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.relay.strategy, RelayKind::Bundle);
        assert_eq!(config.bundle_tip_accounts().unwrap().len(), 8);
        assert_eq!(config.single_tip_accounts().unwrap().len(), 17);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[rpc]
url = "http://localhost:8899"

[trading]
slippage_bps = 250

[relay]
strategy = "single"

[[relay.single.endpoints]]
url = "http://relay.local/?c="
weight = 3
"#
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.rpc.url, "http://localhost:8899");
        assert_eq!(config.rpc.timeout_secs, 30);
        assert_eq!(config.trading.slippage_bps, 250);
        assert_eq!(config.trading.cu_limit, 130_000);
        assert_eq!(config.relay.strategy, RelayKind::Single);
        assert_eq!(
            config.relay.single.endpoints,
            vec![RelayEndpoint::new("http://relay.local/?c=", 3)]
        );
        assert_eq!(config.relay.bundle.endpoints.len(), 5);

        // Single relay without API keys is rejected
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env_overrides(env(&[
                ("RPC_URL", "http://rpc.example"),
                ("PRIVATE_KEY", "abc"),
                ("JITO_FEE", "0.003"),
                ("NOZOMI_API_KEYS", "k1, k2,,"),
            ]))
            .unwrap();

        assert_eq!(config.rpc.url, "http://rpc.example");
        assert_eq!(config.wallet.private_key.as_deref(), Some("abc"));
        assert_eq!(config.relay.bundle.tip_lamports, 3_000_000);
        assert_eq!(config.relay.single.tip_lamports, 3_000_000);
        assert_eq!(config.relay.single.api_keys, vec!["k1", "k2"]);
    }

    #[test]
    fn test_bad_jito_fee_is_rejected() {
        let mut config = Config::default();
        assert!(config
            .apply_env_overrides(env(&[("JITO_FEE", "lots")]))
            .is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.trading.slippage_bps = 10_001;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rpc.commitment = "eventually".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        for endpoint in &mut config.relay.bundle.endpoints {
            endpoint.weight = 0;
        }
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.relay.bundle.tip_accounts = vec!["not-a-key".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/config.toml"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_toml_round_trip_keeps_secrets_out() {
        let mut config = Config::default();
        config.wallet.private_key = Some("secret".into());
        config.relay.single.api_keys = vec!["key".into()];

        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("secret"));
        assert!(!text.contains("api_keys"));

        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(parsed.trading.slippage_bps, config.trading.slippage_bps);
        assert_eq!(parsed.relay.bundle.endpoints, config.relay.bundle.endpoints);
    }
}
