use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::ledger::{Address, Amount, LedgerError, TokenMetadata, DEFAULT_DECIMALS};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("genesis failed: {0}")]
    Genesis(#[from] LedgerError),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub sale: SaleConfig,
    #[serde(default)]
    pub calculator: CalculatorConfig,
    #[serde(default)]
    pub genesis: GenesisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_token_name() -> String {
    "BlueCoin".to_string()
}

fn default_token_symbol() -> String {
    "BLC".to_string()
}

fn default_decimals() -> u8 {
    DEFAULT_DECIMALS
}

fn default_initial_supply() -> Amount {
    2_000_000
}

fn default_price_per_token() -> Amount {
    1_000_000_000
}

fn default_sale_allowance() -> Amount {
    1_000_000
}

fn default_owner() -> Address {
    Address::from_label("owner")
}

fn default_genesis_timestamp() -> u64 {
    1_700_000_000
}

fn default_native_balances() -> BTreeMap<Address, Amount> {
    const HUNDRED_ETHER: Amount = 100_000_000_000_000_000_000;
    ["owner", "alice", "bob", "carol"]
        .into_iter()
        .map(|label| (Address::from_label(label), HUNDRED_ETHER))
        .collect()
}

fn default_logging_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_token_name")]
    pub name: String,
    #[serde(default = "default_token_symbol")]
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    /// Whole tokens minted to the genesis owner.
    #[serde(default = "default_initial_supply")]
    pub initial_supply: Amount,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: default_token_name(),
            symbol: default_token_symbol(),
            decimals: default_decimals(),
            initial_supply: default_initial_supply(),
        }
    }
}

impl TokenConfig {
    pub fn metadata(&self) -> TokenMetadata {
        TokenMetadata {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleConfig {
    /// Native value (wei) paid per whole token.
    #[serde(default = "default_price_per_token")]
    pub price_per_token: Amount,
    /// Whole tokens the owner approves to the sale at genesis.
    #[serde(default = "default_sale_allowance")]
    pub allowance: Amount,
}

impl Default for SaleConfig {
    fn default() -> Self {
        Self {
            price_per_token: default_price_per_token(),
            allowance: default_sale_allowance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CalculatorConfig {
    /// Receives call fees; the token owner when unset.
    #[serde(default)]
    pub beneficiary: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    #[serde(default = "default_owner")]
    pub owner: Address,
    #[serde(default = "default_genesis_timestamp")]
    pub timestamp: u64,
    #[serde(default = "default_native_balances")]
    pub native_balances: BTreeMap<Address, Amount>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            timestamp: default_genesis_timestamp(),
            native_balances: default_native_balances(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` wins when set.
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_logging_filter(),
            json: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sale.price_per_token == 0 {
            return Err(ConfigError::Invalid(
                "sale.price_per_token must be > 0".to_string(),
            ));
        }
        if self.token.decimals > 38 {
            return Err(ConfigError::Invalid(format!(
                "token.decimals must be <= 38, got {}",
                self.token.decimals
            )));
        }
        if self.sale.allowance > self.token.initial_supply {
            return Err(ConfigError::Invalid(format!(
                "sale.allowance ({}) exceeds token.initial_supply ({})",
                self.sale.allowance, self.token.initial_supply
            )));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "logging.filter cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
