//! Relay server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4022
//! rpc_url = "https://sepolia.base.org"
//! relayer_private_key = "$RELAYER_PRIVATE_KEY"
//!
//! drip_amount = "0.001"
//! min_balance = "0.0005"
//! escrow_addresses = ["0x3333333333333333333333333333333333333333"]
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG`: Path to configuration file (default: `config.toml`)
//! - `HOST`, `PORT`: Override the bind address
//! - `RPC_URL`: Override the RPC endpoint
//! - `RELAYER_PRIVATE_KEY`: Signing key, used when the file sets none

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use gasrelay::address::parse_address;
use gasrelay::amount::{NATIVE_DECIMALS, try_parse_units};
use gasrelay_evm::DripPolicy;
use serde::{Deserialize, Serialize};
use url::Url;

/// Errors raised while loading or resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration file is not valid TOML for [`RelayConfig`].
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    /// The RPC URL does not parse.
    #[error("invalid rpc_url {url}: {reason}")]
    RpcUrl {
        /// Configured value.
        url: String,
        /// Parser message.
        reason: String,
    },
    /// The signing key is present but unusable. The key itself is not echoed.
    #[error("invalid relayer_private_key: {0}")]
    SigningKey(String),
    /// An amount setting is not a valid native-currency decimal.
    #[error("invalid {field}: {reason}")]
    Amount {
        /// Setting name.
        field: &'static str,
        /// Parser message.
        reason: String,
    },
    /// An allow-listed escrow address is malformed.
    #[error("invalid escrow address {0}")]
    EscrowAddress(String),
}

/// Top-level relay server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4022`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP RPC endpoint URL.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Relayer private key (hex, with or without `0x`).
    /// Supports `$VAR` / `${VAR}` for environment variable expansion.
    #[serde(default, skip_serializing)]
    pub relayer_private_key: Option<String>,

    /// Native amount sent per drip, as a decimal string.
    #[serde(default = "default_drip_amount")]
    pub drip_amount: String,

    /// Native balance at or above which an address gets no drip.
    #[serde(default = "default_min_balance")]
    pub min_balance: String,

    /// Blocks to wait for after a drip transfer; `0` returns at mempool acceptance.
    #[serde(default)]
    pub drip_confirmations: u64,

    /// Escrow contracts the relay forwards to. Empty means any.
    #[serde(default)]
    pub escrow_addresses: Vec<String>,

    /// Upper bound on a single chain call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upper bound on waiting for confirmations, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub receipt_timeout_secs: u64,

    /// Whether the chain prices gas with EIP-1559 fees.
    #[serde(default = "default_eip1559")]
    pub eip1559: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

const fn default_port() -> u16 {
    4022
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_owned()
}

fn default_drip_amount() -> String {
    "0.001".to_owned()
}

fn default_min_balance() -> String {
    "0.0005".to_owned()
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_eip1559() -> bool {
    true
}

impl RelayConfig {
    /// Loads configuration from the path given by the `CONFIG` environment
    /// variable, falling back to `config.toml` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path. A missing file yields
    /// the defaults.
    ///
    /// After parsing, `HOST`, `PORT`, `RPC_URL` and `RELAYER_PRIVATE_KEY`
    /// environment variables are applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path)?
        } else {
            String::new()
        };
        let mut config = Self::from_toml(&content, |name| std::env::var(name).ok())?;

        if let Some(host) = std::env::var("HOST").ok().and_then(|h| h.parse().ok()) {
            config.host = host;
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Ok(rpc_url) = std::env::var("RPC_URL") {
            config.rpc_url = rpc_url;
        }
        if config.relayer_private_key.is_none() {
            config.relayer_private_key = std::env::var("RELAYER_PRIVATE_KEY").ok();
        }
        Ok(config)
    }

    /// Parses TOML after expanding `$VAR` references through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML.
    pub fn from_toml(
        content: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let expanded = expand_vars(content, lookup);
        Ok(toml::from_str(&expanded)?)
    }

    /// The RPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RpcUrl`] if the URL does not parse.
    pub fn rpc_url(&self) -> Result<Url, ConfigError> {
        self.rpc_url.parse().map_err(|e: url::ParseError| ConfigError::RpcUrl {
            url: self.rpc_url.clone(),
            reason: e.to_string(),
        })
    }

    /// The relayer signer, or `None` if no key is configured.
    ///
    /// A blank key or an unresolved `$VAR` reference counts as absent: the
    /// server still starts, and requests needing the key are refused.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SigningKey`] if a key is present but invalid.
    pub fn signer(&self) -> Result<Option<PrivateKeySigner>, ConfigError> {
        let Some(key) = self.relayer_private_key.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if key.is_empty() || key.starts_with('$') {
            tracing::warn!("relayer_private_key not resolved (missing env var?)");
            return Ok(None);
        }
        key.parse::<PrivateKeySigner>()
            .map(Some)
            .map_err(|_| ConfigError::SigningKey("not a 32-byte hex secret".to_owned()))
    }

    /// Drip amounts and confirmation depth.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Amount`] if an amount is not a valid decimal.
    pub fn drip_policy(&self) -> Result<DripPolicy, ConfigError> {
        let amount = |field: &'static str, raw: &str| {
            try_parse_units(raw, NATIVE_DECIMALS).map_err(|e| ConfigError::Amount {
                field,
                reason: e.to_string(),
            })
        };
        Ok(DripPolicy {
            amount: amount("drip_amount", &self.drip_amount)?,
            min_balance: amount("min_balance", &self.min_balance)?,
            confirmations: self.drip_confirmations,
        })
    }

    /// Allow-listed escrow contracts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EscrowAddress`] for a malformed entry.
    pub fn escrow_allow_list(&self) -> Result<Vec<Address>, ConfigError> {
        self.escrow_addresses
            .iter()
            .map(|raw| parse_address(raw).ok_or_else(|| ConfigError::EscrowAddress(raw.clone())))
            .collect()
    }

    /// Bound on a single chain call.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Bound on waiting for confirmations.
    #[must_use]
    pub const fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

/// Expands `$VAR` and `${VAR}` patterns using `lookup`.
///
/// Unresolved variables are left as-is.
fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();
        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match (name.is_empty(), lookup(&name)) {
            (false, Some(value)) => result.push_str(&value),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}
