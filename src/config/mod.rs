//! Network profiles: which token and vesting addresses, presale floor and
//! conversion rate a deployment on a given network is wired with.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use leaf_core::{Address, Amount};
use serde::{Deserialize, Serialize};

/// Presale rate used by the integration replay (1e10 token units per wei).
pub const DEFAULT_LEAF_PER_WEI: Amount = 10_000_000_000;

const WEI_PER_ETH: Amount = 1_000_000_000_000_000_000;
const ETH_DECIMALS: usize = 18;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown network {0}")]
    UnknownNetwork(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf_token: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vesting: Option<Address>,
    #[serde(with = "decimal")]
    pub min_accept_wei: Amount,
    #[serde(with = "decimal")]
    pub leaf_per_wei: Amount,
}

impl Default for NetworkProfile {
    fn default() -> Self {
        Self {
            leaf_token: None,
            vesting: None,
            min_accept_wei: 0,
            leaf_per_wei: DEFAULT_LEAF_PER_WEI,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    pub networks: BTreeMap<String, NetworkProfile>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let networks = ["local", "rinkeby", "mainnet"]
            .into_iter()
            .map(|name| (name.to_string(), NetworkProfile::default()))
            .collect();
        Self { networks }
    }
}

impl NetworkConfig {
    /// Built-in profiles, replaced by the file at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `LEAF_<NET>`, `VESTING_<NET>` and the presale floor per network,
    /// plus the shared `LEAFINWEI` rate, read through `lookup`.
    ///
    /// The floor comes from `MinAcceptAmountInEth_<NET>` in ether (as the
    /// deployment scripts set it) or `MIN_ACCEPT_WEI_<NET>` in wei; the wei
    /// key wins when both are set.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let rate = lookup("LEAFINWEI")
            .map(|v| parse_amount("LEAFINWEI", &v))
            .transpose()?;
        for (name, profile) in self.networks.iter_mut() {
            let suffix = name.to_ascii_uppercase();
            let key = format!("LEAF_{suffix}");
            if let Some(v) = lookup(&key) {
                profile.leaf_token = Some(parse_address(&key, &v)?);
            }
            let key = format!("VESTING_{suffix}");
            if let Some(v) = lookup(&key) {
                profile.vesting = Some(parse_address(&key, &v)?);
            }
            let key = format!("MinAcceptAmountInEth_{suffix}");
            if let Some(v) = lookup(&key) {
                profile.min_accept_wei = parse_ether(&key, &v)?;
            }
            let key = format!("MIN_ACCEPT_WEI_{suffix}");
            if let Some(v) = lookup(&key) {
                profile.min_accept_wei = parse_amount(&key, &v)?;
            }
            if let Some(rate) = rate {
                profile.leaf_per_wei = rate;
            }
        }
        Ok(())
    }

    pub fn profile(&self, network: &str) -> Result<&NetworkProfile, ConfigError> {
        self.networks
            .get(network)
            .ok_or_else(|| ConfigError::UnknownNetwork(network.to_string()))
    }
}

fn parse_address(key: &str, value: &str) -> Result<Address, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Parse a decimal amount; `1e18` style exponents are accepted for the
/// literals deployment scripts tend to use.
pub fn parse_amount(key: &str, value: &str) -> Result<Amount, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    };
    let trimmed = value.trim().replace('_', "");
    let (mantissa, exponent) = match trimmed.split_once(|c: char| c == 'e' || c == 'E') {
        Some((m, e)) => (m, e.parse::<u32>().map_err(|_| invalid())?),
        None => (trimmed.as_str(), 0),
    };
    let base = mantissa.parse::<Amount>().map_err(|_| invalid())?;
    10u128
        .checked_pow(exponent)
        .and_then(|scale| base.checked_mul(scale))
        .ok_or_else(invalid)
}

/// Parse an ether amount such as `0.001`, `2` or `1e3` into wei. At most
/// 18 fractional digits are accepted.
pub fn parse_ether(key: &str, value: &str) -> Result<Amount, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    };
    let trimmed = value.trim().replace('_', "");
    let Some((whole, fraction)) = trimmed.split_once('.') else {
        return parse_amount(key, value)?
            .checked_mul(WEI_PER_ETH)
            .ok_or_else(invalid);
    };
    if fraction.len() > ETH_DECIMALS
        || (whole.is_empty() && fraction.is_empty())
        || !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    let whole: Amount = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let fraction_wei: Amount = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{fraction:0<width$}", width = ETH_DECIMALS);
        padded.parse().map_err(|_| invalid())?
    };
    whole
        .checked_mul(WEI_PER_ETH)
        .and_then(|wei| wei.checked_add(fraction_wei))
        .ok_or_else(invalid)
}

pub(crate) mod decimal {
    use leaf_core::Amount;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(encoded) => super::parse_amount("amount", &encoded).map_err(D::Error::custom),
            Raw::Number(n) => Ok(Amount::from(n)),
        }
    }
}
