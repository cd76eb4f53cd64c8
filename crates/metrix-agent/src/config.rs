//! Agent Configuration
//!
//! Same layering as the server:
//!
//! ```text
//! defaults -> JSON config file -> CLI flags -> environment
//! ```
//!
//! | setting          | env               | file key          | default          |
//! |------------------|-------------------|-------------------|------------------|
//! | server address   | `ADDRESS`         | `address`         | `localhost:8080` |
//! | RPC address      | `RPC_ADDRESS`     | `rpc_address`     | none (use HTTP)  |
//! | poll interval    | `POLL_INTERVAL`   | `poll_interval`   | `2s`             |
//! | report interval  | `REPORT_INTERVAL` | `report_interval` | `10s`            |
//! | shared secret    | `KEY`             | never             | none             |
//! | rate limit       | `RATE_LIMIT`      | `rate_limit`      | `2`              |
//! | public key       | `CRYPTO_KEY`      | `crypto_key`      | none             |

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use metrix_common::config::{read_config_file, EnvSource};
use metrix_common::humanize::deserialize_opt_duration;
use metrix_common::protocol::error::{MetrixError, Result};
use metrix_common::security::{Encryptor, Signer};

pub const DEFAULT_ADDRESS: &str = "localhost:8080";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_RATE_LIMIT: usize = 2;

/// One configuration layer; unset fields defer to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentOptions {
    pub address: Option<String>,
    pub rpc_address: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_duration")]
    pub poll_interval: Option<Duration>,
    #[serde(deserialize_with = "deserialize_opt_duration")]
    pub report_interval: Option<Duration>,
    #[serde(skip_deserializing)]
    pub key: Option<String>,
    pub rate_limit: Option<usize>,
    pub crypto_key: Option<PathBuf>,
    #[serde(skip_deserializing)]
    pub config: Option<PathBuf>,
}

impl AgentOptions {
    pub fn from_env<F>(env: &EnvSource<F>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            address: env.string("ADDRESS"),
            rpc_address: env.string("RPC_ADDRESS"),
            poll_interval: env.duration("POLL_INTERVAL")?,
            report_interval: env.duration("REPORT_INTERVAL")?,
            key: env.string("KEY"),
            rate_limit: env.parse("RATE_LIMIT")?,
            crypto_key: env.path("CRYPTO_KEY"),
            config: env.path("CONFIG"),
        })
    }

    pub fn overlay(self, over: AgentOptions) -> AgentOptions {
        AgentOptions {
            address: over.address.or(self.address),
            rpc_address: over.rpc_address.or(self.rpc_address),
            poll_interval: over.poll_interval.or(self.poll_interval),
            report_interval: over.report_interval.or(self.report_interval),
            key: over.key.or(self.key),
            rate_limit: over.rate_limit.or(self.rate_limit),
            crypto_key: over.crypto_key.or(self.crypto_key),
            config: over.config.or(self.config),
        }
    }
}

/// Validated agent configuration with keys loaded.
#[derive(Clone)]
pub struct AgentConfig {
    pub address: String,
    /// When set, batches go over JSON-RPC instead of HTTP.
    pub rpc_address: Option<String>,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub rate_limit: usize,
    pub signer: Option<Signer>,
    pub encryptor: Option<Encryptor>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.into(),
            rpc_address: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            report_interval: DEFAULT_REPORT_INTERVAL,
            rate_limit: DEFAULT_RATE_LIMIT,
            signer: None,
            encryptor: None,
        }
    }
}

impl AgentConfig {
    pub fn load<F>(flags: AgentOptions, env: &EnvSource<F>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_layer = AgentOptions::from_env(env)?;
        let file_layer = match env_layer.config.as_ref().or(flags.config.as_ref()) {
            Some(path) => read_config_file::<AgentOptions>(path)?,
            None => AgentOptions::default(),
        };
        Self::resolve(file_layer.overlay(flags).overlay(env_layer))
    }

    pub fn resolve(options: AgentOptions) -> Result<Self> {
        let defaults = AgentConfig::default();

        let rate_limit = options.rate_limit.unwrap_or(defaults.rate_limit);
        if rate_limit == 0 {
            return Err(MetrixError::Config("rate limit must be at least 1".into()));
        }
        let poll_interval = options.poll_interval.unwrap_or(defaults.poll_interval);
        let report_interval = options.report_interval.unwrap_or(defaults.report_interval);
        if poll_interval.is_zero() || report_interval.is_zero() {
            return Err(MetrixError::Config("poll and report intervals must be non-zero".into()));
        }

        let encryptor = options
            .crypto_key
            .filter(|p| !p.as_os_str().is_empty())
            .map(Encryptor::from_pem_file)
            .transpose()?;

        Ok(Self {
            address: options.address.unwrap_or(defaults.address),
            rpc_address: options.rpc_address.filter(|a| !a.trim().is_empty()),
            poll_interval,
            report_interval,
            rate_limit,
            signer: Signer::from_key(options.key.as_deref())?,
            encryptor,
        })
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("address", &self.address)
            .field("rpc_address", &self.rpc_address)
            .field("poll_interval", &self.poll_interval)
            .field("report_interval", &self.report_interval)
            .field("rate_limit", &self.rate_limit)
            .field("signing", &self.signer.is_some())
            .field("encryption", &self.encryptor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> EnvSource<impl Fn(&str) -> Option<String>> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvSource::new(move |name: &str| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::load(AgentOptions::default(), &env(&[])).unwrap();
        assert_eq!(config.address, "localhost:8080");
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.report_interval, Duration::from_secs(10));
        assert_eq!(config.rate_limit, 2);
        assert!(config.rpc_address.is_none());
        assert!(config.signer.is_none());
        assert!(config.encryptor.is_none());
    }

    #[test]
    fn test_layer_precedence() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"{"address": "file:1", "poll_interval": "1s", "report_interval": "30s", "rate_limit": 8}"#,
        )
        .unwrap();
        let flags = AgentOptions {
            address: Some("flag:2".into()),
            report_interval: Some(Duration::from_secs(20)),
            config: Some(file.path().to_path_buf()),
            ..AgentOptions::default()
        };

        let config = AgentConfig::load(flags, &env(&[("RATE_LIMIT", "3")])).unwrap();
        assert_eq!(config.address, "flag:2");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.report_interval, Duration::from_secs(20));
        assert_eq!(config.rate_limit, 3);
    }

    #[test]
    fn test_rate_limit_must_be_positive() {
        assert!(AgentConfig::load(AgentOptions::default(), &env(&[("RATE_LIMIT", "0")])).is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(AgentConfig::load(AgentOptions::default(), &env(&[("POLL_INTERVAL", "0")])).is_err());
    }

    #[test]
    fn test_public_key_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let (_, public) = metrix_common::security::keys::write_key_pair(dir.path(), 1024).unwrap();
        let path = public.display().to_string();

        let config = AgentConfig::load(AgentOptions::default(), &env(&[("CRYPTO_KEY", &path), ("KEY", "k")])).unwrap();
        assert!(config.encryptor.is_some());
        assert!(config.signer.is_some());
        assert!(!format!("{:?}", config).contains("\"k\""));
    }
}
