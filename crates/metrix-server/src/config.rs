//! Server Configuration
//!
//! Resolved once at startup through immutable layers:
//!
//! ```text
//! defaults -> JSON config file -> CLI flags -> environment
//! ```
//!
//! | setting          | env                 | file key         | default                |
//! |------------------|---------------------|------------------|------------------------|
//! | listen address   | `ADDRESS`           | `address`        | `localhost:8080`       |
//! | RPC address      | `RPC_ADDRESS`       | `rpc_address`    | `localhost:9090`       |
//! | store interval   | `STORE_INTERVAL`    | `store_interval` | `300s`                 |
//! | store file       | `FILE_STORAGE_PATH` | `store_file`     | `/tmp/metrics-db.json` |
//! | restore          | `RESTORE`           | `restore`        | `true`                 |
//! | database DSN     | `DATABASE_DSN`      | `database_dsn`   | none                   |
//! | shared secret    | `KEY`               | never            | none                   |
//! | private key      | `CRYPTO_KEY`        | `crypto_key`     | none                   |
//! | trusted subnet   | `TRUSTED_SUBNET`    | `trusted_subnet` | none                   |
//!
//! The config file itself is named by `CONFIG` or the `-c` flag.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use metrix_common::config::{read_config_file, EnvSource};
use metrix_common::humanize::deserialize_opt_duration;
use metrix_common::protocol::error::{MetrixError, Result};
use metrix_common::security::{Decryptor, Signer, TrustedSubnet};

use crate::storage::StorageSettings;

pub const DEFAULT_ADDRESS: &str = "localhost:8080";
pub const DEFAULT_RPC_ADDRESS: &str = "localhost:9090";
pub const DEFAULT_STORE_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_STORE_FILE: &str = "/tmp/metrics-db.json";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// One configuration layer; unset fields defer to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    pub address: Option<String>,
    pub rpc_address: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_duration")]
    pub store_interval: Option<Duration>,
    pub store_file: Option<PathBuf>,
    pub restore: Option<bool>,
    pub database_dsn: Option<String>,
    #[serde(skip_deserializing)]
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub trusted_subnet: Option<String>,
    #[serde(skip_deserializing)]
    pub config: Option<PathBuf>,
}

impl ServerOptions {
    /// Reads the environment layer.
    pub fn from_env<F>(env: &EnvSource<F>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            address: env.string("ADDRESS"),
            rpc_address: env.string("RPC_ADDRESS"),
            store_interval: env.duration("STORE_INTERVAL")?,
            store_file: env.path("FILE_STORAGE_PATH"),
            restore: env.parse("RESTORE")?,
            database_dsn: env.string("DATABASE_DSN"),
            key: env.string("KEY"),
            crypto_key: env.path("CRYPTO_KEY"),
            trusted_subnet: env.string("TRUSTED_SUBNET"),
            config: env.path("CONFIG"),
        })
    }

    /// Returns a new layer where every field set in `over` wins.
    pub fn overlay(self, over: ServerOptions) -> ServerOptions {
        ServerOptions {
            address: over.address.or(self.address),
            rpc_address: over.rpc_address.or(self.rpc_address),
            store_interval: over.store_interval.or(self.store_interval),
            store_file: over.store_file.or(self.store_file),
            restore: over.restore.or(self.restore),
            database_dsn: over.database_dsn.or(self.database_dsn),
            key: over.key.or(self.key),
            crypto_key: over.crypto_key.or(self.crypto_key),
            trusted_subnet: over.trusted_subnet.or(self.trusted_subnet),
            config: over.config.or(self.config),
        }
    }
}

/// Validated server configuration with keys loaded.
#[derive(Clone)]
pub struct ServerConfig {
    pub address: String,
    pub rpc_address: String,
    pub storage: StorageSettings,
    pub signer: Option<Signer>,
    pub decryptor: Option<Decryptor>,
    pub trusted_subnet: Option<TrustedSubnet>,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.into(),
            rpc_address: DEFAULT_RPC_ADDRESS.into(),
            storage: StorageSettings {
                database_dsn: None,
                store_file: Some(PathBuf::from(DEFAULT_STORE_FILE)),
                store_interval: DEFAULT_STORE_INTERVAL,
                restore: true,
            },
            signer: None,
            decryptor: None,
            trusted_subnet: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Runs the full pipeline: file named by flags or env, then flags, then env.
    pub fn load<F>(flags: ServerOptions, env: &EnvSource<F>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_layer = ServerOptions::from_env(env)?;
        let file_layer = match env_layer.config.as_ref().or(flags.config.as_ref()) {
            Some(path) => read_config_file::<ServerOptions>(path)?,
            None => ServerOptions::default(),
        };
        Self::resolve(file_layer.overlay(flags).overlay(env_layer))
    }

    /// Applies defaults to a merged layer and validates it.
    pub fn resolve(options: ServerOptions) -> Result<Self> {
        let defaults = ServerConfig::default();

        let signer = Signer::from_key(options.key.as_deref())?;
        let decryptor = options
            .crypto_key
            .filter(|p| !p.as_os_str().is_empty())
            .map(Decryptor::from_pem_file)
            .transpose()?;
        let trusted_subnet = options
            .trusted_subnet
            .filter(|s| !s.trim().is_empty())
            .map(|s| TrustedSubnet::parse(&s))
            .transpose()?;

        let address = options.address.unwrap_or(defaults.address);
        if address.trim().is_empty() {
            return Err(MetrixError::Config("listen address is empty".into()));
        }

        Ok(Self {
            address,
            rpc_address: options.rpc_address.unwrap_or(defaults.rpc_address),
            storage: StorageSettings {
                database_dsn: options.database_dsn.filter(|dsn| !dsn.is_empty()),
                store_file: match options.store_file {
                    // an explicitly empty path disables file storage
                    Some(path) if path.as_os_str().is_empty() => None,
                    Some(path) => Some(path),
                    None => defaults.storage.store_file,
                },
                store_interval: options.store_interval.unwrap_or(defaults.storage.store_interval),
                restore: options.restore.unwrap_or(defaults.storage.restore),
            },
            signer,
            decryptor,
            trusted_subnet,
            request_timeout: defaults.request_timeout,
        })
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("address", &self.address)
            .field("rpc_address", &self.rpc_address)
            .field("storage", &self.storage)
            .field("signing", &self.signer.is_some())
            .field("decryption", &self.decryptor.is_some())
            .field("trusted_subnet", &self.trusted_subnet.as_ref().map(|s| s.to_string()))
            .finish()
    }
}
