//! Configuration layer helpers.
//!
//! Server and agent both resolve their configuration as a pipeline of
//! immutable layers: `defaults -> JSON file -> CLI flags -> environment`.
//! Each layer is an "options" value with every field optional; a later
//! layer overrides the fields it sets. The helpers here read the file and
//! environment layers.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::humanize::parse_duration;
use crate::protocol::error::{MetrixError, Result};

/// Reads a JSON configuration file into an options layer.
pub fn read_config_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let raw = std::fs::read(path)
        .map_err(|e| MetrixError::Config(format!("failed to read config file {}: {}", path.display(), e)))?;
    serde_json::from_slice(&raw)
        .map_err(|e| MetrixError::Config(format!("invalid config file {}: {}", path.display(), e)))
}

/// Typed access to environment variables.
///
/// Backed by a lookup function so tests can supply their own environment.
pub struct EnvSource<F> {
    lookup: F,
}

impl EnvSource<fn(&str) -> Option<String>> {
    /// The process environment.
    pub fn process() -> Self {
        fn lookup(name: &str) -> Option<String> {
            std::env::var(name).ok()
        }
        Self { lookup }
    }
}

impl<F> EnvSource<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    pub fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
    }

    pub fn path(&self, name: &str) -> Option<PathBuf> {
        self.string(name).map(PathBuf::from)
    }

    pub fn duration(&self, name: &str) -> Result<Option<Duration>> {
        self.string(name)
            .map(|raw| parse_duration(&raw).map_err(|e| MetrixError::Config(format!("{name}: {e}"))))
            .transpose()
    }

    pub fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(name)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| MetrixError::Config(format!("{name}={raw:?}: {e}")))
            })
            .transpose()
    }
}
