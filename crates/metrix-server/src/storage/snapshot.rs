//! Snapshot Files
//!
//! A snapshot is the whole store serialized as one JSON document:
//!
//! ```json
//! {"gauges": {"Alloc": 1024.5}, "counters": {"PollCount": 42}}
//! ```
//!
//! Writes go to a temporary file in the same directory which is then renamed
//! over the target, so a reader never sees a partially written snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use metrix_common::protocol::error::{MetrixError, Result};
use metrix_common::{Metric, MetricRecord};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub gauges: BTreeMap<String, f64>,
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
}

impl Snapshot {
    /// Reads a snapshot; `Ok(None)` when the file does not exist.
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| MetrixError::Storage(format!("corrupt snapshot {}: {}", path.display(), e)))?;
        Ok(Some(snapshot))
    }

    /// Atomically replaces the file at `path`.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let body = serde_json::to_vec_pretty(self)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = temp_path(path);
        tokio::fs::write(&tmp, &body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tracing::debug!(
            "Saved snapshot with {} gauges and {} counters to {}",
            self.gauges.len(),
            self.counters.len(),
            path.display()
        );
        Ok(())
    }

    pub fn into_records(self) -> Vec<MetricRecord> {
        let gauges = self
            .gauges
            .into_iter()
            .map(|(id, value)| MetricRecord::from(Metric::gauge(id, value)));
        let counters = self
            .counters
            .into_iter()
            .map(|(id, delta)| MetricRecord::from(Metric::counter(id, delta)));
        gauges.chain(counters).collect()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}
