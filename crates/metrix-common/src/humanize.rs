//! Human-readable durations for configuration values.
//!
//! Accepts either a bare integer (seconds) or a humanized string such as
//! `"10s"`, `"1m"` or `"500ms"`.

use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::protocol::error::{MetrixError, Result};

pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humanize_rs::duration::parse(raw)
        .map_err(|e| MetrixError::Config(format!("invalid duration {raw:?}: {e:?}")))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

/// Serde adapter for optional duration fields in JSON config files.
pub fn deserialize_opt_duration<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawDuration>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawDuration::Seconds(secs)) => Ok(Some(Duration::from_secs(secs))),
        Some(RawDuration::Text(text)) => parse_duration(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
