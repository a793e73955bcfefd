use anyhow::{Result, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);

pub const INTERVAL_ENV: &str = "HEARTBEAT_INTERVAL_MS";
pub const ACK_REQUIRED_ENV: &str = "HEARTBEAT_ACK_REQUIRED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    #[serde(rename = "intervalMs", with = "millis")]
    pub interval: Duration,
    pub ack_required: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            ack_required: true,
        }
    }
}

impl MonitorConfig {
    /// Build a config from `HEARTBEAT_INTERVAL_MS` and `HEARTBEAT_ACK_REQUIRED`.
    /// Missing or unparsable values fall back to the defaults; a zero interval
    /// is rejected.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = env::var(INTERVAL_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.interval = Duration::from_millis(ms),
                Err(e) => warn!("Ignoring {INTERVAL_ENV}={raw:?}: {e}"),
            }
        }

        if let Ok(raw) = env::var(ACK_REQUIRED_ENV) {
            match parse_flag(&raw) {
                Some(flag) => config.ack_required = flag,
                None => warn!("Ignoring {ACK_REQUIRED_ENV}={raw:?}: expected true or false"),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a config section such as `{"intervalMs": 2000, "ackRequired": false}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(anyhow!("heartbeat interval must be positive"));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
