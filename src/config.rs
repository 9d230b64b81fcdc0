//! Runtime settings.
//!
//! Layered lowest to highest: built-in defaults, an optional TOML file,
//! `DEPTH_REPLICA__*` environment variables (a `.env` file is honoured), then
//! CLI flags applied by the binary.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::reconciler::ReconcilerConfig;

pub const ENV_PREFIX: &str = "DEPTH_REPLICA";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub symbol: String,
    pub ws_base: String,
    pub rest_base: String,
    pub update_speed: String,
    pub snapshot_limit: u32,
    pub snapshot_min_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub max_buffered_events: usize,
    pub malformed_threshold: usize,
    pub malformed_window_ms: u64,
    pub display_depth: usize,
    pub display_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".into(),
            ws_base: "wss://fstream.binance.com/ws".into(),
            rest_base: "https://fapi.binance.com".into(),
            update_speed: "100ms".into(),
            snapshot_limit: 1000,
            snapshot_min_interval_ms: 2000, // exchange rate limit
            reconnect_delay_ms: 1000,
            max_buffered_events: 5000,
            malformed_threshold: 20,
            malformed_window_ms: 60_000,
            display_depth: 13,
            display_interval_ms: 100,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: &'static str },
}

impl Settings {
    /// Load from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("depth-replica").required(false));
        }
        let settings: Settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.symbol.trim().is_empty() {
            return Err(SettingsError::Invalid { field: "symbol", reason: "must not be empty" });
        }
        if self.max_buffered_events == 0 {
            return Err(SettingsError::Invalid { field: "max_buffered_events", reason: "must be positive" });
        }
        if self.snapshot_min_interval_ms == 0 {
            return Err(SettingsError::Invalid { field: "snapshot_min_interval_ms", reason: "must be positive" });
        }
        if !(5..=1000).contains(&self.snapshot_limit) {
            return Err(SettingsError::Invalid { field: "snapshot_limit", reason: "must be within 5..=1000" });
        }
        Ok(())
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            max_buffered_events: self.max_buffered_events,
            malformed_threshold: self.malformed_threshold,
            malformed_window: Duration::from_millis(self.malformed_window_ms),
        }
    }

    pub fn snapshot_min_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_min_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn display_interval(&self) -> Duration {
        Duration::from_millis(self.display_interval_ms)
    }
}
