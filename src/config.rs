//! Application-level configuration: global administrators and clock cadence.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BLIND_CLOCK_CONFIG_PATH";

const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
const DEFAULT_SYNC_INTERVAL_SECS: u32 = 30;
const DEFAULT_ROOM_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    admins: Vec<String>,
    tick_interval: Duration,
    sync_interval_secs: u32,
    room_capacity: usize,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        admins = app_config.admins.len(),
                        tick_interval_ms = app_config.tick_interval.as_millis() as u64,
                        "loaded clock configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// User ids allowed to control every tournament.
    pub fn admins(&self) -> &[String] {
        &self.admins
    }

    /// Wall-clock length of one clock second.
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Running seconds between two `SYNC` broadcasts; 0 disables them.
    pub fn sync_interval_secs(&self) -> u32 {
        self.sync_interval_secs
    }

    /// Per-viewer backlog of a tournament room.
    pub fn room_capacity(&self) -> usize {
        self.room_capacity
    }

    /// Replace the administrator list.
    pub fn with_admins(mut self, admins: Vec<String>) -> Self {
        self.admins = admins;
        self
    }

    /// Replace the tick interval; zero is ignored.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        if !tick_interval.is_zero() {
            self.tick_interval = tick_interval;
        }
        self
    }

    /// Replace the sync interval.
    pub fn with_sync_interval_secs(mut self, sync_interval_secs: u32) -> Self {
        self.sync_interval_secs = sync_interval_secs;
        self
    }

    /// Replace the per-room event backlog; clamped to at least one.
    pub fn with_room_capacity(mut self, room_capacity: usize) -> Self {
        self.room_capacity = room_capacity.max(1);
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            admins: Vec::new(),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            room_capacity: DEFAULT_ROOM_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default)]
    admins: Vec<String>,
    tick_interval_ms: Option<u64>,
    sync_interval_secs: Option<u32>,
    room_capacity: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let tick_interval_ms = value
            .tick_interval_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_TICK_INTERVAL_MS);
        Self {
            admins: value.admins,
            tick_interval: Duration::from_millis(tick_interval_ms),
            sync_interval_secs: value
                .sync_interval_secs
                .unwrap_or(DEFAULT_SYNC_INTERVAL_SECS),
            room_capacity: value
                .room_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(DEFAULT_ROOM_CAPACITY),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let raw: RawConfig = serde_json::from_str(r#"{ "admins": ["floor-1"] }"#).unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.admins(), ["floor-1".to_string()]);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.sync_interval_secs(), 30);
        assert_eq!(config.room_capacity(), 64);
    }

    #[test]
    fn zero_values_fall_back() {
        let raw: RawConfig = serde_json::from_str(
            r#"{ "tickIntervalMs": 0, "syncIntervalSecs": 0, "roomCapacity": 0 }"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.sync_interval_secs(), 0);
        assert_eq!(config.room_capacity(), 64);
    }
}
