//! Device configuration loaded from TOML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config at {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to create config parent directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Whole-device configuration. Every section has defaults, so an empty file
/// is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DeviceConfig {
    pub store: StoreConfig,
    pub icons: IconConfig,
    pub trigger: TriggerConfig,
    pub execution: ExecutionConfig,
    pub notify: NotifyConfig,
    pub display: DisplayConfig,
    pub timer_mode: TimerModeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub sqlite_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from(".routined/routines.sqlite"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconConfig {
    pub dir: PathBuf,
}

impl Default for IconConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("icons"),
        }
    }
}

/// Firing window and main-loop cadence.
///
/// A routine fires when `now - start` lies in
/// `[window_low_secs, window_high_secs]`, both ends inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub window_low_secs: i64,
    pub window_high_secs: i64,
    pub tick_interval_ms: u64,
    /// Timer mode is offered only when the next routine is further away than this.
    pub idle_threshold_mins: u64,
    /// Routines further ahead than this are ignored by the next-routine estimate.
    pub lookahead_mins: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            window_low_secs: 0,
            window_high_secs: 90,
            tick_interval_ms: 1_000,
            idle_threshold_mins: 5,
            lookahead_mins: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub poll_interval_ms: u64,
    /// Added to `minutes * 60` to absorb display and setup latency.
    pub slack_secs: u64,
    pub buzz_secs: u64,
    pub write_status_on_cancel: bool,
    pub write_status_on_timeout: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            slack_secs: 0,
            buzz_secs: 1,
            write_status_on_cancel: true,
            write_status_on_timeout: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// `host:port` of the report sink. Reports go to stdout when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub connect_timeout_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            connect_timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub backlight_percent: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            backlight_percent: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TimerModeConfig {
    pub enabled: bool,
}

pub fn parse_device_config(contents: &str) -> Result<DeviceConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_device_config(path: impl AsRef<Path>) -> Result<DeviceConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_device_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

pub fn save_device_config(
    path: impl AsRef<Path>,
    config: &DeviceConfig,
) -> Result<(), ConfigError> {
    let path_ref = path.as_ref();
    if let Some(parent_dir) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent_dir).map_err(|source| ConfigError::CreateDir {
            path: parent_dir.to_path_buf(),
            source,
        })?;
    }

    let body = toml::to_string_pretty(config).map_err(|source| ConfigError::Serialize {
        path: path_ref.to_path_buf(),
        source,
    })?;
    fs::write(path_ref, body).map_err(|source| ConfigError::Write {
        path: path_ref.to_path_buf(),
        source,
    })?;
    Ok(())
}
