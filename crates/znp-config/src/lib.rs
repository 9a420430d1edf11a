//! Shared configuration for ZNP tools.
//!
//! TOML radio profiles with environment overrides, translated into a
//! validated `znp_core::NetworkConfig` plus the serial device to open.
//! The CLI layers flag overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use znp_core::{DeviceType, NetworkConfig, PanIdSelection};

/// Prefix for environment overrides. `__` separates nested keys, e.g.
/// `ZNP_PROFILES__HOME__BAUD_RATE=57600`.
pub const ENV_PREFIX: &str = "ZNP_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String, available: Vec<String> },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named radio profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    /// CLI output format: "plain", "json" or "toml".
    #[serde(default = "default_output")]
    pub output: String,

    /// Seconds to wait for network bring-up.
    #[serde(default = "default_start_timeout")]
    pub start_timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            start_timeout: default_start_timeout(),
        }
    }
}

fn default_output() -> String {
    "plain".into()
}
fn default_start_timeout() -> u64 {
    30
}

/// A named radio profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Serial device the radio is attached to (e.g. "/dev/ttyACM0").
    pub serial_port: String,

    /// "coordinator", "router" or "end-device".
    #[serde(default)]
    pub device_type: DeviceType,

    /// Discard stored network state and form a fresh network.
    #[serde(default)]
    pub new_network: bool,

    /// Raw channel bitmask. Mutually exclusive with `channels`.
    pub channel_mask: Option<u32>,

    /// Channel numbers (11-26). Mutually exclusive with `channel_mask`.
    pub channels: Option<Vec<u8>>,

    pub baud_rate: Option<u32>,

    /// "random" or "fixed".
    #[serde(default)]
    pub pan_id_selection: PanIdSelection,

    pub pan_id: Option<u16>,

    /// Override `defaults.start_timeout`.
    pub start_timeout: Option<u64>,
}

/// A profile resolved into what a controller needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub name: String,
    pub serial_port: String,
    pub network: NetworkConfig,
    pub start_timeout: Duration,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "znp-rs", "znp").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("znp");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment. A missing file
/// yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading configuration");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "configuration saved");
    Ok(())
}

// ── Profile resolution ──────────────────────────────────────────────

impl Config {
    /// Name of the profile to use: `requested`, else `default_profile`,
    /// else "default".
    pub fn active_profile_name<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.into(),
                available: self.profiles.keys().cloned().collect(),
            })
    }
}

/// Resolve the named (or default) profile into a validated bundle.
pub fn resolve_profile(
    cfg: &Config,
    requested: Option<&str>,
) -> Result<ResolvedProfile, ConfigError> {
    let name = cfg.active_profile_name(requested);
    let profile = cfg.profile(name)?;

    if profile.serial_port.trim().is_empty() {
        return Err(invalid("serial_port", "must name a serial device"));
    }

    let network = profile_to_network_config(profile)?;
    let start_timeout =
        Duration::from_secs(profile.start_timeout.unwrap_or(cfg.defaults.start_timeout));

    Ok(ResolvedProfile {
        name: name.to_owned(),
        serial_port: profile.serial_port.clone(),
        network,
        start_timeout,
    })
}

/// Build a validated `NetworkConfig` from a profile.
pub fn profile_to_network_config(profile: &Profile) -> Result<NetworkConfig, ConfigError> {
    let defaults = NetworkConfig::default();

    let channel_mask = match (&profile.channel_mask, &profile.channels) {
        (Some(_), Some(_)) => {
            return Err(invalid(
                "channels",
                "set either `channel_mask` or `channels`, not both",
            ));
        }
        (Some(mask), None) => *mask,
        (None, Some(channels)) => NetworkConfig::mask_for_channels(channels)
            .map_err(|e| invalid("channels", e.to_string()))?,
        (None, None) => defaults.channel_mask,
    };

    let network = NetworkConfig {
        device_type: profile.device_type,
        start_new_network: profile.new_network,
        channel_mask,
        baud_rate: profile.baud_rate.unwrap_or(defaults.baud_rate),
        pan_id_selection: profile.pan_id_selection,
        pan_id: profile.pan_id.unwrap_or(defaults.pan_id),
    };
    network
        .validate()
        .map_err(|e| invalid("network", e.to_string()))?;
    Ok(network)
}
