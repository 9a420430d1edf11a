//! CLI error types with miette diagnostics.
//!
//! Maps `ConfigError` into user-facing errors with actionable help text
//! and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use znp_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(znp::validation))]
    Validation { field: String, reason: String },

    #[error("Profile '{name}' already exists")]
    #[diagnostic(
        code(znp::profile_exists),
        help("Pass --force to replace it, or pick another --name.")
    )]
    ProfileExists { name: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(znp::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: znp config init --port <DEVICE>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration could not be loaded")]
    #[diagnostic(
        code(znp::config),
        help("Check the TOML syntax and any ZNP_* environment overrides.")
    )]
    Config(#[source] Box<figment::Error>),

    #[error("Failed to serialize config: {0}")]
    #[diagnostic(code(znp::serialize))]
    Serialization(#[from] toml::ser::Error),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(znp::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } | Self::ProfileExists { .. } => exit_code::USAGE,
            Self::Config(_) => exit_code::CONFIG,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::ProfileNotFound { name, available } => Self::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            },
            ConfigError::Serialization(e) => Self::Serialization(e),
            ConfigError::Figment(e) => Self::Config(e),
            ConfigError::Io(e) => Self::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        assert_eq!(
            CliError::validation("baud_rate", "not a number").exit_code(),
            exit_code::USAGE
        );
        assert_eq!(
            CliError::ProfileNotFound {
                name: "lab".into(),
                available: "(none)".into()
            }
            .exit_code(),
            exit_code::NOT_FOUND
        );
        assert_eq!(
            CliError::from(std::io::Error::other("disk gone")).exit_code(),
            exit_code::GENERAL
        );
    }

    #[test]
    fn config_failures_map_to_config_exit() {
        let load = ConfigError::Figment(Box::new(figment::Error::from(String::from(
            "invalid type: found string, expected u64",
        ))));
        assert_eq!(CliError::from(load).exit_code(), exit_code::CONFIG);

        let invalid = CliError::from(ConfigError::Validation {
            field: "channel_mask".into(),
            reason: "enables no channels".into(),
        });
        assert!(matches!(invalid, CliError::Validation { .. }));
        assert_eq!(invalid.exit_code(), exit_code::USAGE);
    }

    #[test]
    fn config_profile_lookup_maps_to_not_found() {
        let err = CliError::from(ConfigError::ProfileNotFound {
            name: "lab".into(),
            available: vec!["default".into(), "home".into()],
        });
        match err {
            CliError::ProfileNotFound { available, .. } => assert_eq!(available, "default, home"),
            other => panic!("unexpected: {other}"),
        }
    }
}
