//! Clap derive structures for the `znp` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use znp_core::{DeviceType, PanIdSelection};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// znp -- radio profile management for serial Zigbee Network Processors
#[derive(Debug, Parser)]
#[command(
    name = "znp",
    version,
    about = "Manage ZNP radio profiles from the command line",
    long_about = "Create, inspect and validate the radio profiles used to bring a\n\
        serial Zigbee Network Processor up into a network.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Radio profile to use
    #[arg(long, short = 'p', env = "ZNP_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "ZNP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format (defaults to `defaults.output` in the config, else plain)
    #[arg(long, short = 'o', env = "ZNP_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    Plain,
    /// Pretty-printed JSON
    Json,
    /// TOML
    Toml,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage radio profiles and configuration
    #[command(alias = "cfg")]
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Add a radio profile to the config file
    Init(InitArgs),

    /// Display the loaded configuration
    Show,

    /// Print the config file path
    Path,

    /// Set a value on the active profile
    Set {
        /// Profile key (e.g. "baud_rate", "channels", "pan_id")
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Resolve and validate the active profile
    Check,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Profile name
    #[arg(long, default_value = "default")]
    pub name: String,

    /// Serial device the radio is attached to
    #[arg(long)]
    pub port: String,

    /// Logical device type
    #[arg(long, default_value = "coordinator", value_parser = parse_device_type)]
    pub device_type: DeviceType,

    /// Permitted channels, comma separated (11-26)
    #[arg(long, value_delimiter = ',', conflicts_with = "channel_mask")]
    pub channels: Option<Vec<u8>>,

    /// Raw channel bitmask (e.g. 0x800)
    #[arg(long, value_parser = parse_u32)]
    pub channel_mask: Option<u32>,

    /// Serial baud rate
    #[arg(long)]
    pub baud_rate: Option<u32>,

    /// Fixed PAN id (implies fixed PAN id selection)
    #[arg(long, value_parser = parse_u16)]
    pub pan_id: Option<u16>,

    /// Form a fresh network, discarding stored state
    #[arg(long)]
    pub new_network: bool,

    /// Replace an existing profile of the same name
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn pan_id_selection(&self) -> PanIdSelection {
        if self.pan_id.is_some() {
            PanIdSelection::Fixed
        } else {
            PanIdSelection::Random
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

// ── Value parsers ────────────────────────────────────────────────────

fn parse_device_type(s: &str) -> Result<DeviceType, String> {
    s.parse::<DeviceType>()
        .or_else(|_| {
            s.parse::<u8>()
                .map_err(|e| e.to_string())
                .and_then(|code| DeviceType::try_from(code).map_err(|e| e.to_string()))
        })
        .map_err(|_| format!("expected coordinator, router, end-device or 0-2, got '{s}'"))
}

/// Decimal or `0x`-prefixed hexadecimal.
pub fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

/// Decimal or `0x`-prefixed hexadecimal.
pub fn parse_u16(s: &str) -> Result<u16, String> {
    let wide = parse_u32(s)?;
    u16::try_from(wide).map_err(|_| format!("'{s}' does not fit in 16 bits"))
}
