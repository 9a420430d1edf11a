//! Config subcommand handlers.

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::ValueEnum;
use serde::Serialize;

use znp_config::{self as config, Config, Profile};
use znp_core::{DeviceType, PanIdSelection};

use crate::cli::{
    ConfigArgs, ConfigCommand, GlobalOpts, InitArgs, OutputFormat, parse_u16, parse_u32,
};
use crate::error::CliError;
use crate::output;

const SETTABLE_KEYS: &str = "serial_port, device_type, new_network, channel_mask, channels, \
                             baud_rate, pan_id_selection, pan_id, start_timeout";

// ── Helpers ─────────────────────────────────────────────────────────

/// `--config` if given, else the platform config path.
fn config_file(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

fn load(global: &GlobalOpts) -> Result<(PathBuf, Config), CliError> {
    let path = config_file(global);
    let cfg = config::load_config_from(&path)?;
    Ok((path, cfg))
}

/// `--output` if given, else `defaults.output` from the config.
fn output_format(global: &GlobalOpts, cfg: &Config) -> Result<OutputFormat, CliError> {
    if let Some(format) = global.output {
        return Ok(format);
    }
    OutputFormat::from_str(&cfg.defaults.output, true).map_err(|_| {
        CliError::validation(
            "defaults.output",
            format!(
                "expected 'plain', 'json' or 'toml', got '{}'",
                cfg.defaults.output
            ),
        )
    })
}

fn parse_field<T: std::str::FromStr>(
    field: &str,
    value: &str,
    expected: &str,
) -> Result<T, CliError> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::validation(field, format!("expected {expected}, got '{value}'")))
}

fn parse_channels(value: &str) -> Result<Vec<u8>, CliError> {
    value
        .split(',')
        .map(|ch| parse_field("channels", ch, "comma-separated channel numbers"))
        .collect()
}

/// Apply `key = value` to a profile.
fn apply_setting(profile: &mut Profile, key: &str, value: &str) -> Result<(), CliError> {
    match key {
        "serial_port" | "serial-port" | "port" => {
            if value.trim().is_empty() {
                return Err(CliError::validation("serial_port", "must name a serial device"));
            }
            profile.serial_port = value.to_owned();
        }
        "device_type" | "device-type" => {
            profile.device_type = parse_field::<DeviceType>(
                "device_type",
                value,
                "'coordinator', 'router' or 'end-device'",
            )?;
        }
        "new_network" | "new-network" => {
            profile.new_network = parse_field("new_network", value, "'true' or 'false'")?;
        }
        "channel_mask" | "channel-mask" => {
            let mask =
                parse_u32(value).map_err(|reason| CliError::validation("channel_mask", reason))?;
            profile.channel_mask = Some(mask);
            profile.channels = None;
        }
        "channels" => {
            profile.channels = Some(parse_channels(value)?);
            profile.channel_mask = None;
        }
        "baud_rate" | "baud-rate" => {
            profile.baud_rate = Some(parse_field("baud_rate", value, "a number")?);
        }
        "pan_id_selection" | "pan-id-selection" => {
            profile.pan_id_selection =
                parse_field::<PanIdSelection>("pan_id_selection", value, "'random' or 'fixed'")?;
        }
        "pan_id" | "pan-id" => {
            let pan_id =
                parse_u16(value).map_err(|reason| CliError::validation("pan_id", reason))?;
            profile.pan_id = Some(pan_id);
        }
        "start_timeout" | "start-timeout" => {
            profile.start_timeout =
                Some(parse_field("start_timeout", value, "a number (seconds)")?);
        }
        other => {
            return Err(CliError::validation(
                other,
                format!("unknown config key '{other}'. Valid keys: {SETTABLE_KEYS}"),
            ));
        }
    }
    Ok(())
}

fn profile_from_init(args: &InitArgs) -> Profile {
    Profile {
        serial_port: args.port.clone(),
        device_type: args.device_type,
        new_network: args.new_network,
        channel_mask: args.channel_mask,
        channels: args.channels.clone(),
        baud_rate: args.baud_rate,
        pan_id_selection: args.pan_id_selection(),
        pan_id: args.pan_id,
        start_timeout: None,
    }
}

// ── Check report ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CheckReport {
    profile: String,
    serial_port: String,
    device_type: DeviceType,
    channels: Vec<u8>,
    channel_mask: u32,
    baud_rate: u32,
    pan_id_selection: PanIdSelection,
    pan_id: u16,
    new_network: bool,
    start_timeout_secs: u64,
}

fn format_check(report: &CheckReport) -> String {
    let channels = report
        .channels
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let mut out = String::new();
    let _ = writeln!(out, "profile           {}", report.profile);
    let _ = writeln!(out, "serial_port       {}", report.serial_port);
    let _ = writeln!(out, "device_type       {}", report.device_type);
    let _ = writeln!(out, "channels          {channels}");
    let _ = writeln!(out, "channel_mask      {:#010x}", report.channel_mask);
    let _ = writeln!(out, "baud_rate         {}", report.baud_rate);
    let _ = writeln!(out, "pan_id_selection  {}", report.pan_id_selection);
    let _ = writeln!(out, "pan_id            {:#06x}", report.pan_id);
    let _ = writeln!(out, "new_network       {}", report.new_network);
    let _ = write!(out, "start_timeout     {}s", report.start_timeout_secs);
    out
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init ────────────────────────────────────────────────────
        ConfigCommand::Init(init) => {
            let (path, mut cfg) = load(global)?;

            if cfg.profiles.contains_key(&init.name) && !init.force {
                return Err(CliError::ProfileExists { name: init.name });
            }

            let profile = profile_from_init(&init);
            config::profile_to_network_config(&profile)?;

            let first = cfg.profiles.is_empty();
            cfg.profiles.insert(init.name.clone(), profile);
            if first || cfg.default_profile.is_none() {
                cfg.default_profile = Some(init.name.clone());
            }

            config::save_config_to(&cfg, &path)?;
            tracing::info!(profile = %init.name, path = %path.display(), "profile written");
            if !global.quiet {
                eprintln!("✓ Profile '{}' written to {}", init.name, path.display());
                eprintln!("\n  Validate it: znp config check --profile {}", init.name);
            }
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let (_, cfg) = load(global)?;
            let format = match output_format(global, &cfg)? {
                OutputFormat::Plain => OutputFormat::Toml,
                other => other,
            };
            let out = output::render_single(format, &cfg, |_| String::new())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            output::print_output(&config_file(global).display().to_string(), global.quiet);
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let (path, mut cfg) = load(global)?;
            let profile_name = cfg.active_profile_name(global.profile.as_deref()).to_owned();

            let profile = cfg.profiles.entry(profile_name.clone()).or_default();
            apply_setting(profile, &key, &value)?;

            config::save_config_to(&cfg, &path)?;
            if !global.quiet {
                eprintln!("✓ Set {key} on profile '{profile_name}'");
            }
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let (_, cfg) = load(global)?;
            let default = cfg.active_profile_name(None);
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: znp config init --port <DEVICE>");
            } else {
                let listing = cfg
                    .profiles
                    .keys()
                    .map(|name| {
                        if name == default {
                            format!("{name} *")
                        } else {
                            name.clone()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                output::print_output(&listing, global.quiet);
            }
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let (path, mut cfg) = load(global)?;
            cfg.profile(&name)?;

            cfg.default_profile = Some(name.clone());
            config::save_config_to(&cfg, &path)?;
            if !global.quiet {
                eprintln!("✓ Default profile set to '{name}'");
            }
            Ok(())
        }

        // ── Check ───────────────────────────────────────────────────
        ConfigCommand::Check => {
            let (_, cfg) = load(global)?;
            let resolved = config::resolve_profile(&cfg, global.profile.as_deref())?;
            let network = &resolved.network;

            let report = CheckReport {
                profile: resolved.name.clone(),
                serial_port: resolved.serial_port.clone(),
                device_type: network.device_type,
                channels: network.channels(),
                channel_mask: network.channel_mask,
                baud_rate: network.baud_rate,
                pan_id_selection: network.pan_id_selection,
                pan_id: network.effective_pan_id(),
                new_network: network.start_new_network,
                start_timeout_secs: resolved.start_timeout.as_secs(),
            };
            let format = output_format(global, &cfg)?;
            let out = output::render_single(format, &report, format_check)?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Profile {
        Profile {
            serial_port: "/dev/ttyACM0".into(),
            ..Profile::default()
        }
    }

    fn globals(output: Option<OutputFormat>) -> GlobalOpts {
        GlobalOpts {
            profile: None,
            config: None,
            output,
            verbose: 0,
            quiet: false,
        }
    }

    #[test]
    fn output_flag_overrides_config_default() {
        let mut cfg = Config::default();
        cfg.defaults.output = "JSON".into();
        assert!(matches!(
            output_format(&globals(None), &cfg).unwrap(),
            OutputFormat::Json
        ));
        assert!(matches!(
            output_format(&globals(Some(OutputFormat::Toml)), &cfg).unwrap(),
            OutputFormat::Toml
        ));

        cfg.defaults.output = "yaml".into();
        let err = output_format(&globals(None), &cfg).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::exit_code::USAGE);
        assert!(matches!(
            output_format(&globals(Some(OutputFormat::Plain)), &cfg).unwrap(),
            OutputFormat::Plain
        ));
    }

    #[test]
    fn channels_and_mask_replace_each_other() {
        let mut p = base();
        apply_setting(&mut p, "channel_mask", "0x800").unwrap();
        assert_eq!(p.channel_mask, Some(0x800));

        apply_setting(&mut p, "channels", "11, 20").unwrap();
        assert_eq!(p.channels, Some(vec![11, 20]));
        assert_eq!(p.channel_mask, None);
    }

    #[test]
    fn typed_keys_are_parsed() {
        let mut p = base();
        apply_setting(&mut p, "device-type", "end-device").unwrap();
        apply_setting(&mut p, "pan_id", "0x1a62").unwrap();
        apply_setting(&mut p, "pan_id_selection", "fixed").unwrap();
        apply_setting(&mut p, "new_network", "true").unwrap();
        assert_eq!(p.device_type, DeviceType::EndDevice);
        assert_eq!(p.pan_id, Some(0x1a62));
        assert_eq!(p.pan_id_selection, PanIdSelection::Fixed);
        assert!(p.new_network);
    }

    #[test]
    fn bad_values_and_keys_are_usage_errors() {
        let mut p = base();
        for (key, value) in [
            ("baud_rate", "fast"),
            ("channels", "11,x"),
            ("pan_id", "0x10000"),
            ("serial_port", " "),
            ("colour", "blue"),
        ] {
            let err = apply_setting(&mut p, key, value).unwrap_err();
            assert_eq!(err.exit_code(), crate::error::exit_code::USAGE, "{key}");
        }
    }

    #[test]
    fn check_plain_lists_channels() {
        let report = CheckReport {
            profile: "default".into(),
            serial_port: "/dev/ttyACM0".into(),
            device_type: DeviceType::Coordinator,
            channels: vec![11, 25],
            channel_mask: 0x0200_0800,
            baud_rate: 115_200,
            pan_id_selection: PanIdSelection::Random,
            pan_id: 0xFFFF,
            new_network: false,
            start_timeout_secs: 30,
        };
        let text = format_check(&report);
        assert!(text.contains("channels          11, 25"));
        assert!(text.contains("channel_mask      0x02000800"));
        assert!(text.contains("pan_id            0xffff"));
    }
}
