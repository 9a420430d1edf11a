//! Output formatting: plain, JSON, TOML.
//!
//! Renders data in the format selected by `--output`. Structured formats
//! use serde; plain delegates to a per-command formatter.

use std::io::{self, Write};

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::CliError;

// ── Render dispatcher ────────────────────────────────────────────────

/// Render a single serde-serializable item in the chosen format.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    plain_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: Serialize,
{
    match format {
        OutputFormat::Plain => Ok(plain_fn(data)),
        OutputFormat::Json => render_json(data),
        OutputFormat::Toml => render_toml(data),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{}", output.trim_end());
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_json<T: Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(data)?)
}

pub(crate) fn render_toml<T: Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    Ok(toml::to_string_pretty(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        port: &'static str,
        channels: Vec<u8>,
    }

    fn sample() -> Sample {
        Sample {
            port: "/dev/ttyACM0",
            channels: vec![11, 25],
        }
    }

    #[test]
    fn plain_uses_formatter() {
        let out = render_single(OutputFormat::Plain, &sample(), |s| s.port.to_owned()).unwrap();
        assert_eq!(out, "/dev/ttyACM0");
    }

    #[test]
    fn json_is_pretty() {
        let out = render_single(OutputFormat::Json, &sample(), |_| String::new()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["channels"][1], 25);
        assert!(out.contains('\n'));
    }

    #[test]
    fn toml_renders_keys() {
        let out = render_single(OutputFormat::Toml, &sample(), |_| String::new()).unwrap();
        assert!(out.contains("port = \"/dev/ttyACM0\""));
    }
}
