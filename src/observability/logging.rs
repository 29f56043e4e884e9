//! Structured logging.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVE: &str = "info";
const VERBOSE_DIRECTIVE: &str = "debug";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Output format.
    pub format: Option<LogFormat>,
    /// Filter directive (`tracing_subscriber::EnvFilter` syntax).
    pub filter: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Resolved logging configuration.
///
/// # Environment Variables
///
/// | Variable | Description |
/// |----------|-------------|
/// | `CITEMERGE_LOG` | Filter directive, takes precedence over `RUST_LOG` |
/// | `RUST_LOG` | Filter directive |
/// | `CITEMERGE_LOG_FORMAT` | `pretty` or `json` |
/// | `CITEMERGE_LOG_FILE` | Log file path |
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Optional log file.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds logging configuration from environment variables.
    #[must_use]
    pub fn from_env(verbose: bool) -> Self {
        Self::from_settings(None, verbose)
    }

    /// Builds logging configuration from config settings with env overrides.
    ///
    /// An invalid filter directive falls back to the default level.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let env_directive = std::env::var("CITEMERGE_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .ok();
        let directive = resolve_directive(
            env_directive,
            settings.and_then(|s| s.filter.as_deref()),
            verbose,
        );
        let filter = EnvFilter::try_new(&directive)
            .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

        let format = std::env::var("CITEMERGE_LOG_FORMAT")
            .ok()
            .and_then(|v| LogFormat::parse(&v))
            .or_else(|| settings.and_then(|s| s.format))
            .unwrap_or_default();
        let file = std::env::var("CITEMERGE_LOG_FILE")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| settings.and_then(|s| s.file.clone()));

        Self {
            format,
            filter,
            file,
        }
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the log file.
    #[must_use]
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

const fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_DIRECTIVE
    } else {
        DEFAULT_DIRECTIVE
    }
}

/// Picks the filter directive: environment, then `--verbose`, then the config
/// file, then the default level.
fn resolve_directive(env: Option<String>, configured: Option<&str>, verbose: bool) -> String {
    if let Some(directive) = env.filter(|d| !d.trim().is_empty()) {
        return directive;
    }
    if verbose {
        return VERBOSE_DIRECTIVE.to_string();
    }
    configured.map_or_else(|| DEFAULT_DIRECTIVE.to_string(), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_precedence() {
        assert_eq!(
            resolve_directive(Some("citemerge=trace".to_string()), Some("warn"), true),
            "citemerge=trace"
        );
        assert_eq!(resolve_directive(None, Some("warn"), true), "debug");
        assert_eq!(resolve_directive(None, Some("warn"), false), "warn");
        assert_eq!(resolve_directive(Some("  ".to_string()), None, false), "info");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Pretty));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_settings_deserialize() {
        let settings: LoggingSettings =
            toml::from_str("format = \"json\"\nfile = \"/tmp/citemerge.log\"").unwrap();
        assert_eq!(settings.format, Some(LogFormat::Json));
        assert_eq!(settings.file, Some(PathBuf::from("/tmp/citemerge.log")));
    }
}
