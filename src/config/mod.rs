//! Configuration management.
//!
//! Settings come from a TOML file, then environment variables override
//! individual values.
//!
//! ```toml
//! style = "apa"
//! locale = "en-US"
//! cache_dir = "~/.cache/citemerge"
//!
//! [deduplication]
//! exhaustive = true
//!
//! [[sources]]
//! name = "lab"
//! kind = "file"
//! path = "lab.bib"
//! priority = 2
//! exclude = [{ field = "type", values = ["thesis"] }]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::fetch::HttpConfig;
use crate::observability::LoggingSettings;
use crate::rendering::DEFAULT_LOCALE;
use crate::services::{DeduplicationConfig, ExclusionConfig};
use crate::{Error, Result};

/// Kind of input a configured source reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A bibliography file (CSL-JSON, CSL-YAML, BibTeX).
    File,
    /// A list of DOIs, inline or in a file.
    Identifiers,
    /// Every work of a registry profile.
    Registry,
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source name, used for provenance.
    pub name: String,
    /// Input kind.
    pub kind: SourceKind,
    /// Bibliography or identifier file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Inline identifiers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    /// Registry profile identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Conflict priority; higher wins.
    #[serde(default)]
    pub priority: i32,
    /// Exclusion rules applied when the source is added.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<ExclusionConfig>,
}

impl SourceConfig {
    /// Checks that the fields required by the kind are present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSourceName`] or [`Error::InvalidInput`].
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::MissingSourceName);
        }
        let missing = match self.kind {
            SourceKind::File => self.path.is_none().then_some("path"),
            SourceKind::Identifiers => {
                (self.path.is_none() && self.ids.is_empty()).then_some("path or ids")
            },
            SourceKind::Registry => self.id.is_none().then_some("id"),
        };
        missing.map_or(Ok(()), |field| {
            Err(Error::InvalidInput(format!(
                "source '{}' needs {field}",
                self.name
            )))
        })
    }
}

/// Main configuration for citemerge.
#[derive(Debug, Clone, Serialize)]
pub struct CitemergeConfig {
    /// Citation style name.
    pub style: Option<String>,
    /// Custom CSL template file.
    pub template: Option<PathBuf>,
    /// Rendering locale.
    pub locale: String,
    /// Directory of the file cache; no cache when unset.
    pub cache_dir: Option<PathBuf>,
    /// Ignore cached entries on read.
    pub refresh: bool,
    /// Drop registry works that have neither BibTeX nor a DOI.
    pub skip_without_bibtex_or_doi: bool,
    /// Duplicate detection.
    pub deduplication: DeduplicationConfig,
    /// Retrieval settings.
    pub http: HttpConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Configured sources, in priority-independent input order.
    pub sources: Vec<SourceConfig>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Citation style.
    pub style: Option<String>,
    /// Custom template path.
    pub template: Option<String>,
    /// Locale.
    pub locale: Option<String>,
    /// Cache directory.
    pub cache_dir: Option<String>,
    /// Refresh flag.
    pub refresh: Option<bool>,
    /// Skip registry works without BibTeX or DOI.
    pub skip_without_bibtex_or_doi: Option<bool>,
    /// Deduplication section.
    pub deduplication: Option<ConfigFileDeduplication>,
    /// HTTP section.
    pub http: Option<ConfigFileHttp>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Sources.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Deduplication section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileDeduplication {
    /// Run deduplication.
    pub enabled: Option<bool>,
    /// Keep merged items as candidates.
    pub exhaustive: Option<bool>,
    /// Compared title prefix length.
    pub title_length: Option<usize>,
    /// Maximum title edit distance.
    pub max_title_distance: Option<usize>,
}

/// HTTP section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileHttp {
    /// DOI resolver base URL.
    pub doi_endpoint: Option<String>,
    /// Registry API base URL.
    pub registry_endpoint: Option<String>,
    /// Delay after each request.
    pub delay_ms: Option<u64>,
    /// Request timeout.
    pub timeout_secs: Option<u64>,
    /// Contact address.
    pub mailto: Option<String>,
    /// Application name.
    pub app_name: Option<String>,
}

impl Default for CitemergeConfig {
    fn default() -> Self {
        Self {
            style: None,
            template: None,
            locale: DEFAULT_LOCALE.to_string(),
            cache_dir: None,
            refresh: false,
            skip_without_bibtex_or_doi: false,
            deduplication: DeduplicationConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingSettings::default(),
            sources: Vec::new(),
        }
    }
}

impl CitemergeConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds configuration from environment variables alone.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Loads configuration from a file path and applies env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a source
    /// entry is incomplete.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::parse_toml(&contents).map(Self::with_env_overrides)
    }

    /// Parses TOML text without env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn parse_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        for source in &file.sources {
            source.validate()?;
        }
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir, then `~/.config/citemerge/`. Returns
    /// the environment-only configuration if neither holds a readable file.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::from_env();
        };

        let candidates = [
            base_dirs.config_dir().join("citemerge").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("citemerge")
                .join("config.toml"),
        ];
        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::from_env()
    }

    /// Applies environment variable overrides.
    ///
    /// | Variable | Overrides |
    /// |----------|-----------|
    /// | `CITEMERGE_STYLE` | `style` |
    /// | `CITEMERGE_LOCALE` | `locale` |
    /// | `CITEMERGE_CACHE_DIR` | `cache_dir` |
    /// | `CITEMERGE_REFRESH` | `refresh` |
    /// | `CITEMERGE_DEDUP_*` | `[deduplication]` |
    /// | `CITEMERGE_DOI_ENDPOINT`, `CITEMERGE_HTTP_*`, ... | `[http]` |
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("CITEMERGE_STYLE") {
            self.style = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = std::env::var("CITEMERGE_LOCALE") {
            if !v.is_empty() {
                self.locale = v;
            }
        }
        if let Ok(v) = std::env::var("CITEMERGE_CACHE_DIR") {
            self.cache_dir = Some(v).filter(|s| !s.is_empty()).map(PathBuf::from);
        }
        if let Ok(v) = std::env::var("CITEMERGE_REFRESH") {
            self.refresh = parse_flag(&v);
        }
        self.deduplication = self.deduplication.with_env_overrides();
        self.http = self.http.with_env_overrides();
        self
    }

    /// Converts a `ConfigFile` to `CitemergeConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self {
            style: file.style,
            template: file.template.map(PathBuf::from),
            logging: file.logging.unwrap_or_default(),
            sources: file.sources,
            ..Self::default()
        };

        if let Some(locale) = file.locale {
            config.locale = locale;
        }
        config.cache_dir = file.cache_dir.map(|dir| expand_home(&dir));
        if let Some(v) = file.refresh {
            config.refresh = v;
        }
        if let Some(v) = file.skip_without_bibtex_or_doi {
            config.skip_without_bibtex_or_doi = v;
        }
        if let Some(dedup) = file.deduplication {
            if let Some(v) = dedup.enabled {
                config.deduplication.enabled = v;
            }
            if let Some(v) = dedup.exhaustive {
                config.deduplication.exhaustive = v;
            }
            if let Some(v) = dedup.title_length {
                config.deduplication.title_length = v;
            }
            if let Some(v) = dedup.max_title_distance {
                config.deduplication.max_title_distance = v;
            }
        }
        if let Some(http) = file.http {
            if let Some(v) = http.doi_endpoint {
                config.http.doi_endpoint = v;
            }
            if let Some(v) = http.registry_endpoint {
                config.http.registry_endpoint = v;
            }
            if let Some(v) = http.delay_ms {
                config.http.delay_ms = v;
            }
            if let Some(v) = http.timeout_secs {
                config.http.timeout_secs = v;
            }
            if let Some(v) = http.app_name {
                config.http.app_name = v;
            }
            config.http.mailto = http.mailto;
        }

        config
    }

    /// Sets the cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Sets the refresh flag.
    #[must_use]
    pub const fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Reads the custom template, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the template file cannot be read.
    pub fn read_template(&self) -> Result<Option<String>> {
        self.template
            .as_deref()
            .map(|path| {
                std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
                    operation: "read_template".to_string(),
                    cause: format!("{}: {e}", path.display()),
                })
            })
            .transpose()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
style = "vancouver"
locale = "de-DE"
cache_dir = "/var/cache/citemerge"
skip_without_bibtex_or_doi = true

[deduplication]
exhaustive = false
max_title_distance = 5

[http]
delay_ms = 100
mailto = "lab@example.org"

[[sources]]
name = "lab"
kind = "file"
path = "lab.bib"
priority = 2
exclude = [
    { field = "type", values = ["thesis"] },
    { after = 2020 },
]

[[sources]]
name = "dois"
kind = "identifiers"
ids = ["10.1/a", "10.1/b"]
"#;

    #[test]
    fn test_parse_full_file() {
        let config = CitemergeConfig::parse_toml(SAMPLE).unwrap();
        assert_eq!(config.style.as_deref(), Some("vancouver"));
        assert_eq!(config.locale, "de-DE");
        assert_eq!(config.cache_dir, Some(PathBuf::from("/var/cache/citemerge")));
        assert!(config.skip_without_bibtex_or_doi);
        assert!(!config.refresh);
        assert!(!config.deduplication.exhaustive);
        assert_eq!(config.deduplication.max_title_distance, 5);
        assert_eq!(config.deduplication.title_length, 30);
        assert_eq!(config.http.delay_ms, 100);
        assert_eq!(config.http.mailto.as_deref(), Some("lab@example.org"));

        assert_eq!(config.sources.len(), 2);
        let lab = &config.sources[0];
        assert_eq!(lab.kind, SourceKind::File);
        assert_eq!(lab.priority, 2);
        assert_eq!(lab.exclude.len(), 2);
        assert_eq!(
            lab.exclude[1],
            ExclusionConfig::YearRange {
                before: None,
                after: Some(2020)
            }
        );
        assert_eq!(config.sources[1].ids, vec!["10.1/a", "10.1/b"]);
        assert_eq!(config.sources[1].priority, 0);
    }

    #[test]
    fn test_defaults() {
        let config = CitemergeConfig::parse_toml("").unwrap();
        assert_eq!(config.style, None);
        assert_eq!(config.locale, "en-US");
        assert!(config.deduplication.enabled);
        assert_eq!(config.http.delay_ms, 25);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_incomplete_source_rejected() {
        let toml = "[[sources]]\nname = \"orcid\"\nkind = \"registry\"\n";
        assert!(matches!(
            CitemergeConfig::parse_toml(toml),
            Err(Error::InvalidInput(_))
        ));

        let toml = "[[sources]]\nname = \"\"\nkind = \"file\"\npath = \"a.bib\"\n";
        assert!(matches!(
            CitemergeConfig::parse_toml(toml),
            Err(Error::MissingSourceName)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "locale = \"fr-FR\"").unwrap();
        let config = CitemergeConfig::load_from_file(file.path()).unwrap();
        assert!(!config.locale.is_empty());
        assert!(CitemergeConfig::load_from_file(Path::new("/nonexistent/config.toml")).is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("no"));
    }

    #[test]
    fn test_read_template() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "<?xml version=\"1.0\"?><style/>").unwrap();
        let mut config = CitemergeConfig::default();
        assert!(config.read_template().unwrap().is_none());
        config.template = Some(file.path().to_path_buf());
        assert!(config.read_template().unwrap().unwrap().starts_with("<?xml"));
    }
}
