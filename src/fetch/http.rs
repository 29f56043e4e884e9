//! HTTP retrieval for DOI content negotiation and the works registry.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::{FetchError, FetchResult, RecordFetcher};

/// HTTP settings for retrieval.
///
/// # Environment Variables
///
/// | Variable | Default |
/// |----------|---------|
/// | `CITEMERGE_DOI_ENDPOINT` | `https://doi.org` |
/// | `CITEMERGE_REGISTRY_ENDPOINT` | `https://pub.orcid.org/v3.0` |
/// | `CITEMERGE_HTTP_DELAY_MS` | `25` |
/// | `CITEMERGE_HTTP_TIMEOUT_SECS` | `30` |
/// | `CITEMERGE_MAILTO` | unset |
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpConfig {
    /// Base URL for DOI content negotiation.
    pub doi_endpoint: String,
    /// Base URL of the works registry API.
    pub registry_endpoint: String,
    /// Pause after every request, in milliseconds.
    pub delay_ms: u64,
    /// Request timeout in seconds (0 to disable).
    pub timeout_secs: u64,
    /// Contact address advertised in the user agent.
    pub mailto: Option<String>,
    /// Application name advertised in the user agent.
    pub app_name: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            doi_endpoint: "https://doi.org".to_string(),
            registry_endpoint: "https://pub.orcid.org/v3.0".to_string(),
            delay_ms: 25,
            timeout_secs: 30,
            mailto: None,
            app_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

impl HttpConfig {
    /// Loads HTTP configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("CITEMERGE_DOI_ENDPOINT") {
            self.doi_endpoint = v;
        }
        if let Ok(v) = std::env::var("CITEMERGE_REGISTRY_ENDPOINT") {
            self.registry_endpoint = v;
        }
        if let Some(delay) = std::env::var("CITEMERGE_HTTP_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.delay_ms = delay;
        }
        if let Some(timeout) = std::env::var("CITEMERGE_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.timeout_secs = timeout;
        }
        if let Ok(v) = std::env::var("CITEMERGE_MAILTO") {
            self.mailto = Some(v).filter(|m| !m.is_empty());
        }
        self
    }

    /// Returns the user agent, including the contact address when set.
    #[must_use]
    pub fn user_agent(&self) -> String {
        let version = env!("CARGO_PKG_VERSION");
        match &self.mailto {
            Some(mailto) => format!(
                "{} (mailto:{mailto}) using citemerge/{version}",
                self.app_name
            ),
            None => format!("{} using citemerge/{version}", self.app_name),
        }
    }
}

/// Blocking HTTP fetcher with a polite per-request delay.
///
/// Calls must not run inside an async runtime; use `spawn_blocking`.
pub struct HttpFetcher {
    config: HttpConfig,
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Media type for CSL-JSON content negotiation.
    pub const CSL_JSON: &'static str = "application/vnd.citationstyles.csl+json";

    /// Creates a fetcher.
    #[must_use]
    pub fn new(config: HttpConfig) -> Self {
        let client = build_http_client(&config);
        Self { config, client }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn get_json(&self, url: &str, accept: &str) -> FetchResult<Value> {
        let response = self.send(url, accept)?;
        response.json().map_err(|e| {
            tracing::warn!(url, error = %e, "Failed to decode JSON response");
            FetchError::transient(url, e)
        })
    }

    fn send(&self, url: &str, accept: &str) -> FetchResult<reqwest::blocking::Response> {
        let result = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, accept)
            .send();
        std::thread::sleep(Duration::from_millis(self.config.delay_ms));

        let response = result.map_err(|e| {
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connect"
            } else {
                "request"
            };
            tracing::warn!(url, error = %e, error_kind, "HTTP request failed");
            metrics::counter!("citemerge_fetch_failures_total", "kind" => error_kind)
                .increment(1);
            FetchError::transient(url, format!("{error_kind} error: {e}"))
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            tracing::warn!(url, status = %status, "HTTP request returned error status");
            metrics::counter!("citemerge_fetch_failures_total", "kind" => "status").increment(1);
            return Err(FetchError::transient(url, format!("status {status}")));
        }
        metrics::counter!("citemerge_fetch_requests_total").increment(1);
        Ok(response)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(HttpConfig::from_env())
    }
}

impl RecordFetcher for HttpFetcher {
    fn fetch_doi(&self, doi: &str) -> FetchResult<Value> {
        let url = format!("{}/{doi}", self.config.doi_endpoint.trim_end_matches('/'));
        self.get_json(&url, Self::CSL_JSON)
    }

    fn fetch_works(&self, registry_id: &str) -> FetchResult<Value> {
        let url = format!(
            "{}/{registry_id}/works",
            self.config.registry_endpoint.trim_end_matches('/')
        );
        self.get_json(&url, "application/json")
    }

    fn fetch_work(&self, registry_id: &str, put_code: u64) -> FetchResult<Value> {
        let url = format!(
            "{}/{registry_id}/work/{put_code}",
            self.config.registry_endpoint.trim_end_matches('/')
        );
        self.get_json(&url, "application/json")
    }
}

fn build_http_client(config: &HttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder().user_agent(config.user_agent());
    if config.timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(config.timeout_secs));
    }
    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}
