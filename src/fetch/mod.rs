//! Raw-data retrieval.
//!
//! Sources never talk to the network directly; they go through a
//! [`RecordFetcher`]. Implementations must report "not found" distinctly
//! from transient failures so that callers can decide whether to skip an
//! item quietly or log and move on.

mod http;

pub use http::{HttpConfig, HttpFetcher};

use serde_json::Value;
use thiserror::Error as ThisError;

use crate::Error;

/// Failure of a single retrieval.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum FetchError {
    /// The identifier resolves to nothing upstream.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network, status or decoding failure.
    #[error("transient failure fetching '{target}': {cause}")]
    Transient {
        /// What was being fetched.
        target: String,
        /// The underlying cause.
        cause: String,
    },
}

impl FetchError {
    /// Creates a transient failure.
    pub fn transient(target: impl Into<String>, cause: impl ToString) -> Self {
        Self::Transient {
            target: target.into(),
            cause: cause.to_string(),
        }
    }
}

impl From<FetchError> for Error {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound(target) => Self::NotFound(target),
            FetchError::Transient { target, cause } => {
                Self::TransientFetchFailure { target, cause }
            },
        }
    }
}

/// Result alias for retrievals.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Retrieves raw bibliographic data from external services.
pub trait RecordFetcher: Send + Sync {
    /// Resolves a DOI to a CSL-JSON record.
    ///
    /// # Errors
    ///
    /// [`FetchError::NotFound`] if the DOI does not resolve.
    fn fetch_doi(&self, doi: &str) -> FetchResult<Value>;

    /// Lists the work summaries of a registry profile.
    ///
    /// Returns the raw response with a `group` array.
    ///
    /// # Errors
    ///
    /// [`FetchError::NotFound`] if the profile does not exist.
    fn fetch_works(&self, registry_id: &str) -> FetchResult<Value>;

    /// Fetches the full record of one registry work.
    ///
    /// # Errors
    ///
    /// [`FetchError::NotFound`] if the work does not exist.
    fn fetch_work(&self, registry_id: &str, put_code: u64) -> FetchResult<Value>;
}

/// Fetcher for offline runs: every lookup reports "not found".
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

impl RecordFetcher for OfflineFetcher {
    fn fetch_doi(&self, doi: &str) -> FetchResult<Value> {
        Err(FetchError::NotFound(format!("doi:{doi}")))
    }

    fn fetch_works(&self, registry_id: &str) -> FetchResult<Value> {
        Err(FetchError::NotFound(format!("{registry_id}/works")))
    }

    fn fetch_work(&self, registry_id: &str, put_code: u64) -> FetchResult<Value> {
        Err(FetchError::NotFound(format!("{registry_id}/work/{put_code}")))
    }
}
