//! Error types for the gridshift scheduler

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Static configuration missing, unparseable, or internally inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// function_metadata missing, empty, or an entry has an unusable shape
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// LLM natural-language extraction produced invalid or incomplete metadata
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// All requested carbon-intensity zones failed to fetch
    #[error("Forecast error: {0}")]
    Forecast(String),

    /// LLM ranking response failed schema validation
    #[error("Ranking error: {0}")]
    Ranking(String),

    /// Object store write failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Requested object does not exist; non-fatal for cache checks
    #[error("Not found: {0}")]
    NotFound(String),

    /// Deploy service reported a non-success outcome
    #[error("Deployment error: {0}")]
    Deploy(String),

    /// Dispatcher received an invalid event
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization failure
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem failure in the local object store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the explicit miss returned by `ObjectStore::read`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
