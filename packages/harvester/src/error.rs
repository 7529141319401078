//! Typed errors for the harvester library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can tell
//! recoverable failures (a bad page, a failed lookup) apart from fatal ones.

use thiserror::Error;

/// Errors that can surface from a harvest run.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Crawl operation failed before it could start
    #[error("crawl failed: {0}")]
    Crawl(#[from] CrawlError),

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Configuration could not be loaded
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Unknown harvest target
    #[error("no sources configured for target: {target}")]
    UnknownTarget { target: String },
}

/// Errors that can occur while fetching a single page.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Non-success status code
    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Connection timeout
    #[error("timeout crawling: {url}")]
    Timeout { url: String },
}

/// Errors raised by the durable stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem read/write failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Stored data could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database backend failed
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from the external geocoding provider.
///
/// These never escape the resolver; they are mapped to an unresolved outcome.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// Transport failure
    #[error("geocoding request failed: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Provider asked us to slow down (HTTP 429/503)
    #[error("geocoding provider throttled the request (HTTP {status})")]
    Throttled { status: u16 },

    /// Provider rejected the request
    #[error("geocoding provider returned HTTP {status}")]
    Status { status: u16 },

    /// Response body did not parse
    #[error("invalid geocoding response: {0}")]
    InvalidResponse(String),
}

/// Configuration errors. Limit parsing errors fall back to the next layer
/// instead of failing a job.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value could not be parsed
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    /// Sources catalog missing
    #[error("sources file not found: {path}")]
    MissingSources { path: String },

    /// Sources catalog malformed
    #[error("sources file {path} is malformed: {reason}")]
    MalformedSources { path: String, reason: String },

    /// Scheduler could not be built
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Result type alias for harvest operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for crawl operations.
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for provider lookups.
pub type GeocodeResult<T> = std::result::Result<T, GeocodeError>;

impl StoreError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
