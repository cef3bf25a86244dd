use thiserror::Error;

/// Result type for pipeline operations that can cross the orchestrator boundary.
pub type Result<T> = std::result::Result<T, QualityError>;

/// The piece of configuration an operation needed but did not find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("progress tracker not set")]
    ProgressTracker,
    #[error("telemetry source not set")]
    TelemetrySource,
    #[error("no goals selected")]
    Goals,
}

/// Errors surfaced to callers of the orchestrator.
///
/// Only configuration problems and unrecoverable storage failures end up here;
/// metric failures and assessment gaps degrade into partial results instead.
#[derive(Debug, Error)]
pub enum QualityError {
    #[error("not configured: {0}")]
    NotConfigured(#[from] ConfigurationError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors raised by telemetry store backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Content exists but cannot be understood in the configured format.
    #[error("malformed content in {location}: {reason}")]
    Malformed { location: String, reason: String },

    #[error("data format {0} is not supported by this backend")]
    UnsupportedFormat(String),

    #[error("remote store error: {0}")]
    Remote(#[from] reqwest::Error),

    #[error("remote store answered {status} for {url}")]
    RemoteStatus { url: String, status: u16 },

    #[error("store not connected")]
    NotConnected,
}

impl StorageError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io { path: path.into(), source }
    }
}

/// A single metric's failure. Isolated to that metric; never aborts a batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    #[error("computation failed: {0}")]
    Computation(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("needs at least {needed} records, got {found}")]
    InsufficientTelemetry { needed: usize, found: usize },
}
