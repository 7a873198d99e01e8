/// A position sample that cannot be classified.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SampleError {
    #[error("invalid sample at t={timestamp}: speed {speed} is negative or NaN")]
    InvalidSample { timestamp: f64, speed: f64 },
}

/// Failure reported by a persistence gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("tracking speed threshold must be finite and positive, got {0}")]
    InvalidThreshold(f64),

    #[error("sample rate must be at least 1")]
    ZeroSampleRate,

    #[error("{0} must be at least 1")]
    ZeroCapacity(&'static str),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors surfaced by the synchronous detector path.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error("persistence write failed for record at t={timestamp}: {source}")]
    PersistenceWriteFailed {
        timestamp: f64,
        #[source]
        source: GatewayError,
    },
}
