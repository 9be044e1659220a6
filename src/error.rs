use thiserror::Error;

/// Internal error type for the schedule acquisition pipeline.
///
/// Nothing in the public surface propagates these: every component catches
/// its own failures at the boundary, logs them, and degrades to empty or
/// partial data. The variants exist so the degradation sites can log a
/// precise cause.
#[derive(Debug, Error)]
pub enum TransitError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Network error: {0}")]
    NetworkMessage(String),
    #[error("Schedule parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
