use thiserror::Error;

/// Errors surfaced by the blacklist tracker and the endpoint registry.
///
/// Probe failures never show up here: they are reported inside each
/// `EndpointLatency`. Unreadable provider config sources are skipped by the
/// extractor and never become an error either.
#[derive(Error, Debug)]
pub enum HealthError {
    /// Input rejected before any I/O (empty or unparseable URL, duplicate add).
    #[error("validation error: {0}")]
    Validation(String),

    /// The addressed provider or endpoint does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Store or file read/write failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, HealthError>;

impl HealthError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HealthError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, HealthError::Validation(_))
    }
}

impl From<rusqlite::Error> for HealthError {
    fn from(e: rusqlite::Error) -> Self {
        HealthError::Persistence(format!("database: {}", e))
    }
}

impl From<r2d2::Error> for HealthError {
    fn from(e: r2d2::Error) -> Self {
        HealthError::Persistence(format!("connection pool: {}", e))
    }
}

impl From<std::io::Error> for HealthError {
    fn from(e: std::io::Error) -> Self {
        HealthError::Persistence(format!("io: {}", e))
    }
}

impl From<serde_json::Error> for HealthError {
    fn from(e: serde_json::Error) -> Self {
        HealthError::Persistence(format!("json: {}", e))
    }
}
