use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("API error: {0}")]
    ApiError(String),

    /// The provider refused the request itself (bad key, unknown symbol).
    /// Sending it again cannot succeed.
    #[error("Request rejected: {0}")]
    RequestRejected(String),

    #[error("State error: {0}")]
    StateError(String),
}
