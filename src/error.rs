use thiserror::Error;

#[derive(Error, Debug)]
pub enum BalancerError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Backend {endpoint} unavailable: {reason}")]
    BackendUnavailable { endpoint: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BalancerError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        BalancerError::MalformedRequest(reason.into())
    }

    pub fn unavailable(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        BalancerError::BackendUnavailable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BalancerError>;
