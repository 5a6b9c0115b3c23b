use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("No transcript found for video {0}")]
    NotFound(String),

    #[error("Upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotFound,
    UpstreamFailure,
    InvalidInput,
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::NotFound(_) => ErrorKind::NotFound,
            ProviderError::UpstreamFailure(_) => ErrorKind::UpstreamFailure,
            ProviderError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::UpstreamFailure(format!("request timed out: {}", e))
        } else {
            ProviderError::UpstreamFailure(e.to_string())
        }
    }
}
