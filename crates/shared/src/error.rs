use serde::Serialize;
use thiserror::Error;

pub const GENERIC_SERVER_ERROR: &str = "Server error occurred";

/// Every way a plan request can fail. Callers match on the variant instead of
/// inspecting message text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum RequestError {
    #[error("{0}")]
    Validation(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl RequestError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Short text suitable for an error banner.
    pub fn banner_text(&self) -> String {
        match self {
            RequestError::Validation(message) => message.clone(),
            RequestError::Network(_) => {
                "Failed to generate plan. Please try again later.".to_string()
            }
            RequestError::Timeout => "The request took too long. Please try again.".to_string(),
            RequestError::Server { message, .. } => message.clone(),
            RequestError::MalformedResponse(message) => message.clone(),
        }
    }
}
