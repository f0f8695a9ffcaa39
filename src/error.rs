use reqwest::StatusCode;
use thiserror::Error;

/// Message used when the service rejects a request without a usable `detail`.
pub const GENERIC_FAILURE: &str = "Request failed";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{detail} (status {status})")]
    Status { status: StatusCode, detail: String },

    #[error("Invalid tree payload: {0}")]
    InvalidTree(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Message is empty")]
    EmptyPrompt,

    #[error("Name must not be empty")]
    EmptyName,
}

impl ClientError {
    /// Text suitable for a user-facing notice.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Status { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
