//! Publisher error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Upstream API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("Invalid publisher configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for PublishError {
    fn from(err: reqwest::Error) -> Self {
        PublishError::Transport(err.to_string())
    }
}
