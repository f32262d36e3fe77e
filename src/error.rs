use crate::requester::RequestError;
use thiserror::Error;

/// A stream line that is not valid JSON.
#[derive(Debug, Error)]
#[error("could not decode stream line {line:?}: {source}")]
pub struct DecodeError {
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, Error)]
pub enum LichessError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("response could not be parsed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid authorization token")]
    InvalidToken(#[source] Box<LichessError>),
    #[error("event streams need a running tokio runtime")]
    NoRuntime,
    #[error("stream task failed: {0}")]
    TaskFailed(String),
}

impl LichessError {
    /// Whether this error only concerns a single stream line.
    pub fn is_decode(&self) -> bool {
        matches!(self, LichessError::Decode(_))
    }
}

pub type Result<T, E = LichessError> = std::result::Result<T, E>;
