use reqwest::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use party_types::api::ErrorCode;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Timeouts, connection failures and undecodable bodies, passed through as
    /// reqwest reported them.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The server answered with an error payload.
    #[error("server responded {status}: {message}")]
    Api {
        status: StatusCode,
        code: Option<ErrorCode>,
        message: String,
    },

    #[error("party {0} is not stored locally")]
    NotCachedLocally(Uuid),

    #[error("invalid base url: {0}")]
    InvalidBase(String),

    /// The request's token was cancelled; the cache was left untouched.
    #[error("request cancelled")]
    Cancelled,
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}
