use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Class of an `error` object returned inside a JSON response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteErrorKind {
    General,
    Authentication,
    Parameter,
    Application,
    Unknown,
}

impl RemoteErrorKind {
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 | 10 | 11 | 12 | 20 | 21 => Self::General,
            2..=9 => Self::Authentication,
            101..=108 => Self::Parameter,
            201..=207 => Self::Application,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::General => "general",
            Self::Authentication => "authentication",
            Self::Parameter => "parameter",
            Self::Application => "application",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Inputs to the signer were unusable (empty method, relative URL).
    #[error("signature error: {0}")]
    Signature(String),

    /// A step of the three-legged handshake failed. Never retried.
    #[error("OAuth flow failed: {0}")]
    AuthFlow(String),

    #[error("token store error: {0}")]
    TokenStore(String),

    /// Non-200 response after retries were exhausted.
    #[error("API request failed ({status}): {body}")]
    Api { status: u16, body: String },

    /// HTTP 200 carrying an `error` object in the envelope.
    #[error("{kind} error {code}: {message}")]
    Remote {
        kind: RemoteErrorKind,
        code: i64,
        message: String,
    },

    /// Transport failure after retries were exhausted.
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid entry: {0}")]
    DataValidation(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for failures a fresh access token might fix.
    #[must_use]
    pub fn is_auth_related(&self) -> bool {
        matches!(
            self,
            Error::AuthFlow(_)
                | Error::Remote {
                    kind: RemoteErrorKind::Authentication,
                    ..
                }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
