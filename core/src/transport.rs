use thiserror::Error;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Failures below HTTP: nothing came back to inspect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

/// Platform HTTP client used for every remote call.
///
/// The CLI implements this with reqwest. Calls are blocking: implementors
/// must return only after the response body has been read or the request
/// has failed, and must bound the wait with a timeout.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, TransportError>;
}
