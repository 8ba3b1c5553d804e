use http::StatusCode;

/// Transport-level failure raised below any provider semantics.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build request: {0}")]
    Build(String),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected HTTP status {status}")]
    Http {
        status: StatusCode,
        url: Option<String>,
        body: Option<String>,
    },
}

impl TransportError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
