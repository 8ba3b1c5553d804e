use http::StatusCode;
use tidings_client::TransportError;

/// Failure raised by the provider endpoint layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("provider returned {status}: {message}")]
    Http {
        status: StatusCode,
        message: String,
        url: Option<String>,
    },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// HTTP status attached to this error, when one exists.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status(),
            _ => None,
        }
    }

    /// True for transport-level failures (timeouts, refused connections).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ApiError::Transport(TransportError::Timeout | TransportError::Network(_))
                | ApiError::Stream(_)
        )
    }
}
