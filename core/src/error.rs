use tidings_api::ApiError;
use tidings_keyring_store::SecretStoreError;

/// Error raised inside an executor.
///
/// The classifier in [`crate::classify`] maps every variant onto a
/// [`tidings_protocol::FailureReason`]; nothing escapes the run loop
/// unclassified.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Cooperative cancel observed; consult the termination signal to
    /// tell a user abort from a watchdog timeout.
    #[error("task cancelled")]
    Cancelled,

    #[error("task timed out")]
    TimedOut,

    #[error("no usable model route")]
    NoUsableModelRoute,

    #[error("invalid base url {url}: {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("model returned an empty completion")]
    EmptyCompletion,

    #[error("credential read failed: {0}")]
    Secret(#[from] SecretStoreError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Storage(format!("{err:#}"))
    }
}
