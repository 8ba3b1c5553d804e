use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Classified cause of a failed or interrupted run.
///
/// Every error raised inside an executor maps onto exactly one of these;
/// the string forms land in usage events, runtime snapshots, and terminal
/// engine events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Cancelled,
    TimedOut,
    RateLimited,
    Network,
    Unauthorized,
    InvalidConfiguration,
    InvalidResponse,
    Unknown,
}

impl FailureReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            FailureReason::Cancelled => "cancelled",
            FailureReason::TimedOut => "timed_out",
            FailureReason::RateLimited => "rate_limited",
            FailureReason::Network => "network",
            FailureReason::Unauthorized => "unauthorized",
            FailureReason::InvalidConfiguration => "invalid_configuration",
            FailureReason::InvalidResponse => "invalid_response",
            FailureReason::Unknown => "unknown",
        }
    }

    /// Reasons that must never be retried on another route.
    pub const fn is_permanent(self) -> bool {
        matches!(
            self,
            FailureReason::Cancelled | FailureReason::TimedOut | FailureReason::InvalidConfiguration
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a cooperatively-cancelled run stopped, as reported by the task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    UserCancelled,
    TimedOut,
}

impl TerminationReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            TerminationReason::UserCancelled => "user_cancelled",
            TerminationReason::TimedOut => "timed_out",
        }
    }
}

/// Failure to parse one of the string-encoded primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {what}: {value}")]
pub struct ParsePrimitiveError {
    what: &'static str,
    value: String,
}

impl ParsePrimitiveError {
    pub fn new(what: &'static str, value: impl Into<String>) -> Self {
        Self {
            what,
            value: value.into(),
        }
    }
}
