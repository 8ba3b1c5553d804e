use crate::error::AgentError;
use http::StatusCode;
use tidings_api::ApiError;
use tidings_client::TransportError;
use tidings_protocol::FailureReason;

/// Map any executor error onto the failure taxonomy.
pub fn classify(error: &AgentError) -> FailureReason {
    match error {
        AgentError::Cancelled => FailureReason::Cancelled,
        AgentError::TimedOut => FailureReason::TimedOut,
        AgentError::NoUsableModelRoute
        | AgentError::InvalidBaseUrl { .. }
        | AgentError::Secret(_) => FailureReason::InvalidConfiguration,
        AgentError::EmptyCompletion => FailureReason::InvalidResponse,
        AgentError::Api(api) => classify_api(api),
        AgentError::Storage(_) | AgentError::Internal(_) => FailureReason::Unknown,
    }
}

fn classify_api(api: &ApiError) -> FailureReason {
    if let Some(status) = api.status() {
        return classify_status(status);
    }
    match api {
        ApiError::Transport(TransportError::Timeout | TransportError::Network(_))
        | ApiError::Stream(_) => FailureReason::Network,
        ApiError::InvalidResponse(_) => FailureReason::InvalidResponse,
        _ => FailureReason::Unknown,
    }
}

fn classify_status(status: StatusCode) -> FailureReason {
    match status {
        StatusCode::TOO_MANY_REQUESTS => FailureReason::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureReason::Unauthorized,
        _ => FailureReason::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn http(status: StatusCode) -> AgentError {
        AgentError::Api(ApiError::Http {
            status,
            message: "err".to_string(),
            url: None,
        })
    }

    #[test]
    fn statuses_map_to_their_reasons() {
        assert_eq!(
            classify(&http(StatusCode::TOO_MANY_REQUESTS)),
            FailureReason::RateLimited
        );
        assert_eq!(
            classify(&http(StatusCode::UNAUTHORIZED)),
            FailureReason::Unauthorized
        );
        assert_eq!(
            classify(&http(StatusCode::FORBIDDEN)),
            FailureReason::Unauthorized
        );
        assert_eq!(
            classify(&http(StatusCode::INTERNAL_SERVER_ERROR)),
            FailureReason::Unknown
        );
    }

    #[test]
    fn transport_failures_are_network() {
        assert_eq!(
            classify(&AgentError::Api(ApiError::Transport(TransportError::Timeout))),
            FailureReason::Network
        );
        assert_eq!(
            classify(&AgentError::Api(ApiError::Transport(TransportError::Network(
                "refused".to_string()
            )))),
            FailureReason::Network
        );
        assert_eq!(
            classify(&AgentError::Api(ApiError::Stream("idle".to_string()))),
            FailureReason::Network
        );
    }

    #[test]
    fn sentinels_and_config_errors_are_terminal_reasons() {
        assert_eq!(classify(&AgentError::Cancelled), FailureReason::Cancelled);
        assert_eq!(classify(&AgentError::TimedOut), FailureReason::TimedOut);
        assert_eq!(
            classify(&AgentError::NoUsableModelRoute),
            FailureReason::InvalidConfiguration
        );
        assert_eq!(
            classify(&AgentError::EmptyCompletion),
            FailureReason::InvalidResponse
        );
    }
}
