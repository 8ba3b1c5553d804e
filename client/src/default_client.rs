use std::time::Duration;

pub const USER_AGENT: &str = concat!("tidings/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the process-wide HTTP client shared by all provider calls.
///
/// No request timeout is set here: unary calls carry their own per-request
/// timeout and SSE streams are bounded by the idle-timeout in the api layer.
pub fn create_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_default()
}
