use crate::common::ChatStream;
use crate::common::Completion;
use crate::common::TokenUsage;
use crate::error::ApiError;
use crate::provider::Provider;
use crate::requests::ChatRequest;
use crate::sse::spawn_chat_stream;
use http::Method;
use http::StatusCode;
use std::sync::Arc;
use tidings_client::HttpTransport;
use tidings_client::Request;
use tidings_client::StreamResponse;
use tidings_client::TransportError;
use tracing::debug;

/// A streaming chat call that connected successfully.
pub struct StreamHandle {
    pub events: ChatStream,
    pub resolved_endpoint: String,
}

/// Chat-completions client for one provider deployment.
#[derive(Clone)]
pub struct ChatClient {
    transport: Arc<dyn HttpTransport>,
    provider: Provider,
}

impl ChatClient {
    pub fn new(transport: Arc<dyn HttpTransport>, provider: Provider) -> Self {
        Self {
            transport,
            provider,
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Unary chat completion.
    pub async fn complete(&self, request: ChatRequest) -> Result<Completion, ApiError> {
        let ChatRequest {
            body,
            headers,
            timeout,
        } = request;

        let urls = self.provider.chat_completions_urls();
        for (idx, url) in urls.iter().enumerate() {
            let mut req = Request::new(Method::POST, url.clone())
                .with_headers(headers.clone())
                .with_json(&body);
            if let Some(timeout) = timeout {
                req = req.with_timeout(timeout);
            }
            match self.transport.execute(req).await {
                Ok(resp) => {
                    let mut completion = parse_completion(&resp.body)?;
                    completion.resolved_endpoint = Some(url.clone());
                    return Ok(completion);
                }
                Err(err) => {
                    if endpoint_missing(&err) {
                        if idx + 1 < urls.len() {
                            debug!("chat endpoint 404 at {url}, retrying without version suffix");
                            continue;
                        }
                        return Err(endpoint_not_found(&self.provider.name, &urls));
                    }
                    return Err(map_http_error(err));
                }
            }
        }
        Err(endpoint_not_found(&self.provider.name, &urls))
    }

    /// Streaming chat completion over SSE.
    pub async fn stream(&self, request: ChatRequest) -> Result<StreamHandle, ApiError> {
        let ChatRequest {
            body,
            headers,
            timeout: _,
        } = request;

        let urls = self.provider.chat_completions_urls();
        for (idx, url) in urls.iter().enumerate() {
            let req = Request::new(Method::POST, url.clone())
                .with_headers(headers.clone())
                .with_json(&body);
            match self.transport.stream(req).await {
                Ok(resp) => {
                    return Ok(StreamHandle {
                        events: start_stream(resp, &self.provider),
                        resolved_endpoint: url.clone(),
                    });
                }
                Err(err) => {
                    if endpoint_missing(&err) {
                        if idx + 1 < urls.len() {
                            debug!("chat endpoint 404 at {url}, retrying without version suffix");
                            continue;
                        }
                        return Err(endpoint_not_found(&self.provider.name, &urls));
                    }
                    return Err(map_http_error(err));
                }
            }
        }
        Err(endpoint_not_found(&self.provider.name, &urls))
    }
}

fn start_stream(resp: StreamResponse, provider: &Provider) -> ChatStream {
    spawn_chat_stream(resp, provider.stream_idle_timeout)
}

fn endpoint_missing(err: &TransportError) -> bool {
    matches!(
        err,
        TransportError::Http {
            status: StatusCode::NOT_FOUND,
            ..
        }
    )
}

fn endpoint_not_found(provider: &str, urls: &[String]) -> ApiError {
    ApiError::Transport(TransportError::Network(format!(
        "no chat completions endpoint found for provider {provider}; tried {}",
        urls.join(", ")
    )))
}

fn map_http_error(err: TransportError) -> ApiError {
    match err {
        TransportError::Http { status, url, body } => ApiError::Http {
            status,
            message: error_message_from_body(body.as_deref()),
            url,
        },
        other => ApiError::Transport(other),
    }
}

fn error_message_from_body(body: Option<&str>) -> String {
    let Some(body) = body else {
        return "unknown error".to_string();
    };
    let json = serde_json::from_str::<serde_json::Value>(body).unwrap_or_default();
    if let Some(message) = json
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
    {
        return message.to_string();
    }
    if body.is_empty() {
        "unknown error".to_string()
    } else {
        body.to_string()
    }
}

fn parse_completion(body: &[u8]) -> Result<Completion, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|err| ApiError::InvalidResponse(format!("non-JSON completion body: {err}")))?;
    let text = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .ok_or_else(|| {
            ApiError::InvalidResponse("completion body carries no message content".to_string())
        })?
        .to_string();
    let usage = value
        .get("usage")
        .filter(|u| !u.is_null())
        .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok());
    Ok(Completion {
        text,
        usage,
        resolved_endpoint: None,
    })
}
