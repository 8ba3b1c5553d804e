//! Capability seam between executors and the provider endpoint layer.
//!
//! Executors never touch HTTP directly; they speak [`CompletionClient`],
//! and tests swap in scripted fixtures the same way the transport layer
//! swaps under the api crate.

use crate::routes::ResolvedRoute;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tidings_api::ApiError;
use tidings_api::ChatClient;
use tidings_api::ChatEvent;
use tidings_api::ChatMessage;
use tidings_api::Completion;
use tidings_api::Provider;
use tidings_api::requests::ChatRequestBuilder;
use tidings_client::HttpTransport;
use tidings_client::ReqwestTransport;
use tidings_client::create_client;
use tokio::sync::mpsc::UnboundedSender;

/// One provider call, ready to aim at any resolved route.
#[derive(Debug, Clone)]
pub struct ChatCall {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl ChatCall {
    pub fn new(messages: Vec<ChatMessage>, timeout: Duration) -> Self {
        Self {
            messages,
            temperature: None,
            top_p: None,
            max_tokens: None,
            timeout,
        }
    }
}

/// Provider capability used by the executors.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        route: &ResolvedRoute,
        call: &ChatCall,
    ) -> Result<Completion, ApiError>;

    /// Streaming variant; text deltas go to `on_delta` as they arrive and
    /// the accumulated completion is returned at the end.
    async fn stream(
        &self,
        route: &ResolvedRoute,
        call: &ChatCall,
        on_delta: UnboundedSender<String>,
    ) -> Result<Completion, ApiError>;
}

/// Production implementation over HTTP+SSE.
#[derive(Clone)]
pub struct HttpCompletionClient {
    transport: Arc<dyn HttpTransport>,
}

impl HttpCompletionClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    pub fn with_default_client() -> Self {
        Self::new(Arc::new(ReqwestTransport::new(create_client())))
    }

    fn chat_client(&self, route: &ResolvedRoute) -> ChatClient {
        ChatClient::new(
            Arc::clone(&self.transport),
            Provider::new(route.provider.name.clone(), route.provider.base_url.clone()),
        )
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(
        &self,
        route: &ResolvedRoute,
        call: &ChatCall,
    ) -> Result<Completion, ApiError> {
        let request = ChatRequestBuilder::new(&route.model.model_name, &call.messages)
            .api_key(Some(&route.api_key))
            .temperature(call.temperature)
            .top_p(call.top_p)
            .max_tokens(call.max_tokens)
            .stream(false)
            .timeout(Some(call.timeout))
            .build();
        self.chat_client(route).complete(request).await
    }

    async fn stream(
        &self,
        route: &ResolvedRoute,
        call: &ChatCall,
        on_delta: UnboundedSender<String>,
    ) -> Result<Completion, ApiError> {
        let request = ChatRequestBuilder::new(&route.model.model_name, &call.messages)
            .api_key(Some(&route.api_key))
            .temperature(call.temperature)
            .top_p(call.top_p)
            .max_tokens(call.max_tokens)
            .stream(true)
            .build();
        let handle = self.chat_client(route).stream(request).await?;

        let mut events = handle.events;
        let mut text = String::new();
        let mut usage = None;
        while let Some(event) = events.next().await {
            match event? {
                ChatEvent::TextDelta(delta) => {
                    text.push_str(&delta);
                    let _ = on_delta.send(delta);
                }
                ChatEvent::Completed { usage: reported } => usage = reported,
            }
        }
        Ok(Completion {
            text,
            usage,
            resolved_endpoint: Some(handle.resolved_endpoint),
        })
    }
}
