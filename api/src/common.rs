use crate::error::ApiError;
use futures::Stream;
use serde::Deserialize;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use tokio::sync::mpsc;

/// Token accounting reported by the provider, when it reports any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

impl TokenUsage {
    pub fn is_empty(&self) -> bool {
        self.prompt_tokens.is_none() && self.completion_tokens.is_none()
    }
}

/// Final result of one provider call, unary or streamed.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
    /// Endpoint URL the call actually landed on, after any 404 fallback.
    pub resolved_endpoint: Option<String>,
}

/// Event produced while draining a chat SSE stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    TextDelta(String),
    Completed { usage: Option<TokenUsage> },
}

/// Stream of [`ChatEvent`]s backed by the SSE processing task.
pub struct ChatStream {
    pub(crate) rx_event: mpsc::Receiver<Result<ChatEvent, ApiError>>,
}

impl Stream for ChatStream {
    type Item = Result<ChatEvent, ApiError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx_event.poll_recv(cx)
    }
}
