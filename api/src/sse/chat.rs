use crate::common::ChatEvent;
use crate::common::ChatStream;
use crate::common::TokenUsage;
use crate::error::ApiError;
use eventsource_stream::Eventsource;
use futures::Stream;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;
use tracing::trace;

pub(crate) fn spawn_chat_stream(
    stream_response: tidings_client::StreamResponse,
    idle_timeout: Duration,
) -> ChatStream {
    let (tx_event, rx_event) = mpsc::channel::<Result<ChatEvent, ApiError>>(1600);
    tokio::spawn(async move {
        process_chat_sse(stream_response.bytes, tx_event, idle_timeout).await;
    });
    ChatStream { rx_event }
}

/// Drain a chat-completions SSE body into [`ChatEvent`]s.
///
/// Text deltas are forwarded in arrival order. The trailing `usage` object
/// (sent by providers honoring `stream_options.include_usage`) is attached
/// to the final `Completed` event. An idle gap longer than `idle_timeout`
/// kills the stream with a `Stream` error.
pub async fn process_chat_sse<S>(
    stream: S,
    tx_event: mpsc::Sender<Result<ChatEvent, ApiError>>,
    idle_timeout: Duration,
) where
    S: Stream<Item = Result<bytes::Bytes, tidings_client::TransportError>> + Unpin,
{
    let mut stream = stream.eventsource();
    let mut usage: Option<TokenUsage> = None;
    let mut completed_sent = false;

    loop {
        let sse = match timeout(idle_timeout, stream.next()).await {
            Ok(Some(Ok(sse))) => sse,
            Ok(Some(Err(e))) => {
                let _ = tx_event.send(Err(ApiError::Stream(e.to_string()))).await;
                return;
            }
            Ok(None) => {
                if !completed_sent {
                    let _ = tx_event.send(Ok(ChatEvent::Completed { usage })).await;
                }
                return;
            }
            Err(_) => {
                let _ = tx_event
                    .send(Err(ApiError::Stream("idle timeout waiting for SSE".into())))
                    .await;
                return;
            }
        };

        trace!("SSE event: {}", sse.data);

        let data = sse.data.trim();
        if data.is_empty() {
            continue;
        }
        if data == "[DONE]" {
            if !completed_sent {
                let _ = tx_event.send(Ok(ChatEvent::Completed { usage })).await;
                completed_sent = true;
            }
            continue;
        }

        let value: serde_json::Value = match serde_json::from_str(data) {
            Ok(val) => val,
            Err(err) => {
                debug!("failed to parse chat SSE event: {err}, data: {data}");
                continue;
            }
        };

        if let Some(found) = parse_usage(&value) {
            usage = Some(found);
        }

        let Some(choices) = value.get("choices").and_then(|c| c.as_array()) else {
            continue;
        };

        for choice in choices {
            if let Some(delta) = choice.get("delta")
                && let Some(content) = delta.get("content")
            {
                if let Some(text) = content.as_str() {
                    if !text.is_empty() {
                        let _ = tx_event
                            .send(Ok(ChatEvent::TextDelta(text.to_string())))
                            .await;
                    }
                } else if let Some(items) = content.as_array() {
                    for item in items {
                        if let Some(text) = item.get("text").and_then(|t| t.as_str())
                            && !text.is_empty()
                        {
                            let _ = tx_event
                                .send(Ok(ChatEvent::TextDelta(text.to_string())))
                                .await;
                        }
                    }
                }
            }

            let finish_reason = choice.get("finish_reason").and_then(|r| r.as_str());
            if finish_reason == Some("stop") && !completed_sent {
                // Usage may still trail in a choice-free chunk; only close
                // here if the provider already reported it.
                if usage.is_some() {
                    let _ = tx_event.send(Ok(ChatEvent::Completed { usage })).await;
                    completed_sent = true;
                }
            }
        }
    }
}

fn parse_usage(value: &serde_json::Value) -> Option<TokenUsage> {
    let usage = value.get("usage")?;
    if usage.is_null() {
        return None;
    }
    let parsed: TokenUsage = serde_json::from_value(usage.clone()).ok()?;
    if parsed.is_empty() && parsed.total_tokens.is_none() {
        return None;
    }
    Some(parsed)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    async fn collect(body: &str) -> Vec<Result<ChatEvent, ApiError>> {
        let stream = futures::stream::iter(vec![Ok::<bytes::Bytes, tidings_client::TransportError>(
            bytes::Bytes::from(body.to_string()),
        )]);
        let (tx, mut rx) = mpsc::channel(64);
        process_chat_sse(Box::pin(stream), tx, Duration::from_secs(5)).await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn deltas_arrive_in_order_and_done_completes() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let events = collect(body).await;
        let events: Vec<ChatEvent> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            vec![
                ChatEvent::TextDelta("Hel".to_string()),
                ChatEvent::TextDelta("lo".to_string()),
                ChatEvent::Completed { usage: None },
            ]
        );
    }

    #[tokio::test]
    async fn trailing_usage_chunk_is_attached_to_completion() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":3,\"total_tokens\":15}}\n\n",
            "data: [DONE]\n\n",
        );
        let events = collect(body).await;
        let last = events.last().unwrap().as_ref().unwrap().clone();
        assert_eq!(
            last,
            ChatEvent::Completed {
                usage: Some(TokenUsage {
                    prompt_tokens: Some(12),
                    completion_tokens: Some(3),
                    total_tokens: Some(15),
                }),
            }
        );
    }

    #[tokio::test]
    async fn malformed_chunks_are_skipped() {
        let body = concat!(
            "data: not-json\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let events = collect(body).await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            *events[0].as_ref().unwrap(),
            ChatEvent::TextDelta("ok".to_string())
        );
    }

    #[tokio::test]
    async fn stream_end_without_done_still_completes() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}\n\n";
        let events = collect(body).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1].as_ref().unwrap(),
            ChatEvent::Completed { .. }
        ));
    }
}
