//! Provider endpoint layer: chat-completions over HTTP+SSE.
//!
//! [`ChatClient`] is the concrete implementation of the provider contract —
//! `complete` for unary calls, `stream` for SSE token streams — on top of
//! the transport seam in `tidings-client`. Endpoint resolution tolerates
//! providers that mount `chat/completions` without the `/v1` prefix.

mod common;
mod endpoint;
mod error;
mod provider;
pub mod requests;
mod sse;

pub use common::ChatEvent;
pub use common::ChatStream;
pub use common::Completion;
pub use common::TokenUsage;
pub use endpoint::ChatClient;
pub use endpoint::StreamHandle;
pub use error::ApiError;
pub use provider::Provider;
pub use requests::ChatMessage;
pub use requests::ChatRequest;
pub use sse::process_chat_sse;
