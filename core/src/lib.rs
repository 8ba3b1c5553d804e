//! Agent runtime core.
//!
//! Coordinates long-running, streaming LLM tasks — per-article summaries
//! and per-segment translations — while the user keeps browsing. The
//! [`engine::AgentRuntime`] serializes every scheduling decision over
//! bounded active/waiting queues; executors drive provider calls with
//! cooperative cancellation and watchdog timeouts; results land in
//! `tidings-state` under slot keys; the projector decides what the
//! currently displayed article gets to see.

pub mod cancel;
pub mod classify;
pub mod config;
pub mod engine;
mod error;
pub mod executors;
pub mod language;
pub mod llm;
pub mod projector;
pub mod prompts;
pub mod routes;

pub use cancel::TaskController;
pub use cancel::TaskHandle;
pub use cancel::TerminationSignal;
pub use classify::classify;
pub use config::KindConfig;
pub use config::RuntimeConfig;
pub use engine::AgentRuntime;
pub use engine::EngineSnapshot;
pub use engine::FinishOutcome;
pub use error::AgentError;
pub use executors::ExecutorContext;
pub use executors::TokenEvent;
pub use llm::ChatCall;
pub use llm::CompletionClient;
pub use llm::HttpCompletionClient;
pub use routes::ModelProfile;
pub use routes::ProviderProfile;
pub use routes::ResolvedRoute;
pub use routes::RouteResolver;
