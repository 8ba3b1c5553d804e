//! Executors: drive one activated owner from provider call to terminal
//! bookkeeping.
//!
//! Both executors share the same shape: resolve routes, open a run row,
//! call providers with cooperative cancellation, record a usage event per
//! request, persist under the slot key, finalize the run with a forensic
//! snapshot, link usage events, and finish the owner at the engine.

mod summary;
mod translation;

pub use summary::SummaryInput;
pub use summary::run_summary;
pub use translation::SegmentSource;
pub use translation::SourceSnapshot;
pub use translation::TranslationError;
pub use translation::TranslationInput;
pub use translation::run_translation;

use crate::cancel::TaskHandle;
use crate::classify::classify;
use crate::config::RuntimeConfig;
use crate::engine::AgentRuntime;
use crate::error::AgentError;
use crate::llm::CompletionClient;
use crate::routes::ResolvedRoute;
use crate::routes::RouteResolver;
use chrono::DateTime;
use chrono::Utc;
use std::sync::Arc;
use tidings_api::Completion;
use tidings_protocol::FailureReason;
use tidings_protocol::TaskKind;
use tidings_protocol::TaskOwner;
use tidings_protocol::TaskPhase;
use tidings_protocol::TerminationReason;
use tidings_state::RequestStatus;
use tidings_state::StateRuntime;
use tidings_state::UsageEventCreateParams;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;
use uuid::Uuid;

/// A streamed text delta, addressed to whoever renders the owner's entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenEvent {
    pub owner: TaskOwner,
    pub delta: String,
}

/// Everything an executor needs, threaded explicitly instead of captured.
#[derive(Clone)]
pub struct ExecutorContext {
    pub engine: Arc<AgentRuntime>,
    pub state: Arc<StateRuntime>,
    pub routes: Arc<RouteResolver>,
    pub client: Arc<dyn CompletionClient>,
    pub config: Arc<RuntimeConfig>,
    /// Sink for streamed deltas; `None` when no pane is listening.
    pub tokens: Option<UnboundedSender<TokenEvent>>,
}

impl ExecutorContext {
    pub(crate) fn send_token(&self, owner: &TaskOwner, delta: String) {
        if let Some(tokens) = &self.tokens {
            let _ = tokens.send(TokenEvent {
                owner: owner.clone(),
                delta,
            });
        }
    }
}

/// Route rung label recorded on usage events.
pub(crate) fn route_label(route_index: usize) -> &'static str {
    if route_index == 0 { "primary" } else { "fallback" }
}

/// Terminal phase and failure reason for an error, splitting user aborts
/// from timeouts via the termination signal.
pub(crate) fn terminal_for_error(
    error: &AgentError,
    handle: &TaskHandle,
) -> (TaskPhase, FailureReason) {
    if error.is_cancellation() {
        return match handle.termination_reason() {
            TerminationReason::UserCancelled => (TaskPhase::Cancelled, FailureReason::Cancelled),
            TerminationReason::TimedOut => (TaskPhase::TimedOut, FailureReason::TimedOut),
        };
    }
    let reason = classify(error);
    let phase = match reason {
        FailureReason::Cancelled => TaskPhase::Cancelled,
        FailureReason::TimedOut => TaskPhase::TimedOut,
        _ => TaskPhase::Failed,
    };
    (phase, reason)
}

/// Request status recorded on the usage event for one attempt.
pub(crate) fn request_status_for(
    result: &Result<Completion, AgentError>,
    handle: &TaskHandle,
) -> RequestStatus {
    match result {
        Ok(_) => RequestStatus::Succeeded,
        Err(error) if error.is_cancellation() => match handle.termination_reason() {
            TerminationReason::UserCancelled => RequestStatus::Cancelled,
            TerminationReason::TimedOut => RequestStatus::TimedOut,
        },
        Err(_) => RequestStatus::Failed,
    }
}

/// Record one provider request; never fails the run over telemetry.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn record_request_usage(
    state: &StateRuntime,
    kind: TaskKind,
    entry_id: i64,
    route: &ResolvedRoute,
    route_index: usize,
    status: RequestStatus,
    completion: Option<&Completion>,
    started_at: DateTime<Utc>,
) {
    let usage = completion.and_then(|c| c.usage);
    let params = UsageEventCreateParams {
        id: Uuid::new_v4().to_string(),
        entry_id: Some(entry_id),
        task_type: kind,
        provider_profile_id: Some(route.provider.id.clone()),
        model_profile_id: Some(route.model.id.clone()),
        provider_base_url_snapshot: route.provider.base_url.clone(),
        provider_resolved_url_snapshot: completion
            .and_then(|c| c.resolved_endpoint.clone()),
        provider_name_snapshot: Some(route.provider.name.clone()),
        model_name_snapshot: route.model.model_name.clone(),
        request_phase: route_label(route_index).to_string(),
        request_status: status,
        prompt_tokens: usage.and_then(|u| u.prompt_tokens),
        completion_tokens: usage.and_then(|u| u.completion_tokens),
        total_tokens: usage.and_then(|u| u.total_tokens),
        started_at: Some(started_at),
        finished_at: Some(Utc::now()),
    };
    if let Err(err) = state.record_usage_event(&params).await {
        warn!("failed to record usage event: {err:#}");
    }
}

/// Backfill `task_run_id` on this run's usage events; log-only on failure.
pub(crate) async fn link_run_usage(
    state: &StateRuntime,
    run_id: &str,
    entry_id: i64,
    kind: TaskKind,
    started_at: DateTime<Utc>,
) {
    if let Err(err) = state
        .link_usage_events_to_run(run_id, entry_id, kind, started_at, Utc::now())
        .await
    {
        warn!("failed to link usage events to run {run_id}: {err:#}");
    }
}
