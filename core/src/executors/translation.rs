use super::ExecutorContext;
use super::link_run_usage;
use super::record_request_usage;
use super::request_status_for;
use super::terminal_for_error;
use crate::cancel::TaskHandle;
use crate::classify::classify;
use crate::error::AgentError;
use crate::language;
use crate::llm::ChatCall;
use crate::prompts;
use crate::routes::ResolvedRoute;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tidings_api::Completion;
use tidings_protocol::FailureReason;
use tidings_protocol::TaskKind;
use tidings_protocol::TaskPhase;
use tidings_state::RuntimeSnapshot;
use tidings_state::SegmentUpsert;
use tidings_state::TaskRunCreateParams;
use tidings_state::TaskRunStatus;
use tidings_state::TranslationSlot;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::warn;
use uuid::Uuid;

/// One segment of the article body, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSource {
    pub id: String,
    pub order_index: i64,
    pub text: String,
}

/// Immutable capture of the article at segmentation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub segments: Vec<SegmentSource>,
    pub source_content_hash: String,
    pub segmenter_version: String,
}

/// One translation request as submitted by the UI.
#[derive(Debug, Clone)]
pub struct TranslationInput {
    pub entry_id: i64,
    pub target_language: String,
    pub snapshot: SourceSnapshot,
    pub primary_model_id: Option<String>,
    pub fallback_model_id: Option<String>,
}

impl TranslationInput {
    fn slot(&self) -> TranslationSlot {
        TranslationSlot {
            entry_id: self.entry_id,
            target_language: self.target_language.clone(),
            source_content_hash: self.snapshot.source_content_hash.clone(),
            segmenter_version: self.snapshot.segmenter_version.clone(),
        }
    }
}

/// How a translation fan-out ended short of full success.
///
/// `CancelledWithPartial` carries the completed segments so the caller can
/// persist them before finalizing the run as cancelled or timed out.
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("translation cancelled before any segment completed")]
    Cancelled,

    #[error("translation cancelled with {} segments completed", .partial.len())]
    CancelledWithPartial { partial: Vec<SegmentUpsert> },

    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Drive one activated translation owner to a terminal state.
pub async fn run_translation(ctx: &ExecutorContext, input: TranslationInput, handle: TaskHandle) {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4().to_string();
    let total_segments = input.snapshot.segments.len();
    let mut checkpoint_started = false;

    let outcome = execute(ctx, &input, &handle, &run_id, &mut checkpoint_started).await;
    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    let (status, phase, reason, translated_count) = match outcome {
        Ok(translated) => {
            let mut snapshot = RuntimeSnapshot::new();
            snapshot.set("translatedSegmentCount", translated.to_string());
            snapshot.set("failedSegmentCount", "0");
            finalize(ctx, &run_id, TaskRunStatus::Succeeded, duration_ms, snapshot).await;
            link_run_usage(&ctx.state, &run_id, input.entry_id, TaskKind::Translation, started_at)
                .await;
            ctx.engine.finish(
                &handle.owner,
                TaskPhase::Completed,
                None,
                Some(&handle.active_token),
            );
            return;
        }
        Err(TranslationError::CancelledWithPartial { partial }) => {
            let translated_count = partial.len();
            // Persist what we have before writing the terminal state.
            ctx.engine.update_phase(
                &handle.owner,
                TaskPhase::Persisting,
                None,
                None,
                Some(&handle.active_token),
            );
            if let Err(err) = ctx
                .state
                .persist_successful_translation(
                    &run_id,
                    &input.slot(),
                    &input.target_language,
                    &partial,
                )
                .await
            {
                warn!("failed to persist partial translation for {run_id}: {err:#}");
            }
            let (phase, reason) = terminal_for_error(&AgentError::Cancelled, &handle);
            let status = run_status_for_phase(phase);
            (status, phase, Some(reason), translated_count)
        }
        Err(TranslationError::Cancelled) => {
            discard(ctx, &run_id, checkpoint_started).await;
            let (phase, reason) = terminal_for_error(&AgentError::Cancelled, &handle);
            (run_status_for_phase(phase), phase, Some(reason), 0)
        }
        Err(TranslationError::Agent(error)) => {
            discard(ctx, &run_id, checkpoint_started).await;
            let (phase, reason) = terminal_for_error(&error, &handle);
            debug!("translation run {run_id} ended {phase}: {error}");
            (run_status_for_phase(phase), phase, Some(reason), 0)
        }
    };

    if checkpoint_started {
        let mut snapshot = RuntimeSnapshot::new();
        snapshot.set("translatedSegmentCount", translated_count.to_string());
        snapshot.set(
            "failedSegmentCount",
            (total_segments - translated_count).to_string(),
        );
        if let Some(reason) = reason {
            snapshot.set("reason", reason.as_str());
        }
        finalize(ctx, &run_id, status, duration_ms, snapshot).await;
        link_run_usage(&ctx.state, &run_id, input.entry_id, TaskKind::Translation, started_at)
            .await;
    }
    ctx.engine
        .finish(&handle.owner, phase, reason, Some(&handle.active_token));
}

fn run_status_for_phase(phase: TaskPhase) -> TaskRunStatus {
    match phase {
        TaskPhase::Cancelled => TaskRunStatus::Cancelled,
        TaskPhase::TimedOut => TaskRunStatus::TimedOut,
        _ => TaskRunStatus::Failed,
    }
}

async fn finalize(
    ctx: &ExecutorContext,
    run_id: &str,
    status: TaskRunStatus,
    duration_ms: i64,
    snapshot: RuntimeSnapshot,
) {
    if let Err(err) = ctx
        .state
        .finalize_task_run(run_id, status, Some(duration_ms), &snapshot)
        .await
    {
        warn!("failed to finalize translation run {run_id}: {err:#}");
    }
}

async fn discard(ctx: &ExecutorContext, run_id: &str, checkpoint_started: bool) {
    if !checkpoint_started {
        return;
    }
    if let Err(err) = ctx.state.discard_running_checkpoint(run_id).await {
        warn!("failed to discard checkpoint for {run_id}: {err:#}");
    }
}

async fn execute(
    ctx: &ExecutorContext,
    input: &TranslationInput,
    handle: &TaskHandle,
    run_id: &str,
    checkpoint_started: &mut bool,
) -> Result<usize, TranslationError> {
    if input.snapshot.segments.is_empty() {
        return Err(TranslationError::Agent(AgentError::Internal(
            "source snapshot has no segments".to_string(),
        )));
    }

    let routes = ctx
        .routes
        .resolve(
            TaskKind::Translation,
            input.primary_model_id.as_deref(),
            input.fallback_model_id.as_deref(),
        )
        .await
        .map_err(TranslationError::from)?;

    let first = &routes[0];
    let mut params = TaskRunCreateParams::new(run_id, input.entry_id, TaskKind::Translation);
    params.provider_profile_id = Some(first.provider.id.clone());
    params.model_profile_id = Some(first.model.id.clone());
    params.target_language = Some(input.target_language.clone());
    params.template_id = Some(prompts::TRANSLATION_TEMPLATE_ID.to_string());
    params.template_version = Some(prompts::TRANSLATION_TEMPLATE_VERSION.to_string());
    ctx.state
        .start_translation_checkpoint(&params, &input.slot(), &input.target_language)
        .await
        .map_err(AgentError::from)?;
    *checkpoint_started = true;

    ctx.engine.update_phase(
        &handle.owner,
        TaskPhase::Generating,
        None,
        None,
        Some(&handle.active_token),
    );

    let segments = translate_segments(ctx, input, handle, &routes, run_id).await?;

    ctx.engine.update_phase(
        &handle.owner,
        TaskPhase::Persisting,
        None,
        None,
        Some(&handle.active_token),
    );
    ctx.state
        .persist_successful_translation(run_id, &input.slot(), &input.target_language, &segments)
        .await
        .map_err(AgentError::from)?;
    Ok(segments.len())
}

/// Shared cursor state of the segment fan-out.
#[derive(Default)]
struct Fanout {
    next_index: usize,
    completed: BTreeMap<usize, SegmentUpsert>,
    last_error: Option<AgentError>,
}

/// Bounded-concurrency fan-out over the segments.
///
/// Workers pull the next unfetched index under the cursor lock, translate
/// it with the per-segment route ladder, checkpoint each success, and stop
/// scheduling as soon as the cancel signal fires. Completed segments come
/// back in source order.
async fn translate_segments(
    ctx: &ExecutorContext,
    input: &TranslationInput,
    handle: &TaskHandle,
    routes: &[ResolvedRoute],
    run_id: &str,
) -> Result<Vec<SegmentUpsert>, TranslationError> {
    let total = input.snapshot.segments.len();
    let degree = ctx.config.concurrency_degree().min(total);
    let fanout = Arc::new(Mutex::new(Fanout::default()));

    let mut workers: JoinSet<()> = JoinSet::new();
    for _ in 0..degree {
        let ctx = ctx.clone();
        let input = input.clone();
        let handle = handle.clone();
        let routes = routes.to_vec();
        let run_id = run_id.to_string();
        let fanout = Arc::clone(&fanout);
        workers.spawn(async move {
            loop {
                if handle.cancel.is_cancelled() {
                    return;
                }
                let index = {
                    let mut state = fanout.lock().await;
                    if state.next_index >= total {
                        return;
                    }
                    let index = state.next_index;
                    state.next_index += 1;
                    index
                };

                match translate_one(&ctx, &input, &handle, &routes, index).await {
                    Ok(segment) => {
                        checkpoint_segment(&ctx, &run_id, &segment).await;
                        let done = {
                            let mut state = fanout.lock().await;
                            state.completed.insert(index, segment);
                            state.completed.len()
                        };
                        ctx.engine.update_phase(
                            &handle.owner,
                            TaskPhase::Generating,
                            None,
                            Some(done as f32 / total as f32),
                            Some(&handle.active_token),
                        );
                    }
                    Err(error) if error.is_cancellation() => return,
                    Err(error) => {
                        debug!("segment {index} failed on all routes: {error}");
                        fanout.lock().await.last_error = Some(error);
                    }
                }
            }
        });
    }
    // Drain outstanding workers; cancellation stops scheduling, not the
    // requests already in flight past their own select.
    while workers.join_next().await.is_some() {}

    let mut state = match Arc::try_unwrap(fanout) {
        Ok(mutex) => mutex.into_inner(),
        Err(_) => {
            return Err(TranslationError::Agent(AgentError::Internal(
                "fan-out state still shared after join".to_string(),
            )));
        }
    };

    if handle.cancel.is_cancelled() {
        if state.completed.is_empty() {
            return Err(TranslationError::Cancelled);
        }
        return Err(TranslationError::CancelledWithPartial {
            partial: state.completed.into_values().collect(),
        });
    }
    if state.completed.len() < total {
        let error = state
            .last_error
            .take()
            .unwrap_or(AgentError::Internal("segment missing without error".to_string()));
        return Err(TranslationError::Agent(error));
    }
    Ok(state.completed.into_values().collect())
}

async fn checkpoint_segment(ctx: &ExecutorContext, run_id: &str, segment: &SegmentUpsert) {
    match ctx
        .state
        .persist_translation_segment_checkpoint(run_id, segment)
        .await
    {
        Ok(true) => {}
        Ok(false) => debug!("checkpoint for {run_id} no longer running; segment kept in memory"),
        Err(err) => warn!("failed to checkpoint segment for {run_id}: {err:#}"),
    }
}

/// Translate one segment with the per-segment route ladder.
///
/// Cancellation propagates immediately; a rate limit aborts the ladder so
/// the caller can surface guidance instead of hammering the fallback; any
/// other error consumes the rung and falls through to the next route.
async fn translate_one(
    ctx: &ExecutorContext,
    input: &TranslationInput,
    handle: &TaskHandle,
    routes: &[ResolvedRoute],
    index: usize,
) -> Result<SegmentUpsert, AgentError> {
    let source = &input.snapshot.segments[index];
    let previous = index
        .checked_sub(1)
        .and_then(|i| input.snapshot.segments.get(i))
        .map(|segment| segment.text.as_str());
    let messages = prompts::translation_messages(
        &language::display_name(&input.target_language),
        &source.text,
        previous,
    );
    let call = ChatCall::new(messages, ctx.config.execution_timeout(TaskKind::Translation));

    let mut last_error = AgentError::NoUsableModelRoute;
    for (route_index, route) in routes.iter().enumerate() {
        let request_started = Utc::now();
        let result = invoke(ctx, handle, route, &call).await;
        record_request_usage(
            &ctx.state,
            TaskKind::Translation,
            input.entry_id,
            route,
            route_index,
            request_status_for(&result, handle),
            result.as_ref().ok(),
            request_started,
        )
        .await;

        match result {
            Ok(completion) => {
                let text = completion.text.trim();
                if text.is_empty() {
                    last_error = AgentError::EmptyCompletion;
                    continue;
                }
                return Ok(SegmentUpsert {
                    source_segment_id: source.id.clone(),
                    order_index: source.order_index,
                    source_text_snapshot: Some(source.text.clone()),
                    translated_text: text.to_string(),
                });
            }
            Err(error) if error.is_cancellation() => return Err(error),
            Err(error) if classify(&error) == FailureReason::RateLimited => return Err(error),
            Err(error) => {
                debug!("segment {index} route {route_index} failed: {error}");
                last_error = error;
            }
        }
    }
    Err(last_error)
}

async fn invoke(
    ctx: &ExecutorContext,
    handle: &TaskHandle,
    route: &ResolvedRoute,
    call: &ChatCall,
) -> Result<Completion, AgentError> {
    if route.model.streaming {
        // Segment deltas stay internal; readers only see whole segments.
        let (delta_tx, _delta_rx) = mpsc::unbounded_channel::<String>();
        tokio::select! {
            _ = handle.cancel.cancelled() => Err(AgentError::Cancelled),
            result = ctx.client.stream(route, call, delta_tx) => result.map_err(AgentError::from),
        }
    } else {
        tokio::select! {
            _ = handle.cancel.cancelled() => Err(AgentError::Cancelled),
            result = ctx.client.complete(route, call) => result.map_err(AgentError::from),
        }
    }
}
