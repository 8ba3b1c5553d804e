use super::ExecutorContext;
use super::link_run_usage;
use super::record_request_usage;
use super::request_status_for;
use super::terminal_for_error;
use crate::cancel::TaskHandle;
use crate::error::AgentError;
use crate::language;
use crate::llm::ChatCall;
use crate::prompts;
use crate::prompts::DetailLevel;
use crate::routes::ResolvedRoute;
use chrono::Utc;
use tidings_api::Completion;
use tidings_protocol::TaskKind;
use tidings_protocol::TaskPhase;
use tidings_state::RuntimeSnapshot;
use tidings_state::SummaryPersistParams;
use tidings_state::TaskRunCreateParams;
use tidings_state::TaskRunStatus;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;
use uuid::Uuid;

/// One summary request as submitted by the UI.
#[derive(Debug, Clone)]
pub struct SummaryInput {
    pub entry_id: i64,
    pub target_language: String,
    pub detail_level: DetailLevel,
    pub source_text: String,
    pub primary_model_id: Option<String>,
    pub fallback_model_id: Option<String>,
}

/// Drive one activated summary owner to a terminal state.
///
/// Owns the full per-run error tier: whatever happens, the run row is
/// finalized, usage events are linked, and the engine sees exactly one
/// `finish` under this activation's token.
pub async fn run_summary(ctx: &ExecutorContext, input: SummaryInput, handle: TaskHandle) {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4().to_string();
    let mut run_created = false;

    let outcome = execute(ctx, &input, &handle, &run_id, &mut run_created).await;
    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match outcome {
        Ok(route_count) => {
            let mut snapshot = RuntimeSnapshot::new();
            snapshot.set("routeCount", route_count.to_string());
            if let Err(err) = ctx
                .state
                .finalize_task_run(&run_id, TaskRunStatus::Succeeded, Some(duration_ms), &snapshot)
                .await
            {
                warn!("failed to finalize summary run {run_id}: {err:#}");
            }
            link_run_usage(&ctx.state, &run_id, input.entry_id, TaskKind::Summary, started_at)
                .await;
            ctx.engine.finish(
                &handle.owner,
                TaskPhase::Completed,
                None,
                Some(&handle.active_token),
            );
        }
        Err(error) => {
            let (phase, reason) = terminal_for_error(&error, &handle);
            debug!("summary run {run_id} ended {phase}: {error}");
            if run_created {
                let mut snapshot = RuntimeSnapshot::new();
                snapshot.set("reason", reason.as_str());
                snapshot.set("error", error.to_string());
                let status = match phase {
                    TaskPhase::Cancelled => TaskRunStatus::Cancelled,
                    TaskPhase::TimedOut => TaskRunStatus::TimedOut,
                    _ => TaskRunStatus::Failed,
                };
                if let Err(err) = ctx
                    .state
                    .finalize_task_run(&run_id, status, Some(duration_ms), &snapshot)
                    .await
                {
                    warn!("failed to finalize summary run {run_id}: {err:#}");
                }
                link_run_usage(&ctx.state, &run_id, input.entry_id, TaskKind::Summary, started_at)
                    .await;
            }
            ctx.engine.finish(
                &handle.owner,
                phase,
                Some(reason),
                Some(&handle.active_token),
            );
        }
    }
}

async fn execute(
    ctx: &ExecutorContext,
    input: &SummaryInput,
    handle: &TaskHandle,
    run_id: &str,
    run_created: &mut bool,
) -> Result<usize, AgentError> {
    let routes = ctx
        .routes
        .resolve(
            TaskKind::Summary,
            input.primary_model_id.as_deref(),
            input.fallback_model_id.as_deref(),
        )
        .await?;

    let first = &routes[0];
    let mut params = TaskRunCreateParams::new(run_id, input.entry_id, TaskKind::Summary);
    params.provider_profile_id = Some(first.provider.id.clone());
    params.model_profile_id = Some(first.model.id.clone());
    params.target_language = Some(input.target_language.clone());
    params.template_id = Some(prompts::SUMMARY_TEMPLATE_ID.to_string());
    params.template_version = Some(prompts::SUMMARY_TEMPLATE_VERSION.to_string());
    ctx.state.create_task_run(&params).await?;
    *run_created = true;

    let messages = prompts::summary_messages(
        &language::display_name(&input.target_language),
        input.detail_level,
        &input.source_text,
    );
    let call = ChatCall::new(messages, ctx.config.execution_timeout(TaskKind::Summary));

    ctx.engine.update_phase(
        &handle.owner,
        TaskPhase::Generating,
        None,
        None,
        Some(&handle.active_token),
    );

    let mut last_error = AgentError::NoUsableModelRoute;
    for (route_index, route) in routes.iter().enumerate() {
        match attempt(ctx, input, handle, route, route_index, &call).await {
            Ok(text) => {
                ctx.engine.update_phase(
                    &handle.owner,
                    TaskPhase::Persisting,
                    None,
                    None,
                    Some(&handle.active_token),
                );
                ctx.state
                    .persist_summary_result(&SummaryPersistParams {
                        task_run_id: run_id.to_string(),
                        entry_id: input.entry_id,
                        target_language: input.target_language.clone(),
                        detail_level: input.detail_level.as_str().to_string(),
                        output_language: input.target_language.clone(),
                        text,
                    })
                    .await?;
                return Ok(routes.len());
            }
            Err(error) if error.is_cancellation() => return Err(error),
            Err(error) => {
                debug!(
                    "summary attempt on route {route_index} failed, trying next: {error}"
                );
                last_error = error;
            }
        }
    }
    Err(last_error)
}

/// One request against one route; always records a usage event.
async fn attempt(
    ctx: &ExecutorContext,
    input: &SummaryInput,
    handle: &TaskHandle,
    route: &ResolvedRoute,
    route_index: usize,
    call: &ChatCall,
) -> Result<String, AgentError> {
    let request_started = Utc::now();
    let result = invoke(ctx, handle, route, call).await;
    record_request_usage(
        &ctx.state,
        TaskKind::Summary,
        input.entry_id,
        route,
        route_index,
        request_status_for(&result, handle),
        result.as_ref().ok(),
        request_started,
    )
    .await;

    let completion = result?;
    let text = completion.text.trim();
    if text.is_empty() {
        return Err(AgentError::EmptyCompletion);
    }
    Ok(text.to_string())
}

async fn invoke(
    ctx: &ExecutorContext,
    handle: &TaskHandle,
    route: &ResolvedRoute,
    call: &ChatCall,
) -> Result<Completion, AgentError> {
    if route.model.streaming {
        let (delta_tx, mut delta_rx) = mpsc::unbounded_channel::<String>();
        let forwarder = {
            let ctx = ctx.clone();
            let owner = handle.owner.clone();
            tokio::spawn(async move {
                while let Some(delta) = delta_rx.recv().await {
                    ctx.send_token(&owner, delta);
                }
            })
        };
        let result = tokio::select! {
            _ = handle.cancel.cancelled() => Err(AgentError::Cancelled),
            result = ctx.client.stream(route, call, delta_tx) => result.map_err(AgentError::from),
        };
        // Both arms drop the delta sender, so the forwarder drains and ends.
        let _ = forwarder.await;
        result
    } else {
        tokio::select! {
            _ = handle.cancel.cancelled() => Err(AgentError::Cancelled),
            result = ctx.client.complete(route, call) => result.map_err(AgentError::from),
        }
    }
}
