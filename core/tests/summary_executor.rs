#![allow(clippy::unwrap_used)]

mod common;

use common::ScriptedClient;
use common::activate;
use common::harness;
use common::model_profile;
use common::provider_profile;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tidings_core::TaskController;
use tidings_core::executors::SummaryInput;
use tidings_core::executors::run_summary;
use tidings_core::prompts::DetailLevel;
use tidings_protocol::FailureReason;
use tidings_protocol::RuntimeEvent;
use tidings_protocol::TaskOwner;
use tidings_protocol::TaskPhase;
use tidings_state::RequestStatus;
use tidings_state::TaskRunStatus;

fn input(source_text: &str) -> SummaryInput {
    SummaryInput {
        entry_id: 10,
        target_language: "en".to_string(),
        detail_level: DetailLevel::Medium,
        source_text: source_text.to_string(),
        primary_model_id: None,
        fallback_model_id: None,
    }
}

#[tokio::test]
async fn streamed_summary_persists_under_its_slot() {
    let controller = TaskController::new();
    let mut h = harness(
        Arc::new(ScriptedClient::new()),
        controller,
        vec![provider_profile("p1")],
        vec![model_profile("m1", "p1", true)],
    )
    .await;
    let owner = TaskOwner::summary(10, "en", "medium");
    let handle = activate(&h, owner.clone());
    let mut events = h.engine.subscribe();

    run_summary(&h.ctx, input("[ok:a tidy summary]"), handle).await;

    let result = h
        .state
        .get_summary_result(10, "en", "medium")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.text, "a tidy summary");
    assert_eq!(result.output_language, "en");

    let run = h.state.get_task_run(&result.task_run_id).await.unwrap().unwrap();
    assert_eq!(run.status, TaskRunStatus::Succeeded);
    assert!(run.duration_ms.is_some());

    // Streamed deltas reached the token channel in order.
    let mut streamed = String::new();
    while let Ok(event) = h.token_rx.try_recv() {
        assert_eq!(event.owner, owner);
        streamed.push_str(&event.delta);
    }
    assert_eq!(streamed, "a tidy summary");

    // Usage event recorded and linked to the run.
    let usage = h.state.list_usage_events_for_entry(10).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].request_status, RequestStatus::Succeeded);
    assert_eq!(usage[0].prompt_tokens, Some(20));
    assert_eq!(usage[0].task_run_id.as_deref(), Some(run.id.as_str()));
    assert_eq!(usage[0].request_phase, "primary");

    // The engine saw phases then a completed terminal.
    let mut phases = Vec::new();
    let mut terminal = None;
    while let Ok(event) = events.try_recv() {
        match event {
            RuntimeEvent::PhaseChanged { phase, .. } => phases.push(phase),
            RuntimeEvent::Terminal { phase, reason, .. } => terminal = Some((phase, reason)),
            _ => {}
        }
    }
    assert_eq!(phases, vec![TaskPhase::Generating, TaskPhase::Persisting]);
    assert_eq!(terminal, Some((TaskPhase::Completed, None)));
}

#[tokio::test]
async fn primary_failure_falls_through_to_the_fallback_route() {
    let controller = TaskController::new();
    let h = harness(
        Arc::new(ScriptedClient::new()),
        controller,
        vec![provider_profile("p1")],
        vec![
            model_profile("bad", "p1", false),
            model_profile("good", "p1", false),
        ],
    )
    .await;
    let owner = TaskOwner::summary(10, "en", "medium");
    let handle = activate(&h, owner.clone());

    let mut request = input("[ok:recovered]");
    request.primary_model_id = Some("bad".to_string());
    request.fallback_model_id = Some("good".to_string());
    run_summary(&h.ctx, request, handle).await;

    let result = h
        .state
        .get_summary_result(10, "en", "medium")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.text, "recovered");

    let usage = h.state.list_usage_events_for_entry(10).await.unwrap();
    assert_eq!(usage.len(), 2);
    assert_eq!(usage[0].request_phase, "primary");
    assert_eq!(usage[0].request_status, RequestStatus::Failed);
    assert_eq!(usage[1].request_phase, "fallback");
    assert_eq!(usage[1].request_status, RequestStatus::Succeeded);
}

#[tokio::test]
async fn watchdog_timeout_is_distinct_from_user_abort() {
    let controller = TaskController::new();
    let h = harness(
        Arc::new(ScriptedClient::new()),
        controller,
        vec![provider_profile("p1")],
        vec![model_profile("m1", "p1", false)],
    )
    .await;
    let owner = TaskOwner::summary(10, "en", "medium");
    let handle = activate(&h, owner.clone());
    let mut events = h.engine.subscribe();

    let _watchdog = h.controller.spawn_watchdog(Duration::from_millis(20));
    run_summary(&h.ctx, input("[hang]"), handle).await;

    // The run row records the timeout, not a user abort.
    let usage = h.state.list_usage_events_for_entry(10).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].request_status, RequestStatus::TimedOut);
    let run_id = usage[0].task_run_id.clone().unwrap();
    let run = h.state.get_task_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, TaskRunStatus::TimedOut);
    let snapshot = run.runtime_parameter_snapshot.unwrap();
    assert_eq!(snapshot.get("reason"), Some("timed_out"));

    let mut terminal = None;
    while let Ok(event) = events.try_recv() {
        if let RuntimeEvent::Terminal { phase, reason, .. } = event {
            terminal = Some((phase, reason));
        }
    }
    assert_eq!(
        terminal,
        Some((TaskPhase::TimedOut, Some(FailureReason::TimedOut)))
    );
}

#[tokio::test]
async fn user_abort_finishes_cancelled() {
    let controller = TaskController::new();
    let h = harness(
        Arc::new(ScriptedClient::new()),
        controller.clone(),
        vec![provider_profile("p1")],
        vec![model_profile("m1", "p1", false)],
    )
    .await;
    let owner = TaskOwner::summary(10, "en", "medium");
    let handle = activate(&h, owner.clone());
    let mut events = h.engine.subscribe();

    let runner = {
        let ctx = h.ctx.clone();
        tokio::spawn(async move { run_summary(&ctx, input("[hang]"), handle).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    controller.cancel_user();
    runner.await.unwrap();

    let usage = h.state.list_usage_events_for_entry(10).await.unwrap();
    assert_eq!(usage[0].request_status, RequestStatus::Cancelled);
    let run_id = usage[0].task_run_id.clone().unwrap();
    let run = h.state.get_task_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, TaskRunStatus::Cancelled);

    let mut terminal = None;
    while let Ok(event) = events.try_recv() {
        if let RuntimeEvent::Terminal { phase, reason, .. } = event {
            terminal = Some((phase, reason));
        }
    }
    assert_eq!(
        terminal,
        Some((TaskPhase::Cancelled, Some(FailureReason::Cancelled)))
    );
}

#[tokio::test]
async fn no_usable_route_fails_without_a_run_row() {
    let controller = TaskController::new();
    let h = harness(
        Arc::new(ScriptedClient::new()),
        controller,
        vec![],
        vec![],
    )
    .await;
    let owner = TaskOwner::summary(10, "en", "medium");
    let handle = activate(&h, owner.clone());
    let mut events = h.engine.subscribe();

    run_summary(&h.ctx, input("[ok:unused]"), handle).await;

    assert!(h.state.get_summary_result(10, "en", "medium").await.unwrap().is_none());
    assert!(h.state.list_usage_events_for_entry(10).await.unwrap().is_empty());

    let mut terminal = None;
    while let Ok(event) = events.try_recv() {
        if let RuntimeEvent::Terminal { phase, reason, .. } = event {
            terminal = Some((phase, reason));
        }
    }
    assert_eq!(
        terminal,
        Some((
            TaskPhase::Failed,
            Some(FailureReason::InvalidConfiguration)
        ))
    );
}
