#![allow(clippy::unwrap_used)]
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::TimeZone;
use chrono::Utc;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;
use tidings_api::ApiError;
use tidings_api::Completion;
use tidings_api::TokenUsage;
use tidings_core::AgentRuntime;
use tidings_core::ChatCall;
use tidings_core::CompletionClient;
use tidings_core::ExecutorContext;
use tidings_core::ModelProfile;
use tidings_core::ProviderProfile;
use tidings_core::ResolvedRoute;
use tidings_core::RouteResolver;
use tidings_core::RuntimeConfig;
use tidings_core::TaskController;
use tidings_core::TaskHandle;
use tidings_core::TokenEvent;
use tidings_keyring_store::MemorySecretStore;
use tidings_keyring_store::SecretRef;
use tidings_keyring_store::SecretStore;
use tidings_protocol::QueuePolicy;
use tidings_protocol::RequestSource;
use tidings_protocol::TaskId;
use tidings_protocol::TaskKind;
use tidings_protocol::TaskOwner;
use tidings_protocol::TaskSpec;
use tidings_protocol::VisibilityPolicy;
use tidings_state::StateRuntime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;

pub fn provider_profile(id: &str) -> ProviderProfile {
    ProviderProfile {
        id: id.to_string(),
        name: format!("provider {id}"),
        base_url: "https://llm.test".to_string(),
        enabled: true,
        secret_ref: SecretRef::provider_api_key(id),
    }
}

pub fn model_profile(id: &str, provider_id: &str, streaming: bool) -> ModelProfile {
    ModelProfile {
        id: id.to_string(),
        provider_id: provider_id.to_string(),
        model_name: format!("model-{id}"),
        enabled: true,
        archived: false,
        is_default: false,
        streaming,
        supports: vec![TaskKind::Summary, TaskKind::Translation],
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    }
}

/// Completion client scripted through markers in the prompt text.
///
/// - a model whose name contains `bad` fails with HTTP 500
/// - `[hang]` parks until the caller's cancel wins the select
/// - `[fail:429]` fails with HTTP 429
/// - `[empty]` returns a blank completion
/// - `[ok:X]` returns `X`
///
/// `cancel_after` fires a user abort once that many requests succeeded.
pub struct ScriptedClient {
    successes: Mutex<usize>,
    cancel_after: Option<(usize, TaskController)>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            successes: Mutex::new(0),
            cancel_after: None,
        }
    }

    pub fn cancel_user_after(successes: usize, controller: TaskController) -> Self {
        Self {
            successes: Mutex::new(0),
            cancel_after: Some((successes, controller)),
        }
    }

    async fn respond(&self, route: &ResolvedRoute, call: &ChatCall) -> Result<String, ApiError> {
        if route.model.model_name.contains("bad") {
            return Err(ApiError::Http {
                status: http::StatusCode::INTERNAL_SERVER_ERROR,
                message: "scripted failure".to_string(),
                url: None,
            });
        }
        let full = call
            .messages
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        // Only the passage under translation decides the behavior; the
        // untranslated context rides along and must not trigger markers.
        let content = full
            .rsplit_once("Translate:\n")
            .map(|(_, target)| target.to_string())
            .unwrap_or(full);
        if content.contains("[hang]") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if content.contains("[fail:429]") {
            return Err(ApiError::Http {
                status: http::StatusCode::TOO_MANY_REQUESTS,
                message: "scripted rate limit".to_string(),
                url: None,
            });
        }
        if content.contains("[empty]") {
            return Ok(String::new());
        }
        let text = content
            .split_once("[ok:")
            .and_then(|(_, rest)| rest.split_once(']'))
            .map(|(text, _)| text.to_string())
            .unwrap_or_else(|| format!("echo {content}"));

        let mut successes = self.successes.lock().unwrap();
        *successes += 1;
        if let Some((threshold, controller)) = &self.cancel_after
            && *successes == *threshold
        {
            controller.cancel_user();
        }
        Ok(text)
    }

    fn completion(text: String) -> Completion {
        Completion {
            text,
            usage: Some(TokenUsage {
                prompt_tokens: Some(20),
                completion_tokens: Some(5),
                total_tokens: Some(25),
            }),
            resolved_endpoint: Some("https://llm.test/v1/chat/completions".to_string()),
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        route: &ResolvedRoute,
        call: &ChatCall,
    ) -> Result<Completion, ApiError> {
        let text = self.respond(route, call).await?;
        Ok(Self::completion(text))
    }

    async fn stream(
        &self,
        route: &ResolvedRoute,
        call: &ChatCall,
        on_delta: UnboundedSender<String>,
    ) -> Result<Completion, ApiError> {
        let text = self.respond(route, call).await?;
        let midpoint = text.len() / 2;
        let (head, tail) = text.split_at(midpoint);
        if !head.is_empty() {
            let _ = on_delta.send(head.to_string());
        }
        if !tail.is_empty() {
            let _ = on_delta.send(tail.to_string());
        }
        Ok(Self::completion(text))
    }
}

pub struct TestHarness {
    pub engine: Arc<AgentRuntime>,
    pub state: Arc<StateRuntime>,
    pub ctx: ExecutorContext,
    pub controller: TaskController,
    pub token_rx: mpsc::UnboundedReceiver<TokenEvent>,
    _dir: TempDir,
}

pub async fn harness(
    client: Arc<dyn CompletionClient>,
    controller: TaskController,
    providers: Vec<ProviderProfile>,
    models: Vec<ModelProfile>,
) -> TestHarness {
    let dir = TempDir::new().unwrap();
    let state = StateRuntime::init(dir.path().to_path_buf()).await.unwrap();
    let secrets = Arc::new(MemorySecretStore::new());
    for provider in &providers {
        secrets.save(&provider.secret_ref, "sk-test").unwrap();
    }
    let engine = Arc::new(AgentRuntime::new());
    let (token_tx, token_rx) = mpsc::unbounded_channel();
    let ctx = ExecutorContext {
        engine: Arc::clone(&engine),
        state: Arc::clone(&state),
        routes: Arc::new(RouteResolver::new(providers, models, secrets)),
        client,
        config: Arc::new(RuntimeConfig::default()),
        tokens: Some(token_tx),
    };
    TestHarness {
        engine,
        state,
        ctx,
        controller,
        token_rx,
        _dir: dir,
    }
}

/// Submit an owner and return the executor handle for its activation.
pub fn activate(harness: &TestHarness, owner: TaskOwner) -> TaskHandle {
    let spec = TaskSpec {
        owner: owner.clone(),
        task_id: TaskId::new(),
        source: RequestSource::Manual,
        queue: QueuePolicy::new(1, 2),
        visibility: VisibilityPolicy::SelectedEntryOnly,
    };
    let decision = harness.engine.submit(spec.clone());
    assert!(matches!(decision, tidings_protocol::Decision::StartNow));
    let token = harness.engine.active_token(&owner).unwrap();
    harness.controller.handle(owner, spec.task_id, token)
}
