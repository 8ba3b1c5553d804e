//! Route resolution: which `(provider, model, secret)` tuples a run may use.
//!
//! Route selection is data, not inheritance: profiles come in as plain
//! records, the resolver orders at most two candidates, and each candidate
//! leaves with its secret already read from the credential store.

use crate::error::AgentError;
use chrono::DateTime;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tidings_keyring_store::SecretRef;
use tidings_keyring_store::SecretStore;
use tidings_protocol::TaskKind;
use tracing::warn;

/// User-configured provider deployment.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
    pub secret_ref: SecretRef,
}

/// User-configured model on one provider.
#[derive(Debug, Clone)]
pub struct ModelProfile {
    pub id: String,
    pub provider_id: String,
    pub model_name: String,
    pub enabled: bool,
    pub archived: bool,
    pub is_default: bool,
    pub streaming: bool,
    pub supports: Vec<TaskKind>,
    pub created_at: DateTime<Utc>,
}

impl ModelProfile {
    fn supports(&self, kind: TaskKind) -> bool {
        self.supports.contains(&kind)
    }
}

/// One usable `(provider, model, secret)` tuple.
#[derive(Clone)]
pub struct ResolvedRoute {
    pub provider: ProviderProfile,
    pub model: ModelProfile,
    pub api_key: String,
}

impl fmt::Debug for ResolvedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedRoute")
            .field("provider", &self.provider.id)
            .field("model", &self.model.id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Builds the ordered candidate list an executor retries across.
pub struct RouteResolver {
    providers: Vec<ProviderProfile>,
    models: Vec<ModelProfile>,
    secrets: Arc<dyn SecretStore>,
}

impl RouteResolver {
    pub fn new(
        providers: Vec<ProviderProfile>,
        models: Vec<ModelProfile>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            providers,
            models,
            secrets,
        }
    }

    /// Resolve up to two routes for a task kind.
    ///
    /// Order: the requested primary, then the requested fallback; slots
    /// left unspecified fill from the default model, then the newest
    /// usable one. Candidates without a readable secret or with a
    /// malformed base URL are skipped. An empty result is
    /// `NoUsableModelRoute`.
    pub async fn resolve(
        &self,
        kind: TaskKind,
        primary_model_id: Option<&str>,
        fallback_model_id: Option<&str>,
    ) -> Result<Vec<ResolvedRoute>, AgentError> {
        let usable: Vec<&ModelProfile> = self
            .models
            .iter()
            .filter(|model| {
                model.enabled
                    && !model.archived
                    && model.supports(kind)
                    && self.provider(&model.provider_id).is_some_and(|p| p.enabled)
            })
            .collect();

        let mut candidates: Vec<&ModelProfile> = Vec::new();
        for requested in [primary_model_id, fallback_model_id].into_iter().flatten() {
            if let Some(model) = usable.iter().find(|m| m.id == requested).copied()
                && !candidates.iter().any(|c| c.id == model.id)
            {
                candidates.push(model);
            }
        }
        if candidates.len() < 2 {
            let mut fill: Vec<&ModelProfile> = usable.clone();
            fill.sort_by(|a, b| {
                b.is_default
                    .cmp(&a.is_default)
                    .then(b.created_at.cmp(&a.created_at))
            });
            for model in fill {
                if candidates.len() >= 2 {
                    break;
                }
                if !candidates.iter().any(|c| c.id == model.id) {
                    candidates.push(model);
                }
            }
        }

        let mut routes = Vec::new();
        for model in candidates {
            let Some(provider) = self.provider(&model.provider_id) else {
                continue;
            };
            validate_base_url(&provider.base_url)?;
            match self.read_secret(&provider.secret_ref).await? {
                Some(api_key) => routes.push(ResolvedRoute {
                    provider: provider.clone(),
                    model: model.clone(),
                    api_key,
                }),
                None => {
                    warn!(
                        "skipping model {}: no secret under {}",
                        model.id, provider.secret_ref
                    );
                }
            }
        }

        if routes.is_empty() {
            return Err(AgentError::NoUsableModelRoute);
        }
        Ok(routes)
    }

    fn provider(&self, provider_id: &str) -> Option<&ProviderProfile> {
        self.providers.iter().find(|p| p.id == provider_id)
    }

    async fn read_secret(&self, reference: &SecretRef) -> Result<Option<String>, AgentError> {
        let secrets = Arc::clone(&self.secrets);
        let reference = reference.clone();
        let secret = tokio::task::spawn_blocking(move || secrets.read(&reference))
            .await
            .map_err(|err| AgentError::Internal(format!("secret read task failed: {err}")))??;
        Ok(secret)
    }
}

fn validate_base_url(base_url: &str) -> Result<(), AgentError> {
    let parsed = url::Url::parse(base_url).map_err(|err| AgentError::InvalidBaseUrl {
        url: base_url.to_string(),
        message: err.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AgentError::InvalidBaseUrl {
            url: base_url.to_string(),
            message: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tidings_keyring_store::MemorySecretStore;

    fn provider(id: &str) -> ProviderProfile {
        ProviderProfile {
            id: id.to_string(),
            name: format!("provider {id}"),
            base_url: "https://llm.test".to_string(),
            enabled: true,
            secret_ref: SecretRef::provider_api_key(id),
        }
    }

    fn model(id: &str, provider_id: &str, created_year: i32) -> ModelProfile {
        ModelProfile {
            id: id.to_string(),
            provider_id: provider_id.to_string(),
            model_name: format!("model-{id}"),
            enabled: true,
            archived: false,
            is_default: false,
            streaming: true,
            supports: vec![TaskKind::Summary, TaskKind::Translation],
            created_at: Utc.with_ymd_and_hms(created_year, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn secrets_for(providers: &[&ProviderProfile]) -> Arc<MemorySecretStore> {
        let store = Arc::new(MemorySecretStore::new());
        for provider in providers {
            store.save(&provider.secret_ref, "sk-test").unwrap();
        }
        store
    }

    #[tokio::test]
    async fn requested_primary_and_fallback_are_honored_in_order() {
        let p = provider("p1");
        let secrets = secrets_for(&[&p]);
        let resolver = RouteResolver::new(
            vec![p],
            vec![model("a", "p1", 2023), model("b", "p1", 2024)],
            secrets,
        );

        let routes = resolver
            .resolve(TaskKind::Translation, Some("b"), Some("a"))
            .await
            .unwrap();
        assert_eq!(
            routes.iter().map(|r| r.model.id.as_str()).collect::<Vec<_>>(),
            vec!["b", "a"]
        );
    }

    #[tokio::test]
    async fn unspecified_slots_fill_with_default_then_newest() {
        let p = provider("p1");
        let secrets = secrets_for(&[&p]);
        let mut default_model = model("default", "p1", 2022);
        default_model.is_default = true;
        let resolver = RouteResolver::new(
            vec![p],
            vec![model("old", "p1", 2021), default_model, model("new", "p1", 2025)],
            secrets,
        );

        let routes = resolver
            .resolve(TaskKind::Summary, None, None)
            .await
            .unwrap();
        assert_eq!(
            routes.iter().map(|r| r.model.id.as_str()).collect::<Vec<_>>(),
            vec!["default", "new"]
        );
    }

    #[tokio::test]
    async fn disabled_archived_and_unsupported_models_are_excluded() {
        let p = provider("p1");
        let secrets = secrets_for(&[&p]);
        let mut disabled = model("disabled", "p1", 2024);
        disabled.enabled = false;
        let mut archived = model("archived", "p1", 2024);
        archived.archived = true;
        let mut wrong_kind = model("summary-only", "p1", 2024);
        wrong_kind.supports = vec![TaskKind::Summary];
        let resolver = RouteResolver::new(
            vec![p],
            vec![disabled, archived, wrong_kind, model("good", "p1", 2020)],
            secrets,
        );

        let routes = resolver
            .resolve(TaskKind::Translation, None, None)
            .await
            .unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].model.id, "good");
    }

    #[tokio::test]
    async fn empty_candidate_list_is_no_usable_model_route() {
        let resolver = RouteResolver::new(vec![], vec![], Arc::new(MemorySecretStore::new()));
        let err = resolver
            .resolve(TaskKind::Summary, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NoUsableModelRoute));
    }

    #[tokio::test]
    async fn missing_secret_skips_the_candidate() {
        let p = provider("p1");
        let resolver = RouteResolver::new(
            vec![p],
            vec![model("a", "p1", 2024)],
            Arc::new(MemorySecretStore::new()),
        );
        let err = resolver
            .resolve(TaskKind::Summary, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NoUsableModelRoute));
    }

    #[tokio::test]
    async fn malformed_base_url_is_invalid_configuration() {
        let mut p = provider("p1");
        p.base_url = "not a url".to_string();
        let secrets = secrets_for(&[&p]);
        let resolver = RouteResolver::new(vec![p], vec![model("a", "p1", 2024)], secrets);

        let err = resolver
            .resolve(TaskKind::Summary, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidBaseUrl { .. }));
    }
}
