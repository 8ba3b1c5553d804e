use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tidings_protocol::QueuePolicy;
use tidings_protocol::TaskKind;

const DEFAULT_CONCURRENT_LIMIT: usize = 1;
const DEFAULT_WAITING_CAPACITY: usize = 2;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_TRANSLATION_TIMEOUT_SECS: u64 = 300;
const DEFAULT_TRANSLATION_CONCURRENCY: usize = 3;
const MIN_TRANSLATION_CONCURRENCY: usize = 1;
const MAX_TRANSLATION_CONCURRENCY: usize = 5;

/// Per-kind overrides; unset fields fall back to the built-in policy table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KindConfig {
    pub concurrent_limit: Option<usize>,
    pub waiting_capacity: Option<usize>,
    pub execution_timeout_secs: Option<u64>,
}

/// Tunables of the agent runtime, loadable from the app's TOML config.
///
/// Every field is optional; an absent or partial `[agent]` section still
/// yields a working runtime.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub summary: KindConfig,
    pub translation: KindConfig,
    pub tagging: KindConfig,
    /// Parallel segment workers for translation, clamped to `[1, 5]`.
    pub translation_concurrency: Option<usize>,
    /// Cap on stored result rows per family before eviction.
    pub result_cap: Option<usize>,
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    pub fn kind(&self, kind: TaskKind) -> &KindConfig {
        match kind {
            TaskKind::Summary => &self.summary,
            TaskKind::Translation => &self.translation,
            TaskKind::Tagging => &self.tagging,
        }
    }

    pub fn queue_policy(&self, kind: TaskKind) -> QueuePolicy {
        let config = self.kind(kind);
        QueuePolicy::new(
            config.concurrent_limit.unwrap_or(DEFAULT_CONCURRENT_LIMIT),
            config.waiting_capacity.unwrap_or(DEFAULT_WAITING_CAPACITY),
        )
    }

    /// Execution-timeout budget enforced by the watchdog.
    pub fn execution_timeout(&self, kind: TaskKind) -> Duration {
        let default = match kind {
            TaskKind::Translation => DEFAULT_TRANSLATION_TIMEOUT_SECS,
            TaskKind::Summary | TaskKind::Tagging => DEFAULT_TIMEOUT_SECS,
        };
        Duration::from_secs(self.kind(kind).execution_timeout_secs.unwrap_or(default))
    }

    pub fn concurrency_degree(&self) -> usize {
        self.translation_concurrency
            .unwrap_or(DEFAULT_TRANSLATION_CONCURRENCY)
            .clamp(MIN_TRANSLATION_CONCURRENCY, MAX_TRANSLATION_CONCURRENCY)
    }

    pub fn result_cap(&self) -> usize {
        self.result_cap.unwrap_or(tidings_state::DEFAULT_RESULT_CAP)
    }
}
