use crate::error::ParsePrimitiveError;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Kind of agent work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Summary,
    Translation,
    /// Reserved for entry auto-tagging; no executor ships for it yet.
    Tagging,
}

impl TaskKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            TaskKind::Summary => "summary",
            TaskKind::Translation => "translation",
            TaskKind::Tagging => "tagging",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ParsePrimitiveError> {
        match value {
            "summary" => Ok(Self::Summary),
            "translation" => Ok(Self::Translation),
            "tagging" => Ok(Self::Tagging),
            other => Err(ParsePrimitiveError::new("task kind", other)),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling identity of a unit of agent work.
///
/// Equal owners collapse: submitting the same owner twice while it is active
/// or waiting is a no-op at the scheduler. The slot key matches the durable
/// result slot the task writes to, so two requests that would produce the
/// same stored row share one owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskOwner {
    pub kind: TaskKind,
    pub entry_id: i64,
    pub slot_key: String,
}

impl TaskOwner {
    pub fn new(kind: TaskKind, entry_id: i64, slot_key: impl Into<String>) -> Self {
        Self {
            kind,
            entry_id,
            slot_key: slot_key.into(),
        }
    }

    /// Owner of a summary task; slot key is `"<lang>|<detail>"`.
    pub fn summary(entry_id: i64, target_language: &str, detail_level: &str) -> Self {
        Self::new(
            TaskKind::Summary,
            entry_id,
            format!("{target_language}|{detail_level}"),
        )
    }

    /// Owner of a translation task; slot key is the normalized language code.
    pub fn translation(entry_id: i64, target_language: &str) -> Self {
        Self::new(
            TaskKind::Translation,
            entry_id,
            target_language.trim().to_ascii_lowercase(),
        )
    }
}

impl fmt::Display for TaskOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.entry_id, self.slot_key)
    }
}

/// Opaque task identifier assigned by the submitter.
///
/// Stable across promotion out of the waiting queue; carried on every
/// emitted event and stored next to persisted rows for cross-correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-activation nonce that fences stale callbacks.
///
/// The engine mints a fresh token every time an owner becomes active. Phase
/// updates and terminal writes carry the token they were issued under and
/// are ignored when it no longer matches the store, so a late callback from
/// a previous activation cannot corrupt a newer run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveToken(String);

impl ActiveToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActiveToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
