use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// Replayable forensic record of one run.
///
/// A flat string map holding routing decisions, retry counts, segment
/// counts, thresholds, and failure reasons. Backed by a `BTreeMap` so the
/// serialized JSON always has canonical key ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeSnapshot(BTreeMap<String, String>);

impl RuntimeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self(serde_json::from_str(json)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_key_order_is_canonical() {
        let mut snapshot = RuntimeSnapshot::new();
        snapshot.set("reason", "timed_out");
        snapshot.set("failedSegmentCount", "3");
        snapshot.set("translatedSegmentCount", "2");

        let json = snapshot.to_json().ok();
        assert_eq!(
            json.as_deref(),
            Some(
                "{\"failedSegmentCount\":\"3\",\"reason\":\"timed_out\",\"translatedSegmentCount\":\"2\"}"
            )
        );
    }

    #[test]
    fn round_trips_through_json() {
        let mut snapshot = RuntimeSnapshot::new();
        snapshot.set("routeCount", "2");
        let json = snapshot.to_json().ok().unwrap_or_default();
        assert_eq!(RuntimeSnapshot::from_json(&json).ok(), Some(snapshot));
    }
}
