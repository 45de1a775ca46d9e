//! Whole-registry snapshot format.
//!
//! A snapshot is a plain owned value: nothing in it points back into a live
//! registry, so it can be serialized, edited or kept around across an
//! in-process restart without affecting anyone else.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entry::{FragmentCache, HistoryEntry, RestMutationRecord, RestQueryRecord};
use super::SessionId;
use crate::error::VibeStateError;
use crate::Result;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized form of a single session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
    #[serde(default)]
    pub prev_html: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub rest_mutations: Vec<RestMutationRecord>,
    #[serde(default)]
    pub rest_queries: Vec<RestQueryRecord>,
    #[serde(default)]
    pub component_cache: FragmentCache,
    #[serde(default)]
    pub style_cache: FragmentCache,
    pub next_component_id: u64,
    pub next_style_id: u64,
}

/// Serialized form of an entire registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub sessions: Vec<SessionSnapshot>,
}

impl Snapshot {
    pub fn new(exported_at: DateTime<Utc>, sessions: Vec<SessionSnapshot>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            exported_at,
            sessions,
        }
    }

    /// Parse a snapshot from JSON and validate it.
    pub fn from_json(json: &str, journal_capacity: usize) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        snapshot.validate(journal_capacity)?;
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check structural invariants.
    ///
    /// Rejects unknown versions, empty or duplicate session ids, zero
    /// counters, over-full REST journals and touch times before creation.
    pub fn validate(&self, journal_capacity: usize) -> Result<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(VibeStateError::UnsupportedSnapshotVersion(self.version));
        }

        let mut seen = HashSet::with_capacity(self.sessions.len());
        for (index, session) in self.sessions.iter().enumerate() {
            let id = session.id.as_str();
            if id.trim().is_empty() {
                return Err(invalid(format!("session #{} has an empty id", index)));
            }
            if !seen.insert(id) {
                return Err(invalid(format!("duplicate session id {}", id)));
            }
            if session.next_component_id == 0 || session.next_style_id == 0 {
                return Err(invalid(format!("session {} has a zero id counter", id)));
            }
            if session.rest_mutations.len() > journal_capacity
                || session.rest_queries.len() > journal_capacity
            {
                return Err(invalid(format!(
                    "session {} exceeds the REST journal capacity of {}",
                    id, journal_capacity
                )));
            }
            if session.last_touched_at < session.created_at {
                return Err(invalid(format!("session {} was touched before it was created", id)));
            }
            if let Some(entry) = session.history.iter().find(|entry| entry.id.trim().is_empty()) {
                return Err(invalid(format!(
                    "session {} has a history entry without an id (created {})",
                    id, entry.created_at
                )));
            }
        }

        Ok(())
    }
}

fn invalid(message: String) -> VibeStateError {
    VibeStateError::InvalidSnapshot(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> SessionSnapshot {
        let now = Utc::now();
        SessionSnapshot {
            id: id.parse().unwrap(),
            created_at: now,
            last_touched_at: now,
            prev_html: String::new(),
            history: Vec::new(),
            rest_mutations: Vec::new(),
            rest_queries: Vec::new(),
            component_cache: FragmentCache::new(),
            style_cache: FragmentCache::new(),
            next_component_id: 1,
            next_style_id: 1,
        }
    }

    #[test]
    fn test_valid_snapshot() {
        let snapshot = Snapshot::new(Utc::now(), vec![session("a"), session("b")]);
        assert!(snapshot.validate(25).is_ok());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut snapshot = Snapshot::new(Utc::now(), vec![]);
        snapshot.version = 2;
        assert!(matches!(
            snapshot.validate(25),
            Err(VibeStateError::UnsupportedSnapshotVersion(2))
        ));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let snapshot = Snapshot::new(Utc::now(), vec![session("a"), session("a")]);
        let err = snapshot.validate(25).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_rejects_zero_counter() {
        let mut bad = session("a");
        bad.next_style_id = 0;
        let snapshot = Snapshot::new(Utc::now(), vec![bad]);
        assert!(snapshot.validate(25).is_err());
    }

    #[test]
    fn test_rejects_overfull_journal() {
        let mut bad = session("a");
        let now = Utc::now();
        bad.rest_mutations = (0..3)
            .map(|_| RestMutationRecord::new("POST", "/rest_api/mutation/x", now))
            .collect();
        let snapshot = Snapshot::new(now, vec![bad]);
        assert!(snapshot.validate(2).is_err());
        assert!(snapshot.validate(3).is_ok());
    }

    #[test]
    fn test_from_json_rejects_malformed() {
        assert!(matches!(
            Snapshot::from_json("{\"version\": 1}", 25),
            Err(VibeStateError::Json(_))
        ));
        assert!(Snapshot::from_json("not json", 25).is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let snapshot = Snapshot::new(Utc::now(), vec![session("a")]);
        let json = snapshot.to_json().unwrap();
        let parsed = Snapshot::from_json(&json, 25).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
