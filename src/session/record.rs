//! Per-client session record.

use chrono::{DateTime, Utc};

use super::entry::{FragmentCache, HistoryEntry, RestMutationRecord, RestQueryRecord};
use super::journal::Journal;
use super::snapshot::SessionSnapshot;
use super::{SessionId, SessionState};
use crate::clock::elapsed_ms;

/// State kept for one client between requests.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Unique identifier.
    pub id: SessionId,
    /// Time when the session was created.
    pub created_at: DateTime<Utc>,
    /// Time of the last call that touched this session.
    pub last_touched_at: DateTime<Utc>,
    /// Latest full rendered document, or empty.
    pub prev_html: String,
    /// Chronological history of turns.
    pub history: Vec<HistoryEntry>,
    pub rest_mutations: Journal<RestMutationRecord>,
    pub rest_queries: Journal<RestQueryRecord>,
    /// Fragments memoized from the latest render.
    pub component_cache: FragmentCache,
    pub style_cache: FragmentCache,
    pub next_component_id: u64,
    pub next_style_id: u64,
    /// Registry-wide touch order, breaks ties between equal timestamps.
    pub(crate) touch_seq: u64,
}

impl Session {
    pub fn new(id: SessionId, now: DateTime<Utc>, journal_capacity: usize) -> Self {
        Self {
            id,
            created_at: now,
            last_touched_at: now,
            prev_html: String::new(),
            history: Vec::new(),
            rest_mutations: Journal::new(journal_capacity),
            rest_queries: Journal::new(journal_capacity),
            component_cache: FragmentCache::new(),
            style_cache: FragmentCache::new(),
            next_component_id: 1,
            next_style_id: 1,
            touch_seq: 0,
        }
    }

    /// Record activity, extending the TTL window.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>, seq: u64) {
        if now > self.last_touched_at {
            self.last_touched_at = now;
        }
        self.touch_seq = seq;
    }

    /// Milliseconds since the last touch.
    pub fn idle_ms(&self, now: DateTime<Utc>) -> u64 {
        elapsed_ms(self.last_touched_at, now)
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl_ms: u64) -> bool {
        self.idle_ms(now) > ttl_ms
    }

    pub fn state_at(&self, now: DateTime<Utc>, ttl_ms: u64) -> SessionState {
        if self.is_expired(now, ttl_ms) {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }

    /// Latest document: the stored one, else the newest HTML history response.
    pub fn current_html(&self) -> String {
        if !self.prev_html.is_empty() {
            return self.prev_html.clone();
        }
        self.history
            .iter()
            .rev()
            .find_map(|entry| entry.response.as_html())
            .unwrap_or_default()
            .to_string()
    }

    pub fn to_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            created_at: self.created_at,
            last_touched_at: self.last_touched_at,
            prev_html: self.prev_html.clone(),
            history: self.history.clone(),
            rest_mutations: self.rest_mutations.to_vec(None),
            rest_queries: self.rest_queries.to_vec(None),
            component_cache: self.component_cache.clone(),
            style_cache: self.style_cache.clone(),
            next_component_id: self.next_component_id,
            next_style_id: self.next_style_id,
        }
    }

    pub fn from_snapshot(snapshot: SessionSnapshot, journal_capacity: usize) -> Self {
        Self {
            id: snapshot.id,
            created_at: snapshot.created_at,
            last_touched_at: snapshot.last_touched_at,
            prev_html: snapshot.prev_html,
            history: snapshot.history,
            rest_mutations: Journal::from_records(journal_capacity, snapshot.rest_mutations),
            rest_queries: Journal::from_records(journal_capacity, snapshot.rest_queries),
            component_cache: snapshot.component_cache,
            style_cache: snapshot.style_cache,
            next_component_id: snapshot.next_component_id.max(1),
            next_style_id: snapshot.next_style_id.max(1),
            touch_seq: 0,
        }
    }
}

/// First counter value that cannot collide with any numbered key in `keys`.
///
/// Keys are matched on their trailing decimal digits, so `sl-gen-12` yields 13.
pub(crate) fn counter_after<'a>(keys: impl IntoIterator<Item = &'a String>) -> u64 {
    keys.into_iter()
        .filter_map(|key| {
            let digits_start = key
                .char_indices()
                .rev()
                .take_while(|(_, c)| c.is_ascii_digit())
                .last()
                .map(|(i, _)| i)?;
            key[digits_start..].parse::<u64>().ok()
        })
        .max()
        .map(|max| max.saturating_add(1))
        .unwrap_or(1)
}
