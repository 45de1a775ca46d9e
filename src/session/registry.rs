//! Session registry: lifecycle, history, REST journals and snapshots.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::entry::{
    FragmentCache, HistoryEntry, RequestSnapshot, ResponsePayload, RestKind, RestMetadata,
    RestMutationRecord, RestQueryRecord,
};
use super::journal::DEFAULT_JOURNAL_CAPACITY;
use super::record::{counter_after, Session};
use super::snapshot::Snapshot;
use super::{SessionId, SessionState};
use crate::clock::{Clock, SystemClock};
use crate::cookies::{CookieSink, SameSite, SetCookie};
use crate::error::VibeStateError;
use crate::Result;

/// Registry tuning.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Idle time after which a session is expired.
    pub ttl_ms: u64,
    /// Maximum number of sessions held at once.
    pub capacity: usize,
    /// Records kept per REST journal.
    pub rest_journal_capacity: usize,
    /// Cookie carrying the session id.
    pub cookie_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 24 * 60 * 60 * 1000,
            capacity: 200,
            rest_journal_capacity: DEFAULT_JOURNAL_CAPACITY,
            cookie_name: "sid".to_string(),
        }
    }
}

impl RegistryConfig {
    pub fn new(ttl_ms: u64, capacity: usize) -> Self {
        Self {
            ttl_ms,
            capacity,
            ..Default::default()
        }
    }
}

/// Options for [`SessionRegistry::append_history_entry`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendOptions {
    /// Keep the stored document even if the entry carries a full page.
    pub preserve_prev_html: bool,
}

impl AppendOptions {
    pub fn preserve_prev_html() -> Self {
        Self {
            preserve_prev_html: true,
        }
    }
}

/// Owned copy of a session's REST journals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RestState {
    pub mutations: Vec<RestMutationRecord>,
    pub queries: Vec<RestQueryRecord>,
}

/// A REST call to be recorded as a history entry.
#[derive(Debug, Clone)]
pub struct RestTurn {
    pub kind: RestKind,
    pub request: RequestSnapshot,
    pub response: Option<Value>,
    pub raw_response: Option<String>,
    pub ok: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl RestTurn {
    pub fn mutation(record: &RestMutationRecord, duration_ms: u64) -> Self {
        Self {
            kind: RestKind::Mutation,
            request: record.request(),
            response: Some(json!({ "success": true })),
            raw_response: None,
            ok: true,
            error: None,
            duration_ms,
        }
    }

    pub fn query(record: &RestQueryRecord, duration_ms: u64) -> Self {
        Self {
            kind: RestKind::Query,
            request: record.request(),
            response: Some(record.response.clone()),
            raw_response: Some(record.raw_response.clone()),
            ok: record.ok,
            error: record.error.clone(),
            duration_ms,
        }
    }
}

/// Fragments a generation may reference, plus the counters to continue from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReusableCaches {
    pub component_cache: FragmentCache,
    pub style_cache: FragmentCache,
    pub next_component_id: u64,
    pub next_style_id: u64,
}

impl Default for ReusableCaches {
    fn default() -> Self {
        Self {
            component_cache: FragmentCache::new(),
            style_cache: FragmentCache::new(),
            next_component_id: 1,
            next_style_id: 1,
        }
    }
}

/// Everything stored after a successful render, applied in one step.
#[derive(Debug, Clone)]
pub struct RenderCommit {
    pub html: String,
    pub component_cache: FragmentCache,
    pub style_cache: FragmentCache,
    pub next_component_id: u64,
    pub next_style_id: u64,
    pub entry: HistoryEntry,
}

/// Sessions removed by a prune pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruneReport {
    /// Removed because their TTL elapsed.
    pub expired: Vec<SessionId>,
    /// Removed to bring the registry back under capacity.
    pub evicted: Vec<SessionId>,
}

impl PruneReport {
    pub fn removed(&self) -> usize {
        self.expired.len() + self.evicted.len()
    }
}

/// Brief session summary for listing.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
    pub idle_ms: u64,
    pub history_len: usize,
    pub rest_mutations: usize,
    pub rest_queries: usize,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    seq: u64,
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Live session for `sid`, creating (or replacing an expired) record.
    ///
    /// Returns the session and whether it was freshly created.
    fn ensure(&mut self, sid: &SessionId, now: DateTime<Utc>, config: &RegistryConfig) -> (&mut Session, bool) {
        let expired = self
            .sessions
            .get(sid)
            .is_some_and(|session| session.is_expired(now, config.ttl_ms));
        if expired {
            self.sessions.remove(sid);
            debug!(session_id = %sid, "Session expired, recreating");
        }

        let seq = self.next_seq();
        let mut created = false;
        let session = self.sessions.entry(sid.clone()).or_insert_with(|| {
            created = true;
            Session::new(sid.clone(), now, config.rest_journal_capacity)
        });
        session.touch(now, seq);
        (session, created)
    }

    /// Drop expired sessions, then evict least-recently-touched ones over capacity.
    fn prune(&mut self, now: DateTime<Utc>, config: &RegistryConfig) -> PruneReport {
        let mut report = PruneReport::default();

        self.sessions.retain(|id, session| {
            if session.is_expired(now, config.ttl_ms) {
                report.expired.push(id.clone());
                false
            } else {
                true
            }
        });

        let capacity = config.capacity.max(1);
        if self.sessions.len() > capacity {
            let mut ranked: Vec<_> = self
                .sessions
                .values()
                .map(|s| (s.last_touched_at, s.touch_seq, s.id.clone()))
                .collect();
            ranked.sort();

            let excess = self.sessions.len() - capacity;
            for (_, _, id) in ranked.into_iter().take(excess) {
                self.sessions.remove(&id);
                report.evicted.push(id);
            }
        }

        for id in &report.expired {
            debug!(session_id = %id, state = ?SessionState::Expired, "Session pruned");
        }
        for id in &report.evicted {
            debug!(session_id = %id, state = ?SessionState::Evicted, "Session evicted over capacity");
        }

        report
    }
}

/// Thread-safe registry of client sessions.
///
/// Every operation runs to completion under the internal lock and performs
/// no I/O, so a caller awaiting a model response never holds registry state
/// mid-mutation. Unknown or expired ids never produce errors: reads return
/// empty data and writes lazily create a fresh record.
pub struct SessionRegistry {
    inner: RwLock<Inner>,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    /// Create a registry using the system clock.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Current time according to the registry's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| VibeStateError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| VibeStateError::LockPoisoned)
    }

    /// Run `f` against the live session, or return `None` if absent/expired.
    fn read_active<R>(&self, sid: &SessionId, f: impl FnOnce(&Session) -> R) -> Result<Option<R>> {
        let inner = self.read()?;
        let now = self.clock.now();
        Ok(inner
            .sessions
            .get(sid)
            .filter(|session| !session.is_expired(now, self.config.ttl_ms))
            .map(f))
    }

    /// Run `f` against the live session, creating it if needed, then touch and prune.
    fn mutate<R>(&self, sid: &SessionId, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        let mut inner = self.write()?;
        let now = self.clock.now();
        let (session, created) = inner.ensure(sid, now, &self.config);
        let result = f(session);
        if created {
            debug!(session_id = %sid, "Session created");
            inner.prune(now, &self.config);
        }
        Ok(result)
    }

    /// Resolve the session id from cookies, minting a new one when needed.
    ///
    /// A known, unexpired id is touched and returned without writing a
    /// cookie. Otherwise a fresh random id is created, registered and
    /// written to `sink`.
    pub fn get_or_create_session_id(
        &self,
        cookies: &HashMap<String, String>,
        sink: &mut dyn CookieSink,
    ) -> Result<SessionId> {
        let mut inner = self.write()?;
        let now = self.clock.now();

        let presented = cookies
            .get(&self.config.cookie_name)
            .and_then(|raw| raw.parse::<SessionId>().ok());

        if let Some(sid) = presented {
            let live = inner
                .sessions
                .get(&sid)
                .map(|session| !session.is_expired(now, self.config.ttl_ms));
            match live {
                Some(true) => {
                    let seq = inner.next_seq();
                    if let Some(session) = inner.sessions.get_mut(&sid) {
                        session.touch(now, seq);
                    }
                    return Ok(sid);
                }
                Some(false) => {
                    inner.sessions.remove(&sid);
                    debug!(session_id = %sid, "Presented session expired");
                }
                None => {}
            }
        }

        let mut sid = SessionId::generate();
        while inner.sessions.contains_key(&sid) {
            sid = SessionId::generate();
        }
        inner.ensure(&sid, now, &self.config);
        inner.prune(now, &self.config);

        sink.set_cookie(
            SetCookie::new(&self.config.cookie_name, sid.as_str())
                .max_age_secs(self.config.ttl_ms / 1000)
                .path("/")
                .http_only()
                .same_site(SameSite::Lax),
        );
        debug!(session_id = %sid, "Session created");

        Ok(sid)
    }

    /// Whether `sid` refers to a live session.
    pub fn contains(&self, sid: &SessionId) -> Result<bool> {
        Ok(self.read_active(sid, |_| ())?.is_some())
    }

    /// Lifecycle state of `sid`.
    ///
    /// Ids with no record report [`SessionState::Evicted`]; the registry
    /// cannot tell an evicted id from one it never minted.
    pub fn state_of(&self, sid: &SessionId) -> Result<SessionState> {
        let inner = self.read()?;
        let now = self.clock.now();
        Ok(inner
            .sessions
            .get(sid)
            .map(|session| session.state_at(now, self.config.ttl_ms))
            .unwrap_or(SessionState::Evicted))
    }

    /// Latest full document for the session; empty when unknown.
    pub fn get_prev_html(&self, sid: &SessionId) -> Result<String> {
        Ok(self.read_active(sid, Session::current_html)?.unwrap_or_default())
    }

    pub fn set_prev_html(&self, sid: &SessionId, html: impl Into<String>) -> Result<()> {
        let html = html.into();
        self.mutate(sid, |session| session.prev_html = html)
    }

    /// History in chronological order, optionally only the most recent `limit`.
    pub fn get_history(&self, sid: &SessionId, limit: Option<usize>) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .read_active(sid, |session| {
                let skip = match limit {
                    Some(limit) if limit > 0 => session.history.len().saturating_sub(limit),
                    _ => 0,
                };
                session.history[skip..].to_vec()
            })?
            .unwrap_or_default())
    }

    /// Append a turn; a full-page response also becomes the stored document
    /// unless `options.preserve_prev_html` is set.
    pub fn append_history_entry(
        &self,
        sid: &SessionId,
        mut entry: HistoryEntry,
        options: AppendOptions,
    ) -> Result<()> {
        entry.session_id = Some(sid.clone());
        self.mutate(sid, |session| {
            if !options.preserve_prev_html {
                if let Some(html) = entry.response.full_document() {
                    session.prev_html = html.to_string();
                }
            }
            session.history.push(entry);
        })
    }

    pub fn append_mutation_record(&self, sid: &SessionId, record: RestMutationRecord) -> Result<()> {
        self.mutate(sid, |session| {
            if let Some(dropped) = session.rest_mutations.push(record) {
                debug!(session_id = %session.id, record_id = %dropped.id, "Dropped oldest REST mutation");
            }
        })
    }

    pub fn append_query_record(&self, sid: &SessionId, record: RestQueryRecord) -> Result<()> {
        self.mutate(sid, |session| {
            if let Some(dropped) = session.rest_queries.push(record) {
                debug!(session_id = %session.id, record_id = %dropped.id, "Dropped oldest REST query");
            }
        })
    }

    /// Record a REST call as a history entry without replacing the stored page.
    ///
    /// Returns the new entry's id.
    pub fn append_rest_history_entry(&self, sid: &SessionId, turn: RestTurn) -> Result<String> {
        let now = self.clock.now();
        let response = turn
            .response
            .clone()
            .unwrap_or_else(|| json!({ "ok": turn.ok, "error": turn.error }));
        let mut entry = HistoryEntry {
            response: ResponsePayload::Json(response),
            entry_kind: turn.kind.entry_kind(),
            rest: Some(RestMetadata {
                kind: turn.kind,
                request: turn.request.clone(),
                response: turn.response,
                raw_response: turn.raw_response,
                ok: Some(turn.ok),
                error: turn.error,
            }),
            ..HistoryEntry::html(turn.request, String::new(), now)
        };
        entry.duration_ms = turn.duration_ms;
        let id = entry.id.clone();
        self.append_history_entry(sid, entry, AppendOptions::preserve_prev_html())?;
        Ok(id)
    }

    /// Owned copy of the REST journals, each optionally limited to the newest `limit`.
    pub fn get_rest_state(&self, sid: &SessionId, limit: Option<usize>) -> Result<RestState> {
        Ok(self
            .read_active(sid, |session| RestState {
                mutations: session.rest_mutations.to_vec(limit),
                queries: session.rest_queries.to_vec(limit),
            })?
            .unwrap_or_default())
    }

    /// Remove the first history entry with `entry_id` from any live session.
    ///
    /// The owning session stays registered even if its history becomes empty.
    pub fn remove_history_entry(&self, entry_id: &str) -> Result<bool> {
        let mut inner = self.write()?;
        let now = self.clock.now();
        let ttl_ms = self.config.ttl_ms;

        let mut candidates: Vec<&mut Session> = inner
            .sessions
            .values_mut()
            .filter(|session| !session.is_expired(now, ttl_ms))
            .collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));

        for session in candidates {
            if let Some(index) = session.history.iter().position(|entry| entry.id == entry_id) {
                session.history.remove(index);
                debug!(session_id = %session.id, entry_id, "History entry removed");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// All history of live sessions, ordered by creation time.
    pub fn export_history(&self) -> Result<Vec<HistoryEntry>> {
        let inner = self.read()?;
        let now = self.clock.now();

        let mut sessions: Vec<&Session> = inner
            .sessions
            .values()
            .filter(|session| !session.is_expired(now, self.config.ttl_ms))
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));

        let mut entries: Vec<HistoryEntry> = sessions
            .into_iter()
            .flat_map(|session| session.history.iter().cloned())
            .collect();
        entries.sort_by_key(|entry| entry.created_at);
        Ok(entries)
    }

    /// Replace every session with the history in `entries`.
    ///
    /// Entries are grouped by their `session_id`; entries without one are
    /// dropped. Each group is ordered by creation time and its latest page
    /// becomes the stored document.
    pub fn replace_history(&self, entries: Vec<HistoryEntry>) -> Result<()> {
        let mut groups: BTreeMap<SessionId, Vec<HistoryEntry>> = BTreeMap::new();
        let mut orphaned = 0usize;
        for entry in entries {
            match entry.session_id.clone() {
                Some(sid) => groups.entry(sid).or_default().push(entry),
                None => orphaned += 1,
            }
        }
        if orphaned > 0 {
            warn!(orphaned, "Dropped history entries without a session id");
        }

        // Touch order follows the newest entry of each group.
        let mut groups: Vec<(SessionId, Vec<HistoryEntry>)> = groups.into_iter().collect();
        groups.sort_by_key(|(sid, group)| {
            (group.iter().map(|entry| entry.created_at).max(), sid.clone())
        });

        let mut inner = self.write()?;
        let now = self.clock.now();
        inner.sessions.clear();
        for (sid, group) in groups {
            let seq = inner.next_seq();
            let mut session = Session::new(sid.clone(), now, self.config.rest_journal_capacity);
            session.touch(now, seq);
            install_history(&mut session, group);
            inner.sessions.insert(sid, session);
        }
        let report = inner.prune(now, &self.config);
        info!(
            sessions = inner.sessions.len(),
            evicted = report.evicted.len(),
            "History replaced"
        );
        Ok(())
    }

    /// Replace the history of one session, re-keying `entries` to it.
    ///
    /// REST journals are reset; the latest imported page becomes the stored
    /// document.
    pub fn replace_session_history(&self, sid: &SessionId, mut entries: Vec<HistoryEntry>) -> Result<()> {
        for entry in &mut entries {
            entry.session_id = Some(sid.clone());
        }
        self.mutate(sid, |session| {
            session.rest_mutations.clear();
            session.rest_queries.clear();
            install_history(session, entries);
        })
    }

    /// Fragments the next generation for `sid` may reference.
    ///
    /// Caches from history entries are layered oldest first, so newer
    /// fragments win; the session's current caches are applied last.
    pub fn reusable_caches(&self, sid: &SessionId) -> Result<ReusableCaches> {
        Ok(self
            .read_active(sid, |session| {
                let mut caches = ReusableCaches {
                    next_component_id: session.next_component_id,
                    next_style_id: session.next_style_id,
                    ..Default::default()
                };
                for entry in &session.history {
                    caches.component_cache.extend(entry.component_cache.clone());
                    caches.style_cache.extend(entry.style_cache.clone());
                }
                caches.component_cache.extend(session.component_cache.clone());
                caches.style_cache.extend(session.style_cache.clone());
                caches
            })?
            .unwrap_or_default())
    }

    /// Store a memoized render and its history entry in one step.
    pub fn commit_render(&self, sid: &SessionId, commit: RenderCommit) -> Result<()> {
        let RenderCommit {
            html,
            component_cache,
            style_cache,
            next_component_id,
            next_style_id,
            mut entry,
        } = commit;
        entry.session_id = Some(sid.clone());
        if entry.component_cache.is_empty() {
            entry.component_cache = component_cache.clone();
        }
        if entry.style_cache.is_empty() {
            entry.style_cache = style_cache.clone();
        }

        self.mutate(sid, |session| {
            session.prev_html = html;
            session.component_cache = component_cache;
            session.style_cache = style_cache;
            session.next_component_id = session.next_component_id.max(next_component_id);
            session.next_style_id = session.next_style_id.max(next_style_id);
            session.history.push(entry);
        })
    }

    /// Deep copy of every live session.
    pub fn export_snapshot(&self) -> Result<Snapshot> {
        let inner = self.read()?;
        let now = self.clock.now();
        let mut sessions: Vec<_> = inner
            .sessions
            .values()
            .filter(|session| !session.is_expired(now, self.config.ttl_ms))
            .map(Session::to_snapshot)
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(Snapshot::new(now, sessions))
    }

    /// Replace the registry's contents with `snapshot`.
    ///
    /// The snapshot is validated first; on error the registry is untouched.
    /// Expired sessions are dropped and the remainder trimmed to capacity.
    /// Returns the number of sessions held afterwards.
    pub fn import_snapshot(&self, snapshot: Snapshot) -> Result<usize> {
        if let Err(err) = snapshot.validate(self.config.rest_journal_capacity) {
            warn!(error = %err, "Rejected snapshot import");
            return Err(err);
        }

        let mut restored: Vec<Session> = snapshot
            .sessions
            .into_iter()
            .map(|s| Session::from_snapshot(s, self.config.rest_journal_capacity))
            .collect();
        restored.sort_by(|a, b| a.last_touched_at.cmp(&b.last_touched_at).then_with(|| a.id.cmp(&b.id)));

        let mut inner = self.write()?;
        let now = self.clock.now();
        inner.sessions.clear();
        for mut session in restored {
            session.touch_seq = inner.next_seq();
            inner.sessions.insert(session.id.clone(), session);
        }
        let report = inner.prune(now, &self.config);
        info!(
            sessions = inner.sessions.len(),
            dropped = report.removed(),
            "Snapshot imported"
        );
        Ok(inner.sessions.len())
    }

    /// Remove expired sessions and enforce capacity.
    pub fn prune(&self) -> Result<PruneReport> {
        let mut inner = self.write()?;
        let now = self.clock.now();
        Ok(inner.prune(now, &self.config))
    }

    /// Number of sessions currently held (including not-yet-swept expired ones).
    ///
    /// Reports 0 when the lock is poisoned; use [`Self::list_sessions`] to
    /// observe [`VibeStateError::LockPoisoned`].
    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(inner) => inner.sessions.len(),
            Err(_) => {
                warn!("Session registry lock poisoned");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summaries of every held session, most recently touched first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let inner = self.read()?;
        let now = self.clock.now();
        let mut summaries: Vec<SessionSummary> = inner
            .sessions
            .values()
            .map(|session| SessionSummary {
                session_id: session.id.clone(),
                state: session.state_at(now, self.config.ttl_ms),
                created_at: session.created_at,
                last_touched_at: session.last_touched_at,
                idle_ms: session.idle_ms(now),
                history_len: session.history.len(),
                rest_mutations: session.rest_mutations.len(),
                rest_queries: session.rest_queries.len(),
            })
            .collect();
        summaries.sort_by(|a, b| b.last_touched_at.cmp(&a.last_touched_at));
        Ok(summaries)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

/// Install `entries` as the session's history in chronological order.
fn install_history(session: &mut Session, mut entries: Vec<HistoryEntry>) {
    entries.sort_by_key(|entry| entry.created_at);

    session.prev_html = entries
        .iter()
        .rev()
        .find_map(|entry| entry.response.full_document())
        .unwrap_or_default()
        .to_string();

    if let Some(latest) = entries.iter().rev().find(|entry| !entry.component_cache.is_empty()) {
        session.component_cache = latest.component_cache.clone();
    }
    if let Some(latest) = entries.iter().rev().find(|entry| !entry.style_cache.is_empty()) {
        session.style_cache = latest.style_cache.clone();
    }
    session.next_component_id = session
        .next_component_id
        .max(counter_after(entries.iter().flat_map(|e| e.component_cache.keys())));
    session.next_style_id = session
        .next_style_id
        .max(counter_after(entries.iter().flat_map(|e| e.style_cache.keys())));

    session.history = entries;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::cookies::PendingCookies;

    const TTL: u64 = 60_000;

    fn registry(capacity: usize) -> (SessionRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let registry = SessionRegistry::with_clock(RegistryConfig::new(TTL, capacity), clock.clone());
        (registry, clock)
    }

    fn new_session(registry: &SessionRegistry) -> SessionId {
        let mut sink = PendingCookies::new();
        registry.get_or_create_session_id(&HashMap::new(), &mut sink).unwrap()
    }

    fn cookies_for(sid: &SessionId) -> HashMap<String, String> {
        HashMap::from([("sid".to_string(), sid.to_string())])
    }

    fn page(html: &str) -> HistoryEntry {
        HistoryEntry::html(RequestSnapshot::default(), html, Utc::now())
    }

    #[test]
    fn test_creates_session_and_sets_cookie() {
        let (registry, _) = registry(5);
        let mut sink = PendingCookies::new();
        let sid = registry.get_or_create_session_id(&HashMap::new(), &mut sink).unwrap();

        assert_eq!(sid.as_str().len(), 32);
        assert_eq!(sink.len(), 1);
        let header = &sink.header_values()[0];
        assert!(header.starts_with(&format!("sid={}", sid)));
        assert!(header.contains("Max-Age=60"));
        assert!(header.contains("HttpOnly"));
        assert!(registry.contains(&sid).unwrap());
    }

    #[test]
    fn test_known_session_does_not_set_cookie() {
        let (registry, _) = registry(5);
        let sid = new_session(&registry);

        let mut sink = PendingCookies::new();
        let again = registry.get_or_create_session_id(&cookies_for(&sid), &mut sink).unwrap();
        assert_eq!(again, sid);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_unknown_session_gets_new_id() {
        let (registry, _) = registry(5);
        let unknown: SessionId = "not-registered".parse().unwrap();

        let mut sink = PendingCookies::new();
        let sid = registry.get_or_create_session_id(&cookies_for(&unknown), &mut sink).unwrap();
        assert_ne!(sid, unknown);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_expired_session_is_not_reused() {
        let (registry, clock) = registry(5);
        let sid = new_session(&registry);
        registry.set_prev_html(&sid, "<html><body>Old</body></html>").unwrap();

        clock.advance_ms(TTL as i64 + 1);
        assert_eq!(registry.state_of(&sid).unwrap(), SessionState::Expired);
        assert_eq!(registry.get_prev_html(&sid).unwrap(), "");

        let mut sink = PendingCookies::new();
        let fresh = registry.get_or_create_session_id(&cookies_for(&sid), &mut sink).unwrap();
        assert_ne!(fresh, sid);
        assert_eq!(sink.len(), 1);
        assert_eq!(registry.state_of(&sid).unwrap(), SessionState::Evicted);
    }

    #[test]
    fn test_touch_extends_ttl() {
        let (registry, clock) = registry(5);
        let sid = new_session(&registry);

        clock.advance_ms(TTL as i64 - 1_000);
        let mut sink = PendingCookies::new();
        registry.get_or_create_session_id(&cookies_for(&sid), &mut sink).unwrap();

        clock.advance_ms(2_000);
        assert!(registry.contains(&sid).unwrap());
    }

    #[test]
    fn test_capacity_evicts_least_recently_touched() {
        let (registry, clock) = registry(3);
        let first = new_session(&registry);
        clock.advance_ms(10);
        let second = new_session(&registry);
        clock.advance_ms(10);
        let third = new_session(&registry);
        clock.advance_ms(10);

        // Touch the oldest so the second becomes least recently used.
        registry.set_prev_html(&first, "<html></html>").unwrap();
        clock.advance_ms(10);

        let fourth = new_session(&registry);
        assert_eq!(registry.len(), 3);
        assert!(registry.contains(&first).unwrap());
        assert!(!registry.contains(&second).unwrap());
        assert!(registry.contains(&third).unwrap());
        assert!(registry.contains(&fourth).unwrap());
    }

    #[test]
    fn test_capacity_eviction_with_identical_timestamps() {
        let (registry, _) = registry(2);
        let a = new_session(&registry);
        let b = new_session(&registry);
        let c = new_session(&registry);

        assert!(!registry.contains(&a).unwrap());
        assert!(registry.contains(&b).unwrap());
        assert!(registry.contains(&c).unwrap());
    }

    #[test]
    fn test_prev_html_and_history() {
        let (registry, _) = registry(5);
        let sid = new_session(&registry);

        let entry = page("<html><body>Initial</body></html>");
        let entry_id = entry.id.clone();
        registry.append_history_entry(&sid, entry, AppendOptions::default()).unwrap();
        assert!(registry.get_prev_html(&sid).unwrap().contains("Initial"));

        registry.set_prev_html(&sid, "<html><body>Manual</body></html>").unwrap();
        assert!(registry.get_prev_html(&sid).unwrap().contains("Manual"));

        let latest = registry.get_history(&sid, Some(1)).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, entry_id);
        assert_eq!(latest[0].session_id.as_ref(), Some(&sid));
    }

    #[test]
    fn test_history_limit_keeps_most_recent() {
        let (registry, _) = registry(5);
        let sid = new_session(&registry);
        for i in 0..5 {
            registry
                .append_history_entry(&sid, page("<html></html>").with_id(format!("h-{}", i)), AppendOptions::default())
                .unwrap();
        }

        let ids: Vec<_> = registry.get_history(&sid, Some(2)).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["h-3", "h-4"]);
        assert_eq!(registry.get_history(&sid, None).unwrap().len(), 5);
    }

    #[test]
    fn test_preserve_prev_html() {
        let (registry, _) = registry(5);
        let sid = new_session(&registry);
        registry.set_prev_html(&sid, "<html><body>Existing</body></html>").unwrap();

        registry
            .append_history_entry(&sid, page("<html><body>Other</body></html>"), AppendOptions::preserve_prev_html())
            .unwrap();
        assert!(registry.get_prev_html(&sid).unwrap().contains("Existing"));
    }

    #[test]
    fn test_fragment_response_does_not_replace_document() {
        let (registry, _) = registry(5);
        let sid = new_session(&registry);
        registry.set_prev_html(&sid, "<html><body>Page</body></html>").unwrap();

        registry.append_history_entry(&sid, page("<div>partial</div>"), AppendOptions::default()).unwrap();
        assert!(registry.get_prev_html(&sid).unwrap().contains("Page"));
    }

    #[test]
    fn test_rest_records_are_capped_and_copied() {
        let (registry, _) = registry(5);
        let sid = new_session(&registry);
        let now = Utc::now();

        for i in 0..30 {
            registry
                .append_mutation_record(&sid, RestMutationRecord {
                    id: format!("mutation-{}", i),
                    ..RestMutationRecord::new("POST", "/rest_api/mutation/test", now)
                })
                .unwrap();
            registry
                .append_query_record(&sid, RestQueryRecord {
                    id: format!("query-{}", i),
                    ..RestQueryRecord::new("GET", "/rest_api/query/test", now)
                })
                .unwrap();
        }

        let mut state = registry.get_rest_state(&sid, None).unwrap();
        assert_eq!(state.mutations.len(), 25);
        assert_eq!(state.queries.len(), 25);
        assert_eq!(state.mutations[0].id, "mutation-5");
        assert!(state.mutations.iter().all(|m| m.id != "mutation-4"));

        state.mutations[0].id = "mutated".into();
        state.queries.clear();
        let again = registry.get_rest_state(&sid, None).unwrap();
        assert_eq!(again.mutations[0].id, "mutation-5");
        assert_eq!(again.queries.len(), 25);

        assert_eq!(registry.get_rest_state(&sid, Some(3)).unwrap().mutations.len(), 3);
    }

    #[test]
    fn test_rest_history_entry_preserves_page() {
        let (registry, _) = registry(5);
        let sid = new_session(&registry);
        registry.set_prev_html(&sid, "<html><body>Existing</body></html>").unwrap();

        let record = RestMutationRecord {
            body: json!({ "updated": true }),
            ..RestMutationRecord::new("POST", "/rest_api/mutation/todo", Utc::now())
        };
        registry.append_mutation_record(&sid, record.clone()).unwrap();
        let entry_id = registry.append_rest_history_entry(&sid, RestTurn::mutation(&record, 123)).unwrap();

        let history = registry.get_history(&sid, None).unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.id, entry_id);
        assert_eq!(last.entry_kind, super::super::EntryKind::RestMutation);
        assert_eq!(last.duration_ms, 123);
        assert_eq!(last.request.body, json!({ "updated": true }));
        assert!(matches!(last.response, ResponsePayload::Json(_)));
        assert!(registry.get_prev_html(&sid).unwrap().contains("Existing"));
    }

    #[test]
    fn test_remove_history_entry() {
        let (registry, _) = registry(5);
        let sid = new_session(&registry);
        let entry = page("<html></html>").with_id("to-remove");
        registry.append_history_entry(&sid, entry, AppendOptions::default()).unwrap();

        assert!(registry.remove_history_entry("to-remove").unwrap());
        assert!(!registry.remove_history_entry("to-remove").unwrap());
        assert!(!registry.remove_history_entry("never-existed").unwrap());

        // The session record survives an emptied history.
        assert!(registry.contains(&sid).unwrap());
        assert!(registry.get_history(&sid, None).unwrap().is_empty());
    }

    #[test]
    fn test_export_and_replace_history() {
        let (registry, _) = registry(5);
        let a = new_session(&registry);
        let b = new_session(&registry);
        let t0 = Utc::now();

        registry
            .append_history_entry(&a, HistoryEntry::html(RequestSnapshot::default(), "<html>a1</html>", t0), AppendOptions::default())
            .unwrap();
        registry
            .append_history_entry(
                &b,
                HistoryEntry::html(RequestSnapshot::default(), "<html>b1</html>", t0 + chrono::Duration::seconds(1)),
                AppendOptions::default(),
            )
            .unwrap();

        let exported = registry.export_history().unwrap();
        assert_eq!(exported.len(), 2);
        assert!(exported[0].created_at <= exported[1].created_at);

        let (restored, _) = self::registry(5);
        restored.replace_history(exported).unwrap();
        assert_eq!(restored.len(), 2);
        assert!(restored.get_prev_html(&a).unwrap().contains("a1"));
        assert!(restored.get_prev_html(&b).unwrap().contains("b1"));
    }

    #[test]
    fn test_replace_history_over_capacity_keeps_most_recent() {
        let (registry, _) = registry(1);
        let t0 = Utc::now() - chrono::Duration::hours(6);
        let old: SessionId = "zzzz-old".parse().unwrap();
        let recent: SessionId = "aaaa-recent".parse().unwrap();

        let entries = vec![
            HistoryEntry::html(RequestSnapshot::default(), "<html>old</html>", t0).with_session(old.clone()),
            HistoryEntry::html(RequestSnapshot::default(), "<html>recent</html>", t0 + chrono::Duration::hours(5))
                .with_session(recent.clone()),
        ];
        registry.replace_history(entries.clone()).unwrap();
        assert!(registry.contains(&recent).unwrap());
        assert!(!registry.contains(&old).unwrap());

        // Input order does not matter.
        let (reversed, _) = self::registry(1);
        reversed.replace_history(entries.into_iter().rev().collect()).unwrap();
        assert!(reversed.contains(&recent).unwrap());
        assert_eq!(reversed.len(), 1);
    }

    #[test]
    fn test_export_snapshot_skips_expired_sessions() {
        let (registry, clock) = registry(5);
        let stale = new_session(&registry);
        clock.advance_ms(TTL as i64 / 2);
        let fresh = new_session(&registry);

        // `stale` has expired but no prune has run yet.
        clock.advance_ms(TTL as i64 / 2 + 1);
        assert_eq!(registry.len(), 2);

        let snapshot = registry.export_snapshot().unwrap();
        assert_eq!(snapshot.sessions.len(), 1);
        assert_eq!(snapshot.sessions[0].id, fresh);
        assert!(!snapshot.sessions.iter().any(|s| s.id == stale));
    }

    #[test]
    fn test_replace_history_drops_unowned_entries() {
        let (registry, _) = registry(5);
        registry.replace_history(vec![page("<html></html>")]).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_replace_session_history_rekeys_and_resets_rest() {
        let (registry, _) = registry(5);
        let sid = new_session(&registry);
        registry
            .append_mutation_record(&sid, RestMutationRecord::new("POST", "/rest_api/mutation/x", Utc::now()))
            .unwrap();

        let external: SessionId = "external-session".parse().unwrap();
        let t0 = Utc::now();
        let imported = vec![
            HistoryEntry::html(RequestSnapshot::default(), "<html><body>Latest</body></html>", t0 + chrono::Duration::days(1))
                .with_session(external.clone()),
            HistoryEntry::html(RequestSnapshot::default(), "<html><body>First</body></html>", t0)
                .with_session(external),
        ];
        registry.replace_session_history(&sid, imported).unwrap();

        let history = registry.get_history(&sid, None).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|entry| entry.session_id.as_ref() == Some(&sid)));
        assert!(history[0].created_at < history[1].created_at);
        assert!(registry.get_prev_html(&sid).unwrap().contains("Latest"));
        assert_eq!(registry.get_rest_state(&sid, None).unwrap(), RestState::default());
    }

    #[test]
    fn test_commit_render_and_reusable_caches() {
        let (registry, _) = registry(5);
        let sid = new_session(&registry);

        let mut component_cache = FragmentCache::new();
        component_cache.insert("sl-gen-1".into(), "<nav data-id=\"sl-gen-1\"></nav>".into());
        let mut style_cache = FragmentCache::new();
        style_cache.insert("sl-style-1".into(), "<style data-style-id=\"sl-style-1\"></style>".into());

        registry
            .commit_render(&sid, RenderCommit {
                html: "<html><body><nav data-id=\"sl-gen-1\"></nav></body></html>".into(),
                component_cache: component_cache.clone(),
                style_cache: style_cache.clone(),
                next_component_id: 2,
                next_style_id: 2,
                entry: page("<html></html>"),
            })
            .unwrap();

        let caches = registry.reusable_caches(&sid).unwrap();
        assert_eq!(caches.component_cache, component_cache);
        assert_eq!(caches.style_cache, style_cache);
        assert_eq!(caches.next_component_id, 2);
        assert!(registry.get_prev_html(&sid).unwrap().contains("sl-gen-1"));

        let history = registry.get_history(&sid, None).unwrap();
        assert_eq!(history[0].component_cache, component_cache);

        // Counters never move backwards.
        registry
            .commit_render(&sid, RenderCommit {
                html: "<html></html>".into(),
                component_cache: FragmentCache::new(),
                style_cache: FragmentCache::new(),
                next_component_id: 1,
                next_style_id: 1,
                entry: page("<html></html>"),
            })
            .unwrap();
        let caches = registry.reusable_caches(&sid).unwrap();
        assert_eq!(caches.next_component_id, 2);
        // Fragments from earlier history entries remain referenceable.
        assert!(caches.component_cache.contains_key("sl-gen-1"));
    }

    #[test]
    fn test_reusable_caches_for_unknown_session() {
        let (registry, _) = registry(5);
        let unknown: SessionId = "nobody".parse().unwrap();
        assert_eq!(registry.reusable_caches(&unknown).unwrap(), ReusableCaches::default());
    }

    #[test]
    fn test_snapshot_does_not_share_state() {
        let (registry, _) = registry(5);
        let sid = new_session(&registry);
        registry
            .append_history_entry(&sid, page("<html>Snapshot</html>"), AppendOptions::default())
            .unwrap();

        let mut snapshot = registry.export_snapshot().unwrap();
        assert_eq!(snapshot.sessions.len(), 1);

        let before = registry.get_prev_html(&sid).unwrap();
        snapshot.sessions[0].prev_html = "tampered".into();
        snapshot.sessions[0].history.clear();
        assert_eq!(registry.get_prev_html(&sid).unwrap(), before);
        assert_eq!(registry.get_history(&sid, None).unwrap().len(), 1);

        let (restored, _) = self::registry(5);
        assert_eq!(restored.import_snapshot(snapshot).unwrap(), 1);
        assert_eq!(restored.get_prev_html(&sid).unwrap(), "tampered");
    }

    #[test]
    fn test_invalid_snapshot_leaves_registry_untouched() {
        let (registry, _) = registry(5);
        let sid = new_session(&registry);
        registry.set_prev_html(&sid, "<html>keep</html>").unwrap();

        let mut snapshot = registry.export_snapshot().unwrap();
        let duplicate = snapshot.sessions[0].clone();
        snapshot.sessions.push(duplicate);
        snapshot.sessions[0].prev_html = "replaced".into();

        assert!(registry.import_snapshot(snapshot).is_err());
        assert_eq!(registry.get_prev_html(&sid).unwrap(), "<html>keep</html>");
    }

    #[test]
    fn test_prune_reports_expired() {
        let (registry, clock) = registry(5);
        let stale = new_session(&registry);
        clock.advance_ms(TTL as i64 + 1);
        let fresh = new_session(&registry);

        // Creating `fresh` already pruned `stale`.
        assert!(!registry.contains(&stale).unwrap());
        assert!(registry.contains(&fresh).unwrap());

        clock.advance_ms(TTL as i64 + 1);
        let report = registry.prune().unwrap();
        assert_eq!(report.expired, vec![fresh]);
        assert!(report.evicted.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_poisoned_lock() {
        let (registry, _) = registry(5);
        new_session(&registry);
        let registry = Arc::new(registry);

        let poisoner = Arc::clone(&registry);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.write().unwrap();
            panic!("poison the registry lock");
        })
        .join();

        assert_eq!(registry.len(), 0);
        assert!(matches!(registry.list_sessions(), Err(VibeStateError::LockPoisoned)));
        assert!(matches!(registry.prune(), Err(VibeStateError::LockPoisoned)));
    }

    #[test]
    fn test_list_sessions() {
        let (registry, clock) = registry(5);
        let a = new_session(&registry);
        clock.advance_ms(5);
        let b = new_session(&registry);

        let summaries = registry.list_sessions().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].session_id, b);
        assert_eq!(summaries[1].session_id, a);
        assert_eq!(summaries[1].idle_ms, 5);
        assert_eq!(summaries[0].state, SessionState::Active);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let registry = Arc::new(SessionRegistry::new(RegistryConfig::new(TTL, 1_000)));
        let mut handles = vec![];

        for _ in 0..100 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                let mut sink = PendingCookies::new();
                let sid = registry.get_or_create_session_id(&HashMap::new(), &mut sink).unwrap();
                registry.set_prev_html(&sid, "<html></html>").unwrap();
                sid
            }));
        }

        let ids: Vec<SessionId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 100);
        assert_eq!(registry.len(), 100);
    }
}
