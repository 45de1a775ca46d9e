//! Per-request composition of registry, budgeter and memoizer.
//!
//! A turn reads state with [`prepare_turn`], leaves the registry alone while
//! the model is generating, and stores the result with [`commit_render`].
//! A generation that fails or is abandoned simply never commits.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::history::{plan_history, HistoryBudget, HistoryPlan};
use crate::memo::{
    apply_reusable_placeholders, prepare_reusable_caches, IdPrefixes, PlaceholderCaches,
    PrepareOptions,
};
use crate::session::{
    HistoryEntry, RenderCommit, RequestSnapshot, RestMutationRecord, RestQueryRecord, RestState,
    RestTurn, SessionId, SessionRegistry,
};
use crate::Result;

/// Everything a prompt builder needs for one request.
#[derive(Debug, Clone, Serialize)]
pub struct TurnContext {
    pub session_id: SessionId,
    pub prev_html: String,
    pub history: HistoryPlan,
    pub rest: RestState,
}

/// Read the session's state and budget its history.
pub fn prepare_turn(
    registry: &SessionRegistry,
    sid: &SessionId,
    budget: HistoryBudget,
) -> Result<TurnContext> {
    let history = registry.get_history(sid, None)?;
    let plan = plan_history(&history, budget);
    debug!(
        session_id = %sid,
        total = plan.total,
        included = plan.entries.len(),
        bytes = plan.bytes_used,
        "Prepared turn context"
    );

    Ok(TurnContext {
        session_id: sid.clone(),
        prev_html: registry.get_prev_html(sid)?,
        history: plan,
        rest: registry.get_rest_state(sid, None)?,
    })
}

/// Raw model output for a page request.
#[derive(Debug, Clone)]
pub struct GeneratedPage {
    pub html: String,
    pub request: RequestSnapshot,
    pub duration_ms: u64,
    pub brief: Option<String>,
    pub usage: Option<Value>,
}

impl GeneratedPage {
    pub fn new(html: impl Into<String>, request: RequestSnapshot) -> Self {
        Self {
            html: html.into(),
            request,
            duration_ms: 0,
            brief: None,
            usage: None,
        }
    }
}

/// What was stored by [`commit_render`].
#[derive(Debug, Clone, Serialize)]
pub struct CommitOutcome {
    pub entry_id: String,
    /// The memoized document, as stored and served.
    pub html: String,
    pub missing_component_ids: Vec<String>,
    pub replaced_component_ids: Vec<String>,
    pub missing_style_ids: Vec<String>,
    pub replaced_style_ids: Vec<String>,
}

/// Expand placeholders in `page`, memoize its fragments and store it.
pub fn commit_render(
    registry: &SessionRegistry,
    sid: &SessionId,
    page: GeneratedPage,
    prefixes: &IdPrefixes,
) -> Result<CommitOutcome> {
    let caches = registry.reusable_caches(sid)?;
    let expanded = apply_reusable_placeholders(
        &page.html,
        PlaceholderCaches {
            component_cache: &caches.component_cache,
            style_cache: &caches.style_cache,
        },
    );

    let prepared = prepare_reusable_caches(
        &expanded.html,
        &PrepareOptions {
            next_component_id: caches.next_component_id,
            next_style_id: caches.next_style_id,
            id_prefixes: prefixes.clone(),
        },
    );

    let mut entry = HistoryEntry::html(page.request, prepared.html.clone(), registry.now())
        .with_duration_ms(page.duration_ms);
    entry.brief = page.brief;
    entry.usage = page.usage;
    let entry_id = entry.id.clone();

    registry.commit_render(
        sid,
        RenderCommit {
            html: prepared.html.clone(),
            component_cache: prepared.component_cache,
            style_cache: prepared.style_cache,
            next_component_id: prepared.next_component_id,
            next_style_id: prepared.next_style_id,
            entry,
        },
    )?;

    Ok(CommitOutcome {
        entry_id,
        html: prepared.html,
        missing_component_ids: expanded.missing_component_ids,
        replaced_component_ids: expanded.replaced_component_ids,
        missing_style_ids: expanded.missing_style_ids,
        replaced_style_ids: expanded.replaced_style_ids,
    })
}

/// Journal a REST mutation and add it to history. Returns the history entry id.
pub fn record_mutation(
    registry: &SessionRegistry,
    sid: &SessionId,
    record: RestMutationRecord,
    duration_ms: u64,
) -> Result<String> {
    let turn = RestTurn::mutation(&record, duration_ms);
    registry.append_mutation_record(sid, record)?;
    registry.append_rest_history_entry(sid, turn)
}

/// Journal a REST query and add it to history. Returns the history entry id.
pub fn record_query(
    registry: &SessionRegistry,
    sid: &SessionId,
    record: RestQueryRecord,
    duration_ms: u64,
) -> Result<String> {
    let turn = RestTurn::query(&record, duration_ms);
    registry.append_query_record(sid, record)?;
    registry.append_rest_history_entry(sid, turn)
}
