//! REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use tracing::warn;

use super::types::{
    CommitRequest, CommitResponse, ContextParams, ContextResponse, ErrorResponse, HistoryResponse,
    ImportResponse, ListSessionsResponse, ReplaceHistoryRequest, RestMutationRequest,
    RestParams, RestQueryRequest, RestRecordResponse, RestStateResponse,
};
use crate::config::Config;
use crate::cookies::{parse_cookies, PendingCookies};
use crate::error::VibeStateError;
use crate::history::HistoryBudget;
use crate::memo::IdPrefixes;
use crate::session::{RegistryConfig, SessionId, SessionRegistry, Snapshot};
use crate::turn::{self, GeneratedPage};

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub history_budget: HistoryBudget,
    pub id_prefixes: IdPrefixes,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(SessionRegistry::new(RegistryConfig::default())))
    }

    pub fn with_registry(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            history_budget: HistoryBudget::default(),
            id_prefixes: IdPrefixes::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(config.to_registry_config())),
            history_budget: config.history_budget(),
            id_prefixes: config.id_prefixes(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn internal_error(err: VibeStateError) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::internal_error(err.to_string())),
    )
}

/// Resolve the caller's session, returning any `Set-Cookie` headers to send.
fn resolve_session(state: &AppState, headers: &HeaderMap) -> Result<(SessionId, HeaderMap), ApiError> {
    let cookies = parse_cookies(
        headers
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok()),
    );
    let mut pending = PendingCookies::new();
    let sid = state
        .registry
        .get_or_create_session_id(&cookies, &mut pending)
        .map_err(internal_error)?;

    let mut response_headers = HeaderMap::new();
    for value in pending.header_values() {
        let value = HeaderValue::from_str(&value).map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::internal_error(e.to_string())),
            )
        })?;
        response_headers.append(header::SET_COOKIE, value);
    }

    Ok((sid, response_headers))
}

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}

/// API information endpoint.
pub async fn api_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "vibe-state",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Prompt context for the caller's next generation.
pub async fn turn_context(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ContextParams>,
) -> Result<(HeaderMap, Json<ContextResponse>), ApiError> {
    let (sid, cookies) = resolve_session(&state, &headers)?;
    let budget = HistoryBudget {
        limit: params.limit.unwrap_or(state.history_budget.limit),
        max_bytes: params.max_bytes.unwrap_or(state.history_budget.max_bytes),
    };

    let context = turn::prepare_turn(&state.registry, &sid, budget).map_err(internal_error)?;
    Ok((cookies, Json(context.into())))
}

/// Memoize and store a generated page.
pub async fn turn_commit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CommitRequest>,
) -> Result<(HeaderMap, Json<CommitResponse>), ApiError> {
    let (sid, cookies) = resolve_session(&state, &headers)?;
    let page = GeneratedPage {
        html: req.html,
        request: req.request,
        duration_ms: req.duration_ms,
        brief: req.brief,
        usage: req.usage,
    };

    let outcome =
        turn::commit_render(&state.registry, &sid, page, &state.id_prefixes).map_err(internal_error)?;
    Ok((
        cookies,
        Json(CommitResponse {
            session_id: sid,
            outcome,
        }),
    ))
}

/// Journal a REST mutation.
pub async fn rest_mutation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RestMutationRequest>,
) -> Result<(StatusCode, HeaderMap, Json<RestRecordResponse>), ApiError> {
    let (sid, cookies) = resolve_session(&state, &headers)?;
    let (record, duration_ms) = req.into_record(state.registry.now());
    let record_id = record.id.clone();

    let entry_id =
        turn::record_mutation(&state.registry, &sid, record, duration_ms).map_err(internal_error)?;
    Ok((
        StatusCode::CREATED,
        cookies,
        Json(RestRecordResponse {
            session_id: sid,
            record_id,
            entry_id,
        }),
    ))
}

/// Journal a REST query and its response.
pub async fn rest_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RestQueryRequest>,
) -> Result<(StatusCode, HeaderMap, Json<RestRecordResponse>), ApiError> {
    let (sid, cookies) = resolve_session(&state, &headers)?;
    let (record, duration_ms) = req.into_record(state.registry.now());
    let record_id = record.id.clone();

    let entry_id =
        turn::record_query(&state.registry, &sid, record, duration_ms).map_err(internal_error)?;
    Ok((
        StatusCode::CREATED,
        cookies,
        Json(RestRecordResponse {
            session_id: sid,
            record_id,
            entry_id,
        }),
    ))
}

/// REST journals of the caller's session.
pub async fn rest_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RestParams>,
) -> Result<(HeaderMap, Json<RestStateResponse>), ApiError> {
    let (sid, cookies) = resolve_session(&state, &headers)?;
    let rest = state
        .registry
        .get_rest_state(&sid, params.limit)
        .map_err(internal_error)?;

    Ok((
        cookies,
        Json(RestStateResponse {
            session_id: sid,
            mutations: rest.mutations,
            queries: rest.queries,
        }),
    ))
}

/// List all sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    let sessions = state.registry.list_sessions().map_err(internal_error)?;
    Ok(Json(ListSessionsResponse {
        count: sessions.len(),
        sessions,
    }))
}

/// Export the history of every live session.
pub async fn export_history(
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let entries = state.registry.export_history().map_err(internal_error)?;
    Ok(Json(HistoryResponse {
        count: entries.len(),
        entries,
    }))
}

/// Replace all sessions with the given history.
pub async fn replace_history(
    State(state): State<AppState>,
    Json(req): Json<ReplaceHistoryRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .registry
        .replace_history(req.entries)
        .map_err(internal_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Remove one history entry.
pub async fn delete_history_entry(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = state
        .registry
        .remove_history_entry(&entry_id)
        .map_err(internal_error)?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::entry_not_found(&entry_id)),
        ))
    }
}

/// Export a deep copy of the registry.
pub async fn export_snapshot(State(state): State<AppState>) -> Result<Json<Snapshot>, ApiError> {
    let snapshot = state.registry.export_snapshot().map_err(internal_error)?;
    Ok(Json(snapshot))
}

/// Replace the registry with a snapshot; invalid payloads leave it unchanged.
pub async fn import_snapshot(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ImportResponse>, ApiError> {
    let capacity = state.registry.config().rest_journal_capacity;
    let result = Snapshot::from_json(&body, capacity)
        .and_then(|snapshot| state.registry.import_snapshot(snapshot));

    match result {
        Ok(sessions) => Ok(Json(ImportResponse { sessions })),
        Err(
            err @ (VibeStateError::InvalidSnapshot(_)
            | VibeStateError::UnsupportedSnapshotVersion(_)
            | VibeStateError::Json(_)),
        ) => {
            warn!(error = %err, "Snapshot import rejected");
            Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::invalid_snapshot(err.to_string())),
            ))
        }
        Err(err) => Err(internal_error(err)),
    }
}
