//! API request and response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::{
    HistoryEntry, RequestSnapshot, RestMutationRecord, RestQueryRecord, SessionId, SessionSummary,
};
use crate::turn::{CommitOutcome, TurnContext};

/// Optional overrides for the history budget of one context request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextParams {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub max_bytes: Option<usize>,
}

/// Prompt context for the caller's session.
#[derive(Debug, Clone, Serialize)]
pub struct ContextResponse {
    pub session_id: SessionId,
    pub prev_html: String,
    pub history: Vec<HistoryEntry>,
    /// Entries in the full history.
    pub history_total: usize,
    /// Entries returned in `history`.
    pub history_included: usize,
    pub bytes_used: usize,
    pub limit_omitted: usize,
    pub byte_omitted: usize,
    pub bytes_omitted: usize,
    pub rest: RestStateResponse,
}

impl From<TurnContext> for ContextResponse {
    fn from(context: TurnContext) -> Self {
        let plan = context.history;
        Self {
            session_id: context.session_id.clone(),
            prev_html: context.prev_html,
            history_total: plan.total,
            history_included: plan.entries.len(),
            bytes_used: plan.bytes_used,
            limit_omitted: plan.limit_omitted,
            byte_omitted: plan.byte_omitted,
            bytes_omitted: plan.bytes_omitted,
            history: plan.entries,
            rest: RestStateResponse {
                session_id: context.session_id,
                mutations: context.rest.mutations,
                queries: context.rest.queries,
            },
        }
    }
}

/// Generated page to memoize and store.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitRequest {
    pub html: String,
    #[serde(default)]
    pub request: RequestSnapshot,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub brief: Option<String>,
    #[serde(default)]
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitResponse {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub outcome: CommitOutcome,
}

fn default_post() -> String {
    "POST".to_string()
}

fn default_get() -> String {
    "GET".to_string()
}

fn default_true() -> bool {
    true
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// A REST mutation to journal.
#[derive(Debug, Clone, Deserialize)]
pub struct RestMutationRequest {
    #[serde(default = "default_post")]
    pub method: String,
    pub path: String,
    #[serde(default = "empty_object")]
    pub query: Value,
    #[serde(default = "empty_object")]
    pub body: Value,
    #[serde(default)]
    pub duration_ms: u64,
}

impl RestMutationRequest {
    pub fn into_record(self, now: chrono::DateTime<chrono::Utc>) -> (RestMutationRecord, u64) {
        let record = RestMutationRecord {
            query: self.query,
            body: self.body,
            ..RestMutationRecord::new(self.method, self.path, now)
        };
        (record, self.duration_ms)
    }
}

/// A REST query and its answer to journal.
#[derive(Debug, Clone, Deserialize)]
pub struct RestQueryRequest {
    #[serde(default = "default_get")]
    pub method: String,
    pub path: String,
    #[serde(default = "empty_object")]
    pub query: Value,
    #[serde(default = "empty_object")]
    pub body: Value,
    #[serde(default = "default_true")]
    pub ok: bool,
    #[serde(default)]
    pub response: Value,
    #[serde(default)]
    pub raw_response: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl RestQueryRequest {
    pub fn into_record(self, now: chrono::DateTime<chrono::Utc>) -> (RestQueryRecord, u64) {
        let raw_response = self
            .raw_response
            .unwrap_or_else(|| self.response.to_string());
        let record = RestQueryRecord {
            query: self.query,
            body: self.body,
            ok: self.ok,
            response: self.response,
            raw_response,
            error: self.error,
            ..RestQueryRecord::new(self.method, self.path, now)
        };
        (record, self.duration_ms)
    }
}

/// Response for a journaled REST call.
#[derive(Debug, Clone, Serialize)]
pub struct RestRecordResponse {
    pub session_id: SessionId,
    pub record_id: String,
    pub entry_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// REST journals of one session.
#[derive(Debug, Clone, Serialize)]
pub struct RestStateResponse {
    pub session_id: SessionId,
    pub mutations: Vec<RestMutationRecord>,
    pub queries: Vec<RestQueryRecord>,
}

/// List sessions response.
#[derive(Debug, Clone, Serialize)]
pub struct ListSessionsResponse {
    /// Total number of sessions.
    pub count: usize,
    /// Session summaries.
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub count: usize,
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceHistoryRequest {
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResponse {
    /// Sessions held after the import.
    pub sessions: usize,
}

/// Generic API error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "ENTRY_NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn entry_not_found(id: &str) -> Self {
        Self::new("ENTRY_NOT_FOUND", format!("History entry '{}' not found", id))
    }

    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::new("INVALID_SNAPSHOT", "Snapshot rejected").with_details(message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }
}
