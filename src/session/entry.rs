//! History entries and REST journal records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SessionId;

/// Fragment id → serialized markup.
pub type FragmentCache = BTreeMap<String, String>;

/// Distinguishes a rendered-page turn from a REST journal turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    #[default]
    Html,
    RestMutation,
    RestQuery,
}

/// The request that produced a history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub method: String,
    pub path: String,
    #[serde(default = "empty_object")]
    pub query: Value,
    #[serde(default = "empty_object")]
    pub body: Value,
    /// Free-form user instructions attached to the request, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl RequestSnapshot {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: empty_object(),
            body: empty_object(),
            instructions: None,
        }
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

impl Default for RequestSnapshot {
    fn default() -> Self {
        Self::new("GET", "/")
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// What the model (or REST layer) answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePayload {
    Html(String),
    Json(Value),
}

impl ResponsePayload {
    pub fn as_html(&self) -> Option<&str> {
        match self {
            Self::Html(html) => Some(html),
            Self::Json(_) => None,
        }
    }

    /// The HTML when it is a complete document rather than a fragment.
    pub fn full_document(&self) -> Option<&str> {
        self.as_html().filter(|html| is_full_document(html))
    }
}

impl Default for ResponsePayload {
    fn default() -> Self {
        Self::Html(String::new())
    }
}

/// Heuristic: a document starts with a doctype or carries an `<html>` element.
pub fn is_full_document(html: &str) -> bool {
    let head: String = html
        .trim_start()
        .chars()
        .take(512)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype") || head.contains("<html")
}

/// Which REST journal a REST turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestKind {
    Mutation,
    Query,
}

impl RestKind {
    pub fn entry_kind(&self) -> EntryKind {
        match self {
            Self::Mutation => EntryKind::RestMutation,
            Self::Query => EntryKind::RestQuery,
        }
    }
}

/// Extra detail carried by REST history entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestMetadata {
    pub kind: RestKind,
    pub request: RequestSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One request/response round trip kept for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,
    pub request: RequestSnapshot,
    pub response: ResponsePayload,
    #[serde(default)]
    pub entry_kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<RestMetadata>,
    /// Provider usage metrics, stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    #[serde(default, skip_serializing_if = "FragmentCache::is_empty")]
    pub component_cache: FragmentCache,
    #[serde(default, skip_serializing_if = "FragmentCache::is_empty")]
    pub style_cache: FragmentCache,
}

impl HistoryEntry {
    /// A rendered-page entry with a fresh id.
    pub fn html(request: RequestSnapshot, html: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: None,
            created_at,
            duration_ms: 0,
            brief: None,
            request,
            response: ResponsePayload::Html(html.into()),
            entry_kind: EntryKind::Html,
            rest: None,
            usage: None,
            component_cache: FragmentCache::new(),
            style_cache: FragmentCache::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_session(mut self, sid: SessionId) -> Self {
        self.session_id = Some(sid);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_brief(mut self, brief: impl Into<String>) -> Self {
        self.brief = Some(brief.into());
        self
    }
}

/// A state-changing REST call recorded for the next render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestMutationRecord {
    pub id: String,
    pub path: String,
    pub method: String,
    #[serde(default = "empty_object")]
    pub query: Value,
    #[serde(default = "empty_object")]
    pub body: Value,
    pub created_at: DateTime<Utc>,
}

impl RestMutationRecord {
    pub fn new(method: impl Into<String>, path: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.into(),
            method: method.into(),
            query: empty_object(),
            body: empty_object(),
            created_at,
        }
    }

    pub fn request(&self) -> RequestSnapshot {
        RequestSnapshot {
            method: self.method.clone(),
            path: self.path.clone(),
            query: self.query.clone(),
            body: self.body.clone(),
            instructions: None,
        }
    }
}

/// A data-fetching REST call and the JSON it was answered with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestQueryRecord {
    pub id: String,
    pub path: String,
    pub method: String,
    #[serde(default = "empty_object")]
    pub query: Value,
    #[serde(default = "empty_object")]
    pub body: Value,
    pub created_at: DateTime<Utc>,
    pub ok: bool,
    #[serde(default)]
    pub response: Value,
    #[serde(default)]
    pub raw_response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RestQueryRecord {
    pub fn new(method: impl Into<String>, path: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.into(),
            method: method.into(),
            query: empty_object(),
            body: empty_object(),
            created_at,
            ok: true,
            response: Value::Null,
            raw_response: String::new(),
            error: None,
        }
    }

    pub fn request(&self) -> RequestSnapshot {
        RequestSnapshot {
            method: self.method.clone(),
            path: self.path.clone(),
            query: self.query.clone(),
            body: self.body.clone(),
            instructions: None,
        }
    }
}
