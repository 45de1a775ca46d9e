//! HTTP layer for vibe-state.
//!
//! Exposes the session engine to the process that talks to the model. The
//! caller's session is resolved from the session cookie on every request,
//! and a `Set-Cookie` header is returned whenever a new id is minted.
//!
//! ## Endpoints
//!
//! ### Health & Info
//! - `GET /health` - Health check
//! - `GET /api/v1/` - API information
//!
//! ### Turns
//! - `POST /api/v1/turns/context` - Previous page, budgeted history and REST journals
//! - `POST /api/v1/turns/commit` - Memoize and store a generated page
//!
//! ### REST journals
//! - `GET /api/v1/rest` - Journals of the caller's session
//! - `POST /api/v1/rest/mutations` - Record a mutation
//! - `POST /api/v1/rest/queries` - Record a query and its response
//!
//! ### Admin
//! - `GET /api/v1/admin/sessions` - List sessions
//! - `GET|PUT /api/v1/admin/history` - Export or replace all history
//! - `DELETE /api/v1/admin/history/{id}` - Remove a history entry
//! - `GET|PUT /api/v1/admin/snapshot` - Export or import a registry snapshot
//!
//! ## Example
//!
//! ```no_run
//! use vibe_state::api::{ServerConfig, serve};
//!
//! #[tokio::main]
//! async fn main() -> vibe_state::Result<()> {
//!     let config = ServerConfig::new("127.0.0.1", 3000);
//!     serve(config).await
//! }
//! ```

pub mod handlers;
pub mod router;
pub mod types;

pub use handlers::AppState;
pub use router::{create_router, create_router_with_state, serve, serve_with_state, ServerConfig};
pub use types::{
    CommitRequest, CommitResponse, ContextResponse, ErrorResponse, HistoryResponse,
    ListSessionsResponse, RestMutationRequest, RestQueryRequest, RestRecordResponse,
    RestStateResponse,
};
