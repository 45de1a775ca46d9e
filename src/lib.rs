//! # vibe-state
//!
//! Session and context-state engine for LLM-rendered web apps.
//!
//! A model regenerates the whole HTML view of an application on every
//! request. This crate keeps the per-client state that makes those views
//! feel continuous while keeping memory and prompt size bounded.
//!
//! ## Features
//!
//! - **Session registry**: cookie-resolved sessions with TTL expiry,
//!   least-recently-used eviction, bounded REST journals and snapshots
//! - **History budgeting**: picks which prior turns fit in a byte ceiling
//! - **Structural memoization**: stable ids for repeated markup and styles,
//!   so a model can emit `{{component:<id>}}` instead of the fragment itself
//! - **HTTP surface**: a small axum API over the engine
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::collections::HashMap;
//!
//! use vibe_state::cookies::PendingCookies;
//! use vibe_state::history::HistoryBudget;
//! use vibe_state::memo::IdPrefixes;
//! use vibe_state::session::{RegistryConfig, RequestSnapshot, SessionRegistry};
//! use vibe_state::turn::{self, GeneratedPage};
//!
//! fn main() -> vibe_state::Result<()> {
//!     vibe_state::logging::try_init().ok();
//!
//!     let registry = SessionRegistry::new(RegistryConfig::default());
//!
//!     let mut cookies = PendingCookies::new();
//!     let sid = registry.get_or_create_session_id(&HashMap::new(), &mut cookies)?;
//!
//!     let context = turn::prepare_turn(&registry, &sid, HistoryBudget::default())?;
//!     println!("{} prior turns", context.history.entries.len());
//!
//!     let page = GeneratedPage::new("<html><body><nav>Home</nav></body></html>", RequestSnapshot::default());
//!     let outcome = turn::commit_render(&registry, &sid, page, &IdPrefixes::default())?;
//!     println!("stored entry {}", outcome.entry_id);
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod cookies;
pub mod error;
pub mod history;
pub mod logging;
pub mod memo;
pub mod session;
pub mod turn;

// Re-export commonly used types
pub use error::{Result, VibeStateError};
pub use history::{plan_history, select_history_for_prompt, HistoryBudget, HistorySelection};
pub use memo::{apply_reusable_placeholders, prepare_reusable_caches, PlaceholderResult, PreparedDocument};
pub use session::{HistoryEntry, RegistryConfig, SessionId, SessionRegistry, SessionState, Snapshot};
