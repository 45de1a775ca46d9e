//! Structural HTML memoization.
//!
//! Repeated markup and styles are given stable ids so a later generation can
//! reference them with a short placeholder instead of emitting them again:
//!
//! - [`prepare_reusable_caches`] annotates a document and extracts fragments.
//! - [`apply_reusable_placeholders`] expands placeholder tokens back into markup.

mod parse;
mod placeholder;
mod prepare;
pub mod tree;

pub use parse::parse_document;
pub use placeholder::{apply_reusable_placeholders, PlaceholderCaches, PlaceholderResult};
pub use prepare::{prepare_reusable_caches, IdPrefixes, PrepareOptions, PreparedDocument};

/// Attribute holding a component fragment id.
pub const COMPONENT_ID_ATTR: &str = "data-id";

/// Attribute holding a style fragment id.
pub const STYLE_ID_ATTR: &str = "data-style-id";

/// Marks scripts that carry per-render state and are never memoized.
pub const STATE_SCRIPT_ATTR: &str = "data-state-script";
