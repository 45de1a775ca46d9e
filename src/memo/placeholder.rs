//! Expansion of `{{component:<id>}}` and `{{style:<id>}}` tokens.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::warn;

use crate::session::FragmentCache;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(component|style):([a-zA-Z0-9_-]+)\}\}").expect("Invalid placeholder regex")
});

/// Fragment caches consulted during expansion.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderCaches<'a> {
    pub component_cache: &'a FragmentCache,
    pub style_cache: &'a FragmentCache,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaceholderResult {
    pub html: String,
    pub missing_component_ids: Vec<String>,
    pub replaced_component_ids: Vec<String>,
    pub missing_style_ids: Vec<String>,
    pub replaced_style_ids: Vec<String>,
}

impl PlaceholderResult {
    pub fn has_missing(&self) -> bool {
        !self.missing_component_ids.is_empty() || !self.missing_style_ids.is_empty()
    }
}

/// Replace every placeholder token in `html` with its cached fragment.
///
/// Unknown ids expand to nothing and are reported as missing. Id lists are
/// de-duplicated in order of first appearance.
pub fn apply_reusable_placeholders(html: &str, caches: PlaceholderCaches<'_>) -> PlaceholderResult {
    let mut result = PlaceholderResult::default();

    // One pass: expanded fragments are never rescanned for tokens.
    let expanded = PLACEHOLDER_RE.replace_all(html, |caps: &Captures| {
        let id = &caps[2];
        let (cache, replaced, missing) = match &caps[1] {
            "style" => (
                caches.style_cache,
                &mut result.replaced_style_ids,
                &mut result.missing_style_ids,
            ),
            _ => (
                caches.component_cache,
                &mut result.replaced_component_ids,
                &mut result.missing_component_ids,
            ),
        };
        match cache.get(id) {
            Some(fragment) => {
                push_unique(replaced, id);
                fragment.clone()
            }
            None => {
                push_unique(missing, id);
                String::new()
            }
        }
    });
    result.html = expanded.into_owned();

    if result.has_missing() {
        warn!(
            missing_components = ?result.missing_component_ids,
            missing_styles = ?result.missing_style_ids,
            "Placeholders referenced unknown fragments"
        );
    }
    result
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}
