//! Fragment id assignment and cache extraction.

use std::collections::HashSet;

use tracing::debug;

use super::parse::parse_document;
use super::tree::{Element, Node};
use super::{COMPONENT_ID_ATTR, STATE_SCRIPT_ATTR, STYLE_ID_ATTR};
use crate::session::FragmentCache;

/// Body-level tags that become reusable components.
const COMPONENT_TAGS: &[&str] = &["header", "footer", "nav", "main", "aside", "section", "div"];

/// Prefixes for generated fragment ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdPrefixes {
    pub component: String,
    pub style: String,
}

impl Default for IdPrefixes {
    fn default() -> Self {
        Self {
            component: "sl-gen-".to_string(),
            style: "sl-style-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareOptions {
    pub next_component_id: u64,
    pub next_style_id: u64,
    pub id_prefixes: IdPrefixes,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            next_component_id: 1,
            next_style_id: 1,
            id_prefixes: IdPrefixes::default(),
        }
    }
}

/// An annotated document and the fragments extracted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDocument {
    pub html: String,
    pub component_cache: FragmentCache,
    pub style_cache: FragmentCache,
    pub next_component_id: u64,
    pub next_style_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Document,
    Html,
    Head,
    InsideHead,
    Body,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Component,
    Style,
}

fn role_of(element: &Element, scope: Scope) -> Option<Role> {
    let tag = element.tag();
    if tag == "script" {
        return (!element.has_attr(STATE_SCRIPT_ATTR)).then_some(Role::Component);
    }
    match (scope, tag) {
        (Scope::Document, "html") | (Scope::Html, "head") | (Scope::Html, "body") => {
            Some(Role::Component)
        }
        (Scope::Head, "style") => Some(Role::Style),
        (Scope::Body, tag) if COMPONENT_TAGS.contains(&tag) => Some(Role::Component),
        _ => None,
    }
}

fn child_scope(element: &Element, scope: Scope) -> Scope {
    match (scope, element.tag()) {
        (Scope::Document, "html") => Scope::Html,
        (Scope::Html, "head") => Scope::Head,
        (Scope::Html, "body") => Scope::Body,
        (Scope::Head, _) | (Scope::InsideHead, _) => Scope::InsideHead,
        (Scope::Body, _) => Scope::Body,
        _ => Scope::Other,
    }
}

/// Visit eligible elements in document order, parents before children.
fn walk(element: &mut Element, scope: Scope, visit: &mut impl FnMut(&mut Element, Role)) {
    if let Some(role) = role_of(element, scope) {
        visit(element, role);
    }
    let inner = child_scope(element, scope);
    for child in element.children_mut() {
        if let Node::Element(child) = child {
            walk(child, inner, visit);
        }
    }
}

fn collect_ids(element: &Element, ids: &mut HashSet<String>) {
    for attr in [COMPONENT_ID_ATTR, STYLE_ID_ATTR] {
        if let Some(id) = element.attr(attr) {
            ids.insert(id.to_string());
        }
    }
    for child in element.children().iter().filter_map(Node::as_element) {
        collect_ids(child, ids);
    }
}

struct IdAllocator<'a> {
    prefix: &'a str,
    next: u64,
    taken: &'a HashSet<String>,
}

impl IdAllocator<'_> {
    fn allocate(&mut self) -> String {
        loop {
            let id = format!("{}{}", self.prefix, self.next);
            self.next += 1;
            if !self.taken.contains(&id) {
                return id;
            }
        }
    }
}

/// Assign stable ids to reusable fragments of `html` and cache each one.
///
/// Elements that already carry an id keep it. Generated ids skip any value
/// already present in the document. The cache holds the fully annotated
/// markup of every identified fragment; when an id repeats, the first
/// occurrence wins.
pub fn prepare_reusable_caches(html: &str, options: &PrepareOptions) -> PreparedDocument {
    let mut document = parse_document(html);

    let mut taken = HashSet::new();
    collect_ids(&document.root, &mut taken);

    let mut components = IdAllocator {
        prefix: &options.id_prefixes.component,
        next: options.next_component_id.max(1),
        taken: &taken,
    };
    let mut styles = IdAllocator {
        prefix: &options.id_prefixes.style,
        next: options.next_style_id.max(1),
        taken: &taken,
    };

    walk(&mut document.root, Scope::Document, &mut |element: &mut Element, role: Role| {
        let (attr, allocator) = match role {
            Role::Component => (COMPONENT_ID_ATTR, &mut components),
            Role::Style => (STYLE_ID_ATTR, &mut styles),
        };
        let has_id = element.attr(attr).is_some_and(|id| !id.trim().is_empty());
        if !has_id {
            element.set_attr(attr, allocator.allocate());
        }
    });

    let next_component_id = components.next;
    let next_style_id = styles.next;

    let mut component_cache = FragmentCache::new();
    let mut style_cache = FragmentCache::new();
    walk(&mut document.root, Scope::Document, &mut |element: &mut Element, role: Role| {
        let (attr, cache) = match role {
            Role::Component => (COMPONENT_ID_ATTR, &mut component_cache),
            Role::Style => (STYLE_ID_ATTR, &mut style_cache),
        };
        if let Some(id) = element.attr(attr) {
            if !cache.contains_key(id) {
                cache.insert(id.to_string(), element.serialize());
            }
        }
    });

    debug!(
        components = component_cache.len(),
        styles = style_cache.len(),
        next_component_id,
        next_style_id,
        "Prepared reusable caches"
    );

    PreparedDocument {
        html: document.serialize(),
        component_cache,
        style_cache,
        next_component_id,
        next_style_id,
    }
}
