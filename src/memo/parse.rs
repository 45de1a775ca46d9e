//! Parser adapter: converts `scraper` output into the owned [`tree`](super::tree).

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};

use super::tree::{Document, Element, Node};

static DOCTYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(<!DOCTYPE[^>]*>)").expect("Invalid doctype regex"));

/// Parse `html` as a full document.
///
/// Missing `<html>`, `<head>` and `<body>` elements are synthesized the way
/// a browser would. The doctype is taken verbatim from the source text.
pub fn parse_document(html: &str) -> Document {
    let parsed = Html::parse_document(html);
    let doctype = DOCTYPE_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    let mut document = Document::new(doctype, convert_element(parsed.root_element()));
    let mut seen_root = false;
    for child in parsed.tree.root().children() {
        match child.value() {
            scraper::Node::Element(_) => seen_root = true,
            scraper::Node::Comment(comment) => {
                let node = Node::Comment(comment.comment.as_ref().to_string());
                if seen_root {
                    document.epilogue.push(node);
                } else {
                    document.prologue.push(node);
                }
            }
            _ => {}
        }
    }
    document
}

fn convert_element(node: ElementRef) -> Element {
    let source = node.value();
    let mut element = Element::new(source.name());
    for (name, value) in source.attrs() {
        element.set_attr(name, value);
    }

    for child in node.children() {
        match child.value() {
            scraper::Node::Element(_) => {
                if let Some(child_ref) = ElementRef::wrap(child) {
                    element.children_mut().push(Node::Element(convert_element(child_ref)));
                }
            }
            scraper::Node::Text(text) => {
                element.children_mut().push(Node::Text(text.text.as_ref().to_string()));
            }
            scraper::Node::Comment(comment) => {
                element.children_mut().push(Node::Comment(comment.comment.as_ref().to_string()));
            }
            _ => {}
        }
    }

    element
}
