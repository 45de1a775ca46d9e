//! Minimal owned HTML tree.
//!
//! The memoizer rewrites attributes and serializes subtrees; it never needs
//! the parser's arena, so documents are converted into this plain structure
//! once and handled as ordinary values from there on.

/// Elements with no end tag and no children.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text content is serialized without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out, false);
        out
    }

    fn write_to(&self, out: &mut String, raw_text: bool) {
        match self {
            Node::Element(element) => element.write_to(out),
            Node::Text(text) if raw_text => out.push_str(text),
            Node::Text(text) => escape_text(text, out),
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Set an attribute, keeping its position if it already exists.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.tag.as_str())
    }

    /// Outer HTML of this element.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attrs {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            escape_attr(value, out);
            out.push('"');
        }
        out.push('>');

        if self.is_void() {
            return;
        }

        let raw_text = RAW_TEXT_ELEMENTS.contains(&self.tag.as_str());
        for child in &self.children {
            child.write_to(out, raw_text);
        }

        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

/// A parsed document: the doctype text as written, plus the root element.
///
/// `prologue` and `epilogue` hold document-level nodes (comments) found
/// before and after the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub doctype: Option<String>,
    pub prologue: Vec<Node>,
    pub root: Element,
    pub epilogue: Vec<Node>,
}

impl Document {
    pub fn new(doctype: Option<String>, root: Element) -> Self {
        Self {
            doctype,
            prologue: Vec::new(),
            root,
            epilogue: Vec::new(),
        }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        if let Some(doctype) = &self.doctype {
            out.push_str(doctype);
        }
        for node in &self.prologue {
            node.write_to(&mut out, false);
        }
        self.root.write_to(&mut out);
        for node in &self.epilogue {
            node.write_to(&mut out, false);
        }
        out
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}
