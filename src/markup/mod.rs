//! Story markup model and parser
//!
//! Markup is lenient, XML-flavoured text. The parser produces an owned
//! [`Element`] forest per document; the compiler grafts it into the arena.

pub mod parser;

pub use parser::parse_document;

use crate::tree::TEXT_KIND;

/// Tags whose inner content is kept verbatim
pub const RAW_TEXT_TAGS: &[&str] = &["script", "code", "data", "style"];

/// Tags that never have content
pub const VOID_TAGS: &[&str] = &["br", "img", "hr"];

/// Inline tags that stay inside an implicit paragraph
pub const INLINE_TAGS: &[&str] = &["b", "strong", "i", "em", "a", "img", "span", "when", "br"];

/// Tags whose loose text is gathered into implicit paragraphs
pub const FLOW_TAGS: &[&str] = &[
    "root", "div", "section", "sec", "origin", "intro", "outro", "resume", "block", "scope",
    "while", "if", "else", "article", "main", "chapter", "body", "header", "footer", "ul", "ol",
    "macro", "append", "prepend", "replace",
];

/// Parsed element prior to addressing
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    /// Lower-cased tag name or `#text`
    pub kind: String,
    /// Attributes in source order
    pub attrs: Vec<(String, String)>,
    /// Child elements
    pub children: Vec<Element>,
    /// Text content for `#text` elements
    pub text: String,
}

impl Element {
    /// Create an empty element
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Create a raw text element
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: TEXT_KIND.to_string(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// Builder-style child append
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Attribute lookup
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether this is a text run
    pub fn is_text(&self) -> bool {
        self.kind == TEXT_KIND
    }
}
