use std::sync::LazyLock;

use regex::Regex;

use super::{Element, FLOW_TAGS, INLINE_TAGS, RAW_TEXT_TAGS, VOID_TAGS};
use crate::tree::traverse::heading_level;

static BLANK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n[ \t\r]*\n").expect("blank line pattern is valid")
});

/// Parse one markup document into its top-level elements.
///
/// Parsing never fails; malformed constructs are logged and dropped.
pub fn parse_document(source: &str) -> Vec<Element> {
    let mut parser = Parser::new(source);
    let items = parser.parse_content(None);
    group_flow(items)
}

enum Item {
    Text(String),
    Element(Element),
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    index: usize,
    open: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            index: 0,
            open: Vec::new(),
        }
    }

    fn eof(&self) -> bool {
        self.index >= self.bytes.len()
    }

    fn current(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.index + offset).copied()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.index..]
    }

    /// Step over one whole character, never into the middle of one
    fn advance_char(&mut self) {
        self.index += self.rest().chars().next().map_or(1, char::len_utf8);
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_ascii_whitespace() {
                self.index += 1;
            } else {
                break;
            }
        }
    }

    fn skip_past(&mut self, needle: &str) {
        match self.rest().find(needle) {
            Some(offset) => self.index += offset + needle.len(),
            None => self.index = self.bytes.len(),
        }
    }

    fn at_markup(&self) -> bool {
        if self.current() != Some(b'<') {
            return false;
        }
        match self.peek(1) {
            Some(ch) if ch.is_ascii_alphabetic() => true,
            Some(b'/') | Some(b'!') | Some(b'?') => true,
            _ => false,
        }
    }

    fn parse_content(&mut self, closing: Option<&str>) -> Vec<Item> {
        let mut items = Vec::new();
        loop {
            if self.eof() {
                if let Some(name) = closing {
                    tracing::warn!("unterminated <{}> closed at end of document", name);
                }
                break;
            }

            if self.rest().starts_with("<!--") {
                self.skip_past("-->");
                continue;
            }
            if self.rest().starts_with("<?") || self.rest().starts_with("<!") {
                self.skip_past(">");
                continue;
            }

            if self.rest().starts_with("</") {
                let checkpoint = self.index;
                self.index += 2;
                let name = self.read_name();
                self.skip_past(">");
                if Some(name.as_str()) == closing {
                    break;
                }
                if self.open.iter().any(|open| *open == name) {
                    // an ancestor closes; leave its tag for it to consume
                    self.index = checkpoint;
                    if let Some(inner) = closing {
                        tracing::warn!("<{}> implicitly closed by </{}>", inner, name);
                    }
                    break;
                }
                tracing::warn!("dropping unmatched closing tag </{}>", name);
                continue;
            }

            if self.at_markup() {
                items.push(Item::Element(self.parse_element()));
                continue;
            }

            let start = self.index;
            self.index += 1;
            while !self.eof() && !self.at_markup() {
                self.index += 1;
            }
            // the loop only stops on ASCII '<', so the slice is on a char boundary
            items.push(Item::Text(decode_entities(&self.src[start..self.index])));
        }
        items
    }

    fn read_name(&mut self) -> String {
        let start = self.index;
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphanumeric() || matches!(ch, b'-' | b'_' | b':' | b'.') {
                self.index += 1;
            } else {
                break;
            }
        }
        self.src[start..self.index].to_ascii_lowercase()
    }

    fn read_attr_name(&mut self) -> String {
        let start = self.index;
        while let Some(ch) = self.current() {
            if ch.is_ascii_alphanumeric() || matches!(ch, b'-' | b'_' | b':' | b'.' | b'@') {
                self.index += 1;
            } else {
                break;
            }
        }
        self.src[start..self.index].to_string()
    }

    fn read_attr_value(&mut self) -> String {
        match self.current() {
            Some(quote @ (b'"' | b'\'')) => {
                self.index += 1;
                let start = self.index;
                while let Some(ch) = self.current() {
                    if ch == quote {
                        break;
                    }
                    self.index += 1;
                }
                let value = decode_entities(&self.src[start..self.index]);
                if !self.eof() {
                    self.index += 1;
                }
                value
            }
            _ => {
                let start = self.index;
                while let Some(ch) = self.current() {
                    if ch.is_ascii_whitespace() || ch == b'>' || (ch == b'/' && self.peek(1) == Some(b'>')) {
                        break;
                    }
                    self.index += 1;
                }
                decode_entities(&self.src[start..self.index])
            }
        }
    }

    fn parse_element(&mut self) -> Element {
        // consume '<'
        self.index += 1;
        let kind = self.read_name();
        let mut element = Element::new(kind.clone());
        let mut self_closing = false;

        loop {
            self.skip_ws();
            match self.current() {
                None => {
                    tracing::warn!("unterminated start tag <{}>", kind);
                    return element;
                }
                Some(b'>') => {
                    self.index += 1;
                    break;
                }
                Some(b'/') if self.peek(1) == Some(b'>') => {
                    self.index += 2;
                    self_closing = true;
                    break;
                }
                Some(_) => {
                    let name = self.read_attr_name();
                    if name.is_empty() {
                        tracing::warn!("skipping malformed attribute in <{}>", kind);
                        self.advance_char();
                        continue;
                    }
                    self.skip_ws();
                    let value = if self.current() == Some(b'=') {
                        self.index += 1;
                        self.skip_ws();
                        self.read_attr_value()
                    } else {
                        String::new()
                    };
                    match element.attrs.iter_mut().find(|(key, _)| *key == name) {
                        Some(existing) => existing.1 = value,
                        None => element.attrs.push((name, value)),
                    }
                }
            }
        }

        if self_closing || VOID_TAGS.contains(&kind.as_str()) {
            return element;
        }

        if RAW_TEXT_TAGS.contains(&kind.as_str()) {
            let closing = format!("</{}", kind);
            let lowered = self.rest().to_ascii_lowercase();
            let (content, consumed) = match lowered.find(&closing) {
                Some(offset) => (&self.rest()[..offset], offset),
                None => {
                    tracing::warn!("unterminated <{}> closed at end of document", kind);
                    (self.rest(), self.rest().len())
                }
            };
            if !content.trim().is_empty() {
                element.children.push(Element::text(content.to_string()));
            }
            self.index += consumed;
            if !self.eof() {
                self.skip_past(">");
            }
            return element;
        }

        self.open.push(kind.clone());
        let items = self.parse_content(Some(&kind));
        self.open.pop();

        element.children = if FLOW_TAGS.contains(&kind.as_str()) {
            group_flow(items)
        } else {
            items
                .into_iter()
                .map(|item| match item {
                    Item::Text(text) => Element::text(text),
                    Item::Element(element) => element,
                })
                .collect()
        };
        element
    }
}

/// Gather loose text and inline elements into implicit paragraphs and headings.
fn group_flow(items: Vec<Item>) -> Vec<Element> {
    let mut out = Vec::new();
    let mut pending: Vec<Element> = Vec::new();

    for item in items {
        match item {
            Item::Element(element) if INLINE_TAGS.contains(&element.kind.as_str()) => {
                pending.push(element);
            }
            Item::Element(element) => {
                flush_paragraph(&mut pending, &mut out);
                out.push(element);
            }
            Item::Text(text) => {
                let segments: Vec<&str> = BLANK_LINE.split(&text).collect();
                for (position, segment) in segments.iter().enumerate() {
                    if position > 0 {
                        flush_paragraph(&mut pending, &mut out);
                    }
                    let mut buffer = String::new();
                    for line in segment.split_inclusive('\n') {
                        if let Some((level, title)) = heading_line(line) {
                            if !buffer.is_empty() {
                                pending.push(Element::text(std::mem::take(&mut buffer)));
                            }
                            flush_paragraph(&mut pending, &mut out);
                            out.push(
                                Element::new(format!("h{}", level)).with_child(Element::text(title)),
                            );
                        } else {
                            buffer.push_str(line);
                        }
                    }
                    if !buffer.is_empty() {
                        pending.push(Element::text(buffer));
                    }
                }
            }
        }
    }
    flush_paragraph(&mut pending, &mut out);
    out
}

fn heading_line(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim();
    let hashes = trimmed.bytes().take_while(|ch| *ch == b'#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let title = trimmed[hashes..].strip_prefix(' ')?;
    let level = hashes;
    heading_level(&format!("h{}", level))?;
    Some((level, title.trim().to_string()))
}

fn flush_paragraph(pending: &mut Vec<Element>, out: &mut Vec<Element>) {
    if pending.is_empty() {
        return;
    }
    let mut pieces = std::mem::take(pending);
    let has_content = pieces
        .iter()
        .any(|piece| !piece.is_text() || !piece.text.trim().is_empty());
    if !has_content {
        return;
    }
    if let Some(first) = pieces.first_mut().filter(|piece| piece.is_text()) {
        first.text = first.text.trim_start().to_string();
    }
    if let Some(last) = pieces.last_mut().filter(|piece| piece.is_text()) {
        last.text = last.text.trim_end().to_string();
    }
    pieces.retain(|piece| !(piece.is_text() && piece.text.is_empty()));
    let mut paragraph = Element::new("p");
    paragraph.children = pieces;
    out.push(paragraph);
}

/// Decode the handful of entities authors realistically type
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(elements: &[Element]) -> Vec<&str> {
        elements.iter().map(|element| element.kind.as_str()).collect()
    }

    #[test]
    fn test_parses_nested_elements_and_attributes() {
        let doc = parse_document(r#"<div id="a" flag><p voice='x'>Hi &amp; bye</p></div>"#);
        assert_eq!(kinds(&doc), vec!["div"]);
        let div = &doc[0];
        assert_eq!(div.attr("id"), Some("a"));
        assert_eq!(div.attr("flag"), Some(""));
        let para = &div.children[0];
        assert_eq!(para.attr("voice"), Some("x"));
        assert_eq!(para.children[0].text, "Hi & bye");
    }

    #[test]
    fn test_loose_text_becomes_paragraphs_and_headings() {
        let doc = parse_document("# Title\nFirst line\nstill first\n\nSecond <b>bold</b> end\n<input/>");
        assert_eq!(kinds(&doc), vec!["h1", "p", "p", "input"]);
        assert_eq!(doc[0].children[0].text, "Title");
        assert_eq!(doc[1].children[0].text, "First line\nstill first");
        assert_eq!(kinds(&doc[2].children), vec!["#text", "b", "#text"]);
        assert_eq!(doc[2].children[2].text, " end");
    }

    #[test]
    fn test_raw_text_tags_keep_content() {
        let doc = parse_document("<script>if (a < b) { x = '<p>'; }</script>");
        assert_eq!(doc[0].kind, "script");
        assert_eq!(doc[0].children[0].text, "if (a < b) { x = '<p>'; }");
    }

    #[test]
    fn test_tag_names_lowercase_and_namespaced() {
        let doc = parse_document(r#"<LLM:Text key="out">Say hi</LLM:Text>"#);
        assert_eq!(doc[0].kind, "llm:text");
        assert_eq!(doc[0].children[0].text, "Say hi");
    }

    #[test]
    fn test_malformed_markup_is_tolerated() {
        let doc = parse_document("<div><p>open</div></span><p>after</p>");
        assert_eq!(kinds(&doc), vec!["div", "p"]);
        assert_eq!(doc[0].children[0].kind, "p");
        let unterminated = parse_document("<section><p>never closed");
        assert_eq!(kinds(&unterminated), vec!["section"]);
    }

    #[test]
    fn test_non_ascii_attribute_names_are_skipped() {
        let doc = parse_document("<p \u{201c}voice\u{201d}=\"guard\">Halt</p><p caf\u{e9}=\"x\" id=\"b\">On</p>");
        assert_eq!(kinds(&doc), vec!["p", "p"]);
        assert_eq!(doc[0].attr("voice"), Some(""));
        assert_eq!(doc[0].children[0].text, "Halt");
        assert_eq!(doc[1].attr("id"), Some("b"));
        assert_eq!(doc[1].children[0].text, "On");
    }

    #[test]
    fn test_comments_and_stray_angles() {
        let doc = parse_document("<!-- note -->a < b");
        assert_eq!(kinds(&doc), vec!["p"]);
        assert_eq!(doc[0].children[0].text, "a < b");
    }
}
