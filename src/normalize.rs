//! Text normalizer – reduces a chapter's DOM to clean text (block layout) or
//! sanitized structural HTML (HTML layout).

use crate::config::LayoutMode;
use crate::dom::{body_children, parse_markup, strip_non_content, DomNode, ParsedMarkup, ParserKind, Tag};
use crate::error::MarkupParseError;

/// Result of normalizing one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Plain text or HTML fragment, depending on the layout mode.
    pub content: String,
    /// Length of the visible text in characters, used for length filtering.
    pub visible_chars: usize,
    /// Whether a character budget cut the content short.
    pub truncated: bool,
    pub parser: ParserKind,
    pub strict_error: Option<String>,
}

/// Normalize a markup payload for the given layout mode.
pub fn normalize(markup: &str, mode: LayoutMode) -> Result<String, MarkupParseError> {
    normalize_with_budget(markup, mode, None).map(|n| n.content)
}

/// Like [`normalize`], but stops emitting content once `budget` visible
/// characters have been produced. The caller appends its own marker.
pub fn normalize_with_budget(
    markup: &str,
    mode: LayoutMode,
    budget: Option<usize>,
) -> Result<Normalized, MarkupParseError> {
    let ParsedMarkup {
        mut nodes,
        parser,
        strict_error,
    } = parse_markup(markup)?;
    strip_non_content(&mut nodes);
    let body = body_children(&nodes);

    let text = plain_text(&body);
    let visible_chars = text.chars().count();

    let (content, truncated) = match mode {
        LayoutMode::Blocks => match budget {
            Some(max) if visible_chars > max => (take_chars(&text, max).to_string(), true),
            _ => (text, false),
        },
        LayoutMode::Html => {
            let mut writer = HtmlWriter::new(budget);
            writer.write_nodes(&body, false);
            (writer.out.trim().to_string(), writer.truncated)
        }
    };

    Ok(Normalized {
        content,
        visible_chars,
        truncated,
        parser,
        strict_error,
    })
}

// ---------------------------------------------------------------------------
// Plain text
// ---------------------------------------------------------------------------

/// Visible text with a blank line between block elements, whitespace runs
/// collapsed to single spaces and surrounding whitespace trimmed.
pub fn plain_text(nodes: &[DomNode]) -> String {
    let mut raw = String::new();
    collect_text(nodes, &mut raw, false);
    collapse_whitespace(&raw)
}

fn collect_text(nodes: &[DomNode], out: &mut String, in_pre: bool) {
    for node in nodes {
        match node {
            DomNode::Text(t) if in_pre => out.push_str(t),
            DomNode::Text(t) => out.extend(t.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c })),
            DomNode::Element(e) if e.tag == Tag::Br => out.push('\n'),
            DomNode::Element(e) if e.tag.is_block() => {
                out.push_str("\n\n");
                collect_text(&e.children, out, in_pre || e.tag == Tag::Pre);
                out.push_str("\n\n");
            }
            DomNode::Element(e) => collect_text(&e.children, out, in_pre),
        }
    }
}

/// Collapse whitespace inside each line and runs of blank lines to a single
/// blank line.
pub fn collapse_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_blank = false;
    for line in raw.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_blank { "\n\n" } else { "\n" });
        }
        pending_blank = false;
        out.push_str(&words.join(" "));
    }
    out
}

/// The first `n` characters of `s`.
pub fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Structural HTML
// ---------------------------------------------------------------------------

/// Structural elements kept in the HTML output. Everything else is unwrapped
/// (its children are kept) except images and the document head.
fn is_structural(tag: &Tag) -> bool {
    matches!(
        tag,
        Tag::P
            | Tag::Div
            | Tag::Section
            | Tag::Article
            | Tag::Blockquote
            | Tag::H1
            | Tag::H2
            | Tag::H3
            | Tag::H4
            | Tag::H5
            | Tag::H6
            | Tag::Ul
            | Tag::Ol
            | Tag::Li
            | Tag::Br
            | Tag::Hr
            | Tag::Pre
            | Tag::Table
            | Tag::Tr
            | Tag::Td
            | Tag::Th
            | Tag::Em
            | Tag::I
            | Tag::Strong
            | Tag::B
            | Tag::U
            | Tag::Sub
            | Tag::Sup
            | Tag::Code
    )
}

struct HtmlWriter {
    out: String,
    remaining: Option<usize>,
    truncated: bool,
}

impl HtmlWriter {
    fn new(budget: Option<usize>) -> Self {
        Self {
            out: String::new(),
            remaining: budget,
            truncated: false,
        }
    }

    fn write_nodes(&mut self, nodes: &[DomNode], in_pre: bool) {
        for node in nodes {
            if self.truncated {
                return;
            }
            match node {
                DomNode::Text(t) => self.write_text(t, in_pre),
                DomNode::Element(e) => self.write_element(&e.tag, &e.children, in_pre),
            }
        }
    }

    fn write_text(&mut self, text: &str, in_pre: bool) {
        let text = if in_pre {
            text.to_string()
        } else {
            collapse_inline(text)
        };
        let visible = text.chars().count();
        let text = match self.remaining {
            Some(rem) if visible > rem => {
                self.truncated = true;
                self.remaining = Some(0);
                take_chars(&text, rem).to_string()
            }
            Some(rem) => {
                self.remaining = Some(rem - visible);
                text
            }
            None => text,
        };
        self.out.push_str(&html_escape::encode_text(&text));
    }

    fn write_element(&mut self, tag: &Tag, children: &[DomNode], in_pre: bool) {
        match tag {
            Tag::Img | Tag::Head | Tag::Title => {}
            Tag::Br | Tag::Hr => {
                self.out.push_str(&format!("<{}/>", tag.name()));
            }
            t if is_structural(t) => {
                let start = self.out.len();
                self.out.push_str(&format!("<{}>", t.name()));
                let inner_start = self.out.len();
                self.write_nodes(children, in_pre || *t == Tag::Pre);
                if self.out[inner_start..].trim().is_empty() {
                    // Drop elements that ended up empty.
                    self.out.truncate(start);
                    return;
                }
                self.out.push_str(&format!("</{}>", t.name()));
                if t.is_block() {
                    self.out.push('\n');
                }
            }
            _ => self.write_nodes(children, in_pre),
        }
    }
}

/// Collapse whitespace runs to single spaces, keeping a leading or trailing
/// space so adjacent inline text stays separated.
fn collapse_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() && c != '\u{a0}' {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}
