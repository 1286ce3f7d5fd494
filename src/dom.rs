//! Markup parsing – turns an XHTML/HTML payload into a small DOM tree.
//!
//! Chapter markup is parsed with a strict XML parser first (`roxmltree`).
//! EPUB chapters are frequently not well-formed XHTML, so when the strict
//! parser rejects a payload the permissive HTML5 parser (`scraper`, backed by
//! html5ever) takes over. The permissive parser is never run when the strict
//! one succeeds, so the strict result always wins.

use scraper::{ElementRef, Html, Node};

use crate::error::MarkupParseError;

/// Deepest element nesting either parser will convert for a chapter item.
/// The converters recurse, so this has to fit a 2 MiB thread stack in an
/// unoptimized build.
pub const MAX_DEPTH: usize = 128;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// Element names the pipeline treats specially.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Html,
    Head,
    Body,
    Title,
    Script,
    Style,
    Meta,
    Link,
    Noscript,
    P,
    Div,
    Section,
    Article,
    Blockquote,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Ul,
    Ol,
    Li,
    Br,
    Hr,
    Pre,
    Table,
    Tr,
    Td,
    Th,
    Span,
    A,
    Em,
    I,
    Strong,
    B,
    U,
    Sub,
    Sup,
    Code,
    Img,
    /// Anything else, lower-cased.
    Other(String),
}

impl Tag {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "html" => Tag::Html,
            "head" => Tag::Head,
            "body" => Tag::Body,
            "title" => Tag::Title,
            "script" => Tag::Script,
            "style" => Tag::Style,
            "meta" => Tag::Meta,
            "link" => Tag::Link,
            "noscript" => Tag::Noscript,
            "p" => Tag::P,
            "div" => Tag::Div,
            "section" => Tag::Section,
            "article" => Tag::Article,
            "blockquote" => Tag::Blockquote,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "h4" => Tag::H4,
            "h5" => Tag::H5,
            "h6" => Tag::H6,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "br" => Tag::Br,
            "hr" => Tag::Hr,
            "pre" => Tag::Pre,
            "table" => Tag::Table,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "span" => Tag::Span,
            "a" => Tag::A,
            "em" => Tag::Em,
            "i" => Tag::I,
            "strong" => Tag::Strong,
            "b" => Tag::B,
            "u" => Tag::U,
            "sub" => Tag::Sub,
            "sup" => Tag::Sup,
            "code" => Tag::Code,
            "img" => Tag::Img,
            other => Tag::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Tag::Html => "html",
            Tag::Head => "head",
            Tag::Body => "body",
            Tag::Title => "title",
            Tag::Script => "script",
            Tag::Style => "style",
            Tag::Meta => "meta",
            Tag::Link => "link",
            Tag::Noscript => "noscript",
            Tag::P => "p",
            Tag::Div => "div",
            Tag::Section => "section",
            Tag::Article => "article",
            Tag::Blockquote => "blockquote",
            Tag::H1 => "h1",
            Tag::H2 => "h2",
            Tag::H3 => "h3",
            Tag::H4 => "h4",
            Tag::H5 => "h5",
            Tag::H6 => "h6",
            Tag::Ul => "ul",
            Tag::Ol => "ol",
            Tag::Li => "li",
            Tag::Br => "br",
            Tag::Hr => "hr",
            Tag::Pre => "pre",
            Tag::Table => "table",
            Tag::Tr => "tr",
            Tag::Td => "td",
            Tag::Th => "th",
            Tag::Span => "span",
            Tag::A => "a",
            Tag::Em => "em",
            Tag::I => "i",
            Tag::Strong => "strong",
            Tag::B => "b",
            Tag::U => "u",
            Tag::Sub => "sub",
            Tag::Sup => "sup",
            Tag::Code => "code",
            Tag::Img => "img",
            Tag::Other(name) => name,
        }
    }

    /// Elements removed before any text is extracted.
    pub fn is_non_content(&self) -> bool {
        matches!(self, Tag::Script | Tag::Style | Tag::Meta | Tag::Link)
    }

    /// Elements that start a new line of text.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            Tag::Html
                | Tag::Body
                | Tag::P
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
                | Tag::Hr
                | Tag::Pre
                | Tag::Table
                | Tag::Tr
                | Tag::Td
                | Tag::Th
        )
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Tag::Br | Tag::Hr | Tag::Img | Tag::Meta | Tag::Link)
    }

    pub fn heading_level(&self) -> Option<u8> {
        match self {
            Tag::H1 => Some(1),
            Tag::H2 => Some(2),
            Tag::H3 => Some(3),
            Tag::H4 => Some(4),
            Tag::H5 => Some(5),
            Tag::H6 => Some(6),
            _ => None,
        }
    }
}

/// A node in our DOM tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attr("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }
}

/// Which parser produced a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    Strict,
    Permissive,
}

/// A parsed payload together with how it was obtained.
#[derive(Debug, Clone)]
pub struct ParsedMarkup {
    pub nodes: Vec<DomNode>,
    pub parser: ParserKind,
    /// Why the strict parser gave up, when the permissive one was used.
    pub strict_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse markup, falling back to the permissive parser only when the strict
/// parser fails.
pub fn parse_markup(markup: &str) -> Result<ParsedMarkup, MarkupParseError> {
    parse_markup_within(markup, MAX_DEPTH)
}

/// [`parse_markup`] with an explicit nesting limit.
pub fn parse_markup_within(markup: &str, max_depth: usize) -> Result<ParsedMarkup, MarkupParseError> {
    let strict = match parse_strict(markup, max_depth) {
        Ok(nodes) => {
            return Ok(ParsedMarkup {
                nodes,
                parser: ParserKind::Strict,
                strict_error: None,
            })
        }
        Err(e) => e,
    };

    match parse_permissive(markup, max_depth) {
        Ok(nodes) => Ok(ParsedMarkup {
            nodes,
            parser: ParserKind::Permissive,
            strict_error: Some(strict),
        }),
        Err(permissive) => Err(MarkupParseError { strict, permissive }),
    }
}

/// Parse well-formed XHTML as XML.
pub fn parse_strict(markup: &str, max_depth: usize) -> Result<Vec<DomNode>, String> {
    let mut options = roxmltree::ParsingOptions::default();
    options.allow_dtd = true;
    let doc = roxmltree::Document::parse_with_options(markup, options).map_err(|e| e.to_string())?;
    let root = convert_xml_element(doc.root_element(), 0, max_depth)?;
    Ok(vec![DomNode::Element(root)])
}

fn convert_xml_element(node: roxmltree::Node<'_, '_>, depth: usize, max_depth: usize) -> Result<ElementNode, String> {
    if depth > max_depth {
        return Err(format!("elements nested deeper than {max_depth} levels"));
    }
    let mut elem = ElementNode::new(Tag::from_name(node.tag_name().name()));
    elem.attributes = node
        .attributes()
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect();

    for child in node.children() {
        if child.is_element() {
            elem.children
                .push(DomNode::Element(convert_xml_element(child, depth + 1, max_depth)?));
        } else if child.is_text() {
            if let Some(text) = child.text() {
                push_text(&mut elem.children, text);
            }
        }
    }
    Ok(elem)
}

/// Parse arbitrary HTML with html5ever's error recovery.
pub fn parse_permissive(markup: &str, max_depth: usize) -> Result<Vec<DomNode>, String> {
    let document = Html::parse_document(markup);
    let root = convert_html_element(document.root_element(), 0, max_depth)?;
    Ok(vec![DomNode::Element(root)])
}

fn convert_html_element(element: ElementRef<'_>, depth: usize, max_depth: usize) -> Result<ElementNode, String> {
    if depth > max_depth {
        return Err(format!("elements nested deeper than {max_depth} levels"));
    }
    let value = element.value();
    let mut elem = ElementNode::new(Tag::from_name(value.name()));
    elem.attributes = value
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_text(&mut elem.children, &**text),
            Node::Element(_) => {
                if let Some(child_elem) = ElementRef::wrap(child) {
                    elem.children
                        .push(DomNode::Element(convert_html_element(child_elem, depth + 1, max_depth)?));
                }
            }
            _ => {}
        }
    }
    Ok(elem)
}

/// Append text, merging with a preceding text node.
fn push_text(children: &mut Vec<DomNode>, text: &str) {
    if let Some(DomNode::Text(prev)) = children.last_mut() {
        prev.push_str(text);
    } else {
        children.push(DomNode::Text(text.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Tree helpers
// ---------------------------------------------------------------------------

/// Remove `script`, `style`, `meta` and `link` elements everywhere.
pub fn strip_non_content(nodes: &mut Vec<DomNode>) {
    nodes.retain(|n| !matches!(n, DomNode::Element(e) if e.tag.is_non_content()));
    for node in nodes.iter_mut() {
        if let DomNode::Element(e) = node {
            strip_non_content(&mut e.children);
        }
    }
}

/// Find the `<body>` element and return its children, or return all nodes
/// (minus any `<head>`) if no `<body>` is present.
pub fn body_children(nodes: &[DomNode]) -> Vec<DomNode> {
    if let Some(body) = find_element(nodes, &Tag::Body) {
        return body.children.clone();
    }
    let mut out = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) if e.tag == Tag::Head => {}
            DomNode::Element(e) if e.tag == Tag::Html => out.extend(body_children(&e.children)),
            other => out.push(other.clone()),
        }
    }
    out
}

/// Depth-first search for the first element with the given tag.
pub fn find_element<'a>(nodes: &'a [DomNode], tag: &Tag) -> Option<&'a ElementNode> {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if &e.tag == tag {
                return Some(e);
            }
            if let Some(found) = find_element(&e.children, tag) {
                return Some(found);
            }
        }
    }
    None
}

/// Concatenated raw text of a subtree.
pub fn inner_text(nodes: &[DomNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            DomNode::Text(t) => out.push_str(t),
            DomNode::Element(e) => out.push_str(&inner_text(&e.children)),
        }
    }
    out
}
