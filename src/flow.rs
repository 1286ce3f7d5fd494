//! Flow lowering – both layout modes become one list of styled text blocks
//! in reading order, which is all the layout engine understands.
//!
//! Block layout: each [`LayoutBlock`] maps onto one named style. HTML layout:
//! the composed document is parsed, its `<style>` sheets are applied, and
//! every block-level element whose content is inline becomes one flow block
//! (inline formatting is flattened into the block's text).

use html_escape::decode_html_entities;

use crate::book::LayoutBlock;
use crate::compose::CHAPTER_WRAPPER_DEPTH;
use crate::config::PageGeometry;
use crate::dom::{find_element, parse_markup_within, strip_non_content, DomNode, ElementNode, Tag, MAX_DEPTH};
use crate::error::RenderError;
use crate::normalize::collapse_whitespace;
use crate::style::{BlockStyles, Stylesheet, TextStyle};

/// One block of text in document flow.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowBlock {
    /// Plain text to draw; `\n` is a hard line break.
    pub text: String,
    pub style: TextStyle,
    /// Minimum height in points, for spacers and rules.
    pub min_height: f32,
}

impl FlowBlock {
    pub fn text(text: impl Into<String>, style: TextStyle) -> Self {
        Self {
            text: text.into(),
            style,
            min_height: 0.0,
        }
    }

    pub fn spacer(height: f32) -> Self {
        Self {
            text: String::new(),
            style: TextStyle::default(),
            min_height: height,
        }
    }
}

/// Lower the block sequence using the named styles. A page break becomes a
/// break before the next block; a trailing break has nothing to act on.
pub fn blocks_to_flow(blocks: &[LayoutBlock], styles: &BlockStyles) -> Vec<FlowBlock> {
    let mut flow = Vec::with_capacity(blocks.len());
    let mut pending_break = false;

    for block in blocks {
        let mut lowered = match block {
            LayoutBlock::TitleBlock(title) => FlowBlock::text(title.as_str(), styles.title.clone()),
            LayoutBlock::AuthorBlock(author) => FlowBlock::text(format!("by {author}"), styles.author.clone()),
            LayoutBlock::ChapterHeading(n) => FlowBlock::text(format!("Chapter {n}"), styles.chapter_heading.clone()),
            LayoutBlock::Paragraph(text) => FlowBlock::text(decode_html_entities(text), styles.body.clone()),
            LayoutBlock::Spacer(height) => FlowBlock::spacer(*height),
            LayoutBlock::PageBreak => {
                pending_break = true;
                continue;
            }
        };
        lowered.style.page_break_before |= std::mem::take(&mut pending_break);
        flow.push(lowered);
    }
    flow
}

/// A lowered HTML document.
#[derive(Debug, Clone)]
pub struct HtmlFlow {
    pub blocks: Vec<FlowBlock>,
    /// `base` with any `@page` rule applied.
    pub page: PageGeometry,
}

/// Lower a complete HTML document with embedded `<style>` elements.
///
/// Any chapter fragment that parsed on its own also parses here once
/// wrapped by the composer.
pub fn html_to_flow(html: &str, base: PageGeometry) -> Result<HtmlFlow, RenderError> {
    let mut nodes = parse_markup_within(html, MAX_DEPTH + CHAPTER_WRAPPER_DEPTH)?.nodes;

    let mut sheet = Stylesheet::default();
    for css in style_texts(&nodes) {
        sheet.extend(Stylesheet::parse(&css)?);
    }
    strip_non_content(&mut nodes);

    let page = sheet.page.as_ref().map_or(base, |rule| rule.geometry(base));
    let mut builder = FlowBuilder::new(&sheet);
    match find_element(&nodes, &Tag::Body) {
        Some(body) => {
            let style = sheet.resolve(&body.tag, &body.classes(), &TextStyle::default());
            builder.element(body, style);
        }
        None => {
            let style = sheet.resolve(&Tag::Body, &[], &TextStyle::default());
            builder.children(&nodes, &style);
        }
    }
    Ok(HtmlFlow {
        blocks: builder.blocks,
        page,
    })
}

/// Text of every `<style>` element, in document order.
fn style_texts(nodes: &[DomNode]) -> Vec<String> {
    let mut out = Vec::new();
    for node in nodes {
        if let DomNode::Element(e) = node {
            if e.tag == Tag::Style {
                out.push(crate::dom::inner_text(&e.children));
            } else {
                out.extend(style_texts(&e.children));
            }
        }
    }
    out
}

struct FlowBuilder<'a> {
    sheet: &'a Stylesheet,
    blocks: Vec<FlowBlock>,
    pending_break: bool,
    pending_margin: f32,
    indent_left: f32,
    indent_right: f32,
    /// `None` for bullets, `Some(n)` for the last number used.
    lists: Vec<Option<usize>>,
    pending_marker: Option<String>,
}

impl<'a> FlowBuilder<'a> {
    fn new(sheet: &'a Stylesheet) -> Self {
        Self {
            sheet,
            blocks: Vec::new(),
            pending_break: false,
            pending_margin: 0.0,
            indent_left: 0.0,
            indent_right: 0.0,
            lists: Vec::new(),
            pending_marker: None,
        }
    }

    /// Walk mixed content: inline runs become anonymous blocks in the
    /// parent's style.
    fn children(&mut self, nodes: &[DomNode], parent: &TextStyle) {
        let mut run: Vec<&DomNode> = Vec::new();
        for node in nodes {
            match node {
                DomNode::Element(e) if e.tag.is_block() => {
                    self.inline_run(&run, parent);
                    run.clear();
                    let style = self.sheet.resolve(&e.tag, &e.classes(), parent);
                    self.element(e, style);
                }
                other => run.push(other),
            }
        }
        self.inline_run(&run, parent);
    }

    fn inline_run(&mut self, run: &[&DomNode], parent: &TextStyle) {
        let mut raw = String::new();
        for node in run {
            collect_inline(node, &mut raw, false);
        }
        let text = collapse_whitespace(&raw);
        if !text.is_empty() {
            self.emit(text, parent.inherit());
        }
    }

    fn element(&mut self, el: &ElementNode, style: TextStyle) {
        if style.page_break_before {
            self.pending_break = true;
        }
        if el.tag == Tag::Li {
            self.pending_marker = Some(match self.lists.last_mut() {
                Some(Some(n)) => {
                    *n += 1;
                    format!("{n}. ")
                }
                _ => "\u{2022} ".to_string(),
            });
        }

        if el.tag == Tag::Hr {
            let mut rule = style.clone();
            rule.margin_top += self.pending_margin;
            self.pending_margin = 0.0;
            self.push(FlowBlock {
                text: String::new(),
                style: rule,
                min_height: 1.0,
            });
        } else if has_block_descendant(&el.children) {
            let pushed_list = matches!(el.tag, Tag::Ul | Tag::Ol);
            if pushed_list {
                self.lists.push((el.tag == Tag::Ol).then_some(0));
            }
            self.pending_margin += style.margin_top;
            self.indent_left += style.margin_left;
            self.indent_right += style.margin_right;

            self.children(&el.children, &style);

            self.indent_left -= style.margin_left;
            self.indent_right -= style.margin_right;
            self.pending_margin += style.margin_bottom;
            if pushed_list {
                self.lists.pop();
            }
        } else {
            let in_pre = el.tag == Tag::Pre;
            let mut raw = String::new();
            for child in &el.children {
                collect_inline(child, &mut raw, in_pre);
            }
            let text = if in_pre {
                raw.trim_matches('\n').to_string()
            } else {
                collapse_whitespace(&raw)
            };
            if !text.is_empty() {
                self.emit(text, style.clone());
            } else {
                // Empty elements still contribute their spacing.
                self.pending_margin += style.margin_top + style.margin_bottom;
            }
        }

        if style.page_break_after {
            self.pending_break = true;
        }
    }

    fn emit(&mut self, text: String, mut style: TextStyle) {
        let text = match self.pending_marker.take() {
            Some(marker) => format!("{marker}{text}"),
            None => text,
        };
        style.margin_top += self.pending_margin;
        self.pending_margin = 0.0;
        self.push(FlowBlock::text(text, style));
    }

    fn push(&mut self, mut block: FlowBlock) {
        block.style.margin_left += self.indent_left;
        block.style.margin_right += self.indent_right;
        block.style.page_break_before = std::mem::take(&mut self.pending_break);
        block.style.page_break_after = false;
        self.blocks.push(block);
    }
}

fn has_block_descendant(nodes: &[DomNode]) -> bool {
    nodes.iter().any(|n| match n {
        DomNode::Element(e) => e.tag.is_block() || has_block_descendant(&e.children),
        DomNode::Text(_) => false,
    })
}

fn collect_inline(node: &DomNode, out: &mut String, in_pre: bool) {
    match node {
        DomNode::Text(t) if in_pre => out.push_str(t),
        DomNode::Text(t) => out.extend(t.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c })),
        DomNode::Element(e) if e.tag == Tag::Br => out.push('\n'),
        DomNode::Element(e) if e.tag == Tag::Img => {}
        DomNode::Element(e) => {
            for child in &e.children {
                collect_inline(child, out, in_pre || e.tag == Tag::Pre);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::stylesheet;
    use crate::style::{FontFamily, TextAlign};

    #[test]
    fn block_lowering_uses_named_styles() {
        let blocks = vec![
            LayoutBlock::TitleBlock("T".into()),
            LayoutBlock::AuthorBlock("A".into()),
            LayoutBlock::PageBreak,
            LayoutBlock::ChapterHeading(1),
            LayoutBlock::Spacer(14.4),
            LayoutBlock::Paragraph("Fish &amp; chips".into()),
            LayoutBlock::PageBreak,
        ];
        let styles = BlockStyles::default();
        let flow = blocks_to_flow(&blocks, &styles);
        assert_eq!(flow.len(), 5);
        assert_eq!(flow[1].text, "by A");
        assert!(flow[2].style.page_break_before);
        assert_eq!(flow[2].text, "Chapter 1");
        assert_eq!(flow[3].min_height, 14.4);
        assert_eq!(flow[4].text, "Fish & chips");
        assert_eq!(flow[4].style.text_align, TextAlign::Justify);
        assert!(!flow[4].style.page_break_before);
    }

    #[test]
    fn html_lowering_applies_embedded_stylesheet() {
        let page = PageGeometry::with_margin(400.0, 600.0, 36.0);
        let html = format!(
            "<!DOCTYPE html><html><head><style>{}</style></head><body>\
             <div class=\"title-page\"><h1 class=\"book-title\">Book</h1>\
             <p class=\"book-author\">by Someone</p></div>\
             <h2 class=\"chapter-heading\">Chapter 1</h2>\
             <p>Some <em>inline</em> text.</p></body></html>",
            stylesheet(&page)
        );
        let flow = html_to_flow(&html, PageGeometry::a4()).unwrap();
        assert_eq!(flow.page, page);

        let texts: Vec<&str> = flow.blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["Book", "by Someone", "Chapter 1", "Some inline text."]);
        assert_eq!(flow.blocks[0].style.margin_top, 144.0);
        assert!(flow.blocks[2].style.page_break_before);
        assert!(!flow.blocks[3].style.page_break_before);
        assert_eq!(flow.blocks[3].style.font_family, FontFamily::Times);
    }

    #[test]
    fn lists_get_markers() {
        let html = "<html><body><ul><li>a</li><li>b</li></ul><ol><li>one</li><li>two</li></ol></body></html>";
        let flow = html_to_flow(html, PageGeometry::a4()).unwrap();
        let texts: Vec<&str> = flow.blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["\u{2022} a", "\u{2022} b", "1. one", "2. two"]);
        assert_eq!(flow.blocks[0].style.margin_left, 24.0);
    }

    #[test]
    fn mixed_content_becomes_anonymous_blocks() {
        let html = "<html><body><div>loose text<p>para</p>tail<br/>line</div></body></html>";
        let flow = html_to_flow(html, PageGeometry::a4()).unwrap();
        let texts: Vec<&str> = flow.blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["loose text", "para", "tail\nline"]);
    }

    #[test]
    fn broken_stylesheet_is_a_render_error() {
        let html = "<html><head><style>p { color: red</style></head><body><p>x</p></body></html>";
        assert!(matches!(
            html_to_flow(html, PageGeometry::a4()),
            Err(RenderError::Stylesheet(_))
        ));
    }
}
