//! Pagination – splits a flat list of positioned boxes into pages.
//!
//! Handles:
//! - page boundaries from the page geometry
//! - page-break-before hints (never producing an empty page)
//! - splitting text blocks between lines when they cross a page boundary
//! - per-line alignment offsets and justification widths

use crate::config::PageGeometry;
use crate::fonts::{FontKey, FontManager, WrappedLine};
use crate::layout::PositionedBox;
use crate::layout_config::*;
use crate::style::TextAlign;

/// Tolerance for floating-point line fitting.
const FIT_EPSILON: f32 = 1e-3;

struct Paginator<'a> {
    config: LayoutConfig,
    current: PageLayout,
    /// Document-space y at which the current page begins. Every
    /// `PositionedBox.y` is a document-space absolute, so
    /// `pbox.y - page_start_doc_y` is its y-on-page.
    page_start_doc_y: f32,
    page: &'a PageGeometry,
    fonts: &'a FontManager,
}

impl<'a> Paginator<'a> {
    fn new_page(&mut self) {
        let index = self.config.pages.len() + 1;
        let done = std::mem::replace(
            &mut self.current,
            PageLayout {
                page_index: index,
                boxes: Vec::new(),
            },
        );
        self.config.pages.push(done);
    }

    fn content_height(&self) -> f32 {
        self.page.content_height()
    }

    fn place(&mut self, pbox: &PositionedBox) {
        if pbox.page_break_before {
            if !self.current.boxes.is_empty() {
                self.new_page();
            }
            // Keep the block's own top margin at the head of the new page.
            self.page_start_doc_y = pbox.y - pbox.style.margin_top;
        }

        if pbox.lines.is_empty() {
            self.place_spacer(pbox);
        } else {
            self.place_text(pbox);
        }
    }

    /// A spacer or rule that does not fit ends the page and is dropped.
    fn place_spacer(&mut self, pbox: &PositionedBox) {
        let y_on_page = (pbox.y - self.page_start_doc_y).max(0.0);
        if y_on_page + pbox.height > self.content_height() + FIT_EPSILON {
            if !self.current.boxes.is_empty() {
                self.new_page();
            }
            self.page_start_doc_y = pbox.y + pbox.height;
            return;
        }
        let abs_y = self.page.margin_top + y_on_page;
        self.current
            .boxes
            .push(LayoutBox::new(pbox.x, abs_y, pbox.width, pbox.height));
    }

    fn place_text(&mut self, pbox: &PositionedBox) {
        let leading = pbox.leading();
        let total = pbox.lines.len();
        let mut first = 0;

        while first < total {
            let line_doc_y = pbox.y + first as f32 * leading;
            let y_on_page = (line_doc_y - self.page_start_doc_y).max(0.0);
            let available = self.content_height() - y_on_page;
            let fit = if available <= 0.0 || leading <= 0.0 {
                0
            } else {
                ((available + FIT_EPSILON) / leading).floor() as usize
            };

            let mut take = fit.min(total - first);
            if take == 0 {
                if self.current.boxes.is_empty() {
                    // A line taller than the page still has to go somewhere.
                    take = 1;
                } else {
                    self.new_page();
                    self.page_start_doc_y = line_doc_y;
                    continue;
                }
            }

            let abs_y = self.page.margin_top + y_on_page;
            let lbox = self.text_box(pbox, &pbox.lines[first..first + take], abs_y);
            self.current.boxes.push(lbox);
            first += take;

            if first < total {
                self.new_page();
                self.page_start_doc_y = pbox.y + first as f32 * leading;
            }
        }
    }

    fn text_box(&self, pbox: &PositionedBox, lines: &[WrappedLine], abs_y: f32) -> LayoutBox {
        let style = &pbox.style;
        let leading = style.leading();
        let key = FontKey::for_style(style);

        let text_lines = lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let line_width = self.fonts.measure_text_width(&line.text, &key, style.font_size);
                let slack = (pbox.width - line_width).max(0.0);
                let (x_offset, justify_width) = match style.text_align {
                    TextAlign::Left => (0.0, None),
                    TextAlign::Center => (slack / 2.0, None),
                    TextAlign::Right => (slack, None),
                    TextAlign::Justify => {
                        let stretch = !line.last_in_paragraph && line.text.contains(' ');
                        (0.0, stretch.then_some(pbox.width))
                    }
                };
                TextLine {
                    text: line.text.clone(),
                    x_offset,
                    y_offset: i as f32 * leading,
                    justify_width,
                }
            })
            .collect();

        let mut lbox = LayoutBox::new(pbox.x, abs_y, pbox.width, lines.len() as f32 * leading);
        lbox.text = Some(TextContent {
            lines: text_lines,
            font_family: style.font_family,
            font_size: style.font_size,
            bold: style.is_bold(),
            italic: style.is_italic(),
            color: style.color.to_array(),
            line_height: leading,
            text_align: style.text_align,
        });
        lbox
    }

    fn finish(mut self) -> LayoutConfig {
        if !self.current.boxes.is_empty() || self.config.pages.is_empty() {
            let last = self.current;
            self.config.pages.push(last);
        }
        self.config
    }
}

/// Convert positioned boxes into a paginated LayoutConfig. The result
/// always has at least one page.
pub fn paginate(
    boxes: &[PositionedBox],
    page: &PageGeometry,
    fonts: &FontManager,
    title: &str,
) -> LayoutConfig {
    let mut paginator = Paginator {
        config: LayoutConfig {
            title: title.to_string(),
            page_width_pt: page.width,
            page_height_pt: page.height,
            pages: Vec::new(),
        },
        current: PageLayout {
            page_index: 0,
            boxes: Vec::new(),
        },
        page_start_doc_y: 0.0,
        page,
        fonts,
    };

    for pbox in boxes {
        paginator.place(pbox);
    }
    paginator.finish()
}
