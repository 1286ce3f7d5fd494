//! Pipeline – ties together extraction, composition, layout, pagination, and
//! rendering into a single function call.

use std::io::Cursor;
use std::path::Path;

use crate::book::{Book, LayoutBlock};
use crate::compose::{compose, compose_html};
use crate::config::{ConvertConfig, LayoutMode, PageGeometry};
use crate::error::{ConvertResult, RenderError};
use crate::extract::{extract, extract_from_reader};
use crate::flow::{blocks_to_flow, html_to_flow, FlowBlock};
use crate::fonts::FontManager;
use crate::layout::compute_layout;
use crate::layout_config::LayoutConfig;
use crate::observer::ConversionObserver;
use crate::pagination::paginate;
use crate::render::render_pdf;
use crate::style::BlockStyles;

/// Result of a successful conversion.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    pub pdf: Vec<u8>,
    /// The frozen page layout the PDF was drawn from.
    pub layout: LayoutConfig,
    /// Chapters that survived extraction.
    pub chapters: usize,
}

impl ConversionOutput {
    pub fn page_count(&self) -> usize {
        self.layout.page_count()
    }
}

/// Full pipeline: EPUB file → PDF bytes.
pub fn convert_file(
    path: impl AsRef<Path>,
    config: &ConvertConfig,
    observer: &dyn ConversionObserver,
) -> ConvertResult<ConversionOutput> {
    let path = path.as_ref();
    log::debug!("extracting {}", path.display());
    let book = extract(path, config, observer)?;
    Ok(render_book(&book, config, observer)?)
}

/// Full pipeline over EPUB bytes already in memory.
pub fn convert_bytes(
    bytes: &[u8],
    config: &ConvertConfig,
    observer: &dyn ConversionObserver,
) -> ConvertResult<ConversionOutput> {
    let book = extract_from_reader(Cursor::new(bytes), config, observer)?;
    Ok(render_book(&book, config, observer)?)
}

/// Compose and render an extracted book in the configured layout mode.
pub fn render_book(
    book: &Book,
    config: &ConvertConfig,
    observer: &dyn ConversionObserver,
) -> Result<ConversionOutput, RenderError> {
    log::debug!(
        "composing '{}' ({} chapter(s), {:?} layout)",
        book.title,
        book.chapters.len(),
        config.mode
    );
    let (pdf, layout) = match config.mode {
        LayoutMode::Blocks => {
            let blocks = compose(book, &config.limits, observer);
            render_blocks(&blocks, &book.title, &config.page, &BlockStyles::default())?
        }
        LayoutMode::Html => {
            let html = compose_html(book, &config.page, &config.limits, observer);
            render_html(&html, &book.title, &config.page)?
        }
    };
    Ok(ConversionOutput {
        pdf,
        layout,
        chapters: book.chapters.len(),
    })
}

/// Block layout: render an ordered block sequence with the named styles.
pub fn render_blocks(
    blocks: &[LayoutBlock],
    title: &str,
    page: &PageGeometry,
    styles: &BlockStyles,
) -> Result<(Vec<u8>, LayoutConfig), RenderError> {
    let flow = blocks_to_flow(blocks, styles);
    let layout = layout_flow(&flow, title, page)?;
    let pdf = render_pdf(&layout)?;
    Ok((pdf, layout))
}

/// HTML layout: render a complete document with an embedded stylesheet.
/// An `@page` rule in the stylesheet overrides `page`.
pub fn render_html(
    html: &str,
    title: &str,
    page: &PageGeometry,
) -> Result<(Vec<u8>, LayoutConfig), RenderError> {
    let lowered = html_to_flow(html, *page)?;
    let layout = layout_flow(&lowered.blocks, title, &lowered.page)?;
    let pdf = render_pdf(&layout)?;
    Ok((pdf, layout))
}

/// Lay out and paginate flow blocks without rendering – useful for testing.
pub fn layout_flow(flow: &[FlowBlock], title: &str, page: &PageGeometry) -> Result<LayoutConfig, RenderError> {
    let fonts = FontManager::default();
    let boxes = compute_layout(flow, page, &fonts)?;
    let layout = paginate(&boxes, page, &fonts, title);
    log::debug!("laid out {} block(s) on {} page(s)", flow.len(), layout.page_count());
    Ok(layout)
}
