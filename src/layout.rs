//! Layout engine – stacks flow blocks in a Taffy flex column sized to the
//! page's content width, word-wrapping each block to its available width.
//! The result is a flat list of boxes in document coordinates.

use taffy::prelude::*;

use crate::config::PageGeometry;
use crate::error::RenderError;
use crate::flow::FlowBlock;
use crate::fonts::{wrap_text, FontManager, WrappedLine};
use crate::style::TextStyle;

/// A positioned block in document coordinates (before page splitting).
/// `y` is measured from the top of the first page's content area.
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub lines: Vec<WrappedLine>,
    pub style: TextStyle,
    pub page_break_before: bool,
}

impl PositionedBox {
    /// Baseline-to-baseline distance of this box's lines.
    pub fn leading(&self) -> f32 {
        self.style.leading()
    }
}

fn layout_error(e: taffy::TaffyError) -> RenderError {
    RenderError::Layout(e.to_string())
}

/// Compute layout for a list of flow blocks.
pub fn compute_layout(
    blocks: &[FlowBlock],
    page: &PageGeometry,
    fonts: &FontManager,
) -> Result<Vec<PositionedBox>, RenderError> {
    let content_width = page.content_width();
    if content_width <= 0.0 || page.content_height() <= 0.0 {
        return Err(RenderError::Geometry {
            width: page.width,
            height: page.height,
        });
    }

    let mut taffy: TaffyTree<()> = TaffyTree::new();
    let mut leaves = Vec::with_capacity(blocks.len());
    let mut wrapped = Vec::with_capacity(blocks.len());

    for block in blocks {
        let s = &block.style;
        let width = (content_width - s.margin_left - s.margin_right).max(1.0);
        let lines = if block.text.is_empty() {
            Vec::new()
        } else {
            wrap_text(&block.text, s, width, fonts)
        };
        let height = (lines.len() as f32 * s.leading()).max(block.min_height);

        let leaf = taffy
            .new_leaf(Style {
                size: Size {
                    width: Dimension::Length(width),
                    height: Dimension::Length(height),
                },
                margin: Rect {
                    top: LengthPercentageAuto::Length(s.margin_top),
                    right: LengthPercentageAuto::Length(s.margin_right),
                    bottom: LengthPercentageAuto::Length(s.margin_bottom),
                    left: LengthPercentageAuto::Length(s.margin_left),
                },
                flex_shrink: 0.0,
                ..Default::default()
            })
            .map_err(layout_error)?;
        leaves.push(leaf);
        wrapped.push(lines);
    }

    let root = taffy
        .new_with_children(
            Style {
                display: taffy::Display::Flex,
                flex_direction: taffy::FlexDirection::Column,
                size: Size {
                    width: Dimension::Length(content_width),
                    height: Dimension::Auto,
                },
                ..Default::default()
            },
            &leaves,
        )
        .map_err(layout_error)?;

    taffy
        .compute_layout(
            root,
            Size {
                width: AvailableSpace::Definite(content_width),
                height: AvailableSpace::MaxContent,
            },
        )
        .map_err(layout_error)?;

    let mut boxes = Vec::with_capacity(blocks.len());
    for ((leaf, lines), block) in leaves.into_iter().zip(wrapped).zip(blocks) {
        let layout = taffy.layout(leaf).map_err(layout_error)?;
        boxes.push(PositionedBox {
            x: page.margin_left + layout.location.x,
            y: layout.location.y,
            width: layout.size.width,
            height: layout.size.height,
            lines,
            style: block.style.clone(),
            page_break_before: block.style.page_break_before,
        });
    }
    Ok(boxes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::BlockStyles;

    #[test]
    fn layout_stacks_blocks_with_margins() {
        let styles = BlockStyles::default();
        let blocks = vec![
            FlowBlock::text("Title", styles.title.clone()),
            FlowBlock::text("Body text", styles.body.clone()),
        ];
        let page = PageGeometry::a4();
        let boxes = compute_layout(&blocks, &page, &FontManager::default()).unwrap();
        assert_eq!(boxes.len(), 2);
        // Title sits below its 144pt top margin.
        assert!((boxes[0].y - 144.0).abs() < 0.01);
        let title_bottom = boxes[0].y + boxes[0].height + styles.title.margin_bottom;
        assert!((boxes[1].y - title_bottom).abs() < 0.01);
        assert!((boxes[1].width - page.content_width()).abs() < 0.01);
        assert_eq!(boxes[0].x, page.margin_left);
    }

    #[test]
    fn long_text_wraps_into_taller_box() {
        let body = BlockStyles::default().body;
        let blocks = vec![FlowBlock::text("word ".repeat(300), body.clone())];
        let boxes = compute_layout(&blocks, &PageGeometry::a4(), &FontManager::default()).unwrap();
        assert!(boxes[0].lines.len() > 5);
        assert!((boxes[0].height - boxes[0].lines.len() as f32 * body.leading()).abs() < 0.01);
    }

    #[test]
    fn spacers_have_height_but_no_lines() {
        let boxes = compute_layout(&[FlowBlock::spacer(14.4)], &PageGeometry::a4(), &FontManager::default()).unwrap();
        assert!(boxes[0].lines.is_empty());
        assert!((boxes[0].height - 14.4).abs() < 0.01);
    }

    #[test]
    fn margins_larger_than_page_are_rejected() {
        let page = PageGeometry::with_margin(100.0, 100.0, 60.0);
        let err = compute_layout(&[], &page, &FontManager::default()).unwrap_err();
        assert!(matches!(err, RenderError::Geometry { .. }));
    }
}
