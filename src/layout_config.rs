//! Layout config – the frozen result of layout and pagination. It records
//! exactly which lines go where on each page, and is all the PDF renderer
//! reads.

use serde::{Deserialize, Serialize};

use crate::style::{FontFamily, TextAlign};

/// A complete document layout ready for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Document title embedded in the PDF metadata.
    #[serde(default = "LayoutConfig::default_title")]
    pub title: String,
    /// Width of each page in PDF points (1 pt = 1/72 inch).
    pub page_width_pt: f32,
    /// Height of each page in PDF points.
    pub page_height_pt: f32,
    /// Ordered list of pages.
    pub pages: Vec<PageLayout>,
}

/// One page of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub boxes: Vec<LayoutBox>,
}

/// A positioned text block (or the part of one that fits on this page).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBox {
    /// Position relative to page top-left, in points.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub text: Option<TextContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped lines of text.
    pub lines: Vec<TextLine>,
    pub font_family: FontFamily,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub color: [f32; 3],
    /// Distance between baselines in points.
    pub line_height: f32,
    pub text_align: TextAlign,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// X offset within the layout box (for alignment).
    pub x_offset: f32,
    /// Y offset from the top of the box.
    pub y_offset: f32,
    /// Spread words across this width (justified lines only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justify_width: Option<f32>,
}

impl LayoutConfig {
    /// An empty A4 layout.
    pub fn a4() -> Self {
        Self {
            title: Self::default_title(),
            // A4: 210mm × 297mm = 595.28 × 841.89 points
            page_width_pt: 595.28,
            page_height_pt: 841.89,
            pages: Vec::new(),
        }
    }

    fn default_title() -> String {
        crate::book::DEFAULT_TITLE.to_string()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All text on one page, line by line, in drawing order.
    pub fn page_text(&self, page: usize) -> Vec<&str> {
        self.pages
            .get(page)
            .map(|p| {
                p.boxes
                    .iter()
                    .filter_map(|b| b.text.as_ref())
                    .flat_map(|t| t.lines.iter().map(|l| l.text.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            text: None,
        }
    }
}
