//! Configuration for the conversion pipeline and the upload service.

use std::env;
use std::str::FromStr;

use serde::Deserialize;

/// Which composition strategy turns a book into a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    /// Discrete styled blocks built from plain chapter text (default).
    #[default]
    Blocks,
    /// One HTML document with an embedded stylesheet.
    Html,
}

impl FromStr for LayoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocks" | "a" | "text" => Ok(LayoutMode::Blocks),
            "html" | "b" => Ok(LayoutMode::Html),
            other => Err(format!("unknown layout mode '{other}' (expected 'blocks' or 'html')")),
        }
    }
}

/// Page size and margins in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
}

impl PageGeometry {
    pub const A4_WIDTH: f32 = 595.28;
    pub const A4_HEIGHT: f32 = 841.89;

    /// A4 with one inch on every side.
    pub fn a4() -> Self {
        Self::with_margin(Self::A4_WIDTH, Self::A4_HEIGHT, 72.0)
    }

    pub fn with_margin(width: f32, height: f32, margin: f32) -> Self {
        Self {
            width,
            height,
            margin_top: margin,
            margin_right: margin,
            margin_bottom: margin,
            margin_left: margin,
        }
    }

    pub fn content_width(&self) -> f32 {
        self.width - self.margin_left - self.margin_right
    }

    pub fn content_height(&self) -> f32 {
        self.height - self.margin_top - self.margin_bottom
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::a4()
    }
}

/// Size bounds that keep memory and rendering time per request in check.
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    /// Chapters must have strictly more visible characters than this.
    pub min_chapter_chars: usize,
    /// Chapter text beyond this many characters is cut.
    pub max_chapter_chars: usize,
    /// Appended after a cut chapter.
    pub chapter_truncation_marker: String,
    /// A paragraph buffer is flushed once it grows past this.
    pub paragraph_soft_limit: usize,
    /// Paragraph text beyond this many characters is cut.
    pub max_paragraph_chars: usize,
    /// Appended after a cut paragraph.
    pub paragraph_ellipsis: String,
    /// Paragraphs past this count in one chapter are dropped.
    pub max_paragraphs_per_chapter: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_chapter_chars: 100,
            max_chapter_chars: 100_000,
            chapter_truncation_marker: "\n\n[Content truncated...]".to_string(),
            paragraph_soft_limit: 1_000,
            max_paragraph_chars: 2_000,
            paragraph_ellipsis: "...".to_string(),
            max_paragraphs_per_chapter: 500,
        }
    }
}

/// Settings for one conversion call.
#[derive(Debug, Clone, Default)]
pub struct ConvertConfig {
    pub mode: LayoutMode,
    pub page: PageGeometry,
    pub limits: Limits,
}

impl ConvertConfig {
    pub fn html() -> Self {
        Self {
            mode: LayoutMode::Html,
            ..Self::default()
        }
    }
}

/// Settings for the HTTP upload service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub convert: ConvertConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10000,
            max_upload_bytes: 100 * 1024 * 1024,
            convert: ConvertConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read `HOST`, `PORT`, `LAYOUT_MODE` and `MAX_UPLOAD_MB`, keeping the
    /// default for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = env::var("HOST").unwrap_or(defaults.host);
        let port = parse_var("PORT").unwrap_or(defaults.port);
        let max_upload_bytes = parse_var::<usize>("MAX_UPLOAD_MB")
            .and_then(megabytes_to_bytes)
            .unwrap_or(defaults.max_upload_bytes);
        let mode = parse_var("LAYOUT_MODE").unwrap_or_default();

        Self {
            host,
            port,
            max_upload_bytes,
            convert: ConvertConfig {
                mode,
                ..ConvertConfig::default()
            },
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn megabytes_to_bytes(mb: usize) -> Option<usize> {
    let bytes = mb.checked_mul(1024 * 1024);
    if bytes.is_none() {
        log::warn!("Ignoring MAX_UPLOAD_MB={mb}: too large");
    }
    bytes
}

fn parse_var<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("Ignoring {name}={raw:?}: {e}");
            None
        }
    }
}
