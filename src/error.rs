//! Error types for the conversion pipeline.
//!
//! Only [`ConvertError`] is fatal. Markup, length and paragraph failures are
//! carried as values inside per-item / per-paragraph outcomes and never abort
//! a conversion.

use thiserror::Error;

/// The EPUB container itself cannot be opened or understood.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to open EPUB archive: {0}")]
    Archive(String),

    #[error("missing required entry '{0}'")]
    MissingEntry(String),

    #[error("container.xml does not name a package document")]
    MissingRootfile,

    #[error("malformed XML in '{path}': {message}")]
    Xml { path: String, message: String },

    #[error("package document has no manifest")]
    MissingManifest,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Both the strict and the permissive parser rejected a markup payload.
#[derive(Debug, Clone, Error)]
#[error("markup could not be parsed (strict: {strict}; permissive: {permissive})")]
pub struct MarkupParseError {
    pub strict: String,
    pub permissive: String,
}

/// A single paragraph cannot be drawn with the builtin PDF fonts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParagraphRenderError {
    #[error("paragraph is empty after cleaning")]
    Empty,

    #[error("unrenderable control character U+{0:04X}")]
    ControlCharacter(u32),
}

/// The final document assembly failed.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("layout engine error: {0}")]
    Layout(String),

    #[error("invalid stylesheet: {0}")]
    Stylesheet(String),

    #[error("composed document could not be parsed: {0}")]
    Markup(#[from] MarkupParseError),

    #[error("page geometry leaves no room for content ({width}x{height} pt)")]
    Geometry { width: f32, height: f32 },
}

/// Why a document item did not become a chapter.
#[derive(Debug, Clone, Error)]
pub enum SkipReason {
    #[error("item could not be read: {0}")]
    Unreadable(String),

    #[error(transparent)]
    Markup(#[from] MarkupParseError),

    /// Not a failure: content below the minimum length is filtered out.
    #[error("chapter too short ({chars} <= {min} characters)")]
    TooShort { chars: usize, min: usize },
}

/// Fatal outcome of one conversion call.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid EPUB container: {0}")]
    InvalidContainer(#[from] ContainerError),

    #[error("PDF rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConvertResult<T> = Result<T, ConvertError>;
