//! # epub-forge – EPUB → PDF conversion
//!
//! Converts an EPUB book into a readable PDF. The pipeline stages are:
//!
//! 1. **Extract** – open the container, read title/creator and turn each
//!    document item into a chapter ([`epub`], [`extract`])
//! 2. **Normalize** – parse item markup (strict XHTML, permissive HTML
//!    fallback) and clean it into text or structural HTML ([`dom`], [`normalize`])
//! 3. **Compose** – build the title page and chapter blocks, or one styled
//!    HTML document ([`compose`])
//! 4. **Layout** – lower to styled flow blocks and stack them with Taffy
//!    ([`flow`], [`style`], [`layout`])
//! 5. **Paginate** – split into pages ([`pagination`])
//! 6. **Render** – emit PDF bytes via printpdf ([`render`])
//!
//! Per-item and per-paragraph problems are reported to a
//! [`ConversionObserver`] and never abort a conversion. An HTTP upload
//! service lives in [`server`].

pub mod book;
pub mod compose;
pub mod config;
pub mod dom;
pub mod epub;
pub mod error;
pub mod extract;
pub mod flow;
pub mod fonts;
pub mod layout;
pub mod layout_config;
pub mod normalize;
pub mod observer;
pub mod pagination;
pub mod pipeline;
pub mod render;
pub mod server;
pub mod style;

// Re-exports for convenience
pub use book::{Book, Chapter, LayoutBlock};
pub use config::{ConvertConfig, LayoutMode, PageGeometry};
pub use error::{ConvertError, ConvertResult};
pub use observer::{ConversionEvent, ConversionObserver, LogObserver, NullObserver};
pub use pipeline::{convert_bytes, convert_file, ConversionOutput};
