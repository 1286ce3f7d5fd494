//! Conversion events and the observers that receive them.
//!
//! The core reports skipped items, parser fallbacks and truncations here
//! instead of logging directly, so callers decide what to do with them.

use crate::error::{ParagraphRenderError, SkipReason};

/// Something noteworthy that happened during a conversion.
#[derive(Debug, Clone)]
pub enum ConversionEvent {
    /// A document item produced no chapter.
    ItemSkipped { href: String, reason: SkipReason },
    /// The strict parser rejected an item and the permissive parser was used.
    ParserFallback { href: String, reason: String },
    /// A chapter exceeded the maximum length and was cut.
    ChapterTruncated { href: String, original_chars: usize },
    /// A paragraph could not be rendered and was left out.
    ParagraphSkipped {
        chapter: usize,
        paragraph: usize,
        reason: ParagraphRenderError,
    },
    /// A chapter had more paragraphs than allowed; the rest were dropped.
    ParagraphsCapped { chapter: usize, dropped: usize },
}

pub trait ConversionObserver {
    fn notify(&self, event: &ConversionEvent);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ConversionObserver for LogObserver {
    fn notify(&self, event: &ConversionEvent) {
        match event {
            ConversionEvent::ItemSkipped {
                href,
                reason: reason @ SkipReason::TooShort { .. },
            } => log::debug!("Skipping '{href}': {reason}"),
            ConversionEvent::ItemSkipped { href, reason } => {
                log::warn!("Skipping '{href}': {reason}")
            }
            ConversionEvent::ParserFallback { href, reason } => {
                log::debug!("Strict parse of '{href}' failed ({reason}), using permissive parser")
            }
            ConversionEvent::ChapterTruncated {
                href,
                original_chars,
            } => log::warn!("Truncated '{href}' ({original_chars} characters)"),
            ConversionEvent::ParagraphSkipped {
                chapter,
                paragraph,
                reason,
            } => log::warn!("Skipping paragraph {paragraph} of chapter {chapter}: {reason}"),
            ConversionEvent::ParagraphsCapped { chapter, dropped } => {
                log::warn!("Chapter {chapter}: dropped {dropped} paragraphs over the cap")
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ConversionObserver for NullObserver {
    fn notify(&self, _event: &ConversionEvent) {}
}
