//! Content extractor – opens an EPUB, reads title and creator, and turns each
//! document item into a chapter.
//!
//! Every item yields an [`ItemOutcome`]; a failing item is skipped with its
//! reason and never aborts the book. Only a container that cannot be opened
//! is fatal.

use std::io::{Read, Seek};
use std::path::Path;

use crate::book::{Book, Chapter};
use crate::config::{ConvertConfig, LayoutMode};
use crate::epub::EpubArchive;
use crate::error::{ContainerError, SkipReason};
use crate::normalize::normalize_with_budget;
use crate::observer::{ConversionEvent, ConversionObserver};

/// What happened to one document item.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub href: String,
    pub result: Result<Chapter, SkipReason>,
}

/// Metadata plus per-item outcomes, before filtering into a [`Book`].
#[derive(Debug, Clone)]
pub struct Extraction {
    pub title: Option<String>,
    pub author: Option<String>,
    pub items: Vec<ItemOutcome>,
}

impl Extraction {
    pub fn into_book(self) -> Book {
        let chapters = self.items.into_iter().filter_map(|i| i.result.ok()).collect();
        Book::new(self.title, self.author, chapters)
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &SkipReason)> {
        self.items
            .iter()
            .filter_map(|i| i.result.as_ref().err().map(|r| (i.href.as_str(), r)))
    }
}

/// Extract a [`Book`] from the EPUB at `path`.
pub fn extract(
    path: impl AsRef<Path>,
    config: &ConvertConfig,
    observer: &dyn ConversionObserver,
) -> Result<Book, ContainerError> {
    let mut epub = EpubArchive::open(path)?;
    Ok(extract_from(&mut epub, config, observer).into_book())
}

/// Extract from any seekable reader holding EPUB bytes.
pub fn extract_from_reader<R: Read + Seek>(
    reader: R,
    config: &ConvertConfig,
    observer: &dyn ConversionObserver,
) -> Result<Book, ContainerError> {
    let mut epub = EpubArchive::from_reader(reader)?;
    Ok(extract_from(&mut epub, config, observer).into_book())
}

/// Run every document item of an opened container through the normalizer.
pub fn extract_from<R: Read + Seek>(
    epub: &mut EpubArchive<R>,
    config: &ConvertConfig,
    observer: &dyn ConversionObserver,
) -> Extraction {
    let title = epub.dublin_core("title");
    let author = epub.dublin_core("creator");

    let items = epub
        .document_items()
        .into_iter()
        .map(|item| {
            let result = epub
                .read_item(&item)
                .map_err(|e| SkipReason::Unreadable(e.to_string()))
                .and_then(|bytes| chapter_from_bytes(&item.path, &bytes, config, observer));
            if let Err(reason) = &result {
                observer.notify(&ConversionEvent::ItemSkipped {
                    href: item.path.clone(),
                    reason: reason.clone(),
                });
            }
            ItemOutcome {
                href: item.path,
                result,
            }
        })
        .collect();

    Extraction {
        title,
        author,
        items,
    }
}

/// Decode, normalize, length-filter and (if needed) truncate one item.
pub fn chapter_from_bytes(
    href: &str,
    bytes: &[u8],
    config: &ConvertConfig,
    observer: &dyn ConversionObserver,
) -> Result<Chapter, SkipReason> {
    let limits = &config.limits;
    let markup = decode_permissive(bytes);
    let normalized = normalize_with_budget(&markup, config.mode, Some(limits.max_chapter_chars))?;

    if let Some(reason) = &normalized.strict_error {
        observer.notify(&ConversionEvent::ParserFallback {
            href: href.to_string(),
            reason: reason.clone(),
        });
    }

    if normalized.visible_chars <= limits.min_chapter_chars {
        return Err(SkipReason::TooShort {
            chars: normalized.visible_chars,
            min: limits.min_chapter_chars,
        });
    }

    let mut content = normalized.content;
    if normalized.truncated {
        observer.notify(&ConversionEvent::ChapterTruncated {
            href: href.to_string(),
            original_chars: normalized.visible_chars,
        });
        match config.mode {
            LayoutMode::Blocks => content.push_str(&limits.chapter_truncation_marker),
            LayoutMode::Html => {
                let marker = html_escape::encode_text(limits.chapter_truncation_marker.trim());
                content.push_str(&format!("\n<p>{marker}</p>"));
            }
        }
    }

    Ok(match config.mode {
        LayoutMode::Blocks => Chapter::Text(content),
        LayoutMode::Html => Chapter::Html(content),
    })
}

/// Decode UTF-8, dropping invalid byte sequences instead of failing or
/// substituting replacement characters. A leading BOM is removed.
pub fn decode_permissive(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let skip = e.error_len().unwrap_or(after.len());
                rest = &after[skip..];
            }
        }
    }
}
