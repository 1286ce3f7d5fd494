//! The extracted book and the layout blocks composed from it.

use serde::Serialize;

pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_AUTHOR: &str = "Unknown Author";

/// Metadata plus the chapters that survived extraction, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub chapters: Vec<Chapter>,
}

impl Book {
    /// Build a book, substituting defaults for blank metadata.
    pub fn new(title: Option<String>, author: Option<String>, chapters: Vec<Chapter>) -> Self {
        fn or_default(value: Option<String>, default: &str) -> String {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        }

        Self {
            title: or_default(title, DEFAULT_TITLE),
            author: or_default(author, DEFAULT_AUTHOR),
            chapters,
        }
    }

    pub fn is_multi_chapter(&self) -> bool {
        self.chapters.len() > 1
    }
}

/// Normalized content of one document item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Chapter {
    /// Cleaned plain text; paragraphs separated by blank lines.
    Text(String),
    /// Sanitized structural HTML fragment.
    Html(String),
}

impl Chapter {
    pub fn as_str(&self) -> &str {
        match self {
            Chapter::Text(s) | Chapter::Html(s) => s,
        }
    }
}

/// One discrete unit handed to the renderer, consumed strictly in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LayoutBlock {
    TitleBlock(String),
    AuthorBlock(String),
    /// 1-based chapter number.
    ChapterHeading(usize),
    /// Markup-escaped paragraph text.
    Paragraph(String),
    PageBreak,
    /// Vertical gap in points.
    Spacer(f32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_metadata_falls_back_to_defaults() {
        let book = Book::new(Some("   ".into()), None, Vec::new());
        assert_eq!(book.title, "Untitled");
        assert_eq!(book.author, "Unknown Author");
    }

    #[test]
    fn metadata_is_trimmed() {
        let book = Book::new(Some(" Test Book\n".into()), Some("A. Writer".into()), Vec::new());
        assert_eq!(book.title, "Test Book");
        assert_eq!(book.author, "A. Writer");
        assert!(!book.is_multi_chapter());
    }
}
