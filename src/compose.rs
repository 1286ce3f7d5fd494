//! Document composer – turns a [`Book`] into the ordered layout blocks of the
//! block layout, or into one styled HTML document for the HTML layout.

use std::borrow::Cow;

use crate::book::{Book, Chapter, LayoutBlock};
use crate::config::{LayoutMode, Limits, PageGeometry};
use crate::error::ParagraphRenderError;
use crate::normalize::{normalize, take_chars};
use crate::observer::{ConversionEvent, ConversionObserver};

/// Gap after a chapter heading, in points.
pub const CHAPTER_HEADING_GAP: f32 = 14.4;

/// Elements `compose_html` puts around a chapter fragment
/// (`html > body > div.chapter`).
pub const CHAPTER_WRAPPER_DEPTH: usize = 3;

/// What happened to one paragraph unit of a chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParagraphOutcome {
    /// 1-based position within the chapter.
    pub index: usize,
    /// Escaped, length-bounded text or the reason it was left out.
    pub result: Result<String, ParagraphRenderError>,
}

/// Build the block sequence for a book: title page, then every chapter.
pub fn compose(book: &Book, limits: &Limits, observer: &dyn ConversionObserver) -> Vec<LayoutBlock> {
    let mut blocks = vec![
        LayoutBlock::TitleBlock(book.title.clone()),
        LayoutBlock::AuthorBlock(book.author.clone()),
        LayoutBlock::PageBreak,
    ];

    let multi = book.is_multi_chapter();
    for (i, chapter) in book.chapters.iter().enumerate() {
        let number = i + 1;
        if multi {
            blocks.push(LayoutBlock::ChapterHeading(number));
            blocks.push(LayoutBlock::Spacer(CHAPTER_HEADING_GAP));
        }

        for text in kept_paragraphs(number, &chapter_text(chapter), limits, observer) {
            blocks.push(LayoutBlock::Paragraph(text));
        }

        if multi && number < book.chapters.len() {
            blocks.push(LayoutBlock::PageBreak);
        }
    }
    blocks
}

fn chapter_text(chapter: &Chapter) -> Cow<'_, str> {
    match chapter {
        Chapter::Text(text) => Cow::Borrowed(text),
        Chapter::Html(html) => normalize(html, LayoutMode::Blocks)
            .map(Cow::Owned)
            .unwrap_or(Cow::Borrowed(html)),
    }
}

/// Segment a chapter, apply the paragraph cap and prepare every surviving
/// unit. Units past the cap are dropped in order.
pub fn paragraph_outcomes(
    chapter: usize,
    text: &str,
    limits: &Limits,
    observer: &dyn ConversionObserver,
) -> Vec<ParagraphOutcome> {
    let units = segment_paragraphs(text, limits.paragraph_soft_limit);
    if units.len() > limits.max_paragraphs_per_chapter {
        observer.notify(&ConversionEvent::ParagraphsCapped {
            chapter,
            dropped: units.len() - limits.max_paragraphs_per_chapter,
        });
    }

    units
        .iter()
        .take(limits.max_paragraphs_per_chapter)
        .enumerate()
        .map(|(i, unit)| ParagraphOutcome {
            index: i + 1,
            result: prepare_paragraph(unit, limits),
        })
        .collect()
}

/// The prepared paragraphs of a chapter. Left-out units are reported as
/// `ParagraphSkipped`.
fn kept_paragraphs(
    chapter: usize,
    text: &str,
    limits: &Limits,
    observer: &dyn ConversionObserver,
) -> Vec<String> {
    paragraph_outcomes(chapter, text, limits, observer)
        .into_iter()
        .filter_map(|outcome| match outcome.result {
            Ok(text) => Some(text),
            Err(reason) => {
                observer.notify(&ConversionEvent::ParagraphSkipped {
                    chapter,
                    paragraph: outcome.index,
                    reason,
                });
                None
            }
        })
        .collect()
}

/// Split text into paragraph units.
///
/// Non-blank lines accumulate into a buffer joined by single spaces. The
/// buffer is flushed at a blank line, once it grows past `soft_limit`
/// characters, and at the end of the text.
pub fn segment_paragraphs(text: &str, soft_limit: usize) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut buffer = String::new();
    let mut buffered_chars = 0;

    for line in text.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            flush(&mut buffer, &mut buffered_chars, &mut paragraphs);
            continue;
        }
        let line = words.join(" ");
        if !buffer.is_empty() {
            buffer.push(' ');
            buffered_chars += 1;
        }
        buffered_chars += line.chars().count();
        buffer.push_str(&line);

        if buffered_chars > soft_limit {
            flush(&mut buffer, &mut buffered_chars, &mut paragraphs);
        }
    }
    flush(&mut buffer, &mut buffered_chars, &mut paragraphs);
    paragraphs
}

fn flush(buffer: &mut String, chars: &mut usize, out: &mut Vec<String>) {
    if !buffer.is_empty() {
        out.push(std::mem::take(buffer));
    }
    *chars = 0;
}

/// Validate, truncate, then escape one paragraph unit.
pub fn prepare_paragraph(raw: &str, limits: &Limits) -> Result<String, ParagraphRenderError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ParagraphRenderError::Empty);
    }
    if let Some(c) = raw.chars().find(|&c| c.is_control() && !matches!(c, '\t' | '\n' | '\r')) {
        return Err(ParagraphRenderError::ControlCharacter(c as u32));
    }
    Ok(escape(&truncate_paragraph(raw, limits)).into_owned())
}

/// Cut text to `max_paragraph_chars`, appending the ellipsis when cut.
pub fn truncate_paragraph<'a>(text: &'a str, limits: &Limits) -> Cow<'a, str> {
    let prefix = take_chars(text, limits.max_paragraph_chars);
    if prefix.len() == text.len() {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{prefix}{}", limits.paragraph_ellipsis))
    }
}

/// Escape `&`, `<` and `>`.
pub fn escape(text: &str) -> Cow<'_, str> {
    html_escape::encode_text(text)
}

// ---------------------------------------------------------------------------
// HTML layout
// ---------------------------------------------------------------------------

/// Compose the whole book as one HTML document with an embedded stylesheet.
///
/// Chapter fragments are inserted as they are; plain-text chapters are
/// segmented and wrapped in `<p>` elements.
pub fn compose_html(
    book: &Book,
    page: &PageGeometry,
    limits: &Limits,
    observer: &dyn ConversionObserver,
) -> String {
    let title = escape(&book.title);
    let author = escape(&book.author);

    let mut html = String::with_capacity(
        1024 + book.chapters.iter().map(|c| c.as_str().len()).sum::<usize>(),
    );
    html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"/>");
    html.push_str(&format!("<title>{title}</title>\n<style>\n{}</style>\n", stylesheet(page)));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!(
        "<div class=\"title-page\"><h1 class=\"book-title\">{title}</h1>\
         <p class=\"book-author\">by {author}</p></div>\n"
    ));

    let multi = book.is_multi_chapter();
    for (i, chapter) in book.chapters.iter().enumerate() {
        let number = i + 1;
        html.push_str("<div class=\"chapter\">\n");
        if multi {
            html.push_str(&format!("<h2 class=\"chapter-heading\">Chapter {number}</h2>\n"));
        }
        match chapter {
            Chapter::Html(fragment) => html.push_str(fragment),
            Chapter::Text(text) => {
                for paragraph in kept_paragraphs(number, text, limits, observer) {
                    html.push_str(&format!("<p>{paragraph}</p>\n"));
                }
            }
        }
        html.push_str("\n</div>\n");
    }

    html.push_str("</body></html>\n");
    html
}

/// Page geometry, heading and paragraph styles, and page-break rules.
pub fn stylesheet(page: &PageGeometry) -> String {
    format!(
        "@page {{ size: {w}pt {h}pt; margin: {mt}pt {mr}pt {mb}pt {ml}pt; }}\n\
         body {{ font-family: Times-Roman; font-size: 11pt; line-height: 16pt; color: #333333; }}\n\
         .title-page {{ page-break-after: always; }}\n\
         h1.book-title {{ font-family: Helvetica; font-size: 24pt; font-weight: bold; color: #2c3e50; \
         text-align: center; margin-top: 144pt; margin-bottom: 30pt; line-height: 28.8pt; }}\n\
         p.book-author {{ font-family: Helvetica; font-size: 16pt; font-style: italic; color: #7f8c8d; \
         text-align: center; line-height: 19.2pt; }}\n\
         h2.chapter-heading {{ page-break-before: always; font-family: Helvetica; font-size: 16pt; \
         font-weight: bold; color: #34495e; margin-top: 12pt; margin-bottom: 26.4pt; line-height: 19.2pt; }}\n\
         h1, h2, h3, h4, h5, h6 {{ font-family: Helvetica; font-weight: bold; color: #2c3e50; }}\n\
         h1 {{ font-size: 20pt; margin-top: 18pt; margin-bottom: 12pt; }}\n\
         h2 {{ font-size: 16pt; margin-top: 14pt; margin-bottom: 10pt; }}\n\
         h3 {{ font-size: 13pt; margin-top: 12pt; margin-bottom: 8pt; }}\n\
         p {{ text-align: justify; margin-bottom: 12pt; }}\n\
         blockquote {{ margin-left: 24pt; margin-right: 24pt; font-style: italic; }}\n\
         pre, code {{ font-family: Courier; font-size: 9pt; }}\n",
        w = page.width,
        h = page.height,
        mt = page.margin_top,
        mr = page.margin_right,
        mb = page.margin_bottom,
        ml = page.margin_left,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NullObserver;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<ConversionEvent>>);

    impl ConversionObserver for Recorder {
        fn notify(&self, event: &ConversionEvent) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    fn book(chapters: &[&str]) -> Book {
        Book::new(
            Some("Test Book".into()),
            Some("A. Writer".into()),
            chapters.iter().map(|c| Chapter::Text(c.to_string())).collect(),
        )
    }

    fn count(blocks: &[LayoutBlock], pred: impl Fn(&LayoutBlock) -> bool) -> usize {
        blocks.iter().filter(|b| pred(b)).count()
    }

    #[test]
    fn two_paragraphs_separated_by_blank_line() {
        let units = segment_paragraphs("Hello   world.\n\n  Second\tparagraph. ", 1000);
        assert_eq!(units, vec!["Hello world.", "Second paragraph."]);
    }

    #[test]
    fn consecutive_lines_join_with_spaces() {
        let units = segment_paragraphs("one\ntwo\nthree\n\n\n\nfour", 1000);
        assert_eq!(units, vec!["one two three", "four"]);
    }

    #[test]
    fn soft_limit_flushes_long_runs() {
        let line = "x".repeat(40);
        let text = vec![line.as_str(); 5].join("\n");
        let units = segment_paragraphs(&text, 100);
        // 40, 81, 122 -> flush; then 40, 81 flushed at end.
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].chars().count(), 122);
    }

    #[test]
    fn single_chapter_book() {
        let blocks = compose(&book(&["Hello world.\n\nSecond paragraph."]), &Limits::default(), &NullObserver);
        assert_eq!(
            blocks,
            vec![
                LayoutBlock::TitleBlock("Test Book".into()),
                LayoutBlock::AuthorBlock("A. Writer".into()),
                LayoutBlock::PageBreak,
                LayoutBlock::Paragraph("Hello world.".into()),
                LayoutBlock::Paragraph("Second paragraph.".into()),
            ]
        );
    }

    #[test]
    fn multi_chapter_book_breaks_between_chapters() {
        let blocks = compose(&book(&["one", "two", "three"]), &Limits::default(), &NullObserver);
        let headings: Vec<usize> = blocks
            .iter()
            .filter_map(|b| match b {
                LayoutBlock::ChapterHeading(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(headings, vec![1, 2, 3]);
        // One after the title page plus chapters - 1.
        assert_eq!(count(&blocks, |b| *b == LayoutBlock::PageBreak), 1 + 2);
        assert_ne!(blocks.last(), Some(&LayoutBlock::PageBreak));
    }

    #[test]
    fn empty_book_still_has_title_page() {
        let blocks = compose(&book(&[]), &Limits::default(), &NullObserver);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2], LayoutBlock::PageBreak);
    }

    #[test]
    fn paragraph_cap_keeps_first_units_in_order() {
        let text: Vec<String> = (0..520).map(|i| format!("para {i}")).collect();
        let recorder = Recorder::default();
        let blocks = compose(&book(&[&text.join("\n\n")]), &Limits::default(), &recorder);
        let paragraphs: Vec<&LayoutBlock> =
            blocks.iter().filter(|b| matches!(b, LayoutBlock::Paragraph(_))).collect();
        assert_eq!(paragraphs.len(), 500);
        assert_eq!(paragraphs[0], &LayoutBlock::Paragraph("para 0".into()));
        assert_eq!(paragraphs[499], &LayoutBlock::Paragraph("para 499".into()));
        assert!(matches!(
            recorder.0.borrow()[0],
            ConversionEvent::ParagraphsCapped { chapter: 1, dropped: 20 }
        ));
    }

    #[test]
    fn long_paragraph_is_prefix_plus_ellipsis() {
        let limits = Limits::default();
        let raw = "a".repeat(2500);
        let prepared = prepare_paragraph(&raw, &limits).unwrap();
        assert_eq!(prepared, format!("{}...", "a".repeat(2000)));
    }

    #[test]
    fn reserved_characters_are_escaped_once() {
        let prepared = prepare_paragraph("Fish & <chips> > peas", &Limits::default()).unwrap();
        assert_eq!(prepared, "Fish &amp; &lt;chips&gt; &gt; peas");
        assert_eq!(escape("clean text"), "clean text");
        assert_ne!(escape(&escape("a & b")), escape("a & b"));
    }

    #[test]
    fn control_characters_skip_only_that_paragraph() {
        let recorder = Recorder::default();
        let blocks = compose(&book(&["good one\n\nbad \u{7} one\n\ngood two"]), &Limits::default(), &recorder);
        assert_eq!(count(&blocks, |b| matches!(b, LayoutBlock::Paragraph(_))), 2);
        assert!(matches!(
            recorder.0.borrow()[0],
            ConversionEvent::ParagraphSkipped {
                chapter: 1,
                paragraph: 2,
                reason: ParagraphRenderError::ControlCharacter(7),
            }
        ));
    }

    #[test]
    fn html_chapters_are_flattened_for_blocks() {
        let book = Book::new(None, None, vec![Chapter::Html("<p>A &amp; B</p>\n<p>C</p>".into())]);
        let blocks = compose(&book, &Limits::default(), &NullObserver);
        assert_eq!(blocks[3], LayoutBlock::Paragraph("A &amp; B".into()));
        assert_eq!(blocks[4], LayoutBlock::Paragraph("C".into()));
    }

    #[test]
    fn html_document_has_stylesheet_and_chapter_headings() {
        let book = Book::new(
            Some("T & U".into()),
            None,
            vec![Chapter::Html("<p>one</p>".into()), Chapter::Text("two".into())],
        );
        let html = compose_html(&book, &PageGeometry::a4(), &Limits::default(), &NullObserver);
        assert!(html.contains("@page { size: 595.28pt 841.89pt; margin: 72pt 72pt 72pt 72pt; }"));
        assert!(html.contains("<h1 class=\"book-title\">T &amp; U</h1>"));
        assert!(html.contains("<p class=\"book-author\">by Unknown Author</p>"));
        assert!(html.contains("<h2 class=\"chapter-heading\">Chapter 2</h2>"));
        assert!(html.contains("<p>one</p>"));
        assert!(html.contains("<p>two</p>"));
    }

    #[test]
    fn single_chapter_html_has_no_heading() {
        let html = compose_html(&book(&["only"]), &PageGeometry::a4(), &Limits::default(), &NullObserver);
        assert!(!html.contains("chapter-heading\">"));
    }

    #[test]
    fn html_text_chapters_report_left_out_paragraphs() {
        let mut limits = Limits::default();
        limits.max_paragraphs_per_chapter = 2;
        let recorder = Recorder::default();
        let html = compose_html(
            &book(&["kept \u{1} not\n\nfirst\n\nsecond\n\nthird"]),
            &PageGeometry::a4(),
            &limits,
            &recorder,
        );
        assert!(!html.contains("kept"));
        assert!(html.contains("<p>first</p>"));
        assert!(!html.contains("second"));

        let events = recorder.0.borrow();
        assert!(matches!(
            events[0],
            ConversionEvent::ParagraphsCapped { chapter: 1, dropped: 2 }
        ));
        assert!(matches!(
            events[1],
            ConversionEvent::ParagraphSkipped {
                chapter: 1,
                paragraph: 1,
                reason: ParagraphRenderError::ControlCharacter(1),
            }
        ));
        assert_eq!(events.len(), 2);
    }
}
