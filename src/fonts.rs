//! Text measurement for the builtin PDF fonts.
//!
//! Builtin fonts are never embedded, so advances come from the standard AFM
//! widths (1/1000 em) for printable ASCII. Italic variants share the upright
//! widths; anything outside ASCII is measured with the family's average.

use std::collections::HashMap;

use crate::style::{FontFamily, TextStyle};

/// Advances for U+0020..=U+007E.
type WidthTable = [u16; 95];

#[rustfmt::skip]
const HELVETICA: WidthTable = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: WidthTable = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[rustfmt::skip]
const TIMES_ROMAN: WidthTable = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

#[rustfmt::skip]
const TIMES_BOLD: WidthTable = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500,
    930, 722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, 722, 778,
    611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667, 333, 278, 333, 581, 500,
    333, 500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, 556, 500,
    556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];

/// Identifies one builtin face.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: FontFamily,
    pub bold: bool,
    pub italic: bool,
}

impl FontKey {
    pub fn for_style(style: &TextStyle) -> Self {
        Self {
            family: style.font_family,
            bold: style.is_bold(),
            italic: style.is_italic(),
        }
    }
}

/// Metrics of one builtin face.
#[derive(Debug, Clone)]
pub struct FontData {
    widths: Option<&'static WidthTable>,
    /// Advance for characters without a table entry.
    pub fallback_width: u16,
    /// In 1/1000 em.
    pub ascender: f32,
    pub descender: f32,
}

impl FontData {
    fn proportional(widths: &'static WidthTable, fallback_width: u16, ascender: f32, descender: f32) -> Self {
        Self {
            widths: Some(widths),
            fallback_width,
            ascender,
            descender,
        }
    }

    fn monospace() -> Self {
        Self {
            widths: None,
            fallback_width: 600,
            ascender: 629.0,
            descender: -157.0,
        }
    }

    fn advance(&self, c: char) -> u16 {
        let code = c as u32;
        match self.widths {
            Some(table) if (0x20..=0x7E).contains(&code) => table[(code - 0x20) as usize],
            _ if c == '\u{a0}' => self.advance(' '),
            _ => self.fallback_width,
        }
    }
}

/// Metrics for every builtin face, looked up by [`FontKey`].
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
    default_data: FontData,
}

impl FontManager {
    pub fn new() -> Self {
        let mut fonts = HashMap::new();
        for italic in [false, true] {
            let key = |family, bold| FontKey { family, bold, italic };
            fonts.insert(
                key(FontFamily::Helvetica, false),
                FontData::proportional(&HELVETICA, 556, 718.0, -207.0),
            );
            fonts.insert(
                key(FontFamily::Helvetica, true),
                FontData::proportional(&HELVETICA_BOLD, 611, 718.0, -207.0),
            );
            fonts.insert(
                key(FontFamily::Times, false),
                FontData::proportional(&TIMES_ROMAN, 500, 683.0, -217.0),
            );
            fonts.insert(
                key(FontFamily::Times, true),
                FontData::proportional(&TIMES_BOLD, 500, 683.0, -217.0),
            );
            fonts.insert(key(FontFamily::Courier, false), FontData::monospace());
            fonts.insert(key(FontFamily::Courier, true), FontData::monospace());
        }

        Self {
            fonts,
            default_data: FontData::proportional(&HELVETICA, 556, 718.0, -207.0),
        }
    }

    pub fn get(&self, key: &FontKey) -> &FontData {
        self.fonts.get(key).unwrap_or(&self.default_data)
    }

    /// Width of `text` in points.
    pub fn measure_text_width(&self, text: &str, key: &FontKey, font_size: f32) -> f32 {
        let data = self.get(key);
        let units: u32 = text.chars().map(|c| u32::from(data.advance(c))).sum();
        units as f32 * font_size / 1000.0
    }

    /// Distance from the top of a line box to the baseline, in points.
    pub fn ascender(&self, key: &FontKey, font_size: f32) -> f32 {
        self.get(key).ascender * font_size / 1000.0
    }
}

impl Default for FontManager {
    fn default() -> Self {
        Self::new()
    }
}

/// One line produced by [`wrap_text`].
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedLine {
    pub text: String,
    /// Last line before a hard break or the end of the text. Justified text
    /// leaves these lines ragged.
    pub last_in_paragraph: bool,
}

/// Word-wrap text to fit within `max_width` points. Hard line breaks are
/// kept and words wider than a whole line are split.
pub fn wrap_text(text: &str, style: &TextStyle, max_width: f32, fonts: &FontManager) -> Vec<WrappedLine> {
    let key = FontKey::for_style(style);
    let size = style.font_size;
    if max_width <= 0.0 || text.is_empty() {
        return vec![WrappedLine {
            text: text.to_string(),
            last_in_paragraph: true,
        }];
    }

    let space = fonts.measure_text_width(" ", &key, size);
    let mut lines: Vec<WrappedLine> = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_width = 0.0f32;

        for word in paragraph.split_whitespace() {
            for piece in split_long_word(word, &key, size, max_width, fonts) {
                let w = fonts.measure_text_width(&piece, &key, size);
                if !current.is_empty() && current_width + space + w > max_width {
                    lines.push(WrappedLine {
                        text: std::mem::take(&mut current),
                        last_in_paragraph: false,
                    });
                    current_width = 0.0;
                }
                if !current.is_empty() {
                    current.push(' ');
                    current_width += space;
                }
                current.push_str(&piece);
                current_width += w;
            }
        }
        lines.push(WrappedLine {
            text: current,
            last_in_paragraph: true,
        });
    }
    lines
}

fn split_long_word(word: &str, key: &FontKey, size: f32, max_width: f32, fonts: &FontManager) -> Vec<String> {
    if fonts.measure_text_width(word, key, size) <= max_width {
        return vec![word.to_string()];
    }
    let mut pieces = Vec::new();
    let mut piece = String::new();
    for c in word.chars() {
        let mut candidate = piece.clone();
        candidate.push(c);
        if !piece.is_empty() && fonts.measure_text_width(&candidate, key, size) > max_width {
            pieces.push(std::mem::take(&mut piece));
            piece.push(c);
        } else {
            piece = candidate;
        }
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helvetica(size: f32) -> TextStyle {
        TextStyle {
            font_size: size,
            ..TextStyle::default()
        }
    }

    #[test]
    fn afm_text_width() {
        let mgr = FontManager::default();
        let key = FontKey::for_style(&helvetica(10.0));
        // H 722 + e 556 + l 222 + l 222 + o 556 = 2278
        let w = mgr.measure_text_width("Hello", &key, 10.0);
        assert!((w - 22.78).abs() < 0.01);
    }

    #[test]
    fn courier_is_monospaced() {
        let mgr = FontManager::default();
        let key = FontKey {
            family: FontFamily::Courier,
            bold: true,
            italic: false,
        };
        assert_eq!(
            mgr.measure_text_width("iiii", &key, 10.0),
            mgr.measure_text_width("MMMM", &key, 10.0)
        );
    }

    #[test]
    fn bold_is_wider() {
        let mgr = FontManager::default();
        let regular = FontKey::for_style(&helvetica(12.0));
        let bold = FontKey { bold: true, ..regular };
        assert!(mgr.measure_text_width("chapter", &bold, 12.0) > mgr.measure_text_width("chapter", &regular, 12.0));
    }

    #[test]
    fn word_wrap_basic() {
        let mgr = FontManager::default();
        let lines = wrap_text("Hello world foo bar", &helvetica(16.0), 60.0, &mgr);
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", lines);
        assert!(lines.last().is_some_and(|l| l.last_in_paragraph));
        assert!(!lines[0].last_in_paragraph);
    }

    #[test]
    fn hard_breaks_end_paragraph_lines() {
        let mgr = FontManager::default();
        let lines = wrap_text("one\ntwo", &helvetica(10.0), 400.0, &mgr);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert!(lines.iter().all(|l| l.last_in_paragraph));
    }

    #[test]
    fn overlong_words_are_split() {
        let mgr = FontManager::default();
        let style = helvetica(10.0);
        let word = "x".repeat(200);
        let lines = wrap_text(&word, &style, 100.0, &mgr);
        assert!(lines.len() > 1);
        let key = FontKey::for_style(&style);
        assert!(lines.iter().all(|l| mgr.measure_text_width(&l.text, &key, 10.0) <= 100.0));
        assert_eq!(lines.iter().map(|l| l.text.len()).sum::<usize>(), 200);
    }
}
