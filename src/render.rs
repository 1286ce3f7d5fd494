//! PDF renderer – takes a [`LayoutConfig`] and produces PDF bytes using
//! `printpdf` (v0.8 ops-based API). Only the builtin base-14 fonts are used,
//! so nothing is embedded and text is written in WinAnsiEncoding.

use printpdf::*;

use crate::error::RenderError;
use crate::fonts::{FontKey, FontManager};
use crate::layout_config::{LayoutBox, LayoutConfig, TextContent, TextLine};
use crate::style::FontFamily;

const PT_TO_MM: f32 = 0.352778;

/// Render a LayoutConfig into PDF bytes.
pub fn render_pdf(config: &LayoutConfig) -> Result<Vec<u8>, RenderError> {
    let (w, h) = (config.page_width_pt, config.page_height_pt);
    if !(w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
        return Err(RenderError::Geometry { width: w, height: h });
    }
    let page_w = Mm(w * PT_TO_MM);
    let page_h = Mm(h * PT_TO_MM);

    let fonts = FontManager::default();
    let mut doc = PdfDocument::new(&config.title);
    let mut pages = Vec::with_capacity(config.pages.len().max(1));

    for page_layout in &config.pages {
        let mut ops = Vec::new();
        for lbox in &page_layout.boxes {
            render_box(&mut ops, lbox, h, &fonts);
        }
        pages.push(PdfPage::new(page_w, page_h, ops));
    }

    // Ensure at least one page.
    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }

    doc.with_pages(pages);
    // Text is shown with raw `Tj` ops, which the default options strip.
    let options = PdfSaveOptions {
        secure: false,
        ..PdfSaveOptions::default()
    };
    let bytes = doc.save(&options, &mut Vec::new());
    log::debug!("rendered {} page(s), {} bytes", config.pages.len().max(1), bytes.len());
    Ok(bytes)
}

fn builtin_font(text: &TextContent) -> BuiltinFont {
    match (text.font_family, text.bold, text.italic) {
        (FontFamily::Helvetica, false, false) => BuiltinFont::Helvetica,
        (FontFamily::Helvetica, true, false) => BuiltinFont::HelveticaBold,
        (FontFamily::Helvetica, false, true) => BuiltinFont::HelveticaOblique,
        (FontFamily::Helvetica, true, true) => BuiltinFont::HelveticaBoldOblique,
        (FontFamily::Times, false, false) => BuiltinFont::TimesRoman,
        (FontFamily::Times, true, false) => BuiltinFont::TimesBold,
        (FontFamily::Times, false, true) => BuiltinFont::TimesItalic,
        (FontFamily::Times, true, true) => BuiltinFont::TimesBoldItalic,
        (FontFamily::Courier, false, false) => BuiltinFont::Courier,
        (FontFamily::Courier, true, false) => BuiltinFont::CourierBold,
        (FontFamily::Courier, false, true) => BuiltinFont::CourierOblique,
        (FontFamily::Courier, true, true) => BuiltinFont::CourierBoldOblique,
    }
}

fn font_key(text: &TextContent) -> FontKey {
    FontKey {
        family: text.font_family,
        bold: text.bold,
        italic: text.italic,
    }
}

/// Windows-1252 byte for `c`; `?` for anything the builtin fonts cannot draw.
fn winansi_byte(c: char) -> u8 {
    match c {
        '\u{20AC}' => 0x80, // euro
        '\u{201A}' => 0x82, // single low-9 quote
        '\u{0192}' => 0x83, // florin
        '\u{201E}' => 0x84, // double low-9 quote
        '\u{2026}' => 0x85, // ellipsis
        '\u{2020}' => 0x86, // dagger
        '\u{2021}' => 0x87, // double dagger
        '\u{02C6}' => 0x88, // circumflex
        '\u{2030}' => 0x89, // per mille
        '\u{0160}' => 0x8A, // S caron
        '\u{2039}' => 0x8B, // single left angle quote
        '\u{0152}' => 0x8C, // OE
        '\u{017D}' => 0x8E, // Z caron
        '\u{2018}' => 0x91, // left single quote
        '\u{2019}' => 0x92, // right single quote
        '\u{201C}' => 0x93, // left double quote
        '\u{201D}' => 0x94, // right double quote
        '\u{2022}' => 0x95, // bullet
        '\u{2013}' => 0x96, // en-dash
        '\u{2014}' => 0x97, // em-dash
        '\u{02DC}' => 0x98, // small tilde
        '\u{2122}' => 0x99, // trademark
        '\u{0161}' => 0x9A, // s caron
        '\u{203A}' => 0x9B, // single right angle quote
        '\u{0153}' => 0x9C, // oe
        '\u{017E}' => 0x9E, // z caron
        '\u{0178}' => 0x9F, // Y diaeresis
        '\u{00A0}' => 0x20, // non-breaking space -> space
        c if (c as u32) < 0x80 || (0xA0..0x100).contains(&(c as u32)) => c as u8,
        _ => b'?',
    }
}

/// Encode a string as the single-byte WinAnsi codes the builtin fonts use.
fn to_winansi(s: &str) -> Vec<u8> {
    s.chars().map(winansi_byte).collect()
}

/// X offsets of each word when `words` are spread across `target` points.
/// `None` when the line cannot be justified.
fn justified_offsets(widths: &[f32], target: f32) -> Option<Vec<f32>> {
    if widths.len() < 2 {
        return None;
    }
    let used: f32 = widths.iter().sum();
    let gap = (target - used) / (widths.len() - 1) as f32;
    if !gap.is_finite() || gap <= 0.0 {
        return None;
    }
    let mut x = 0.0;
    Some(
        widths
            .iter()
            .map(|w| {
                let at = x;
                x += w + gap;
                at
            })
            .collect(),
    )
}

fn write_text(ops: &mut Vec<Op>, text: &TextContent, font: BuiltinFont, x: f32, y: f32, s: &str) {
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point { x: Pt(x), y: Pt(y) },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(text.font_size),
        font,
    });
    ops.push(Op::SetLineHeight {
        lh: Pt(text.line_height),
    });
    ops.push(Op::SetFillColor {
        col: Color::Rgb(Rgb {
            r: text.color[0],
            g: text.color[1],
            b: text.color[2],
            icc_profile: None,
        }),
    });
    // printpdf hands builtin-font text to the PDF as UTF-8, so the glyph
    // codes go out through a raw `Tj`. The empty write still registers the
    // font on the page.
    ops.push(Op::WriteTextBuiltinFont { items: Vec::new(), font });
    ops.push(show_winansi(s));
    ops.push(Op::EndTextSection);
}

/// `Tj` with the WinAnsi bytes of `s` as a hex string.
fn show_winansi(s: &str) -> Op {
    Op::Unknown {
        key: "Tj".to_string(),
        value: vec![DictItem::String {
            data: to_winansi(s),
            literal: false,
        }],
    }
}

/// Render one LayoutBox into PDF ops.
fn render_box(ops: &mut Vec<Op>, lbox: &LayoutBox, page_height: f32, fonts: &FontManager) {
    let Some(text) = &lbox.text else {
        return;
    };
    // PDF coordinate system: origin at bottom-left.
    // Our layout uses origin at top-left. Convert:
    let pdf_y = page_height - lbox.y;
    let font = builtin_font(text);
    let key = font_key(text);
    // Glyphs sit centred in the line box: half the extra leading above,
    // then the ascender down to the baseline.
    let baseline_drop = (text.line_height - text.font_size) / 2.0 + fonts.ascender(&key, text.font_size);

    for tline in &text.lines {
        if tline.text.trim().is_empty() {
            continue;
        }
        let text_x = lbox.x + tline.x_offset;
        let text_y = pdf_y - tline.y_offset - baseline_drop;
        if !render_justified(ops, text, font, &key, fonts, tline, text_x, text_y) {
            write_text(ops, text, font, text_x, text_y, &tline.text);
        }
    }
}

/// Draw a justified line word by word. Returns `false` when the line should
/// be drawn normally instead.
#[allow(clippy::too_many_arguments)]
fn render_justified(
    ops: &mut Vec<Op>,
    text: &TextContent,
    font: BuiltinFont,
    key: &FontKey,
    fonts: &FontManager,
    tline: &TextLine,
    x: f32,
    y: f32,
) -> bool {
    let Some(target) = tline.justify_width else {
        return false;
    };
    let words: Vec<&str> = tline.text.split(' ').filter(|w| !w.is_empty()).collect();
    let widths: Vec<f32> = words
        .iter()
        .map(|w| fonts.measure_text_width(w, key, text.font_size))
        .collect();
    let Some(offsets) = justified_offsets(&widths, target) else {
        return false;
    };
    for (word, dx) in words.iter().zip(offsets) {
        write_text(ops, text, font, x + dx, y, word);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout_config::PageLayout;
    use crate::style::TextAlign;

    fn text_box(lines: Vec<TextLine>) -> LayoutBox {
        let mut lbox = LayoutBox::new(72.0, 72.0, 451.0, 16.0 * lines.len() as f32);
        lbox.text = Some(TextContent {
            lines,
            font_family: FontFamily::Times,
            font_size: 11.0,
            bold: false,
            italic: true,
            color: [0.2, 0.2, 0.2],
            line_height: 16.0,
            text_align: TextAlign::Justify,
        });
        lbox
    }

    fn line(text: &str, justify_width: Option<f32>) -> TextLine {
        TextLine {
            text: text.into(),
            x_offset: 0.0,
            y_offset: 0.0,
            justify_width,
        }
    }

    #[test]
    fn render_empty_page() {
        let config = LayoutConfig::a4();
        let bytes = render_pdf(&config).unwrap();
        assert!(bytes.len() > 100, "PDF should have content");
        // PDF magic number
        assert_eq!(&bytes[0..5], b"%PDF-");
    }

    #[test]
    fn render_text_pages() {
        let mut config = LayoutConfig::a4();
        for i in 0..3 {
            config.pages.push(PageLayout {
                page_index: i,
                boxes: vec![text_box(vec![
                    line("A justified line of text – with “quotes”", Some(451.0)),
                    line("Last line", None),
                ])],
            });
        }
        let bytes = render_pdf(&config).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
        assert!(bytes.len() > render_pdf(&LayoutConfig::a4()).unwrap().len());
    }

    #[test]
    fn invalid_page_size_is_rejected() {
        let mut config = LayoutConfig::a4();
        config.page_height_pt = 0.0;
        assert!(matches!(render_pdf(&config), Err(RenderError::Geometry { .. })));
        config.page_height_pt = f32::NAN;
        assert!(render_pdf(&config).is_err());
    }

    #[test]
    fn winansi_mapping() {
        assert_eq!(to_winansi("abc"), b"abc");
        assert_eq!(to_winansi("é"), [0xE9]);
        assert_eq!(to_winansi("“Œuvre”"), [0x93, 0x8C, b'u', b'v', b'r', b'e', 0x94]);
        assert_eq!(to_winansi("\u{a0}"), b" ");
        assert_eq!(to_winansi("漢\u{85}"), b"??");
    }

    #[test]
    fn text_is_shown_as_winansi_bytes() {
        let text = text_box(vec![]).text.unwrap();
        let mut ops = Vec::new();
        write_text(&mut ops, &text, BuiltinFont::TimesItalic, 72.0, 700.0, "café – €5");

        let registers_font = ops.iter().any(|op| {
            matches!(op, Op::WriteTextBuiltinFont { items, font: BuiltinFont::TimesItalic } if items.is_empty())
        });
        assert!(registers_font);

        let shown: Vec<&Vec<u8>> = ops
            .iter()
            .filter_map(|op| match op {
                Op::Unknown { key, value } if key == "Tj" => match value.as_slice() {
                    [DictItem::String { data, literal: false }] => Some(data),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(shown, vec![&b"caf\xE9 \x96 \x805".to_vec()]);
    }

    #[test]
    fn justification_spreads_gaps_evenly() {
        let offsets = justified_offsets(&[10.0, 10.0, 10.0], 50.0).unwrap();
        assert_eq!(offsets, vec![0.0, 20.0, 40.0]);
        assert!(justified_offsets(&[10.0], 50.0).is_none());
        assert!(justified_offsets(&[30.0, 30.0], 50.0).is_none());
    }

    #[test]
    fn fonts_follow_family_and_face() {
        let mut lbox = text_box(vec![]);
        let text = lbox.text.as_mut().unwrap();
        assert!(matches!(builtin_font(text), BuiltinFont::TimesItalic));
        text.font_family = FontFamily::Courier;
        text.bold = true;
        assert!(matches!(builtin_font(text), BuiltinFont::CourierBoldOblique));
    }
}
