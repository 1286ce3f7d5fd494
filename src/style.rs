//! Text styles – the named styles of the block layout, and a small CSS reader
//! for the stylesheet embedded in composed HTML documents.
//!
//! Only what the flow renderer can honour is understood: simple `tag`,
//! `.class` and `tag.class` selectors, typography, vertical and horizontal
//! margins, page-break hints and an `@page` rule. Everything else is ignored.

use serde::{Deserialize, Serialize};

use crate::config::PageGeometry;
use crate::dom::Tag;
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Style values
// ---------------------------------------------------------------------------

/// The builtin PDF font families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FontFamily {
    #[default]
    Helvetica,
    Times,
    Courier,
}

impl FontFamily {
    /// Map a CSS `font-family` list onto a builtin family, using the first
    /// entry that is recognised.
    pub fn from_css(value: &str) -> Option<Self> {
        value.split(',').find_map(|name| {
            let name = name.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase();
            if name.contains("courier") || name.contains("mono") {
                Some(FontFamily::Courier)
            } else if name.contains("sans") || name.contains("helvetica") || name.contains("arial") {
                Some(FontFamily::Helvetica)
            } else if name.contains("times") || name.contains("serif") || name.contains("georgia") {
                Some(FontFamily::Times)
            } else {
                None
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

/// RGB colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Self = Self { r: 0.0, g: 0.0, b: 0.0 };

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
            }),
            3 => Some(Self {
                r: channel(&hex[0..1].repeat(2))?,
                g: channel(&hex[1..2].repeat(2))?,
                b: channel(&hex[2..3].repeat(2))?,
            }),
            _ => None,
        }
    }

    /// Hex, `rgb(r, g, b)` or one of a few common names.
    pub fn from_css(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value.starts_with('#') {
            return Self::from_hex(&value);
        }
        if let Some(args) = value.strip_prefix("rgb(").and_then(|v| v.strip_suffix(')')) {
            let parts: Vec<f32> = args
                .split(',')
                .filter_map(|p| p.trim().parse::<f32>().ok())
                .collect();
            if let [r, g, b] = parts[..] {
                return Some(Self {
                    r: (r / 255.0).clamp(0.0, 1.0),
                    g: (g / 255.0).clamp(0.0, 1.0),
                    b: (b / 255.0).clamp(0.0, 1.0),
                });
            }
            return None;
        }
        let hex = match value.as_str() {
            "black" => "000000",
            "white" => "ffffff",
            "gray" | "grey" => "808080",
            "silver" => "c0c0c0",
            "red" => "ff0000",
            "maroon" => "800000",
            "green" => "008000",
            "blue" => "0000ff",
            "navy" => "000080",
            _ => return None,
        };
        Self::from_hex(hex)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

/// Resolved style of one flow block.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font_family: FontFamily,
    /// Points.
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    pub color: Color,
    pub text_align: TextAlign,
    /// Multiple of `font_size`.
    pub line_height: f32,
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub page_break_before: bool,
    pub page_break_after: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: FontFamily::Helvetica,
            font_size: 12.0,
            font_weight: FontWeight::Normal,
            font_style: FontStyle::Normal,
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.2,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            page_break_before: false,
            page_break_after: false,
        }
    }
}

impl TextStyle {
    pub fn is_bold(&self) -> bool {
        self.font_weight == FontWeight::Bold
    }

    pub fn is_italic(&self) -> bool {
        self.font_style == FontStyle::Italic
    }

    /// Distance between baselines, in points.
    pub fn leading(&self) -> f32 {
        self.font_size * self.line_height
    }

    /// A child's starting style: text properties inherited, box properties reset.
    pub fn inherit(&self) -> Self {
        Self {
            font_family: self.font_family,
            font_size: self.font_size,
            font_weight: self.font_weight,
            font_style: self.font_style,
            color: self.color,
            text_align: self.text_align,
            line_height: self.line_height,
            ..Self::default()
        }
    }
}

/// The named styles of the block layout.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStyles {
    pub title: TextStyle,
    pub author: TextStyle,
    pub chapter_heading: TextStyle,
    pub body: TextStyle,
}

impl Default for BlockStyles {
    fn default() -> Self {
        let hex = |h: &str| Color::from_hex(h).unwrap_or(Color::BLACK);
        Self {
            title: TextStyle {
                font_family: FontFamily::Helvetica,
                font_size: 24.0,
                font_weight: FontWeight::Bold,
                color: hex("#2c3e50"),
                text_align: TextAlign::Center,
                margin_top: 144.0,
                margin_bottom: 30.0,
                ..TextStyle::default()
            },
            author: TextStyle {
                font_family: FontFamily::Helvetica,
                font_size: 16.0,
                font_style: FontStyle::Italic,
                color: hex("#7f8c8d"),
                text_align: TextAlign::Center,
                margin_bottom: 12.0,
                ..TextStyle::default()
            },
            chapter_heading: TextStyle {
                font_family: FontFamily::Helvetica,
                font_size: 16.0,
                font_weight: FontWeight::Bold,
                color: hex("#34495e"),
                margin_top: 12.0,
                margin_bottom: 12.0,
                ..TextStyle::default()
            },
            body: TextStyle {
                font_family: FontFamily::Times,
                font_size: 11.0,
                color: hex("#333333"),
                text_align: TextAlign::Justify,
                line_height: 16.0 / 11.0,
                margin_bottom: 12.0,
                ..TextStyle::default()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Stylesheet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Selector {
    tag: Option<String>,
    class: Option<String>,
}

impl Selector {
    /// `tag`, `.class` or `tag.class`; anything more complex is unsupported.
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() || text.contains(|c: char| c.is_whitespace() || "#>+~:[*".contains(c)) {
            return None;
        }
        let (tag, class) = match text.split_once('.') {
            Some((tag, class)) if !class.contains('.') => (tag, Some(class)),
            Some(_) => return None,
            None => (text, None),
        };
        Some(Self {
            tag: (!tag.is_empty()).then(|| tag.to_ascii_lowercase()),
            class: class.map(str::to_string),
        })
    }

    fn matches(&self, tag: &Tag, classes: &[&str]) -> bool {
        self.tag.as_deref().map_or(true, |t| t == tag.name())
            && self.class.as_deref().map_or(true, |c| classes.contains(&c))
    }

    fn specificity(&self) -> u8 {
        u8::from(self.tag.is_some()) + 10 * u8::from(self.class.is_some())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Rule {
    selector: Selector,
    declarations: Vec<(String, String)>,
}

/// Parsed contents of an `@page` rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRule {
    pub size: Option<(f32, f32)>,
    /// Top, right, bottom, left.
    pub margin: Option<[f32; 4]>,
}

impl PageRule {
    /// Apply onto a base geometry.
    pub fn geometry(&self, base: PageGeometry) -> PageGeometry {
        let mut page = base;
        if let Some((w, h)) = self.size {
            page.width = w;
            page.height = h;
        }
        if let Some([t, r, b, l]) = self.margin {
            page.margin_top = t;
            page.margin_right = r;
            page.margin_bottom = b;
            page.margin_left = l;
        }
        page
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stylesheet {
    rules: Vec<Rule>,
    pub page: Option<PageRule>,
}

impl Stylesheet {
    pub fn parse(css: &str) -> Result<Self, RenderError> {
        let css = strip_comments(css)?;
        let mut sheet = Stylesheet::default();
        let mut rest = css.as_str();

        while let Some(open) = rest.find('{') {
            let prelude = rest[..open].trim();
            let close = matching_brace(&rest[open..]).ok_or_else(|| {
                RenderError::Stylesheet(format!("unclosed block after '{prelude}'"))
            })? + open;
            let body = &rest[open + 1..close];
            rest = &rest[close + 1..];

            if prelude.eq_ignore_ascii_case("@page") {
                let mut page = sheet.page.take().unwrap_or_default();
                for (prop, val) in declarations(body) {
                    apply_page_property(&mut page, &prop, &val);
                }
                sheet.page = Some(page);
                continue;
            }
            if prelude.starts_with('@') {
                // @media, @font-face and friends.
                continue;
            }

            let decls = declarations(body);
            for selector in prelude.split(',').filter_map(Selector::parse) {
                sheet.rules.push(Rule {
                    selector,
                    declarations: decls.clone(),
                });
            }
        }

        if rest.contains('}') {
            return Err(RenderError::Stylesheet("unexpected '}'".to_string()));
        }
        Ok(sheet)
    }

    /// Merge another sheet's rules after this one's.
    pub fn extend(&mut self, other: Stylesheet) {
        self.rules.extend(other.rules);
        if other.page.is_some() {
            self.page = other.page;
        }
    }

    /// Resolve the style of an element from its parent's.
    pub fn resolve(&self, tag: &Tag, classes: &[&str], parent: &TextStyle) -> TextStyle {
        let mut style = parent.inherit();
        apply_tag_defaults(&mut style, tag);

        let mut matching: Vec<(u8, usize, &Rule)> = self
            .rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.selector.matches(tag, classes))
            .map(|(i, r)| (r.selector.specificity(), i, r))
            .collect();
        matching.sort_by_key(|(spec, order, _)| (*spec, *order));

        for (_, _, rule) in matching {
            // Font size first so relative lengths in the same rule use it.
            for (prop, val) in rule.declarations.iter().filter(|(p, _)| p == "font-size") {
                apply_css_property(&mut style, prop, val, parent.font_size);
            }
            for (prop, val) in rule.declarations.iter().filter(|(p, _)| p != "font-size") {
                apply_css_property(&mut style, prop, val, parent.font_size);
            }
        }
        style
    }
}

fn strip_comments(css: &str) -> Result<String, RenderError> {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        let end = rest[start + 2..]
            .find("*/")
            .ok_or_else(|| RenderError::Stylesheet("unterminated comment".to_string()))?;
        rest = &rest[start + 2 + end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Index of the `}` closing the `{` at the start of `s`.
fn matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn declarations(body: &str) -> Vec<(String, String)> {
    body.split(';')
        .filter_map(|decl| {
            let (prop, val) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let val = val.trim().trim_end_matches("!important").trim().to_string();
            (!prop.is_empty() && !val.is_empty()).then_some((prop, val))
        })
        .collect()
}

/// Built-in defaults by element, before any stylesheet rule.
fn apply_tag_defaults(s: &mut TextStyle, tag: &Tag) {
    match tag {
        Tag::H1 | Tag::H2 | Tag::H3 | Tag::H4 | Tag::H5 | Tag::H6 => {
            let (size, before, after) = match tag {
                Tag::H1 => (24.0, 16.0, 12.0),
                Tag::H2 => (20.0, 14.0, 10.0),
                Tag::H3 => (16.0, 12.0, 8.0),
                Tag::H4 => (14.0, 10.0, 6.0),
                _ => (12.0, 8.0, 6.0),
            };
            s.font_size = size;
            s.font_weight = FontWeight::Bold;
            s.margin_top = before;
            s.margin_bottom = after;
            s.line_height = 1.2;
        }
        Tag::P => s.margin_bottom = 10.0,
        Tag::Ul | Tag::Ol => {
            s.margin_left = 24.0;
            s.margin_bottom = 10.0;
        }
        Tag::Li => s.margin_bottom = 4.0,
        Tag::Blockquote => {
            s.margin_left = 24.0;
            s.margin_right = 24.0;
            s.margin_bottom = 10.0;
        }
        Tag::Pre => {
            s.font_family = FontFamily::Courier;
            s.margin_bottom = 10.0;
        }
        Tag::Hr => {
            s.margin_top = 6.0;
            s.margin_bottom = 6.0;
        }
        Tag::Th | Tag::Strong | Tag::B => s.font_weight = FontWeight::Bold,
        Tag::Em | Tag::I => s.font_style = FontStyle::Italic,
        Tag::Code => s.font_family = FontFamily::Courier,
        _ => {}
    }
}

fn apply_css_property(s: &mut TextStyle, prop: &str, val: &str, parent_size: f32) {
    let lower = val.to_ascii_lowercase();
    match prop {
        "font-size" => {
            if let Some(pt) = parse_length(&lower, parent_size) {
                s.font_size = pt;
            }
        }
        "font-family" => {
            if let Some(family) = FontFamily::from_css(val) {
                s.font_family = family;
            }
        }
        "font-weight" => {
            s.font_weight = match lower.as_str() {
                "bold" | "bolder" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match lower.as_str() {
                "italic" | "oblique" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "color" => {
            if let Some(c) = Color::from_css(&lower) {
                s.color = c;
            }
        }
        "text-align" => {
            s.text_align = match lower.as_str() {
                "center" => TextAlign::Center,
                "right" | "end" => TextAlign::Right,
                "justify" => TextAlign::Justify,
                _ => TextAlign::Left,
            }
        }
        "line-height" => {
            if let Ok(factor) = lower.parse::<f32>() {
                s.line_height = factor;
            } else if let Some(pt) = parse_length(&lower, s.font_size) {
                if s.font_size > 0.0 {
                    s.line_height = pt / s.font_size;
                }
            }
        }
        "margin" => {
            if let Some([t, r, b, l]) = parse_box(&lower, s.font_size) {
                s.margin_top = t;
                s.margin_right = r;
                s.margin_bottom = b;
                s.margin_left = l;
            }
        }
        "margin-top" => set_length(&mut s.margin_top, &lower, s.font_size),
        "margin-right" => set_length(&mut s.margin_right, &lower, s.font_size),
        "margin-bottom" => set_length(&mut s.margin_bottom, &lower, s.font_size),
        "margin-left" => set_length(&mut s.margin_left, &lower, s.font_size),
        "page-break-before" | "break-before" => {
            s.page_break_before = lower == "always" || lower == "page";
        }
        "page-break-after" | "break-after" => {
            s.page_break_after = lower == "always" || lower == "page";
        }
        _ => {}
    }
}

fn apply_page_property(page: &mut PageRule, prop: &str, val: &str) {
    let lower = val.to_ascii_lowercase();
    match prop {
        "size" => page.size = parse_page_size(&lower),
        "margin" => page.margin = parse_box(&lower, 12.0),
        "margin-top" | "margin-right" | "margin-bottom" | "margin-left" => {
            if let Some(pt) = parse_length(&lower, 12.0) {
                let margin = page.margin.get_or_insert([72.0; 4]);
                let idx = match prop {
                    "margin-top" => 0,
                    "margin-right" => 1,
                    "margin-bottom" => 2,
                    _ => 3,
                };
                margin[idx] = pt;
            }
        }
        _ => {}
    }
}

fn set_length(target: &mut f32, val: &str, font_size: f32) {
    if let Some(pt) = parse_length(val, font_size) {
        *target = pt;
    }
}

/// A CSS length in points. Unitless numbers are taken as points; `em` and
/// `%` are relative to `font_size`.
pub fn parse_length(val: &str, font_size: f32) -> Option<f32> {
    let val = val.trim();
    if val == "0" || val == "auto" {
        return Some(0.0);
    }
    let split = val
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(val.len());
    let (number, unit) = val.split_at(split);
    let number: f32 = number.parse().ok()?;
    let factor = match unit.trim() {
        "" | "pt" => 1.0,
        "px" => 0.75,
        "em" | "rem" => font_size,
        "%" => font_size / 100.0,
        "in" => 72.0,
        "cm" => 72.0 / 2.54,
        "mm" => 72.0 / 25.4,
        "pc" => 12.0,
        _ => return None,
    };
    Some(number * factor)
}

/// One to four lengths, expanded CSS-style to top, right, bottom, left.
fn parse_box(val: &str, font_size: f32) -> Option<[f32; 4]> {
    let parts: Vec<f32> = val
        .split_whitespace()
        .map(|p| parse_length(p, font_size))
        .collect::<Option<_>>()?;
    match parts[..] {
        [a] => Some([a, a, a, a]),
        [v, h] => Some([v, h, v, h]),
        [t, h, b] => Some([t, h, b, h]),
        [t, r, b, l] => Some([t, r, b, l]),
        _ => None,
    }
}

fn parse_page_size(val: &str) -> Option<(f32, f32)> {
    let mut landscape = false;
    let mut named = None;
    let mut lengths = Vec::new();
    for token in val.split_whitespace() {
        match token {
            "landscape" => landscape = true,
            "portrait" => {}
            "a4" => named = Some((PageGeometry::A4_WIDTH, PageGeometry::A4_HEIGHT)),
            "a5" => named = Some((419.53, 595.28)),
            "a3" => named = Some((841.89, 1190.55)),
            "letter" => named = Some((612.0, 792.0)),
            "legal" => named = Some((612.0, 1008.0)),
            other => lengths.push(parse_length(other, 12.0)?),
        }
    }
    let (w, h) = match (named, lengths.as_slice()) {
        (Some(size), []) => size,
        (None, &[side]) => (side, side),
        (None, &[w, h]) => (w, h),
        (None, []) if landscape => (PageGeometry::A4_WIDTH, PageGeometry::A4_HEIGHT),
        _ => return None,
    };
    Some(if landscape && w < h { (h, w) } else { (w, h) })
}
