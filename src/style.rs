// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::str::FromStr;

pub use svgtypes::Color;
use svgtypes::PaintFallback;
use tiny_skia::Size;

use crate::units::{self, LengthBase};
use crate::xmltree::Node;
use crate::Options;

/// A resolved paint value.
#[derive(Clone, PartialEq, Debug)]
pub enum Paint {
    /// A solid color.
    Color(Color),
    /// The `currentColor` keyword.
    ///
    /// Kept symbolic so that a descendant with a different `color`
    /// re-binds it; the painter snaps it to [`Style::color`].
    CurrentColor,
    /// A `url(#id)` paint server reference.
    Link {
        /// The referenced element id.
        id: String,
        /// An optional fallback for a broken reference.
        fallback: Option<PaintFallback>,
    },
}

impl Paint {
    /// Returns the effective solid color, when the paint is one.
    pub fn to_color(&self, current_color: Color) -> Option<Color> {
        match self {
            Paint::Color(c) => Some(*c),
            Paint::CurrentColor => Some(current_color),
            Paint::Link { .. } => None,
        }
    }
}

/// An element visibility.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Visibility {
    Visible,
    Hidden,
    Collapse,
}

/// A `text-anchor` value.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum TextAnchor {
    Start,
    Middle,
    End,
}

/// A `font-style` value.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum FontStyle {
    Normal,
    Italic,
    Oblique,
}

/// Text decoration flags.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Default, Debug)]
pub struct TextDecoration {
    pub underline: bool,
    pub overline: bool,
    pub line_through: bool,
}

/// The cascaded property bag of a single element.
#[derive(Clone, Debug)]
pub struct Style {
    /// The resolved `color` property, the `currentColor` source.
    pub color: Color,
    /// Fill paint. `None` means no fill.
    pub fill: Option<Paint>,
    /// Fill opacity in `[0, 1]`.
    pub fill_opacity: f32,
    /// Fill rule.
    pub fill_rule: tiny_skia::FillRule,
    /// Stroke paint. `None` means no stroke.
    pub stroke: Option<Paint>,
    /// Stroke opacity in `[0, 1]`.
    pub stroke_opacity: f32,
    /// Stroke width in user units.
    pub stroke_width: f32,
    /// Miter limit, at least 1.
    pub stroke_miterlimit: f32,
    /// Line cap.
    pub stroke_linecap: tiny_skia::LineCap,
    /// Line join.
    pub stroke_linejoin: tiny_skia::LineJoin,
    /// Dash array. `None` or an all-zero list means a solid stroke.
    pub stroke_dasharray: Option<Vec<f32>>,
    /// Dash offset.
    pub stroke_dashoffset: f32,
    /// Group opacity. Not inherited.
    pub opacity: f32,
    /// Whether the element is rendered at all. Not inherited.
    pub display: bool,
    /// Element visibility.
    pub visibility: Visibility,
    /// Font family list as written.
    pub font_family: String,
    /// Font size in user units.
    pub font_size: f32,
    /// Font weight, 100..=900.
    pub font_weight: u16,
    /// Font style.
    pub font_style: FontStyle,
    /// Text anchor.
    pub text_anchor: TextAnchor,
    /// Additional spacing per glyph.
    pub letter_spacing: f32,
    /// Additional spacing per word gap.
    pub word_spacing: f32,
    /// Text decoration lines.
    pub text_decoration: TextDecoration,
}

impl Style {
    /// The style of the root element's parent.
    pub fn root(opt: &Options) -> Style {
        Style {
            color: Color::black(),
            fill: Some(Paint::Color(Color::black())),
            fill_opacity: 1.0,
            fill_rule: tiny_skia::FillRule::Winding,
            stroke: None,
            stroke_opacity: 1.0,
            stroke_width: 1.0,
            stroke_miterlimit: 4.0,
            stroke_linecap: tiny_skia::LineCap::Butt,
            stroke_linejoin: tiny_skia::LineJoin::Miter,
            stroke_dasharray: None,
            stroke_dashoffset: 0.0,
            opacity: 1.0,
            display: true,
            visibility: Visibility::Visible,
            font_family: opt.font_family.clone(),
            font_size: opt.font_size,
            font_weight: 400,
            font_style: FontStyle::Normal,
            text_anchor: TextAnchor::Start,
            letter_spacing: 0.0,
            word_spacing: 0.0,
            text_decoration: TextDecoration::default(),
        }
    }
}

/// Computes the resolved style of `node` from its parent style.
///
/// Attribute values already embody the
/// attribute < stylesheet < inline-style precedence, so this is a plain
/// copy-then-override pass. Unparsable values keep the inherited one.
pub fn resolve(parent: &Style, node: Node, viewport: Size) -> Style {
    let mut s = parent.clone();
    s.opacity = 1.0;
    s.display = true;

    // The `font` shorthand first, so `font-*` attributes can override it.
    if let Some(value) = node.attribute("font") {
        if let Ok(font) = svgtypes::FontShorthand::from_str(value) {
            if let Some(size) = units::resolve_font_size(font.font_size, parent.font_size) {
                s.font_size = size;
            }
            s.font_family = font.font_family.to_string();
            if let Some(weight) = font.font_weight {
                apply_font_weight(&mut s, weight);
            }
            if let Some(style) = font.font_style {
                apply_font_style(&mut s, style);
            }
        }
    }

    if let Some(value) = node.attribute("font-size") {
        if let Some(size) = units::resolve_font_size(value, parent.font_size) {
            s.font_size = size;
        }
    }
    if let Some(value) = node.attribute("font-family") {
        s.font_family = value.to_string();
    }
    if let Some(value) = node.attribute("font-weight") {
        apply_font_weight(&mut s, value);
    }
    if let Some(value) = node.attribute("font-style") {
        apply_font_style(&mut s, value);
    }

    if let Some(value) = node.attribute("color") {
        if let Ok(color) = Color::from_str(value) {
            s.color = color;
        }
    }

    if let Some(value) = node.attribute("fill") {
        if let Some(paint) = parse_paint(value) {
            s.fill = paint;
        }
    }
    if let Some(value) = node.attribute("stroke") {
        if let Some(paint) = parse_paint(value) {
            s.stroke = paint;
        }
    }

    if let Some(value) = node.attribute("fill-opacity") {
        if let Some(opacity) = parse_opacity(value) {
            s.fill_opacity = opacity;
        }
    }
    if let Some(value) = node.attribute("stroke-opacity") {
        if let Some(opacity) = parse_opacity(value) {
            s.stroke_opacity = opacity;
        }
    }
    if let Some(value) = node.attribute("opacity") {
        if let Some(opacity) = parse_opacity(value) {
            s.opacity = opacity;
        }
    }

    if let Some(value) = node.attribute("fill-rule") {
        match value {
            "nonzero" => s.fill_rule = tiny_skia::FillRule::Winding,
            "evenodd" => s.fill_rule = tiny_skia::FillRule::EvenOdd,
            _ => {}
        }
    }

    if let Some(length) = node.attribute("stroke-width").and_then(units::parse_length) {
        let width = units::resolve_length(length, LengthBase::Diagonal, viewport, s.font_size);
        if width > 0.0 && width.is_finite() {
            s.stroke_width = width;
        }
    }
    if let Some(value) = node.attribute("stroke-miterlimit") {
        if let Ok(limit) = f32::from_str(value) {
            s.stroke_miterlimit = limit.max(1.0);
        }
    }
    if let Some(value) = node.attribute("stroke-linecap") {
        match value {
            "butt" => s.stroke_linecap = tiny_skia::LineCap::Butt,
            "round" => s.stroke_linecap = tiny_skia::LineCap::Round,
            "square" => s.stroke_linecap = tiny_skia::LineCap::Square,
            _ => {}
        }
    }
    if let Some(value) = node.attribute("stroke-linejoin") {
        match value {
            "miter" => s.stroke_linejoin = tiny_skia::LineJoin::Miter,
            "round" => s.stroke_linejoin = tiny_skia::LineJoin::Round,
            "bevel" => s.stroke_linejoin = tiny_skia::LineJoin::Bevel,
            _ => {}
        }
    }
    if let Some(value) = node.attribute("stroke-dasharray") {
        s.stroke_dasharray = parse_dasharray(value, viewport, s.font_size);
    }
    if let Some(length) = node
        .attribute("stroke-dashoffset")
        .and_then(units::parse_length)
    {
        s.stroke_dashoffset =
            units::resolve_length(length, LengthBase::Diagonal, viewport, s.font_size);
    }

    if let Some(value) = node.attribute("display") {
        s.display = value != "none";
    }
    if let Some(value) = node.attribute("visibility") {
        match value {
            "visible" => s.visibility = Visibility::Visible,
            "hidden" => s.visibility = Visibility::Hidden,
            "collapse" => s.visibility = Visibility::Collapse,
            _ => {}
        }
    }

    if let Some(value) = node.attribute("text-anchor") {
        match value {
            "start" => s.text_anchor = TextAnchor::Start,
            "middle" => s.text_anchor = TextAnchor::Middle,
            "end" => s.text_anchor = TextAnchor::End,
            _ => {}
        }
    }
    if let Some(value) = node.attribute("letter-spacing") {
        s.letter_spacing = parse_spacing(value, viewport, s.font_size, s.letter_spacing);
    }
    if let Some(value) = node.attribute("word-spacing") {
        s.word_spacing = parse_spacing(value, viewport, s.font_size, s.word_spacing);
    }
    if let Some(value) = node.attribute("text-decoration") {
        let mut decoration = TextDecoration::default();
        for keyword in value.split_whitespace() {
            match keyword {
                "underline" => decoration.underline = true,
                "overline" => decoration.overline = true,
                "line-through" => decoration.line_through = true,
                _ => {}
            }
        }
        s.text_decoration = decoration;
    }

    s
}

/// Parses a paint value.
///
/// The outer `Option` is `None` when the value is unparsable or `inherit`,
/// i.e. when the inherited paint must be kept.
fn parse_paint(value: &str) -> Option<Option<Paint>> {
    match svgtypes::Paint::from_str(value) {
        Ok(svgtypes::Paint::None) => Some(None),
        Ok(svgtypes::Paint::Inherit) => None,
        Ok(svgtypes::Paint::CurrentColor) => Some(Some(Paint::CurrentColor)),
        Ok(svgtypes::Paint::Color(color)) => Some(Some(Paint::Color(color))),
        Ok(svgtypes::Paint::FuncIRI(iri, fallback)) => Some(Some(Paint::Link {
            id: iri.to_string(),
            fallback,
        })),
        Ok(svgtypes::Paint::ContextFill) | Ok(svgtypes::Paint::ContextStroke) => {
            log::warn!("Unsupported paint value: '{}'.", value);
            None
        }
        Err(_) => {
            log::warn!("Failed to parse a paint value: '{}'.", value);
            None
        }
    }
}

/// Parses an opacity value, clamped to `[0, 1]`. Accepts percents.
pub fn parse_opacity(value: &str) -> Option<f32> {
    let value = value.trim();
    let n = match value.strip_suffix('%') {
        Some(p) => f32::from_str(p.trim_end()).ok()? / 100.0,
        None => f32::from_str(value).ok()?,
    };
    if n.is_finite() {
        Some(n.clamp(0.0, 1.0))
    } else {
        None
    }
}

// Prepare the `stroke-dasharray` according to:
// https://www.w3.org/TR/SVG11/painting.html#StrokeDasharrayProperty
fn parse_dasharray(value: &str, viewport: Size, font_size: f32) -> Option<Vec<f32>> {
    if value == "none" {
        return None;
    }

    let list = units::resolve_length_list(value, LengthBase::Diagonal, viewport, font_size);
    if list.is_empty() {
        return None;
    }

    // 'A negative value is an error.'
    if list.iter().any(|n| n.is_sign_negative()) {
        return None;
    }

    // 'If the sum of the values is zero, then the stroke is rendered
    // as if a value of none were specified.'
    if list.iter().sum::<f32>() <= 0.0 {
        return None;
    }

    // 'If an odd number of values is provided, then the list of values
    // is repeated to yield an even number of values.'
    if list.len() % 2 != 0 {
        let mut doubled = list.clone();
        doubled.extend_from_slice(&list);
        return Some(doubled);
    }

    Some(list)
}

fn parse_spacing(value: &str, viewport: Size, font_size: f32, inherited: f32) -> f32 {
    if value == "normal" {
        return 0.0;
    }
    match units::parse_length(value) {
        Some(length) => units::resolve_length(length, LengthBase::Width, viewport, font_size),
        None => inherited,
    }
}

fn apply_font_weight(s: &mut Style, value: &str) {
    match value {
        "normal" => s.font_weight = 400,
        "bold" => s.font_weight = 700,
        "bolder" => s.font_weight = (s.font_weight + 300).min(900),
        "lighter" => s.font_weight = s.font_weight.saturating_sub(300).max(100),
        _ => {
            if let Ok(weight) = u16::from_str(value) {
                if (100..=900).contains(&weight) {
                    s.font_weight = weight;
                }
            }
        }
    }
}

fn apply_font_style(s: &mut Style, value: &str) {
    match value {
        "normal" => s.font_style = FontStyle::Normal,
        "italic" => s.font_style = FontStyle::Italic,
        "oblique" => s.font_style = FontStyle::Oblique,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmltree::Document;

    fn viewport() -> Size {
        Size::from_wh(100.0, 100.0).unwrap()
    }

    fn resolve_first(doc: &Document) -> Style {
        let opt = Options::default();
        let root = Style::root(&opt);
        let svg = doc.root_element();
        let parent = resolve(&root, svg, viewport());
        resolve(&parent, svg.children().next().unwrap(), viewport())
    }

    #[test]
    fn defaults() {
        let doc = Document::parse("<svg><rect/></svg>").unwrap();
        let s = resolve_first(&doc);
        assert_eq!(s.fill, Some(Paint::Color(Color::black())));
        assert_eq!(s.stroke, None);
        assert_eq!(s.fill_rule, tiny_skia::FillRule::Winding);
        assert_eq!(s.stroke_miterlimit, 4.0);
    }

    #[test]
    fn inheritance() {
        let doc = Document::parse("<svg fill='#102030' fill-opacity='0.5'><rect/></svg>").unwrap();
        let s = resolve_first(&doc);
        assert_eq!(s.fill, Some(Paint::Color(Color::new_rgb(0x10, 0x20, 0x30))));
        assert_eq!(s.fill_opacity, 0.5);
    }

    #[test]
    fn current_color() {
        let doc = Document::parse("<svg color='red'><rect fill='currentColor'/></svg>").unwrap();
        let s = resolve_first(&doc);
        assert_eq!(s.fill, Some(Paint::CurrentColor));
        assert_eq!(
            s.fill.as_ref().unwrap().to_color(s.color),
            Some(Color::new_rgb(255, 0, 0))
        );
    }

    #[test]
    fn current_color_rebinds_in_descendants() {
        let doc = Document::parse(
            "<svg><g fill='currentColor' color='#ff0000'><g color='#0000ff'/></g></svg>",
        )
        .unwrap();
        let opt = Options::default();
        let root = Style::root(&opt);
        let svg = doc.root_element();
        let s0 = resolve(&root, svg, viewport());
        let outer = resolve(&s0, svg.children().next().unwrap(), viewport());
        let inner = resolve(
            &outer,
            svg.children().next().unwrap().children().next().unwrap(),
            viewport(),
        );
        assert_eq!(
            outer.fill.as_ref().unwrap().to_color(outer.color),
            Some(Color::new_rgb(255, 0, 0))
        );
        assert_eq!(
            inner.fill.as_ref().unwrap().to_color(inner.color),
            Some(Color::new_rgb(0, 0, 255))
        );
    }

    #[test]
    fn transparent_alpha_wins_over_fill_opacity() {
        let doc = Document::parse("<svg><rect fill='rgba(10,20,30,0)' fill-opacity='1'/></svg>")
            .unwrap();
        let s = resolve_first(&doc);
        assert_eq!(s.fill, Some(Paint::Color(Color::new_rgba(10, 20, 30, 0))));
    }

    #[test]
    fn explicit_none() {
        let doc = Document::parse("<svg fill='red'><rect fill='none'/></svg>").unwrap();
        let s = resolve_first(&doc);
        assert_eq!(s.fill, None);
    }

    #[test]
    fn invalid_value_keeps_inherited() {
        let doc = Document::parse("<svg fill='#123456'><rect fill='#junk!'/></svg>").unwrap();
        let s = resolve_first(&doc);
        assert_eq!(s.fill, Some(Paint::Color(Color::new_rgb(0x12, 0x34, 0x56))));
    }

    #[test]
    fn paint_server_reference() {
        let doc = Document::parse("<svg><rect fill='url(#g) red'/></svg>").unwrap();
        let s = resolve_first(&doc);
        assert_eq!(
            s.fill,
            Some(Paint::Link {
                id: "g".to_string(),
                fallback: Some(PaintFallback::Color(Color::new_rgb(255, 0, 0))),
            })
        );
    }

    #[test]
    fn odd_dasharray_is_doubled() {
        let doc = Document::parse("<svg><line stroke-dasharray='1 2 3'/></svg>").unwrap();
        let s = resolve_first(&doc);
        assert_eq!(s.stroke_dasharray, Some(vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]));
    }

    #[test]
    fn zero_sum_dasharray_is_solid() {
        let doc = Document::parse("<svg><line stroke-dasharray='0 0'/></svg>").unwrap();
        let s = resolve_first(&doc);
        assert_eq!(s.stroke_dasharray, None);
    }

    #[test]
    fn font_shorthand() {
        let doc = Document::parse("<svg><text font='italic bold 20px Arial'/></svg>").unwrap();
        let s = resolve_first(&doc);
        assert_eq!(s.font_size, 20.0);
        assert_eq!(s.font_weight, 700);
        assert_eq!(s.font_style, FontStyle::Italic);
        assert_eq!(s.font_family, "Arial");
    }

    #[test]
    fn opacity_is_not_inherited() {
        let doc = Document::parse("<svg opacity='0.5'><rect/></svg>").unwrap();
        let s = resolve_first(&doc);
        assert_eq!(s.opacity, 1.0);
    }
}
