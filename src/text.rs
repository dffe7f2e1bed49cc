// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Single-run text rendering.
//!
//! One typographic line per `text` element: per-character glyph lookup,
//! horizontal advances, anchor alignment and decoration lines.
//! No shaping, no bidi, no `tspan` runs.

use tiny_skia::{PathBuilder, PixmapMut, Rect, Size, Transform};

use crate::render::{fill_path, stroke_path, Context, RenderState};
use crate::style::{Style, TextAnchor};
use crate::units::{resolve_attr_length, LengthBase};
use crate::xmltree::Node;

pub(crate) fn render(
    node: Node,
    ctx: &Context,
    state: &mut RenderState,
    style: &Style,
    viewport: Size,
    transform: Transform,
    pixmap: &mut PixmapMut,
) {
    let text = collapse_whitespace(node.text());
    if text.is_empty() {
        return;
    }

    let x = resolve_attr_length(node, "x", LengthBase::Width, viewport, style.font_size, 0.0);
    let y = resolve_attr_length(node, "y", LengthBase::Height, viewport, style.font_size, 0.0);

    let fontdb = ctx.fontdb();
    let id = match query_face(fontdb, style) {
        Some(v) => v,
        None => {
            log::warn!("No match for the '{}' font family.", style.font_family);
            return;
        }
    };

    let line = fontdb.with_face_data(id, |data, face_index| -> Option<Line> {
        let face = ttf_parser::Face::parse(data, face_index).ok()?;
        outline_line(&face, &text, style)
    });
    let line = match line.flatten() {
        Some(v) => v,
        None => return,
    };

    let anchor_offset = match style.text_anchor {
        TextAnchor::Start => 0.0,
        TextAnchor::Middle => -line.width / 2.0,
        TextAnchor::End => -line.width,
    };

    let transform = transform.pre_concat(Transform::from_translate(x + anchor_offset, y));

    // Decorations under the glyphs, line-through above.
    if style.text_decoration.underline {
        draw_decoration_rect(line.underline, ctx, state, style, viewport, transform, pixmap);
    }
    if style.text_decoration.overline {
        draw_decoration_rect(line.overline, ctx, state, style, viewport, transform, pixmap);
    }

    if let Some(ref path) = line.path {
        fill_path(path, ctx, state, style, viewport, transform, pixmap);
        stroke_path(path, ctx, state, style, viewport, transform, pixmap);
    }

    if style.text_decoration.line_through {
        draw_decoration_rect(line.line_through, ctx, state, style, viewport, transform, pixmap);
    }
}

struct Line {
    /// The whole line as one path, positioned at the baseline origin.
    path: Option<tiny_skia::Path>,
    width: f32,
    underline: Option<Rect>,
    overline: Option<Rect>,
    line_through: Option<Rect>,
}

/// Outlines and measures a single line of text.
fn outline_line(face: &ttf_parser::Face, text: &str, style: &Style) -> Option<Line> {
    // Broken fonts with a zero units-per-em would poison the scale.
    let units_per_em = face.units_per_em();
    if units_per_em == 0 {
        return None;
    }
    let scale = style.font_size / units_per_em as f32;

    let mut builder = PathBuilder::new();
    let mut pen_x = 0.0f32;

    for c in text.chars() {
        if let Some(glyph_id) = face.glyph_index(c) {
            let mut glyph_builder = GlyphBuilder {
                builder: &mut builder,
                scale,
                pen_x,
            };
            face.outline_glyph(glyph_id, &mut glyph_builder);

            let advance = face.glyph_hor_advance(glyph_id).unwrap_or(0) as f32 * scale;
            pen_x += advance;
        }

        pen_x += style.letter_spacing;
        if c == ' ' {
            pen_x += style.word_spacing;
        }
    }

    let width = pen_x;

    // Font metrics are Y-up; the canvas is Y-down.
    let metrics_rect = |metrics: Option<ttf_parser::LineMetrics>, fallback_pos: f32| {
        let (position, thickness) = match metrics {
            Some(m) => (
                m.position as f32 * scale,
                (m.thickness as f32 * scale).max(0.5),
            ),
            None => (fallback_pos, (style.font_size / 15.0).max(0.5)),
        };
        Rect::from_xywh(0.0, -position - thickness / 2.0, width, thickness)
    };

    let ascender = face.ascender() as f32 * scale;
    let x_height = face
        .x_height()
        .map(|h| h as f32 * scale)
        .unwrap_or(ascender * 0.45);

    Some(Line {
        path: builder.finish(),
        width,
        underline: metrics_rect(face.underline_metrics(), -style.font_size / 8.0),
        overline: metrics_rect(None, ascender),
        line_through: metrics_rect(face.strikeout_metrics(), x_height / 2.0),
    })
}

fn draw_decoration_rect(
    rect: Option<Rect>,
    ctx: &Context,
    state: &mut RenderState,
    style: &Style,
    viewport: Size,
    transform: Transform,
    pixmap: &mut PixmapMut,
) {
    let rect = match rect {
        Some(v) if v.width() > 0.0 => v,
        _ => return,
    };
    let path = PathBuilder::from_rect(rect);
    fill_path(&path, ctx, state, style, viewport, transform, pixmap);
}

/// Writes a glyph outline into the line path builder,
/// scaled to the font size and flipped to the Y-down canvas.
struct GlyphBuilder<'a> {
    builder: &'a mut PathBuilder,
    scale: f32,
    pen_x: f32,
}

impl GlyphBuilder<'_> {
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.pen_x + x * self.scale, -y * self.scale)
    }
}

impl ttf_parser::OutlineBuilder for GlyphBuilder<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Queries the font database for the styled family list.
fn query_face(fontdb: &fontdb::Database, style: &Style) -> Option<fontdb::ID> {
    let mut families = Vec::new();
    for family in style.font_family.split(',') {
        let name = family.trim().trim_matches(|c| c == '\'' || c == '"');
        if name.is_empty() {
            continue;
        }
        families.push(match name {
            "serif" => fontdb::Family::Serif,
            "sans-serif" => fontdb::Family::SansSerif,
            "monospace" => fontdb::Family::Monospace,
            "cursive" => fontdb::Family::Cursive,
            "fantasy" => fontdb::Family::Fantasy,
            _ => fontdb::Family::Name(name),
        });
    }
    // The last resort fallback.
    families.push(fontdb::Family::Serif);

    let query = fontdb::Query {
        families: &families,
        weight: fontdb::Weight(style.font_weight),
        stretch: fontdb::Stretch::Normal,
        style: match style.font_style {
            crate::style::FontStyle::Normal => fontdb::Style::Normal,
            crate::style::FontStyle::Italic => fontdb::Style::Italic,
            crate::style::FontStyle::Oblique => fontdb::Style::Oblique,
        },
    };

    fontdb.query(&query)
}

/// Collapses runs of whitespace into single spaces, trimming the ends.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_space = true;
    for c in text.chars() {
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::collapse_whitespace;

    #[test]
    fn whitespace_collapsing() {
        assert_eq!(collapse_whitespace("  a\n  b\tc  "), "a b c");
        assert_eq!(collapse_whitespace("\n\t "), "");
        assert_eq!(collapse_whitespace("abc"), "abc");
    }
}
