// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::cell::OnceCell;

use tiny_skia::{Pixmap, PixmapMut, PixmapPaint, Size, Transform};

use crate::geom::{parse_aspect_ratio, parse_transform, ViewBox};
use crate::layout::Layout;
use crate::style::{self, Style, Visibility};
use crate::units::{resolve_attr_length, LengthBase};
use crate::xmltree::{Document, Node, NodeId};
use crate::{paint_server, shapes, Options};

/// Per-render immutable state.
pub(crate) struct Context<'a> {
    pub doc: &'a Document,
    pub opt: &'a Options,
    /// Set for SVG documents loaded through `<image>`:
    /// their own `image` elements are ignored.
    pub allow_image_elements: bool,
    fontdb: OnceCell<fontdb::Database>,
}

impl<'a> Context<'a> {
    pub fn new(doc: &'a Document, opt: &'a Options) -> Self {
        Context {
            doc,
            opt,
            allow_image_elements: true,
            fontdb: OnceCell::new(),
        }
    }

    /// The system font database, loaded on first text usage.
    pub fn fontdb(&self) -> &fontdb::Database {
        self.fontdb.get_or_init(|| {
            let mut db = fontdb::Database::new();
            db.load_system_fonts();
            db
        })
    }
}

/// Mutable recursion state: the reference cycle guards.
#[derive(Default)]
pub(crate) struct RenderState {
    /// `use` targets on the current recursion stack.
    pub active_use: Vec<NodeId>,
    /// `pattern` elements on the current recursion stack.
    pub active_patterns: Vec<NodeId>,
}

/// Paints the whole document onto the pixmap.
pub(crate) fn render_document(ctx: &Context, layout: &Layout, pixmap: &mut PixmapMut) {
    let root_transform = Transform::from_scale(ctx.opt.scale, ctx.opt.scale)
        .pre_concat(layout.view_box.to_transform(layout.base));

    let root = ctx.doc.root_element();
    let root_style = style::resolve(&Style::root(ctx.opt), root, layout.base);
    if !root_style.display || root_style.visibility != Visibility::Visible {
        return;
    }

    let mut state = RenderState::default();
    for child in root.children() {
        render_node(
            child,
            ctx,
            &mut state,
            &root_style,
            layout.base,
            root_transform,
            pixmap,
        );
    }
}

/// Elements that only define resources and are never painted directly.
fn is_definition(local_name: &str) -> bool {
    matches!(
        local_name,
        "defs"
            | "linearGradient"
            | "radialGradient"
            | "stop"
            | "pattern"
            | "clipPath"
            | "mask"
            | "marker"
            | "color-profile"
            | "filter"
            | "style"
            | "title"
            | "desc"
            | "metadata"
    )
}

/// Paints one element: style resolution, transform stacking,
/// filter hand-off and the opacity layer.
pub(crate) fn render_node(
    node: Node,
    ctx: &Context,
    state: &mut RenderState,
    parent_style: &Style,
    viewport: Size,
    transform: Transform,
    pixmap: &mut PixmapMut,
) {
    if is_definition(node.local_name()) {
        return;
    }

    let style = style::resolve(parent_style, node, viewport);
    if !style.display || style.visibility != Visibility::Visible {
        return;
    }

    let transform = transform.pre_concat(parse_transform(node.attribute("transform")));
    if !transform.is_valid() {
        return;
    }

    if let Some(filter_id) = node.attribute("filter").and_then(parse_func_iri) {
        match ctx
            .doc
            .element_by_id(filter_id)
            .filter(|n| n.local_name() == "filter")
        {
            Some(filter_node) => {
                crate::filter::apply(
                    node,
                    filter_node,
                    ctx,
                    state,
                    &style,
                    viewport,
                    transform,
                    pixmap,
                );
            }
            None => {
                // A broken filter reference disables the element.
                log::warn!("Unresolvable filter reference '{}'.", filter_id);
            }
        }
        return;
    }

    if style.opacity < 1.0 {
        let mut sub_pixmap = match Pixmap::new(pixmap.width(), pixmap.height()) {
            Some(v) => v,
            None => return,
        };
        render_element(
            node,
            ctx,
            state,
            &style,
            viewport,
            transform,
            &mut sub_pixmap.as_mut(),
        );
        pixmap.draw_pixmap(
            0,
            0,
            sub_pixmap.as_ref(),
            &PixmapPaint {
                opacity: style.opacity,
                ..PixmapPaint::default()
            },
            Transform::identity(),
            None,
        );
    } else {
        render_element(node, ctx, state, &style, viewport, transform, pixmap);
    }
}

/// Paints the element itself, transform and opacity already handled.
///
/// The filter pipeline also enters here to get an element's pixels
/// without re-triggering its own `filter` attribute.
pub(crate) fn render_element(
    node: Node,
    ctx: &Context,
    state: &mut RenderState,
    style: &Style,
    viewport: Size,
    transform: Transform,
    pixmap: &mut PixmapMut,
) {
    match node.local_name() {
        "svg" => render_nested_svg(node, ctx, state, style, viewport, transform, pixmap),
        "use" => render_use(node, ctx, state, style, viewport, transform, pixmap),
        "g" | "symbol" | "a" => {
            render_children(node, ctx, state, style, viewport, transform, pixmap)
        }
        "text" => crate::text::render(node, ctx, state, style, viewport, transform, pixmap),
        "image" => {
            if ctx.allow_image_elements {
                crate::image::render(node, ctx, style, viewport, transform, pixmap);
            }
        }
        _ => match shapes::convert(node, viewport, style.font_size) {
            Some(path) => {
                fill_path(&path, ctx, state, style, viewport, transform, pixmap);
                stroke_path(&path, ctx, state, style, viewport, transform, pixmap);
            }
            None => {
                // Unknown elements do not hide supported descendants.
                render_children(node, ctx, state, style, viewport, transform, pixmap);
            }
        },
    }
}

pub(crate) fn render_children(
    node: Node,
    ctx: &Context,
    state: &mut RenderState,
    style: &Style,
    viewport: Size,
    transform: Transform,
    pixmap: &mut PixmapMut,
) {
    for child in node.children() {
        render_node(child, ctx, state, style, viewport, transform, pixmap);
    }
}

fn render_nested_svg(
    node: Node,
    ctx: &Context,
    state: &mut RenderState,
    style: &Style,
    viewport: Size,
    transform: Transform,
    pixmap: &mut PixmapMut,
) {
    let x = resolve_attr_length(node, "x", LengthBase::Width, viewport, style.font_size, 0.0);
    let y = resolve_attr_length(node, "y", LengthBase::Height, viewport, style.font_size, 0.0);
    let width = resolve_attr_length(
        node,
        "width",
        LengthBase::Width,
        viewport,
        style.font_size,
        viewport.width(),
    );
    let height = resolve_attr_length(
        node,
        "height",
        LengthBase::Height,
        viewport,
        style.font_size,
        viewport.height(),
    );

    // A zero-sized nested viewport is not an error, just invisible.
    let new_viewport = match Size::from_wh(width, height) {
        Some(v) => v,
        None => return,
    };

    let view_box_transform = match node
        .attribute("viewBox")
        .and_then(|v| std::str::FromStr::from_str(v).ok())
        .and_then(|vb: svgtypes::ViewBox| {
            tiny_skia::NonZeroRect::from_xywh(vb.x as f32, vb.y as f32, vb.w as f32, vb.h as f32)
        }) {
        Some(rect) => ViewBox {
            rect,
            aspect: parse_aspect_ratio(node.attribute("preserveAspectRatio")),
        }
        .to_transform(new_viewport),
        None => Transform::identity(),
    };

    let content_transform = transform
        .pre_concat(Transform::from_translate(x, y))
        .pre_concat(view_box_transform);

    let mut sub_pixmap = match Pixmap::new(pixmap.width(), pixmap.height()) {
        Some(v) => v,
        None => return,
    };
    render_children(
        node,
        ctx,
        state,
        style,
        new_viewport,
        content_transform,
        &mut sub_pixmap.as_mut(),
    );

    // Clip to the nested viewport rect.
    let clip_rect = match tiny_skia::Rect::from_xywh(x, y, width, height) {
        Some(v) => v,
        None => return,
    };
    let mut mask = match tiny_skia::Mask::new(pixmap.width(), pixmap.height()) {
        Some(v) => v,
        None => return,
    };
    mask.fill_path(
        &tiny_skia::PathBuilder::from_rect(clip_rect),
        tiny_skia::FillRule::Winding,
        true,
        transform,
    );
    sub_pixmap.apply_mask(&mask);

    pixmap.draw_pixmap(
        0,
        0,
        sub_pixmap.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
}

fn render_use(
    node: Node,
    ctx: &Context,
    state: &mut RenderState,
    style: &Style,
    viewport: Size,
    transform: Transform,
    pixmap: &mut PixmapMut,
) {
    let id = match node.href().and_then(|href| href.strip_prefix('#')) {
        Some(v) => v,
        None => return,
    };
    // A missing target is a no-op.
    let target = match ctx.doc.element_by_id(id) {
        Some(v) => v,
        None => return,
    };

    // A reference into an ancestor on the active stack is silently skipped.
    if state.active_use.contains(&target.id()) {
        log::warn!("Recursive 'use' reference to '{}'. Skipped.", id);
        return;
    }

    let x = resolve_attr_length(node, "x", LengthBase::Width, viewport, style.font_size, 0.0);
    let y = resolve_attr_length(node, "y", LengthBase::Height, viewport, style.font_size, 0.0);
    let transform = transform.pre_concat(Transform::from_translate(x, y));

    state.active_use.push(target.id());
    render_node(target, ctx, state, style, viewport, transform, pixmap);
    state.active_use.pop();
}

/// Fills a path, honoring paint servers.
pub(crate) fn fill_path(
    path: &tiny_skia::Path,
    ctx: &Context,
    state: &mut RenderState,
    style: &Style,
    viewport: Size,
    transform: Transform,
    pixmap: &mut PixmapMut,
) -> Option<()> {
    let paint_def = style.fill.as_ref()?;

    let server = paint_server::convert_paint(
        paint_def,
        style.fill_opacity,
        style.color,
        path.compute_tight_bounds()?,
        ctx,
        state,
        viewport,
        style.font_size,
    )?;

    let pattern_pixmap;
    let mut paint = tiny_skia::Paint::default();
    match server {
        paint_server::ServerPaint::Shader(shader) => paint.shader = shader,
        paint_server::ServerPaint::Pattern {
            pixmap: tile,
            transform: pattern_ts,
            opacity,
        } => {
            pattern_pixmap = tile;
            paint.shader = tiny_skia::Pattern::new(
                pattern_pixmap.as_ref(),
                tiny_skia::SpreadMode::Repeat,
                tiny_skia::FilterQuality::Bicubic,
                opacity,
                pattern_ts,
            );
        }
    }
    paint.anti_alias = true;

    pixmap.fill_path(path, &paint, style.fill_rule, transform, None);
    Some(())
}

/// Strokes a path, honoring paint servers and dashing.
pub(crate) fn stroke_path(
    path: &tiny_skia::Path,
    ctx: &Context,
    state: &mut RenderState,
    style: &Style,
    viewport: Size,
    transform: Transform,
    pixmap: &mut PixmapMut,
) -> Option<()> {
    let paint_def = style.stroke.as_ref()?;

    let server = paint_server::convert_paint(
        paint_def,
        style.stroke_opacity,
        style.color,
        path.compute_tight_bounds()?,
        ctx,
        state,
        viewport,
        style.font_size,
    )?;

    let pattern_pixmap;
    let mut paint = tiny_skia::Paint::default();
    match server {
        paint_server::ServerPaint::Shader(shader) => paint.shader = shader,
        paint_server::ServerPaint::Pattern {
            pixmap: tile,
            transform: pattern_ts,
            opacity,
        } => {
            pattern_pixmap = tile;
            paint.shader = tiny_skia::Pattern::new(
                pattern_pixmap.as_ref(),
                tiny_skia::SpreadMode::Repeat,
                tiny_skia::FilterQuality::Bicubic,
                opacity,
                pattern_ts,
            );
        }
    }
    paint.anti_alias = true;

    let stroke = tiny_skia::Stroke {
        width: style.stroke_width,
        miter_limit: style.stroke_miterlimit,
        line_cap: style.stroke_linecap,
        line_join: style.stroke_linejoin,
        dash: style
            .stroke_dasharray
            .clone()
            .and_then(|array| tiny_skia::StrokeDash::new(array, style.stroke_dashoffset)),
    };

    pixmap.stroke_path(path, &paint, &stroke, transform, None);
    Some(())
}

/// Extracts the fragment id out of an `url(#id)` value.
pub(crate) fn parse_func_iri(value: &str) -> Option<&str> {
    let value = value.trim();
    let inner = value.strip_prefix("url(")?;
    let inner = inner.find(')').map(|i| &inner[..i])?;
    let inner = inner.trim().trim_matches(|c| c == '\'' || c == '"');
    inner.strip_prefix('#').filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn func_iri() {
        assert_eq!(parse_func_iri("url(#a)"), Some("a"));
        assert_eq!(parse_func_iri(" url( #a ) "), Some("a"));
        assert_eq!(parse_func_iri("url('#a')"), Some("a"));
        assert_eq!(parse_func_iri("none"), None);
        assert_eq!(parse_func_iri("url(#)"), None);
        assert_eq!(parse_func_iri("url(a)"), None);
    }
}
