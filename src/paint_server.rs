// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::str::FromStr;

use svgtypes::PaintFallback;
use tiny_skia::{
    GradientStop, Pixmap, Rect, Size, SpreadMode, Transform,
};

use crate::geom::{parse_aspect_ratio, parse_transform, ViewBox};
use crate::render::{Context, RenderState};
use crate::style::{Color, Paint, Style};
use crate::units::{self, LengthBase};
use crate::xmltree::Node;

/// A paint ready for `tiny_skia::Paint`.
pub(crate) enum ServerPaint {
    Shader(tiny_skia::Shader<'static>),
    Pattern {
        pixmap: Pixmap,
        transform: Transform,
        opacity: f32,
    },
}

/// The coordinate system of gradient/pattern geometry.
#[derive(Clone, Copy, PartialEq, Debug)]
enum Units {
    UserSpaceOnUse,
    ObjectBoundingBox,
}

/// Resolves a paint into a shader or a pattern tile.
///
/// `opacity` is the effective fill/stroke opacity; it is baked into
/// the produced paint. Returns `None` when nothing should be painted.
pub(crate) fn convert_paint(
    paint: &Paint,
    opacity: f32,
    current_color: Color,
    object_bbox: Rect,
    ctx: &Context,
    state: &mut RenderState,
    viewport: Size,
    font_size: f32,
) -> Option<ServerPaint> {
    match paint {
        Paint::Link { id, fallback } => {
            let server = ctx
                .doc
                .element_by_id(id)
                .filter(|n| {
                    matches!(
                        n.local_name(),
                        "linearGradient" | "radialGradient" | "pattern"
                    )
                });

            let resolved = server.and_then(|server| match server.local_name() {
                "pattern" => convert_pattern(
                    server, opacity, object_bbox, ctx, state, viewport, font_size,
                ),
                _ => convert_gradient(
                    server,
                    opacity,
                    current_color,
                    object_bbox,
                    ctx,
                    viewport,
                    font_size,
                ),
            });

            match resolved {
                Some(v) => Some(v),
                None => match fallback {
                    Some(PaintFallback::Color(c)) => Some(solid(*c, opacity)),
                    Some(PaintFallback::CurrentColor) => Some(solid(current_color, opacity)),
                    Some(PaintFallback::None) | None => None,
                },
            }
        }
        _ => paint.to_color(current_color).map(|c| solid(c, opacity)),
    }
}

fn solid(color: Color, opacity: f32) -> ServerPaint {
    let color = tiny_skia::Color::from_rgba8(
        color.red,
        color.green,
        color.blue,
        combine_alpha(color.alpha, opacity),
    );
    ServerPaint::Shader(tiny_skia::Shader::SolidColor(color))
}

fn combine_alpha(alpha: u8, opacity: f32) -> u8 {
    (alpha as f32 * opacity.clamp(0.0, 1.0) + 0.5) as u8
}

/// A gradient stop with resolved color and combined opacity.
struct Stop {
    offset: f32,
    color: Color,
    opacity: f32,
}

fn convert_gradient(
    node: Node,
    opacity: f32,
    current_color: Color,
    object_bbox: Rect,
    ctx: &Context,
    viewport: Size,
    font_size: f32,
) -> Option<ServerPaint> {
    let chain = resolve_href_chain(node, ctx);

    let stops = collect_stops(&chain, current_color);
    if stops.is_empty() {
        return None;
    }
    // A single stop is just a solid fill.
    if stops.len() == 1 {
        let stop = &stops[0];
        return Some(solid(stop.color, stop.opacity * opacity));
    }

    let units = parse_units(find_attr(&chain, "gradientUnits"), Units::ObjectBoundingBox);
    let gradient_transform = parse_transform(find_attr(&chain, "gradientTransform"));

    let transform = if units == Units::ObjectBoundingBox {
        let bbox = object_bbox.to_non_zero_rect().or_else(|| {
            log::warn!("Gradients on zero-sized shapes are not allowed.");
            None
        })?;
        Transform::from_bbox(bbox).pre_concat(gradient_transform)
    } else {
        gradient_transform
    };

    let mode = match find_attr(&chain, "spreadMethod") {
        Some("reflect") => SpreadMode::Reflect,
        Some("repeat") => SpreadMode::Repeat,
        // 'Always extend beyond stops.'
        _ => SpreadMode::Pad,
    };

    let mut points = Vec::with_capacity(stops.len());
    for stop in &stops {
        let alpha = combine_alpha(stop.color.alpha, stop.opacity * opacity);
        points.push(GradientStop::new(
            stop.offset,
            tiny_skia::Color::from_rgba8(stop.color.red, stop.color.green, stop.color.blue, alpha),
        ));
    }

    let coord = |name: &str, default_percent: f64, base: LengthBase| {
        resolve_server_length(&chain, name, default_percent, base, units, viewport, font_size)
    };

    let shader = if node.local_name() == "linearGradient" {
        let x1 = coord("x1", 0.0, LengthBase::Width);
        let y1 = coord("y1", 0.0, LengthBase::Height);
        let x2 = coord("x2", 100.0, LengthBase::Width);
        let y2 = coord("y2", 0.0, LengthBase::Height);

        // Coincident endpoints paint as the last stop.
        if (x1 - x2).abs() < f32::EPSILON && (y1 - y2).abs() < f32::EPSILON {
            let stop = stops.last().unwrap();
            return Some(solid(stop.color, stop.opacity * opacity));
        }

        tiny_skia::LinearGradient::new((x1, y1).into(), (x2, y2).into(), points, mode, transform)
    } else {
        let cx = coord("cx", 50.0, LengthBase::Width);
        let cy = coord("cy", 50.0, LengthBase::Height);
        let r = coord("r", 50.0, LengthBase::Diagonal);
        if !(r > 0.0) {
            let stop = stops.last().unwrap();
            return Some(solid(stop.color, stop.opacity * opacity));
        }

        let fx = match find_attr(&chain, "fx") {
            Some(_) => coord("fx", 50.0, LengthBase::Width),
            None => cx,
        };
        let fy = match find_attr(&chain, "fy") {
            Some(_) => coord("fy", 50.0, LengthBase::Height),
            None => cy,
        };

        tiny_skia::RadialGradient::new((fx, fy).into(), (cx, cy).into(), r, points, mode, transform)
    };

    shader.map(ServerPaint::Shader)
}

fn convert_pattern(
    node: Node,
    opacity: f32,
    object_bbox: Rect,
    ctx: &Context,
    state: &mut RenderState,
    viewport: Size,
    font_size: f32,
) -> Option<ServerPaint> {
    if state.active_patterns.contains(&node.id()) {
        log::warn!("Self-referencing pattern detected. Skipped.");
        return None;
    }

    let chain = resolve_href_chain(node, ctx);

    let units = parse_units(find_attr(&chain, "patternUnits"), Units::ObjectBoundingBox);
    let content_units = parse_units(
        find_attr(&chain, "patternContentUnits"),
        Units::UserSpaceOnUse,
    );
    let pattern_transform = parse_transform(find_attr(&chain, "patternTransform"));

    let rect = {
        let coord = |name: &str, base: LengthBase| {
            resolve_server_length(&chain, name, 0.0, base, units, viewport, font_size)
        };
        let x = coord("x", LengthBase::Width);
        let y = coord("y", LengthBase::Height);
        let width = coord("width", LengthBase::Width);
        let height = coord("height", LengthBase::Height);

        if units == Units::ObjectBoundingBox {
            Rect::from_xywh(
                object_bbox.x() + x * object_bbox.width(),
                object_bbox.y() + y * object_bbox.height(),
                width * object_bbox.width(),
                height * object_bbox.height(),
            )?
        } else {
            Rect::from_xywh(x, y, width, height)?
        }
    };
    if !(rect.width() > 0.0 && rect.height() > 0.0) {
        return None;
    }

    // The tile surface is sized to the whole user-space units.
    let tile_width = rect.width().ceil().max(1.0);
    let tile_height = rect.height().ceil().max(1.0);
    let mut tile = Pixmap::new(tile_width as u32, tile_height as u32)?;

    let content = chain.iter().copied().find(|n| n.has_children())?;

    let view_box = find_attr(&chain, "viewBox")
        .and_then(|v| svgtypes::ViewBox::from_str(v).ok())
        .and_then(|vb| {
            tiny_skia::NonZeroRect::from_xywh(vb.x as f32, vb.y as f32, vb.w as f32, vb.h as f32)
        });

    let content_transform = if let Some(vb_rect) = view_box {
        ViewBox {
            rect: vb_rect,
            aspect: parse_aspect_ratio(find_attr(&chain, "preserveAspectRatio")),
        }
        .to_transform(Size::from_wh(rect.width(), rect.height())?)
    } else if content_units == Units::ObjectBoundingBox {
        // Content is authored in unit coordinates.
        Transform::from_scale(object_bbox.width(), object_bbox.height())
    } else {
        Transform::identity()
    };

    state.active_patterns.push(node.id());
    let content_style = Style::root(ctx.opt);
    let content_style = crate::style::resolve(&content_style, content, viewport);
    for child in content.children() {
        crate::render::render_node(
            child,
            ctx,
            state,
            &content_style,
            viewport,
            content_transform,
            &mut tile.as_mut(),
        );
    }
    state.active_patterns.pop();

    let transform = pattern_transform.pre_translate(rect.x(), rect.y());

    Some(ServerPaint::Pattern {
        pixmap: tile,
        transform,
        opacity,
    })
}

/// Follows the `href` template chain of a paint server.
///
/// The chain starts at `node` itself; attribute lookups walk it in order.
fn resolve_href_chain<'a>(node: Node<'a>, ctx: &Context<'a>) -> Vec<Node<'a>> {
    let mut chain = vec![node];
    let mut current = node;

    while let Some(id) = current.href().and_then(|href| href.strip_prefix('#')) {
        let next = match ctx.doc.element_by_id(id) {
            Some(v) => v,
            None => break,
        };
        // Only paint servers participate and cycles end the chain.
        if !matches!(
            next.local_name(),
            "linearGradient" | "radialGradient" | "pattern"
        ) || chain.iter().any(|n| n.id() == next.id())
        {
            break;
        }
        chain.push(next);
        current = next;
    }

    chain
}

fn find_attr<'a>(chain: &[Node<'a>], name: &str) -> Option<&'a str> {
    chain.iter().find_map(|n| n.attribute(name))
}

fn parse_units(value: Option<&str>, default: Units) -> Units {
    match value {
        Some("userSpaceOnUse") => Units::UserSpaceOnUse,
        Some("objectBoundingBox") => Units::ObjectBoundingBox,
        _ => default,
    }
}

/// Resolves a paint-server geometry attribute.
///
/// In objectBoundingBox units values are plain fractions
/// (percent divided by 100); otherwise regular length resolution applies.
fn resolve_server_length(
    chain: &[Node],
    name: &str,
    default_percent: f64,
    base: LengthBase,
    units: Units,
    viewport: Size,
    font_size: f32,
) -> f32 {
    let length = find_attr(chain, name)
        .and_then(units::parse_length)
        .unwrap_or(svgtypes::Length::new(
            default_percent,
            svgtypes::LengthUnit::Percent,
        ));

    match units {
        Units::ObjectBoundingBox => {
            if length.unit == svgtypes::LengthUnit::Percent {
                length.number as f32 / 100.0
            } else {
                length.number as f32
            }
        }
        Units::UserSpaceOnUse => units::resolve_length(length, base, viewport, font_size),
    }
}

/// Collects gradient stops from the first chain node that has any.
fn collect_stops(chain: &[Node], current_color: Color) -> Vec<Stop> {
    let source = chain
        .iter()
        .find(|n| n.children().any(|c| c.local_name() == "stop"));
    let source = match source {
        Some(v) => v,
        None => return Vec::new(),
    };

    let mut stops: Vec<Stop> = Vec::new();
    for child in source.children().filter(|c| c.local_name() == "stop") {
        let offset = child
            .attribute("offset")
            .and_then(crate::style::parse_opacity)
            .unwrap_or(0.0);
        // Offsets must be monotonically increasing.
        let offset = match stops.last() {
            Some(prev) => offset.max(prev.offset),
            None => offset,
        };

        let color = match child.attribute("stop-color") {
            Some("currentColor") => current_color,
            Some(value) => Color::from_str(value).unwrap_or_else(|_| {
                log::warn!("Failed to parse a stop color: '{}'.", value);
                Color::black()
            }),
            None => Color::black(),
        };

        let stop_opacity = child
            .attribute("stop-opacity")
            .and_then(crate::style::parse_opacity)
            .unwrap_or(1.0);

        stops.push(Stop {
            offset,
            color,
            opacity: stop_opacity,
        });
    }

    stops
}
