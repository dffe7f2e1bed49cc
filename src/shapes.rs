// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tiny_skia::{Path, PathBuilder, Rect, Size};

use crate::pathdata::{self, PathBuilderExt};
use crate::units::{resolve_attr_length, LengthBase};
use crate::xmltree::Node;

/// Builds the geometry of a drawable element.
///
/// Returns `None` for unknown or degenerate elements; the painter then
/// recurses into the children instead of drawing.
pub(crate) fn convert(node: Node, viewport: Size, font_size: f32) -> Option<Path> {
    match node.local_name() {
        "rect" => convert_rect(node, viewport, font_size),
        "circle" => convert_circle(node, viewport, font_size),
        "ellipse" => convert_ellipse(node, viewport, font_size),
        "line" => convert_line(node, viewport, font_size),
        "polyline" => convert_poly(node, false),
        "polygon" => convert_poly(node, true),
        "path" => pathdata::convert_path(node.attribute("d")?),
        _ => None,
    }
}

fn convert_rect(node: Node, viewport: Size, font_size: f32) -> Option<Path> {
    // 'width' and 'height' must be positive and non-zero.
    let width = resolve_attr_length(node, "width", LengthBase::Width, viewport, font_size, 0.0);
    let height = resolve_attr_length(node, "height", LengthBase::Height, viewport, font_size, 0.0);
    if !(width > 0.0 && height > 0.0) {
        log::warn!("Rect '{}' has an invalid size. Skipped.", node.tag_name());
        return None;
    }

    let x = resolve_attr_length(node, "x", LengthBase::Width, viewport, font_size, 0.0);
    let y = resolve_attr_length(node, "y", LengthBase::Height, viewport, font_size, 0.0);

    let (mut rx, mut ry) = resolve_rx_ry(node, viewport, font_size);

    // Clamp rx/ry to the half of the width/height.
    if rx > width / 2.0 {
        rx = width / 2.0;
    }
    if ry > height / 2.0 {
        ry = height / 2.0;
    }

    // Conversion according to https://www.w3.org/TR/SVG11/shapes.html#RectElement
    if rx < 1e-6 {
        Some(PathBuilder::from_rect(Rect::from_xywh(x, y, width, height)?))
    } else {
        let mut builder = PathBuilder::new();
        builder.move_to(x + rx, y);

        builder.line_to(x + width - rx, y);
        builder.arc_to(rx, ry, 0.0, false, true, x + width, y + ry);

        builder.line_to(x + width, y + height - ry);
        builder.arc_to(rx, ry, 0.0, false, true, x + width - rx, y + height);

        builder.line_to(x + rx, y + height);
        builder.arc_to(rx, ry, 0.0, false, true, x, y + height - ry);

        builder.line_to(x, y + ry);
        builder.arc_to(rx, ry, 0.0, false, true, x + rx, y);

        builder.close();
        builder.finish()
    }
}

/// Resolves `rx`/`ry`, either one defaulting to the other.
fn resolve_rx_ry(node: Node, viewport: Size, font_size: f32) -> (f32, f32) {
    // 'auto' is the same as an absent value.
    let attr = |name| {
        node.attribute(name)
            .filter(|v| *v != "auto")
            .and_then(crate::units::parse_length)
    };

    let rx = attr("rx")
        .map(|l| crate::units::resolve_length(l, LengthBase::Width, viewport, font_size));
    let ry = attr("ry")
        .map(|l| crate::units::resolve_length(l, LengthBase::Height, viewport, font_size));

    let (rx, ry) = match (rx, ry) {
        (None, None) => (0.0, 0.0),
        (Some(rx), None) => (rx, rx),
        (None, Some(ry)) => (ry, ry),
        (Some(rx), Some(ry)) => (rx, ry),
    };

    if rx.is_sign_negative() || ry.is_sign_negative() {
        (0.0, 0.0)
    } else {
        (rx, ry)
    }
}

fn convert_circle(node: Node, viewport: Size, font_size: f32) -> Option<Path> {
    let cx = resolve_attr_length(node, "cx", LengthBase::Width, viewport, font_size, 0.0);
    let cy = resolve_attr_length(node, "cy", LengthBase::Height, viewport, font_size, 0.0);
    let r = resolve_attr_length(node, "r", LengthBase::Diagonal, viewport, font_size, 0.0);

    if !(r > 0.0) {
        log::warn!("Circle '{}' has an invalid radius. Skipped.", node.tag_name());
        return None;
    }

    ellipse_to_path(cx, cy, r, r)
}

fn convert_ellipse(node: Node, viewport: Size, font_size: f32) -> Option<Path> {
    let cx = resolve_attr_length(node, "cx", LengthBase::Width, viewport, font_size, 0.0);
    let cy = resolve_attr_length(node, "cy", LengthBase::Height, viewport, font_size, 0.0);
    let rx = resolve_attr_length(node, "rx", LengthBase::Width, viewport, font_size, 0.0);
    let ry = resolve_attr_length(node, "ry", LengthBase::Height, viewport, font_size, 0.0);

    if !(rx > 0.0 && ry > 0.0) {
        log::warn!("Ellipse '{}' has invalid radii. Skipped.", node.tag_name());
        return None;
    }

    ellipse_to_path(cx, cy, rx, ry)
}

fn ellipse_to_path(cx: f32, cy: f32, rx: f32, ry: f32) -> Option<Path> {
    let mut builder = PathBuilder::new();
    builder.move_to(cx + rx, cy);
    builder.arc_to(rx, ry, 0.0, false, true, cx, cy + ry);
    builder.arc_to(rx, ry, 0.0, false, true, cx - rx, cy);
    builder.arc_to(rx, ry, 0.0, false, true, cx, cy - ry);
    builder.arc_to(rx, ry, 0.0, false, true, cx + rx, cy);
    builder.close();
    builder.finish()
}

fn convert_line(node: Node, viewport: Size, font_size: f32) -> Option<Path> {
    let x1 = resolve_attr_length(node, "x1", LengthBase::Width, viewport, font_size, 0.0);
    let y1 = resolve_attr_length(node, "y1", LengthBase::Height, viewport, font_size, 0.0);
    let x2 = resolve_attr_length(node, "x2", LengthBase::Width, viewport, font_size, 0.0);
    let y2 = resolve_attr_length(node, "y2", LengthBase::Height, viewport, font_size, 0.0);

    let mut builder = PathBuilder::new();
    builder.move_to(x1, y1);
    builder.line_to(x2, y2);
    builder.finish()
}

fn convert_poly(node: Node, closed: bool) -> Option<Path> {
    let points = node.attribute("points")?;

    let mut builder = PathBuilder::new();
    // An odd trailing number is dropped by the pair parser.
    let mut count = 0;
    for (x, y) in svgtypes::PointsParser::from(points) {
        if count == 0 {
            builder.move_to(x as f32, y as f32);
        } else {
            builder.line_to(x as f32, y as f32);
        }
        count += 1;
    }

    if count < 2 {
        return None;
    }

    if closed {
        builder.close();
    }

    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmltree::Document;

    fn shape(svg: &str) -> Option<Path> {
        let doc = Document::parse(svg).unwrap();
        let node = doc.root_element().children().next().unwrap();
        convert(node, Size::from_wh(100.0, 100.0).unwrap(), 12.0)
    }

    #[test]
    fn plain_rect() {
        let path = shape("<svg><rect x='5' y='10' width='20' height='30'/></svg>").unwrap();
        let b = path.bounds();
        assert_eq!((b.left(), b.top(), b.right(), b.bottom()), (5.0, 10.0, 25.0, 40.0));
    }

    #[test]
    fn rect_without_size_is_skipped() {
        assert!(shape("<svg><rect x='5'/></svg>").is_none());
        assert!(shape("<svg><rect width='0' height='5'/></svg>").is_none());
        assert!(shape("<svg><rect width='-1' height='5'/></svg>").is_none());
    }

    #[test]
    fn rounded_rect_ry_defaults_to_rx() {
        let path = shape("<svg><rect width='20' height='20' rx='5'/></svg>").unwrap();
        assert!(path
            .segments()
            .any(|s| matches!(s, tiny_skia::PathSegment::CubicTo(..))));
        let b = path.bounds();
        assert_eq!((b.right(), b.bottom()), (20.0, 20.0));
    }

    #[test]
    fn circle_radius_uses_diagonal_basis() {
        // 10% of sqrt((100² + 100²) / 2) = 10.
        let path = shape("<svg><circle cx='50' cy='50' r='10%'/></svg>").unwrap();
        let b = path.bounds();
        assert!((b.width() - 20.0).abs() < 1e-3);
    }

    #[test]
    fn percent_coordinates() {
        let path = shape("<svg><rect x='10%' y='20%' width='50%' height='50%'/></svg>").unwrap();
        let b = path.bounds();
        assert_eq!((b.left(), b.top()), (10.0, 20.0));
        assert_eq!((b.width(), b.height()), (50.0, 50.0));
    }

    #[test]
    fn polygon_drops_odd_trailing_number() {
        let path = shape("<svg><polygon points='0 0 10 0 10 10 5'/></svg>").unwrap();
        let b = path.bounds();
        assert_eq!((b.width(), b.height()), (10.0, 10.0));
    }

    #[test]
    fn polyline_with_one_point_is_skipped() {
        assert!(shape("<svg><polyline points='5 5'/></svg>").is_none());
    }

    #[test]
    fn unknown_element_returns_none() {
        assert!(shape("<svg><g/></svg>").is_none());
    }
}
