// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::str::FromStr;

use svgtypes::{Align, AspectRatio};
use tiny_skia::{NonZeroRect, Size, Transform};

/// A viewBox together with its `preserveAspectRatio`.
#[derive(Clone, Copy, Debug)]
pub struct ViewBox {
    /// The user-space rectangle mapped into the viewport.
    pub rect: NonZeroRect,
    /// How the rectangle is fitted.
    pub aspect: AspectRatio,
}

impl ViewBox {
    /// Returns the transform that maps `rect` into a viewport of `size`.
    pub fn to_transform(&self, size: Size) -> Transform {
        view_box_to_transform(self.rect, self.aspect, size)
    }
}

/// Converts a viewBox into a viewport transform.
pub fn view_box_to_transform(view_box: NonZeroRect, aspect: AspectRatio, size: Size) -> Transform {
    let vr = view_box;

    let sx = size.width() / vr.width();
    let sy = size.height() / vr.height();

    let (sx, sy) = if aspect.align == Align::None {
        (sx, sy)
    } else {
        let s = if aspect.slice {
            if sx < sy {
                sy
            } else {
                sx
            }
        } else {
            if sx > sy {
                sy
            } else {
                sx
            }
        };

        (s, s)
    };

    let x = -vr.x() * sx;
    let y = -vr.y() * sy;
    let w = size.width() - vr.width() * sx;
    let h = size.height() - vr.height() * sy;

    let (tx, ty) = aligned_pos(aspect.align, x, y, w, h);
    Transform::from_row(sx, 0.0, 0.0, sy, tx, ty)
}

/// Returns an object position aligned inside a free area of `w`x`h`.
pub fn aligned_pos(align: Align, x: f32, y: f32, w: f32, h: f32) -> (f32, f32) {
    match align {
        Align::None => (x, y),
        Align::XMinYMin => (x, y),
        Align::XMidYMin => (x + w / 2.0, y),
        Align::XMaxYMin => (x + w, y),
        Align::XMinYMid => (x, y + h / 2.0),
        Align::XMidYMid => (x + w / 2.0, y + h / 2.0),
        Align::XMaxYMid => (x + w, y + h / 2.0),
        Align::XMinYMax => (x, y + h),
        Align::XMidYMax => (x + w / 2.0, y + h),
        Align::XMaxYMax => (x + w, y + h),
    }
}

/// Parses a `transform` attribute list into a single matrix.
///
/// The list `T1 T2 …` is composed so that `T1` is outermost.
/// An unparsable or degenerate list resolves to identity.
pub fn parse_transform(value: Option<&str>) -> Transform {
    let value = match value {
        Some(v) => v,
        None => return Transform::identity(),
    };

    let ts = match svgtypes::Transform::from_str(value) {
        Ok(v) => v,
        Err(_) => {
            log::warn!("Failed to parse a transform list: '{}'.", value);
            return Transform::identity();
        }
    };

    let ts = Transform::from_row(
        ts.a as f32,
        ts.b as f32,
        ts.c as f32,
        ts.d as f32,
        ts.e as f32,
        ts.f as f32,
    );

    if ts.is_valid() {
        ts
    } else {
        Transform::identity()
    }
}

/// Parses a `preserveAspectRatio` attribute, defaulting to `xMidYMid meet`.
pub fn parse_aspect_ratio(value: Option<&str>) -> AspectRatio {
    value
        .and_then(|v| AspectRatio::from_str(v).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_box_meet_centers() {
        let vb = ViewBox {
            rect: NonZeroRect::from_xywh(0.0, 0.0, 100.0, 100.0).unwrap(),
            aspect: AspectRatio::default(),
        };
        let ts = vb.to_transform(Size::from_wh(200.0, 100.0).unwrap());
        // Uniform scale 1.0, centered horizontally with 50px padding.
        assert_eq!(ts.sx, 1.0);
        assert_eq!(ts.sy, 1.0);
        assert_eq!(ts.tx, 50.0);
        assert_eq!(ts.ty, 0.0);
    }

    #[test]
    fn view_box_none_stretches() {
        let vb = ViewBox {
            rect: NonZeroRect::from_xywh(0.0, 0.0, 100.0, 50.0).unwrap(),
            aspect: AspectRatio::from_str("none").unwrap(),
        };
        let ts = vb.to_transform(Size::from_wh(200.0, 200.0).unwrap());
        assert_eq!(ts.sx, 2.0);
        assert_eq!(ts.sy, 4.0);
    }

    #[test]
    fn transform_list_order() {
        // `translate(10 0) scale(2)` maps (1, 0) to (12, 0).
        let ts = parse_transform(Some("translate(10 0) scale(2)"));
        let mut p = tiny_skia::Point::from_xy(1.0, 0.0);
        ts.map_point(&mut p);
        assert_eq!(p.x, 12.0);
        assert_eq!(p.y, 0.0);
    }

    #[test]
    fn invalid_transform_is_identity() {
        assert_eq!(parse_transform(Some("rotate(")), Transform::identity());
    }
}
