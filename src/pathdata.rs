// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use tiny_skia::PathBuilder;

/// Numerical tolerance of the arc conversion.
const ARC_EPSILON: f64 = 1e-9;

pub(crate) trait PathBuilderExt {
    /// Appends an SVG elliptical arc, decomposed into cubic curves.
    fn arc_to(
        &mut self,
        rx: f32,
        ry: f32,
        x_axis_rotation: f32,
        large_arc: bool,
        sweep: bool,
        x: f32,
        y: f32,
    );
}

impl PathBuilderExt for PathBuilder {
    fn arc_to(
        &mut self,
        rx: f32,
        ry: f32,
        x_axis_rotation: f32,
        large_arc: bool,
        sweep: bool,
        x: f32,
        y: f32,
    ) {
        let prev = match self.last_point() {
            Some(v) => v,
            None => return,
        };

        arc_to_curves(
            self,
            prev.x as f64,
            prev.y as f64,
            rx as f64,
            ry as f64,
            x_axis_rotation as f64,
            large_arc,
            sweep,
            x as f64,
            y as f64,
        );
    }
}

/// Interprets a path data string.
///
/// Handles all SVG 1.1 commands: relative coordinates, implicit repeats,
/// smooth control point reflection and arcs. Parsing stops at the first
/// syntax error, keeping what was read so far.
pub(crate) fn convert_path(data: &str) -> Option<tiny_skia::Path> {
    let mut builder = PathBuilder::new();

    // Current position.
    let mut px = 0.0;
    let mut py = 0.0;
    // Previous MoveTo, where ClosePath returns to.
    let mut pmx = 0.0;
    let mut pmy = 0.0;
    // The control points smooth segments reflect.
    let mut prev_cubic_ctrl: Option<(f64, f64)> = None;
    let mut prev_quad_ctrl: Option<(f64, f64)> = None;
    let mut has_move_to = false;

    for segment in svgtypes::PathParser::from(data) {
        let segment = match segment {
            Ok(v) => v,
            Err(_) => break,
        };

        // 'If a relative moveto appears as the first element of the path,
        // then it is treated as a pair of absolute coordinates.'
        // The parser guarantees the path starts with a MoveTo, so a plain
        // rel-to-abs shift from (0, 0) covers it.
        match segment {
            svgtypes::PathSegment::MoveTo { abs, mut x, mut y } => {
                if !abs {
                    x += px;
                    y += py;
                }
                builder.move_to(x as f32, y as f32);
                px = x;
                py = y;
                pmx = x;
                pmy = y;
                prev_cubic_ctrl = None;
                prev_quad_ctrl = None;
                has_move_to = true;
            }
            svgtypes::PathSegment::LineTo { abs, mut x, mut y } => {
                if !abs {
                    x += px;
                    y += py;
                }
                builder.line_to(x as f32, y as f32);
                px = x;
                py = y;
                prev_cubic_ctrl = None;
                prev_quad_ctrl = None;
            }
            svgtypes::PathSegment::HorizontalLineTo { abs, mut x } => {
                if !abs {
                    x += px;
                }
                builder.line_to(x as f32, py as f32);
                px = x;
                prev_cubic_ctrl = None;
                prev_quad_ctrl = None;
            }
            svgtypes::PathSegment::VerticalLineTo { abs, mut y } => {
                if !abs {
                    y += py;
                }
                builder.line_to(px as f32, y as f32);
                py = y;
                prev_cubic_ctrl = None;
                prev_quad_ctrl = None;
            }
            svgtypes::PathSegment::CurveTo {
                abs,
                mut x1,
                mut y1,
                mut x2,
                mut y2,
                mut x,
                mut y,
            } => {
                if !abs {
                    x1 += px;
                    y1 += py;
                    x2 += px;
                    y2 += py;
                    x += px;
                    y += py;
                }
                builder.cubic_to(
                    x1 as f32, y1 as f32, x2 as f32, y2 as f32, x as f32, y as f32,
                );
                px = x;
                py = y;
                prev_cubic_ctrl = Some((x2, y2));
                prev_quad_ctrl = None;
            }
            svgtypes::PathSegment::SmoothCurveTo {
                abs,
                mut x2,
                mut y2,
                mut x,
                mut y,
            } => {
                if !abs {
                    x2 += px;
                    y2 += py;
                    x += px;
                    y += py;
                }
                // 'The first control point is assumed to be the reflection
                // of the second control point on the previous command
                // relative to the current point.'
                let (x1, y1) = match prev_cubic_ctrl {
                    Some((cx, cy)) => (px * 2.0 - cx, py * 2.0 - cy),
                    None => (px, py),
                };
                builder.cubic_to(
                    x1 as f32, y1 as f32, x2 as f32, y2 as f32, x as f32, y as f32,
                );
                px = x;
                py = y;
                prev_cubic_ctrl = Some((x2, y2));
                prev_quad_ctrl = None;
            }
            svgtypes::PathSegment::Quadratic {
                abs,
                mut x1,
                mut y1,
                mut x,
                mut y,
            } => {
                if !abs {
                    x1 += px;
                    y1 += py;
                    x += px;
                    y += py;
                }
                builder.quad_to(x1 as f32, y1 as f32, x as f32, y as f32);
                px = x;
                py = y;
                prev_quad_ctrl = Some((x1, y1));
                prev_cubic_ctrl = None;
            }
            svgtypes::PathSegment::SmoothQuadratic { abs, mut x, mut y } => {
                if !abs {
                    x += px;
                    y += py;
                }
                let (x1, y1) = match prev_quad_ctrl {
                    Some((cx, cy)) => (px * 2.0 - cx, py * 2.0 - cy),
                    None => (px, py),
                };
                builder.quad_to(x1 as f32, y1 as f32, x as f32, y as f32);
                px = x;
                py = y;
                prev_quad_ctrl = Some((x1, y1));
                prev_cubic_ctrl = None;
            }
            svgtypes::PathSegment::EllipticalArc {
                abs,
                rx,
                ry,
                x_axis_rotation,
                large_arc,
                sweep,
                mut x,
                mut y,
            } => {
                if !abs {
                    x += px;
                    y += py;
                }
                if has_move_to {
                    arc_to_curves(
                        &mut builder,
                        px,
                        py,
                        rx,
                        ry,
                        x_axis_rotation,
                        large_arc,
                        sweep,
                        x,
                        y,
                    );
                }
                px = x;
                py = y;
                prev_cubic_ctrl = None;
                prev_quad_ctrl = None;
            }
            svgtypes::PathSegment::ClosePath { .. } => {
                builder.close();
                px = pmx;
                py = pmy;
                prev_cubic_ctrl = None;
                prev_quad_ctrl = None;
            }
        }
    }

    builder.finish()
}

/// Decomposes an elliptical arc into cubic curves via the SVG
/// endpoint-to-center conversion (SVG 1.1, F.6.5 and F.6.6).
fn arc_to_curves(
    builder: &mut PathBuilder,
    x1: f64,
    y1: f64,
    rx: f64,
    ry: f64,
    x_axis_rotation: f64,
    large_arc: bool,
    sweep: bool,
    x2: f64,
    y2: f64,
) {
    // A degenerate arc with coincident endpoints draws nothing.
    if (x1 - x2).abs() < ARC_EPSILON && (y1 - y2).abs() < ARC_EPSILON {
        return;
    }

    // Out-of-range radii are taken by absolute value;
    // a zero radius degrades to a line.
    let mut rx = rx.abs();
    let mut ry = ry.abs();
    if rx < ARC_EPSILON || ry < ARC_EPSILON {
        builder.line_to(x2 as f32, y2 as f32);
        return;
    }

    let phi = x_axis_rotation.to_radians();
    let (sin_phi, cos_phi) = phi.sin_cos();

    let dx2 = (x1 - x2) / 2.0;
    let dy2 = (y1 - y2) / 2.0;
    let x1p = cos_phi * dx2 + sin_phi * dy2;
    let y1p = -sin_phi * dx2 + cos_phi * dy2;

    // Scale up too-small radii to reach the endpoint.
    let lambda = (x1p * x1p) / (rx * rx) + (y1p * y1p) / (ry * ry);
    if lambda > 1.0 {
        let s = lambda.sqrt();
        rx *= s;
        ry *= s;
    }

    let rx2 = rx * rx;
    let ry2 = ry * ry;
    let num = rx2 * ry2 - rx2 * y1p * y1p - ry2 * x1p * x1p;
    let den = rx2 * y1p * y1p + ry2 * x1p * x1p;
    if den < ARC_EPSILON {
        builder.line_to(x2 as f32, y2 as f32);
        return;
    }

    let sign = if large_arc != sweep { 1.0 } else { -1.0 };
    let coef = sign * (num / den).max(0.0).sqrt();
    let cxp = coef * rx * y1p / ry;
    let cyp = -coef * ry * x1p / rx;
    let cx = cos_phi * cxp - sin_phi * cyp + (x1 + x2) / 2.0;
    let cy = sin_phi * cxp + cos_phi * cyp + (y1 + y2) / 2.0;

    let theta1 = vector_angle(1.0, 0.0, (x1p - cxp) / rx, (y1p - cyp) / ry);
    let mut delta_theta = vector_angle(
        (x1p - cxp) / rx,
        (y1p - cyp) / ry,
        (-x1p - cxp) / rx,
        (-y1p - cyp) / ry,
    );
    if !sweep && delta_theta > 0.0 {
        delta_theta -= std::f64::consts::TAU;
    }
    if sweep && delta_theta < 0.0 {
        delta_theta += std::f64::consts::TAU;
    }

    let segments = (delta_theta.abs() / std::f64::consts::FRAC_PI_2)
        .ceil()
        .max(1.0) as usize;
    let seg_theta = delta_theta / segments as f64;
    let alpha = 4.0 / 3.0 * (seg_theta / 4.0).tan();

    // E(θ) and E'(θ) of the rotated ellipse.
    let point_at = |theta: f64| {
        let (sin_t, cos_t) = theta.sin_cos();
        (
            cx + rx * cos_phi * cos_t - ry * sin_phi * sin_t,
            cy + rx * sin_phi * cos_t + ry * cos_phi * sin_t,
        )
    };
    let derivative_at = |theta: f64| {
        let (sin_t, cos_t) = theta.sin_cos();
        (
            -rx * cos_phi * sin_t - ry * sin_phi * cos_t,
            -rx * sin_phi * sin_t + ry * cos_phi * cos_t,
        )
    };

    let mut theta = theta1;
    for _ in 0..segments {
        let next = theta + seg_theta;
        let (sx, sy) = point_at(theta);
        let (ex, ey) = point_at(next);
        let (sdx, sdy) = derivative_at(theta);
        let (edx, edy) = derivative_at(next);

        builder.cubic_to(
            (sx + alpha * sdx) as f32,
            (sy + alpha * sdy) as f32,
            (ex - alpha * edx) as f32,
            (ey - alpha * edy) as f32,
            ex as f32,
            ey as f32,
        );

        theta = next;
    }
}

/// The signed angle between two vectors (SVG 1.1, F.6.5.4).
fn vector_angle(ux: f64, uy: f64, vx: f64, vy: f64) -> f64 {
    let len = ((ux * ux + uy * uy) * (vx * vx + vy * vy)).sqrt();
    if len < ARC_EPSILON {
        return 0.0;
    }
    let cos = ((ux * vx + uy * vy) / len).clamp(-1.0, 1.0);
    let sign = if ux * vy - uy * vx < 0.0 { -1.0 } else { 1.0 };
    sign * cos.acos()
}
