// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use rgb::RGBA8;

use super::ImageRefMut;

/// A morphology operation.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Operator {
    Erode,
    Dilate,
}

impl Operator {
    /// The value every window extreme starts from.
    fn seed(self) -> RGBA8 {
        match self {
            Operator::Erode => RGBA8 {
                r: 255,
                g: 255,
                b: 255,
                a: 255,
            },
            Operator::Dilate => RGBA8::default(),
        }
    }

    #[inline]
    fn pick(self, a: u8, b: u8) -> u8 {
        match self {
            Operator::Erode => a.min(b),
            Operator::Dilate => a.max(b),
        }
    }
}

/// Applies a morphology filter.
///
/// Per-channel min/max over a box around each pixel, edges clamped
/// to the image. A box extreme is separable, so the filter runs as
/// a horizontal and a vertical 1-D pass.
///
/// `src` pixels should have a **premultiplied alpha**.
///
/// # Panics
///
/// When `rx` or `ry` is negative.
///
/// # Allocations
///
/// This method will allocate one scratch copy of the image.
pub fn apply(operator: Operator, rx: f64, ry: f64, image: ImageRefMut) {
    assert!(!rx.is_sign_negative());
    assert!(!ry.is_sign_negative());

    let width = image.width;
    let height = image.height;

    // No point in a window wider than the image itself.
    let span_x = (rx.ceil() as u64 * 2).clamp(1, width as u64) as u32;
    let span_y = (ry.ceil() as u64 * 2).clamp(1, height as u64) as u32;

    let mut scratch = image.data.to_vec();

    // Horizontal: every row is a line of `width` pixels, one pixel apart.
    pass(
        operator,
        image.data,
        &mut scratch,
        height,
        width,
        width as usize,
        1,
        span_x,
    );
    // Vertical: every column is a line of `height` pixels, one row apart.
    pass(
        operator,
        &scratch,
        image.data,
        width,
        height,
        1,
        width as usize,
        span_y,
    );
}

/// Runs one 1-D min/max pass over `lines` lines of `len` samples each.
///
/// A line starts every `line_stride` samples; within a line consecutive
/// samples are `step` apart. The window covers `span` samples with the
/// target at `span / 2`, cut off at the line ends.
#[allow(clippy::too_many_arguments)]
fn pass(
    operator: Operator,
    src: &[RGBA8],
    dst: &mut [RGBA8],
    lines: u32,
    len: u32,
    line_stride: usize,
    step: usize,
    span: u32,
) {
    let target = (span / 2) as i64;

    for line in 0..lines {
        let base = line as usize * line_stride;
        for i in 0..len as i64 {
            let from = (i - target).max(0);
            let to = (i - target + span as i64).min(len as i64);

            let mut extreme = operator.seed();
            for t in from..to {
                let p = src[base + t as usize * step];
                extreme.r = operator.pick(extreme.r, p.r);
                extreme.g = operator.pick(extreme.g, p.g);
                extreme.b = operator.pick(extreme.b, p.b);
                extreme.a = operator.pick(extreme.a, p.a);
            }

            dst[base + i as usize * step] = extreme;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dilate_grows_a_dot() {
        let mut data = vec![RGBA8::default(); 25];
        data[12] = RGBA8 { r: 255, g: 0, b: 0, a: 255 };

        apply(Operator::Dilate, 1.0, 1.0, ImageRefMut::new(5, 5, &mut data));

        // A radius-1 window covers the pixel and its predecessor,
        // so the dot spreads right and down.
        assert_eq!(data[12].a, 255);
        assert_eq!(data[13].a, 255);
        assert_eq!(data[17].a, 255);
        // Not to the far corner.
        assert_eq!(data[24].a, 0);
    }

    #[test]
    fn erode_eats_thin_features() {
        // A fully opaque image with one transparent pixel.
        let mut data = vec![RGBA8 { r: 255, g: 255, b: 255, a: 255 }; 25];
        data[12] = RGBA8::default();

        apply(Operator::Erode, 1.0, 1.0, ImageRefMut::new(5, 5, &mut data));

        // The hole swallowed the pixels whose window reaches it.
        assert_eq!(data[12].a, 0);
        assert_eq!(data[13].a, 0);
        assert_eq!(data[18].a, 0);
        // The far-side neighbors are intact.
        assert_eq!(data[7].a, 255);
        assert_eq!(data[24].a, 255);
    }
}
