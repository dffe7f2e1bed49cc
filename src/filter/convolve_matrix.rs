// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use rgb::RGBA8;

use super::ImageRefMut;

/// An edges processing mode.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum EdgeMode {
    None,
    Duplicate,
    Wrap,
}

impl EdgeMode {
    /// Maps an out-of-range sample coordinate back into `0..len`,
    /// or discards the sample.
    #[inline]
    fn resolve(self, coord: i32, len: i32) -> Option<i32> {
        if (0..len).contains(&coord) {
            return Some(coord);
        }
        match self {
            EdgeMode::None => None,
            EdgeMode::Duplicate => Some(coord.clamp(0, len - 1)),
            EdgeMode::Wrap => Some(coord.rem_euclid(len)),
        }
    }
}

/// A convolution kernel.
///
/// `weights` is row-major with `columns * rows` entries;
/// the target is the output position inside the kernel.
#[derive(Clone, Debug)]
pub struct Kernel<'a> {
    pub columns: u32,
    pub rows: u32,
    pub target_x: u32,
    pub target_y: u32,
    pub weights: &'a [f64],
}

impl Kernel<'_> {
    fn is_valid(&self) -> bool {
        self.weights.len() == (self.columns * self.rows) as usize
            && self.target_x < self.columns
            && self.target_y < self.rows
    }
}

/// Applies a convolve matrix.
///
/// Input image pixels should have a **premultiplied alpha** when
/// `preserve_alpha` is off and an **unpremultiplied alpha** when it is on;
/// the output is premultiplied either way.
///
/// Does nothing when the kernel is inconsistent or `divisor` is zero.
///
/// # Allocations
///
/// This method will allocate one scratch copy of the image.
pub fn apply(
    kernel: &Kernel,
    divisor: f64,
    bias: f64,
    edge_mode: EdgeMode,
    preserve_alpha: bool,
    image: ImageRefMut,
) {
    if !kernel.is_valid() || divisor == 0.0 {
        return;
    }

    let width = image.width as i32;
    let height = image.height as i32;
    let mut out = vec![RGBA8::default(); image.data.len()];

    for y in 0..height {
        for x in 0..width {
            // Accumulated r, g, b, a contributions.
            let mut sum = [0.0f64; 4];

            for oy in 0..kernel.rows as i32 {
                let ty = match edge_mode.resolve(y - kernel.target_y as i32 + oy, height) {
                    Some(v) => v,
                    None => continue,
                };
                for ox in 0..kernel.columns as i32 {
                    let tx = match edge_mode.resolve(x - kernel.target_x as i32 + ox, width) {
                        Some(v) => v,
                        None => continue,
                    };

                    // Convolution rotates the kernel by 180 degrees,
                    // which for a flat row-major list is a reverse walk.
                    let flat = (oy * kernel.columns as i32 + ox) as usize;
                    let weight = kernel.weights[kernel.weights.len() - 1 - flat];

                    let p = image.data[(ty * width + tx) as usize];
                    sum[0] += p.r as f64 / 255.0 * weight;
                    sum[1] += p.g as f64 / 255.0 * weight;
                    sum[2] += p.b as f64 / 255.0 * weight;
                    sum[3] += p.a as f64 / 255.0 * weight;
                }
            }

            let alpha = if preserve_alpha {
                image.data[(y * width + x) as usize].a as f64 / 255.0
            } else {
                (sum[3] / divisor + bias).clamp(0.0, 1.0)
            };

            let channel = |s: f64| {
                let v = s / divisor + bias * alpha;
                let v = if preserve_alpha {
                    // Straight input: clamp, then premultiply the result.
                    v.clamp(0.0, 1.0) * alpha
                } else {
                    v.clamp(0.0, alpha)
                };
                (v * 255.0 + 0.5) as u8
            };

            let result = &mut out[(y * width + x) as usize];
            result.r = channel(sum[0]);
            result.g = channel(sum[1]);
            result.b = channel(sum[2]);
            result.a = (alpha * 255.0 + 0.5) as u8;
        }
    }

    image.data.copy_from_slice(&out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_kernel() {
        let weights = [0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let kernel = Kernel {
            columns: 3,
            rows: 3,
            target_x: 1,
            target_y: 1,
            weights: &weights,
        };

        let mut data = vec![RGBA8::default(); 9];
        data[4] = RGBA8 { r: 100, g: 150, b: 200, a: 255 };
        let expected = data.clone();

        apply(&kernel, 1.0, 0.0, EdgeMode::Duplicate, false, ImageRefMut::new(3, 3, &mut data));
        assert_eq!(data, expected);
    }

    #[test]
    fn shift_kernel_moves_pixels() {
        // All weight on one corner shifts the image diagonally.
        let weights = [1.0, 0.0, 0.0, 0.0];
        let kernel = Kernel {
            columns: 2,
            rows: 2,
            target_x: 0,
            target_y: 0,
            weights: &weights,
        };

        let mut data = vec![RGBA8::default(); 9];
        data[4] = RGBA8 { r: 255, g: 255, b: 255, a: 255 };

        apply(&kernel, 1.0, 0.0, EdgeMode::None, false, ImageRefMut::new(3, 3, &mut data));
        // The flipped kernel samples (x + 1, y + 1).
        assert_eq!(data[0].a, 255);
        assert_eq!(data[4].a, 0);
    }

    #[test]
    fn inconsistent_kernel_is_a_noop() {
        let weights = [1.0; 3];
        let kernel = Kernel {
            columns: 2,
            rows: 2,
            target_x: 0,
            target_y: 0,
            weights: &weights,
        };

        let mut data = vec![RGBA8 { r: 1, g: 2, b: 3, a: 255 }; 4];
        let expected = data.clone();
        apply(&kernel, 1.0, 0.0, EdgeMode::None, false, ImageRefMut::new(2, 2, &mut data));
        assert_eq!(data, expected);
    }
}
