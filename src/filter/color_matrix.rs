// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::ImageRefMut;

/// A `feColorMatrix` operation.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub enum ColorMatrix {
    Matrix([f64; 20]),
    Saturate(f64),
    HueRotate(f64),
    LuminanceToAlpha,
}

impl ColorMatrix {
    /// Lowers the shortcut variants into the generic 4x5 row-major form.
    ///
    /// The saturation and hue-rotation coefficients are the ones given in
    /// <https://www.w3.org/TR/SVG11/filters.html#feColorMatrixElement>.
    fn to_coefficients(&self) -> [f64; 20] {
        match *self {
            ColorMatrix::Matrix(m) => m,
            ColorMatrix::Saturate(s) => [
                0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s, 0.0, 0.0,
                0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s, 0.0, 0.0,
                0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s, 0.0, 0.0,
                0.0, 0.0, 0.0, 1.0, 0.0,
            ],
            ColorMatrix::HueRotate(angle) => {
                let (sin, cos) = angle.to_radians().sin_cos();
                [
                    0.213 + cos * 0.787 - sin * 0.213,
                    0.715 - cos * 0.715 - sin * 0.715,
                    0.072 - cos * 0.072 + sin * 0.928,
                    0.0,
                    0.0,
                    0.213 - cos * 0.213 + sin * 0.143,
                    0.715 + cos * 0.285 + sin * 0.140,
                    0.072 - cos * 0.072 - sin * 0.283,
                    0.0,
                    0.0,
                    0.213 - cos * 0.213 - sin * 0.787,
                    0.715 - cos * 0.715 + sin * 0.715,
                    0.072 + cos * 0.928 + sin * 0.072,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    0.0,
                    1.0,
                    0.0,
                ]
            }
            ColorMatrix::LuminanceToAlpha => [
                0.0, 0.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 0.0, 0.0,
                0.2125, 0.7154, 0.0721, 0.0, 0.0,
            ],
        }
    }
}

/// Applies a color matrix.
///
/// Input image pixels should have an **unpremultiplied alpha**.
pub fn apply(kind: &ColorMatrix, image: ImageRefMut) {
    let m = kind.to_coefficients();

    for pixel in image.data.iter_mut() {
        let r = pixel.r as f64 / 255.0;
        let g = pixel.g as f64 / 255.0;
        let b = pixel.b as f64 / 255.0;
        let a = pixel.a as f64 / 255.0;

        let row = |i: usize| m[i] * r + m[i + 1] * g + m[i + 2] * b + m[i + 3] * a + m[i + 4];

        pixel.r = to_byte(row(0));
        pixel.g = to_byte(row(5));
        pixel.b = to_byte(row(10));
        pixel.a = to_byte(row(15));
    }
}

fn to_byte(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}
