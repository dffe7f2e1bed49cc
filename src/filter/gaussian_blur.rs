// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use rgb::RGBA8;

use super::ImageRefMut;

/// Applies a separable Gaussian blur.
///
/// `src` pixels should have a **premultiplied alpha**.
///
/// The two deviations blur their axes independently; a zero deviation
/// skips that pass. Samples outside the image are transparent.
///
/// # Allocations
///
/// This method will allocate a copy of the `src` image as a back buffer.
pub fn apply(std_dx: f64, std_dy: f64, mut src: ImageRefMut) {
    if std_dx > 0.0 {
        blur_pass(&kernel(std_dx), true, &mut src);
    }
    if std_dy > 0.0 {
        blur_pass(&kernel(std_dy), false, &mut src);
    }
}

/// A normalized 1-D Gaussian kernel with radius `ceil(3 * sigma)`.
fn kernel(sigma: f64) -> Vec<f64> {
    let radius = (sigma * 3.0).ceil().max(1.0) as i32;
    let mut weights = Vec::with_capacity(radius as usize * 2 + 1);

    let denom = 2.0 * sigma * sigma;
    for i in -radius..=radius {
        let x = i as f64;
        weights.push((-x * x / denom).exp());
    }

    let sum: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }

    weights
}

fn blur_pass(weights: &[f64], horizontal: bool, src: &mut ImageRefMut) {
    let width = src.width as i32;
    let height = src.height as i32;
    let radius = (weights.len() / 2) as i32;

    let mut buf = vec![RGBA8::default(); src.data.len()];

    for y in 0..height {
        for x in 0..width {
            let mut r = 0.0;
            let mut g = 0.0;
            let mut b = 0.0;
            let mut a = 0.0;

            for (i, w) in weights.iter().enumerate() {
                let offset = i as i32 - radius;
                let (tx, ty) = if horizontal {
                    (x + offset, y)
                } else {
                    (x, y + offset)
                };

                if tx < 0 || tx >= width || ty < 0 || ty >= height {
                    continue;
                }

                let p = src.pixel_at(tx as u32, ty as u32);
                r += p.r as f64 * w;
                g += p.g as f64 * w;
                b += p.b as f64 * w;
                a += p.a as f64 * w;
            }

            buf[(y * width + x) as usize] = RGBA8 {
                r: (r + 0.5) as u8,
                g: (g + 0.5) as u8,
                b: (b + 0.5) as u8,
                a: (a + 0.5) as u8,
            };
        }
    }

    src.data.copy_from_slice(&buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_normalized() {
        let k = kernel(2.0);
        assert_eq!(k.len(), 13);
        let sum: f64 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn blur_spreads_alpha() {
        let mut data = vec![RGBA8::default(); 9];
        data[4] = RGBA8 { r: 255, g: 0, b: 0, a: 255 };
        let image = ImageRefMut::new(3, 3, &mut data);
        apply(1.0, 1.0, image);

        assert!(data[4].a < 255);
        assert!(data[0].a > 0);
    }
}
