// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use super::{ImageRef, ImageRefMut};

/// Performs an arithmetic composition:
/// `result = k1 * i1 * i2 + k2 * i1 + k3 * i2 + k4` per channel.
///
/// - `src1` and `src2` image pixels should have a **premultiplied alpha**.
/// - `dest` image pixels will have a **premultiplied alpha**; color
///   channels are clamped to the computed alpha.
///
/// The `k4` term is a flood: it produces output even where both
/// inputs are fully transparent.
///
/// # Panics
///
/// When `src1`, `src2` and `dest` have different sizes.
pub fn arithmetic(
    k1: f64,
    k2: f64,
    k3: f64,
    k4: f64,
    src1: ImageRef,
    src2: ImageRef,
    dest: ImageRefMut,
) {
    assert!(src1.width == src2.width && src1.width == dest.width);
    assert!(src1.height == src2.height && src1.height == dest.height);

    let combine = |c1: u8, c2: u8| {
        let i1 = c1 as f64 / 255.0;
        let i2 = c2 as f64 / 255.0;
        k1 * i1 * i2 + k2 * i1 + k3 * i2 + k4
    };

    for ((out, p1), p2) in dest.data.iter_mut().zip(src1.data).zip(src2.data) {
        let alpha = combine(p1.a, p2.a).clamp(0.0, 1.0);
        let channel = |c1: u8, c2: u8| {
            (combine(c1, c2).clamp(0.0, alpha) * 255.0 + 0.5) as u8
        };

        out.r = channel(p1.r, p2.r);
        out.g = channel(p1.g, p2.g);
        out.b = channel(p1.b, p2.b);
        out.a = (alpha * 255.0 + 0.5) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgb::RGBA8;

    #[test]
    fn k4_floods_empty_regions() {
        let src1 = vec![RGBA8::default(); 4];
        let src2 = vec![RGBA8::default(); 4];
        let mut out = vec![RGBA8::default(); 4];

        arithmetic(
            0.0,
            0.0,
            0.0,
            0.5,
            ImageRef::new(2, 2, &src1),
            ImageRef::new(2, 2, &src2),
            ImageRefMut::new(2, 2, &mut out),
        );

        // Both inputs are empty, yet k4 still emits coverage.
        assert_eq!(out[0].a, 128);
        assert_eq!(out[0].r, 128);
    }

    #[test]
    fn channels_stay_premultiplied() {
        let src1 = vec![RGBA8 { r: 255, g: 0, b: 0, a: 255 }];
        let src2 = vec![RGBA8::default()];
        let mut out = vec![RGBA8::default()];

        arithmetic(
            0.0,
            0.5,
            0.0,
            0.0,
            ImageRef::new(1, 1, &src1),
            ImageRef::new(1, 1, &src2),
            ImageRefMut::new(1, 1, &mut out),
        );

        assert_eq!(out[0].a, 128);
        assert!(out[0].r <= out[0].a);
        assert_eq!(out[0].g, 0);
    }
}
