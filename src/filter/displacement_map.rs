// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use rgb::RGBA8;

use super::{ImageRef, ImageRefMut};

/// A color channel.
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ColorChannel {
    R,
    G,
    B,
    A,
}

impl ColorChannel {
    #[inline]
    fn of(self, pixel: RGBA8) -> u8 {
        match self {
            ColorChannel::R => pixel.r,
            ColorChannel::G => pixel.g,
            ColorChannel::B => pixel.b,
            ColorChannel::A => pixel.a,
        }
    }
}

/// Applies a displacement map.
///
/// Every output pixel is the nearest `src` sample at
/// `(x + sx * (map[x_channel] - 0.5), y + sy * (map[y_channel] - 0.5))`.
/// `dest` stays transparent where the displaced position leaves the image.
///
/// # Panics
///
/// When `src`, `map` and `dest` have different sizes.
pub fn apply(
    x_channel: ColorChannel,
    y_channel: ColorChannel,
    sx: f64,
    sy: f64,
    src: ImageRef,
    map: ImageRef,
    dest: ImageRefMut,
) {
    assert!(src.width == map.width && src.width == dest.width);
    assert!(src.height == map.height && src.height == dest.height);

    let width = src.width as i64;
    let height = src.height as i64;

    let mut idx = 0;
    for y in 0..height {
        for x in 0..width {
            let control = map.data[idx];
            let shift = |channel: ColorChannel, scale: f64| {
                (channel.of(control) as f64 / 255.0 - 0.5) * scale
            };

            let tx = (x as f64 + shift(x_channel, sx)).round() as i64;
            let ty = (y as f64 + shift(y_channel, sy)).round() as i64;

            if (0..width).contains(&tx) && (0..height).contains(&ty) {
                dest.data[idx] = src.data[(ty * width + tx) as usize];
            }

            idx += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_map_shifts_uniformly() {
        // A map with the X channel fully saturated shifts by sx / 2.
        let mut src = vec![RGBA8::default(); 16];
        src[6] = RGBA8 { r: 9, g: 9, b: 9, a: 255 };
        let map = vec![RGBA8 { r: 255, g: 0, b: 0, a: 0 }; 16];
        let mut out = vec![RGBA8::default(); 16];

        apply(
            ColorChannel::R,
            ColorChannel::G,
            4.0,
            4.0,
            ImageRef::new(4, 4, &src),
            ImageRef::new(4, 4, &map),
            ImageRefMut::new(4, 4, &mut out),
        );

        // R = 1.0 samples two to the right, G = 0.0 two above:
        // the marked pixel (2, 1) shows up at (0, 3).
        assert_eq!(out[12], src[6]);
    }
}
