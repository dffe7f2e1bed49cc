// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use rgb::{RGB8, RGBA8};

use super::{f64_bound, ImageRef, ImageRefMut};

/// A distant light source.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug)]
pub struct DistantLight {
    pub azimuth: f64,
    pub elevation: f64,
}

impl DistantLight {
    fn direction(&self) -> Vector3 {
        let azimuth = self.azimuth.to_radians();
        let elevation = self.elevation.to_radians();
        Vector3::new(
            azimuth.cos() * elevation.cos(),
            azimuth.sin() * elevation.cos(),
            elevation.sin(),
        )
    }
}

#[derive(Clone, Copy, Debug)]
struct Vector3 {
    x: f64,
    y: f64,
    z: f64,
}

impl Vector3 {
    #[inline]
    fn new(x: f64, y: f64, z: f64) -> Self {
        Vector3 { x, y, z }
    }

    #[inline]
    fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    #[inline]
    fn normalized(&self) -> Option<Self> {
        let length = self.length();
        if length > 1e-12 {
            Some(Vector3::new(self.x / length, self.y / length, self.z / length))
        } else {
            None
        }
    }
}

/// Renders a diffuse lighting: `k_d * (N . L)`.
///
/// - `src` alpha is the height map; the color channels are ignored.
/// - `dest` will have a **premultiplied alpha** in the caller's color space.
///
/// # Panics
///
/// When `src` and `dest` have different sizes.
pub fn diffuse_lighting(
    surface_scale: f64,
    diffuse_constant: f64,
    lighting_color: RGB8,
    light: DistantLight,
    src: ImageRef,
    dest: ImageRefMut,
) {
    let light_vector = light.direction();

    apply(src, dest, |normal| {
        let k = diffuse_constant * normal.dot(&light_vector);
        let compute =
            |c: u8| (f64_bound(0.0, c as f64 * k, 255.0) + 0.5) as u8;

        let r = compute(lighting_color.r);
        let g = compute(lighting_color.g);
        let b = compute(lighting_color.b);
        RGBA8 { r, g, b, a: 255 }
    }, surface_scale);
}

/// Renders a specular lighting: `k_s * (N . H)^e` with the eye at `(0, 0, 1)`.
///
/// - `src` alpha is the height map; the color channels are ignored.
/// - `dest` will have a **premultiplied alpha** in the caller's color space.
///
/// # Panics
///
/// When `src` and `dest` have different sizes.
pub fn specular_lighting(
    surface_scale: f64,
    specular_constant: f64,
    specular_exponent: f64,
    lighting_color: RGB8,
    light: DistantLight,
    src: ImageRef,
    dest: ImageRefMut,
) {
    let light_vector = light.direction();
    // The halfway vector between the light and the (0, 0, 1) eye.
    let halfway = Vector3::new(light_vector.x, light_vector.y, light_vector.z + 1.0);
    let halfway = match halfway.normalized() {
        Some(v) => v,
        None => return,
    };

    apply(src, dest, |normal| {
        let n_dot_h = normal.dot(&halfway);
        let k = if n_dot_h <= 0.0 {
            0.0
        } else {
            specular_constant * n_dot_h.powf(specular_exponent)
        };

        let compute =
            |c: u8| (f64_bound(0.0, c as f64 * k, 255.0) + 0.5) as u8;

        let r = compute(lighting_color.r);
        let g = compute(lighting_color.g);
        let b = compute(lighting_color.b);
        let a = r.max(g).max(b);
        RGBA8 { r, g, b, a }
    }, surface_scale);
}

fn apply(
    src: ImageRef,
    mut dest: ImageRefMut,
    shade: impl Fn(Vector3) -> RGBA8,
    surface_scale: f64,
) {
    assert!(src.width == dest.width && src.height == dest.height);

    let width = src.width;
    let height = src.height;

    // The alpha channel as a height in [0, 1], edges clamped.
    let alpha_at = |x: i64, y: i64| {
        let x = x.clamp(0, width as i64 - 1) as u32;
        let y = y.clamp(0, height as i64 - 1) as u32;
        src.alpha_at(x, y) as f64 / 255.0
    };

    for y in 0..height {
        for x in 0..width {
            let (xi, yi) = (x as i64, y as i64);

            // A 4-neighbor central-difference height gradient.
            let dx = (alpha_at(xi + 1, yi) - alpha_at(xi - 1, yi)) / 2.0;
            let dy = (alpha_at(xi, yi + 1) - alpha_at(xi, yi - 1)) / 2.0;

            let normal = Vector3::new(-surface_scale * dx, -surface_scale * dy, 1.0);
            let normal = normal.normalized().unwrap_or(Vector3::new(0.0, 0.0, 1.0));

            *dest.pixel_at_mut(x, y) = shade(normal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_surface_diffuse() {
        // A flat, fully opaque surface lit from straight above
        // is the lighting color everywhere.
        let src = vec![RGBA8 { r: 0, g: 0, b: 0, a: 255 }; 25];
        let mut out = vec![RGBA8::default(); 25];

        diffuse_lighting(
            1.0,
            1.0,
            RGB8 { r: 200, g: 100, b: 50 },
            DistantLight { azimuth: 0.0, elevation: 90.0 },
            ImageRef::new(5, 5, &src),
            ImageRefMut::new(5, 5, &mut out),
        );

        assert_eq!(out[12], RGBA8 { r: 200, g: 100, b: 50, a: 255 });
    }
}
