// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use rgb::FromSlice;
use tiny_skia::{Pixmap, PixmapMut, Size, Transform};

use crate::geom::{parse_aspect_ratio, view_box_to_transform};
use crate::render::Context;
use crate::style::Style;
use crate::units::{resolve_attr_length, LengthBase};
use crate::xmltree::Node;

pub(crate) fn render(
    node: Node,
    ctx: &Context,
    style: &Style,
    viewport: Size,
    transform: Transform,
    pixmap: &mut PixmapMut,
) -> Option<()> {
    let href = node.href()?;
    let raster = load_href(href, ctx)?;

    let x = resolve_attr_length(node, "x", LengthBase::Width, viewport, style.font_size, 0.0);
    let y = resolve_attr_length(node, "y", LengthBase::Height, viewport, style.font_size, 0.0);
    let width = resolve_attr_length(
        node,
        "width",
        LengthBase::Width,
        viewport,
        style.font_size,
        raster.width() as f32,
    );
    let height = resolve_attr_length(
        node,
        "height",
        LengthBase::Height,
        viewport,
        style.font_size,
        raster.height() as f32,
    );
    if !(width > 0.0 && height > 0.0) {
        return None;
    }

    let aspect = parse_aspect_ratio(node.attribute("preserveAspectRatio"));
    let img_rect = tiny_skia::NonZeroRect::from_xywh(
        0.0,
        0.0,
        raster.width() as f32,
        raster.height() as f32,
    )?;

    let fit = view_box_to_transform(img_rect, aspect, Size::from_wh(width, height)?);
    let image_transform = transform
        .pre_concat(Transform::from_translate(x, y))
        .pre_concat(fit);

    // Slice mode overflows the target rect and must be clipped to it.
    // The target rect lives in the element's own user space.
    let mask = if aspect.slice {
        let target = tiny_skia::Rect::from_xywh(x, y, width, height)?;
        let mut mask = tiny_skia::Mask::new(pixmap.width(), pixmap.height())?;
        mask.fill_path(
            &tiny_skia::PathBuilder::from_rect(target),
            tiny_skia::FillRule::Winding,
            true,
            transform,
        );
        Some(mask)
    } else {
        None
    };

    let rect = tiny_skia::Rect::from_xywh(0.0, 0.0, raster.width() as f32, raster.height() as f32)?;
    let mut paint = tiny_skia::Paint::default();
    paint.shader = tiny_skia::Pattern::new(
        raster.as_ref(),
        tiny_skia::SpreadMode::Pad,
        tiny_skia::FilterQuality::Bilinear,
        1.0,
        Transform::identity(),
    );

    pixmap.fill_rect(rect, &paint, image_transform, mask.as_ref());

    Some(())
}

/// Loads an `href` into a decoded pixmap.
///
/// Only `data:` URLs and local paths are handled here;
/// remote references are the host's concern.
pub(crate) fn load_href(href: &str, ctx: &Context) -> Option<Pixmap> {
    let data: Vec<u8>;
    let mime;

    if let Ok(url) = data_url::DataUrl::process(href) {
        let (decoded, _) = url.decode_to_vec().ok()?;
        mime = format!(
            "{}/{}",
            url.mime_type().type_.as_str(),
            url.mime_type().subtype.as_str()
        );
        data = decoded;
    } else if href.contains("://") {
        log::warn!("Remote images are not loaded by the renderer: '{}'.", href);
        return None;
    } else {
        data = std::fs::read(href)
            .map_err(|e| log::warn!("Failed to load '{}': {}.", href, e))
            .ok()?;
        mime = String::new();
    }

    decode(&data, &mime, ctx)
}

fn decode(data: &[u8], mime: &str, ctx: &Context) -> Option<Pixmap> {
    // Magic bytes take precedence over the declared MIME type.
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        decode_png(data)
    } else if data.starts_with(&[0xff, 0xd8, 0xff]) {
        decode_jpeg(data)
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        decode_gif(data)
    } else if mime == "image/svg+xml" || looks_like_svg(data) {
        decode_svg(data, ctx)
    } else {
        log::warn!("Unsupported image format.");
        None
    }
}

fn looks_like_svg(data: &[u8]) -> bool {
    let text = match std::str::from_utf8(data) {
        Ok(v) => v,
        Err(_) => return false,
    };
    text.trim_start().starts_with('<')
}

fn decode_png(data: &[u8]) -> Option<Pixmap> {
    let mut decoder = png::Decoder::new(data);
    decoder.set_transformations(png::Transformations::normalize_to_color8());
    let mut reader = decoder.read_info().ok()?;

    let mut img_data = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut img_data).ok()?;
    img_data.truncate(info.buffer_size());

    let mut pixmap = Pixmap::new(info.width, info.height)?;
    match info.color_type {
        png::ColorType::Rgb => rgb_to_pixmap(&img_data, &mut pixmap),
        png::ColorType::Rgba => rgba_to_pixmap(&img_data, &mut pixmap),
        png::ColorType::Grayscale => {
            let rgb: Vec<u8> = img_data.iter().flat_map(|&g| [g, g, g]).collect();
            rgb_to_pixmap(&rgb, &mut pixmap);
        }
        png::ColorType::GrayscaleAlpha => {
            let rgba: Vec<u8> = img_data
                .chunks(2)
                .flat_map(|ga| [ga[0], ga[0], ga[0], ga[1]])
                .collect();
            rgba_to_pixmap(&rgba, &mut pixmap);
        }
        png::ColorType::Indexed => {
            log::warn!("Indexed PNG is not supported.");
            return None;
        }
    }

    Some(pixmap)
}

fn decode_jpeg(data: &[u8]) -> Option<Pixmap> {
    let mut decoder = jpeg_decoder::Decoder::new(data);
    let img_data = decoder.decode().ok()?;
    let info = decoder.info()?;

    let mut pixmap = Pixmap::new(info.width as u32, info.height as u32)?;
    match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => rgb_to_pixmap(&img_data, &mut pixmap),
        jpeg_decoder::PixelFormat::L8 => {
            let rgb: Vec<u8> = img_data.iter().flat_map(|&g| [g, g, g]).collect();
            rgb_to_pixmap(&rgb, &mut pixmap);
        }
        _ => {
            log::warn!("Unsupported JPEG pixel format.");
            return None;
        }
    }

    Some(pixmap)
}

fn decode_gif(data: &[u8]) -> Option<Pixmap> {
    let mut decode_opts = gif::DecodeOptions::new();
    decode_opts.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = decode_opts.read_info(data).ok()?;
    let first_frame = decoder.read_next_frame().ok()??;

    let mut pixmap = Pixmap::new(
        u32::from(first_frame.width),
        u32::from(first_frame.height),
    )?;
    rgba_to_pixmap(&first_frame.buffer, &mut pixmap);
    Some(pixmap)
}

/// Renders an SVG image into a pixmap of its natural size.
fn decode_svg(data: &[u8], ctx: &Context) -> Option<Pixmap> {
    let mut sub_opt = crate::Options::default();
    sub_opt.font_family = ctx.opt.font_family.clone();
    sub_opt.font_size = ctx.opt.font_size;

    match crate::render_inner(data, &sub_opt, false) {
        Ok(pixmap) => Some(pixmap),
        Err(e) => {
            log::warn!("Failed to load an SVG image: {}.", e);
            None
        }
    }
}

fn rgb_to_pixmap(data: &[u8], pixmap: &mut Pixmap) {
    let mut i = 0;
    let dst = pixmap.data_mut();
    for p in data.as_rgb() {
        dst[i] = p.r;
        dst[i + 1] = p.g;
        dst[i + 2] = p.b;
        dst[i + 3] = 255;

        i += tiny_skia::BYTES_PER_PIXEL;
    }
}

fn rgba_to_pixmap(data: &[u8], pixmap: &mut Pixmap) {
    let mut i = 0;
    let dst = pixmap.data_mut();
    for p in data.as_rgba() {
        let a = p.a as f64 / 255.0;
        dst[i] = (p.r as f64 * a + 0.5) as u8;
        dst[i + 1] = (p.g as f64 * a + 0.5) as u8;
        dst[i + 2] = (p.b as f64 * a + 0.5) as u8;
        dst[i + 3] = p.a;

        i += tiny_skia::BYTES_PER_PIXEL;
    }
}
