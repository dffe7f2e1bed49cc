// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The per-element filter evaluator.
//!
//! A filtered element is rendered into an offscreen surface; the filter's
//! primitives then run in document order over a pool of named surfaces,
//! and the last output is composited back. Primitives never abort the
//! render: anything unsupported or broken degrades to a passthrough.

use std::rc::Rc;
use std::str::FromStr;

use rgb::{FromSlice, RGBA8};
use tiny_skia::{IntRect, Pixmap, PixmapMut, PixmapPaint, Size, Transform};

use crate::render::{Context, RenderState};
use crate::style::{Color, Style};
use crate::xmltree::Node;
use crate::{CompatFlags, Error};

mod color_matrix;
mod component_transfer;
mod composite;
mod convolve_matrix;
mod displacement_map;
mod gaussian_blur;
mod lighting;
mod morphology;
mod turbulence;

/// An image reference.
///
/// Image pixels are stored in RGBA order.
///
/// Some kernels require premultiplied channels, some not.
/// See the specific kernel documentation for details.
#[derive(Clone, Copy)]
pub(crate) struct ImageRef<'a> {
    pub data: &'a [RGBA8],
    pub width: u32,
    pub height: u32,
}

impl<'a> ImageRef<'a> {
    #[inline]
    pub fn new(width: u32, height: u32, data: &'a [RGBA8]) -> Self {
        ImageRef {
            data,
            width,
            height,
        }
    }

    #[inline]
    fn alpha_at(&self, x: u32, y: u32) -> i16 {
        self.data[(self.width * y + x) as usize].a as i16
    }
}

/// A mutable `ImageRef` variant.
pub(crate) struct ImageRefMut<'a> {
    pub data: &'a mut [RGBA8],
    pub width: u32,
    pub height: u32,
}

impl<'a> ImageRefMut<'a> {
    #[inline]
    pub fn new(width: u32, height: u32, data: &'a mut [RGBA8]) -> Self {
        ImageRefMut {
            data,
            width,
            height,
        }
    }

    #[inline]
    fn pixel_at(&self, x: u32, y: u32) -> RGBA8 {
        self.data[(self.width * y + x) as usize]
    }

    #[inline]
    fn pixel_at_mut(&mut self, x: u32, y: u32) -> &mut RGBA8 {
        &mut self.data[(self.width * y + x) as usize]
    }
}

trait PixmapToImageRef {
    fn as_image_ref(&self) -> ImageRef<'_>;
    fn as_image_ref_mut(&mut self) -> ImageRefMut<'_>;
}

impl PixmapToImageRef for Pixmap {
    fn as_image_ref(&self) -> ImageRef<'_> {
        ImageRef::new(self.width(), self.height(), self.data().as_rgba())
    }

    fn as_image_ref_mut(&mut self) -> ImageRefMut<'_> {
        let (w, h) = (self.width(), self.height());
        ImageRefMut::new(w, h, self.data_mut().as_rgba_mut())
    }
}

/// The primitives the evaluator understands, lowercased.
const SUPPORTED_PRIMITIVES: &[&str] = &[
    "feblend",
    "fecolormatrix",
    "fecomponenttransfer",
    "fecomposite",
    "feconvolvematrix",
    "fediffuselighting",
    "fedisplacementmap",
    "feflood",
    "fegaussianblur",
    "feimage",
    "femerge",
    "femorphology",
    "feoffset",
    "fespecularlighting",
    "fetile",
    "feturbulence",
];

/// Advisory filter-support validation.
///
/// Walks every `filter` element and checks its primitives against the
/// supported set. Never produces pixels; the evaluator itself tolerates
/// anything by downgrading to passthrough.
pub(crate) fn validate(doc: &crate::xmltree::Document, compat: &CompatFlags) -> Result<(), Error> {
    if !compat.rejects_unsupported_filters() {
        return Ok(());
    }

    for filter in doc.descendants().filter(|n| n.local_name() == "filter") {
        for child in filter.children() {
            let name = child.local_name().to_ascii_lowercase();
            if name.starts_with("fe") && !SUPPORTED_PRIMITIVES.contains(&name.as_str()) {
                return Err(Error::UnsupportedFeature(format!(
                    "filter primitive '{}'",
                    child.local_name()
                )));
            }
        }
    }

    Ok(())
}

/// A named intermediate surface.
///
/// All surfaces share the filter region size. Pixels are premultiplied
/// sRGB between primitives; linear-light operators convert on entry
/// and back on exit.
#[derive(Clone)]
struct Image(Rc<Pixmap>);

impl Image {
    fn from_pixmap(pixmap: Pixmap) -> Self {
        Image(Rc::new(pixmap))
    }

    fn take(self) -> Pixmap {
        match Rc::try_unwrap(self.0) {
            Ok(v) => v,
            Err(v) => (*v).clone(),
        }
    }

    fn as_pixmap(&self) -> &Pixmap {
        &self.0
    }
}

struct FilterResult {
    name: String,
    image: Image,
}

/// Applies `filter_node` to `node` and composites the result
/// with the element's resolved opacity.
pub(crate) fn apply(
    node: Node,
    filter_node: Node,
    ctx: &Context,
    state: &mut RenderState,
    style: &Style,
    viewport: Size,
    transform: Transform,
    pixmap: &mut PixmapMut,
) {
    // The element is rendered with its opacity suppressed;
    // the opacity is reapplied when the filter result is drawn back.
    let mut source = match Pixmap::new(pixmap.width(), pixmap.height()) {
        Some(v) => v,
        None => return,
    };
    crate::render::render_element(
        node,
        ctx,
        state,
        style,
        viewport,
        transform,
        &mut source.as_mut(),
    );

    let result = eval_primitives(filter_node, ctx, state, style, viewport, transform, &source);

    if let Some(result) = result {
        pixmap.draw_pixmap(
            0,
            0,
            result.as_ref(),
            &PixmapPaint {
                opacity: style.opacity,
                ..PixmapPaint::default()
            },
            Transform::identity(),
            None,
        );
    }
}

fn eval_primitives(
    filter_node: Node,
    ctx: &Context,
    state: &mut RenderState,
    style: &Style,
    viewport: Size,
    transform: Transform,
    source: &Pixmap,
) -> Option<Pixmap> {
    let width = source.width();
    let height = source.height();
    let mut results: Vec<FilterResult> = Vec::new();

    for primitive in filter_node.children() {
        if !primitive.local_name().starts_with("fe") {
            continue;
        }

        let input = || get_input(primitive.attribute("in"), source, &results);
        let input2 = || get_input(primitive.attribute("in2"), source, &results);

        let result = match primitive.local_name() {
            "feFlood" => apply_flood(primitive, style, width, height),
            "feGaussianBlur" => apply_blur(primitive, transform, input()),
            "feOffset" => apply_offset(primitive, transform, input()),
            "feColorMatrix" => apply_color_matrix(primitive, input()),
            "feComponentTransfer" => apply_component_transfer(primitive, input()),
            "feConvolveMatrix" => apply_convolve_matrix(primitive, input()),
            "feMorphology" => apply_morphology(primitive, transform, input()),
            "feComposite" => apply_composite(primitive, input(), input2()),
            "feBlend" => apply_blend(primitive, input(), input2()),
            "feDisplacementMap" => apply_displacement_map(primitive, transform, input(), input2()),
            "feMerge" => apply_merge(primitive, source, &results, width, height),
            "feImage" => apply_image(primitive, ctx, state, style, viewport, transform, width, height),
            "feTile" => apply_tile(input()),
            "feTurbulence" => apply_turbulence(primitive, transform, width, height),
            "feDiffuseLighting" => {
                apply_lighting(primitive, style, transform, false, input())
            }
            "feSpecularLighting" => {
                apply_lighting(primitive, style, transform, true, input())
            }
            // Unknown primitives pass the last output through unchanged.
            _ => None,
        };

        // Per-primitive failures downgrade to passthrough.
        let image = match result {
            Some(v) => v,
            None => get_input(None, source, &results),
        };

        results.push(FilterResult {
            name: primitive.attribute("result").unwrap_or("").to_string(),
            image,
        });
    }

    results.pop().map(|r| r.image.take())
}

/// Resolves a primitive input name against the surface pool.
///
/// `None` or an unknown name resolves to the last output,
/// or SourceGraphic at the head of the chain.
fn get_input(name: Option<&str>, source: &Pixmap, results: &[FilterResult]) -> Image {
    match name {
        Some("SourceGraphic") => Image::from_pixmap(source.clone()),
        Some("SourceAlpha") => {
            let mut image = source.clone();
            // Set RGB to black. Keep alpha as is.
            for p in image.data_mut().as_rgba_mut() {
                p.r = 0;
                p.g = 0;
                p.b = 0;
            }
            Image::from_pixmap(image)
        }
        Some(name) => match results.iter().rev().find(|v| v.name == name) {
            Some(result) => result.image.clone(),
            None => {
                log::warn!("Unknown filter primitive reference '{}'.", name);
                get_input(None, source, results)
            }
        },
        None => match results.last() {
            Some(result) => result.image.clone(),
            None => Image::from_pixmap(source.clone()),
        },
    }
}

fn apply_flood(primitive: Node, style: &Style, width: u32, height: u32) -> Option<Image> {
    let color = match primitive.attribute("flood-color") {
        Some("currentColor") => style.color,
        Some(value) => Color::from_str(value).ok()?,
        None => Color::black(),
    };
    let opacity = primitive
        .attribute("flood-opacity")
        .and_then(crate::style::parse_opacity)
        .unwrap_or(1.0);

    let mut pixmap = Pixmap::new(width, height)?;
    let mut fill = tiny_skia::Color::from_rgba8(color.red, color.green, color.blue, color.alpha);
    fill.apply_opacity(opacity);
    pixmap.fill(fill);

    Some(Image::from_pixmap(pixmap))
}

fn apply_blur(primitive: Node, ts: Transform, input: Image) -> Option<Image> {
    let std_dev = num_list(primitive.attribute("stdDeviation").unwrap_or("0"));
    let std_x = *std_dev.first()? as f32;
    let std_y = *std_dev.get(1).unwrap_or(&(std_x as f64)) as f32;
    if std_x < 0.0 || std_y < 0.0 {
        return Some(input);
    }

    let (sx, sy) = ts.get_scale();
    let (std_x, std_y) = (std_x * sx, std_y * sy);
    if std_x < 0.05 && std_y < 0.05 {
        return Some(input);
    }

    let mut pixmap = input.take();
    gaussian_blur::apply(std_x as f64, std_y as f64, pixmap.as_image_ref_mut());
    Some(Image::from_pixmap(pixmap))
}

fn apply_offset(primitive: Node, ts: Transform, input: Image) -> Option<Image> {
    let dx = num_attr(primitive, "dx").unwrap_or(0.0) as f32;
    let dy = num_attr(primitive, "dy").unwrap_or(0.0) as f32;

    let (sx, sy) = ts.get_scale();
    let dx = (dx * sx).round() as i32;
    let dy = (dy * sy).round() as i32;
    if dx == 0 && dy == 0 {
        return Some(input);
    }

    // Out-of-source samples stay transparent.
    let mut pixmap = Pixmap::new(input.as_pixmap().width(), input.as_pixmap().height())?;
    pixmap.draw_pixmap(
        dx,
        dy,
        input.as_pixmap().as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );

    Some(Image::from_pixmap(pixmap))
}

fn apply_color_matrix(primitive: Node, input: Image) -> Option<Image> {
    let kind = match primitive.attribute("type").unwrap_or("matrix") {
        "matrix" => {
            let values = num_list(primitive.attribute("values").unwrap_or(""));
            let values: [f64; 20] = values.try_into().ok()?;
            color_matrix::ColorMatrix::Matrix(values)
        }
        "saturate" => {
            let v = num_attr(primitive, "values").unwrap_or(1.0);
            color_matrix::ColorMatrix::Saturate(v.clamp(0.0, 1.0))
        }
        "hueRotate" => {
            color_matrix::ColorMatrix::HueRotate(num_attr(primitive, "values").unwrap_or(0.0))
        }
        "luminanceToAlpha" => color_matrix::ColorMatrix::LuminanceToAlpha,
        _ => return None,
    };

    let mut pixmap = input.take();
    in_linear_straight(&mut pixmap, |image| color_matrix::apply(&kind, image));
    Some(Image::from_pixmap(pixmap))
}

fn apply_component_transfer(primitive: Node, input: Image) -> Option<Image> {
    let func = |name: &str| {
        primitive
            .children()
            .find(|c| c.local_name() == name)
            .map(component_transfer::TransferFunction::from_node)
            .unwrap_or(component_transfer::TransferFunction::Identity)
    };

    let func_r = func("feFuncR");
    let func_g = func("feFuncG");
    let func_b = func("feFuncB");
    let func_a = func("feFuncA");

    let mut pixmap = input.take();
    in_linear_straight(&mut pixmap, |image| {
        component_transfer::apply(&func_r, &func_g, &func_b, &func_a, image)
    });
    Some(Image::from_pixmap(pixmap))
}

fn apply_convolve_matrix(primitive: Node, input: Image) -> Option<Image> {
    let order = num_list(primitive.attribute("order").unwrap_or("3"));
    let order_x = *order.first()? as i32;
    let order_y = *order.get(1).unwrap_or(&(order_x as f64)) as i32;
    if order_x <= 0 || order_y <= 0 {
        return None;
    }

    let weights = num_list(primitive.attribute("kernelMatrix").unwrap_or(""));
    if weights.len() != (order_x * order_y) as usize {
        return None;
    }

    let divisor = match num_attr(primitive, "divisor") {
        Some(d) if d != 0.0 => d,
        Some(_) => return None,
        None => {
            let sum: f64 = weights.iter().sum();
            if sum == 0.0 {
                1.0
            } else {
                sum
            }
        }
    };

    let target_x = num_attr(primitive, "targetX")
        .map(|v| v as i32)
        .unwrap_or(order_x / 2);
    let target_y = num_attr(primitive, "targetY")
        .map(|v| v as i32)
        .unwrap_or(order_y / 2);
    if !(0..order_x).contains(&target_x) || !(0..order_y).contains(&target_y) {
        return None;
    }

    let edge_mode = match primitive.attribute("edgeMode") {
        Some("wrap") => convolve_matrix::EdgeMode::Wrap,
        Some("none") => convolve_matrix::EdgeMode::None,
        _ => convolve_matrix::EdgeMode::Duplicate,
    };
    let preserve_alpha = primitive.attribute("preserveAlpha") == Some("true");
    let bias = num_attr(primitive, "bias").unwrap_or(0.0);

    let kernel = convolve_matrix::Kernel {
        columns: order_x as u32,
        rows: order_y as u32,
        target_x: target_x as u32,
        target_y: target_y as u32,
        weights: &weights,
    };

    let mut pixmap = input.take();
    if preserve_alpha {
        demultiply_alpha(pixmap.data_mut().as_rgba_mut());
    }
    convolve_matrix::apply(
        &kernel,
        divisor,
        bias,
        edge_mode,
        preserve_alpha,
        pixmap.as_image_ref_mut(),
    );
    Some(Image::from_pixmap(pixmap))
}

fn apply_morphology(primitive: Node, ts: Transform, input: Image) -> Option<Image> {
    let radius = num_list(primitive.attribute("radius").unwrap_or("0"));
    let rx = *radius.first()? as f32;
    let ry = *radius.get(1).unwrap_or(&(rx as f64)) as f32;
    if rx < 0.0 || ry < 0.0 {
        return Some(input);
    }

    let operator = match primitive.attribute("operator") {
        Some("dilate") => morphology::Operator::Dilate,
        _ => morphology::Operator::Erode,
    };

    let (sx, sy) = ts.get_scale();
    let (rx, ry) = (rx * sx, ry * sy);

    let mut pixmap = input.take();
    if !(rx > 0.0 && ry > 0.0) {
        pixmap.fill(tiny_skia::Color::TRANSPARENT);
        return Some(Image::from_pixmap(pixmap));
    }

    morphology::apply(operator, rx as f64, ry as f64, pixmap.as_image_ref_mut());
    Some(Image::from_pixmap(pixmap))
}

fn apply_composite(primitive: Node, input1: Image, input2: Image) -> Option<Image> {
    let operator = primitive.attribute("operator").unwrap_or("over");

    let width = input1.as_pixmap().width();
    let height = input1.as_pixmap().height();
    let mut pixmap = Pixmap::new(width, height)?;

    if operator == "arithmetic" {
        let k = |name| num_attr(primitive, name).unwrap_or(0.0);
        let (k1, k2, k3, k4) = (k("k1"), k("k2"), k("k3"), k("k4"));

        let pixmap1 = input1.take();
        let pixmap2 = input2.take();
        composite::arithmetic(
            k1,
            k2,
            k3,
            k4,
            pixmap1.as_image_ref(),
            pixmap2.as_image_ref(),
            pixmap.as_image_ref_mut(),
        );
        return Some(Image::from_pixmap(pixmap));
    }

    let blend_mode = match operator {
        "over" => tiny_skia::BlendMode::SourceOver,
        "in" => tiny_skia::BlendMode::SourceIn,
        "out" => tiny_skia::BlendMode::SourceOut,
        "atop" => tiny_skia::BlendMode::SourceAtop,
        "xor" => tiny_skia::BlendMode::Xor,
        _ => return None,
    };

    pixmap.draw_pixmap(
        0,
        0,
        input2.as_pixmap().as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
    pixmap.draw_pixmap(
        0,
        0,
        input1.as_pixmap().as_ref(),
        &PixmapPaint {
            blend_mode,
            ..PixmapPaint::default()
        },
        Transform::identity(),
        None,
    );

    Some(Image::from_pixmap(pixmap))
}

fn apply_blend(primitive: Node, input1: Image, input2: Image) -> Option<Image> {
    let blend_mode = match primitive.attribute("mode").unwrap_or("normal") {
        "normal" => tiny_skia::BlendMode::SourceOver,
        "multiply" => tiny_skia::BlendMode::Multiply,
        "screen" => tiny_skia::BlendMode::Screen,
        "darken" => tiny_skia::BlendMode::Darken,
        "lighten" => tiny_skia::BlendMode::Lighten,
        _ => return None,
    };

    // Blending happens in linear light.
    let mut pixmap1 = input1.take();
    let mut pixmap2 = input2.take();
    into_linear_rgb(&mut pixmap1);
    into_linear_rgb(&mut pixmap2);

    let mut pixmap = Pixmap::new(pixmap1.width(), pixmap1.height())?;
    pixmap.draw_pixmap(
        0,
        0,
        pixmap2.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
    pixmap.draw_pixmap(
        0,
        0,
        pixmap1.as_ref(),
        &PixmapPaint {
            blend_mode,
            ..PixmapPaint::default()
        },
        Transform::identity(),
        None,
    );

    into_srgb(&mut pixmap);
    Some(Image::from_pixmap(pixmap))
}

fn apply_displacement_map(
    primitive: Node,
    ts: Transform,
    input1: Image,
    input2: Image,
) -> Option<Image> {
    let scale = num_attr(primitive, "scale").unwrap_or(0.0) as f32;

    let channel = |name| match primitive.attribute(name) {
        Some("R") => displacement_map::ColorChannel::R,
        Some("G") => displacement_map::ColorChannel::G,
        Some("B") => displacement_map::ColorChannel::B,
        _ => displacement_map::ColorChannel::A,
    };
    let x_channel = channel("xChannelSelector");
    let y_channel = channel("yChannelSelector");

    let (sx, sy) = ts.get_scale();

    // The displacement math runs in linear light.
    let mut pixmap1 = input1.take();
    let mut pixmap2 = input2.take();
    into_linear_rgb(&mut pixmap1);
    into_linear_rgb(&mut pixmap2);

    let mut pixmap = Pixmap::new(pixmap1.width(), pixmap1.height())?;
    displacement_map::apply(
        x_channel,
        y_channel,
        (scale * sx) as f64,
        (scale * sy) as f64,
        pixmap1.as_image_ref(),
        pixmap2.as_image_ref(),
        pixmap.as_image_ref_mut(),
    );

    into_srgb(&mut pixmap);
    Some(Image::from_pixmap(pixmap))
}

fn apply_merge(
    primitive: Node,
    source: &Pixmap,
    results: &[FilterResult],
    width: u32,
    height: u32,
) -> Option<Image> {
    let mut pixmap = Pixmap::new(width, height)?;

    for child in primitive
        .children()
        .filter(|c| c.local_name() == "feMergeNode")
    {
        let input = get_input(child.attribute("in"), source, results);
        pixmap.draw_pixmap(
            0,
            0,
            input.as_pixmap().as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    Some(Image::from_pixmap(pixmap))
}

#[allow(clippy::too_many_arguments)]
fn apply_image(
    primitive: Node,
    ctx: &Context,
    state: &mut RenderState,
    style: &Style,
    viewport: Size,
    transform: Transform,
    width: u32,
    height: u32,
) -> Option<Image> {
    let href = primitive.href()?;
    let mut pixmap = Pixmap::new(width, height)?;

    let (sx, sy) = transform.get_scale();
    let x = num_attr(primitive, "x").unwrap_or(0.0) as f32;
    let y = num_attr(primitive, "y").unwrap_or(0.0) as f32;

    if let Some(id) = href.strip_prefix('#') {
        // A local reference renders the element itself.
        let target = ctx.doc.element_by_id(id)?;
        let ts = transform.pre_concat(Transform::from_translate(x, y));
        crate::render::render_node(
            target,
            ctx,
            state,
            style,
            viewport,
            ts,
            &mut pixmap.as_mut(),
        );
    } else {
        let raster = crate::image::load_href(href, ctx)?;
        pixmap.draw_pixmap(
            (x * sx).round() as i32,
            (y * sy).round() as i32,
            raster.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    Some(Image::from_pixmap(pixmap))
}

fn apply_tile(input: Image) -> Option<Image> {
    let pixmap = input.as_pixmap();
    let bounds = content_bounds(pixmap)?;

    let tile = pixmap.clone_rect(bounds)?;
    let mut paint = tiny_skia::Paint::default();
    paint.shader = tiny_skia::Pattern::new(
        tile.as_ref(),
        tiny_skia::SpreadMode::Repeat,
        tiny_skia::FilterQuality::Nearest,
        1.0,
        Transform::from_translate(bounds.x() as f32, bounds.y() as f32),
    );

    let mut result = Pixmap::new(pixmap.width(), pixmap.height())?;
    let rect = tiny_skia::Rect::from_xywh(
        0.0,
        0.0,
        pixmap.width() as f32,
        pixmap.height() as f32,
    )?;
    result.fill_rect(rect, &paint, Transform::identity(), None);

    Some(Image::from_pixmap(result))
}

/// Returns the bounding box of the non-transparent pixels.
fn content_bounds(pixmap: &Pixmap) -> Option<IntRect> {
    let width = pixmap.width() as i32;
    let height = pixmap.height() as i32;
    let data = pixmap.data().as_rgba();

    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = -1;
    let mut max_y = -1;

    for y in 0..height {
        for x in 0..width {
            if data[(y * width + x) as usize].a != 0 {
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }

    if max_x < min_x {
        return None;
    }

    IntRect::from_xywh(
        min_x,
        min_y,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    )
}

fn apply_turbulence(primitive: Node, ts: Transform, width: u32, height: u32) -> Option<Image> {
    let base_frequency = num_list(primitive.attribute("baseFrequency").unwrap_or("0"));
    let base_x = *base_frequency.first()?;
    let base_y = *base_frequency.get(1).unwrap_or(&base_x);
    if base_x < 0.0 || base_y < 0.0 {
        return None;
    }

    let num_octaves = num_attr(primitive, "numOctaves")
        .unwrap_or(1.0)
        .round()
        .clamp(1.0, 8.0) as u32;
    let seed = num_attr(primitive, "seed").unwrap_or(0.0).trunc() as i32;
    let fractal_noise = primitive.attribute("type") == Some("fractalNoise");

    let (sx, sy) = ts.get_scale();
    if sx == 0.0 || sy == 0.0 {
        return None;
    }

    let mut pixmap = Pixmap::new(width, height)?;
    turbulence::apply(
        -ts.tx as f64,
        -ts.ty as f64,
        sx as f64,
        sy as f64,
        base_x,
        base_y,
        num_octaves,
        seed,
        fractal_noise,
        pixmap.as_image_ref_mut(),
    );

    multiply_alpha(pixmap.data_mut().as_rgba_mut());

    Some(Image::from_pixmap(pixmap))
}

fn apply_lighting(
    primitive: Node,
    style: &Style,
    ts: Transform,
    specular: bool,
    input: Image,
) -> Option<Image> {
    let light = primitive
        .children()
        .find(|c| c.local_name() == "feDistantLight")?;
    let azimuth = num_attr(light, "azimuth").unwrap_or(0.0);
    let elevation = num_attr(light, "elevation").unwrap_or(0.0);

    let surface_scale = num_attr(primitive, "surfaceScale").unwrap_or(1.0);
    let lighting_color = match primitive.attribute("lighting-color") {
        Some("currentColor") => style.color,
        Some(value) => Color::from_str(value).ok()?,
        None => Color::new_rgb(255, 255, 255),
    };
    // The lighting equations run in linear light.
    let lighting_color = rgb::RGB8 {
        r: SRGB_TO_LINEAR_RGB_TABLE[lighting_color.red as usize],
        g: SRGB_TO_LINEAR_RGB_TABLE[lighting_color.green as usize],
        b: SRGB_TO_LINEAR_RGB_TABLE[lighting_color.blue as usize],
    };

    let (sx, _) = ts.get_scale();
    let surface_scale = surface_scale * sx as f64;

    let source = input.take();
    let mut pixmap = Pixmap::new(source.width(), source.height())?;

    let light_source = lighting::DistantLight { azimuth, elevation };

    if specular {
        let specular_constant = num_attr(primitive, "specularConstant").unwrap_or(1.0);
        let specular_exponent = num_attr(primitive, "specularExponent")
            .unwrap_or(1.0)
            .clamp(1.0, 128.0);
        lighting::specular_lighting(
            surface_scale,
            specular_constant,
            specular_exponent,
            lighting_color,
            light_source,
            source.as_image_ref(),
            pixmap.as_image_ref_mut(),
        );
    } else {
        let diffuse_constant = num_attr(primitive, "diffuseConstant").unwrap_or(1.0);
        lighting::diffuse_lighting(
            surface_scale,
            diffuse_constant,
            lighting_color,
            light_source,
            source.as_image_ref(),
            pixmap.as_image_ref_mut(),
        );
    }

    // The kernels emit premultiplied linear pixels.
    into_srgb(&mut pixmap);

    Some(Image::from_pixmap(pixmap))
}

/// Runs `f` over the pixmap converted to straight linear RGBA,
/// then converts back to premultiplied sRGB.
fn in_linear_straight(pixmap: &mut Pixmap, f: impl FnOnce(ImageRefMut)) {
    let width = pixmap.width();
    let height = pixmap.height();
    let data = pixmap.data_mut().as_rgba_mut();

    demultiply_alpha(data);
    into_linear_rgb_straight(data);

    f(ImageRefMut::new(width, height, data));

    from_linear_rgb_straight(data);
    multiply_alpha(data);
}

/// Converts a premultiplied sRGB pixmap into premultiplied linear RGB.
fn into_linear_rgb(pixmap: &mut Pixmap) {
    let data = pixmap.data_mut().as_rgba_mut();
    demultiply_alpha(data);
    into_linear_rgb_straight(data);
    multiply_alpha(data);
}

/// Converts a premultiplied linear RGB pixmap back into premultiplied sRGB.
fn into_srgb(pixmap: &mut Pixmap) {
    let data = pixmap.data_mut().as_rgba_mut();
    demultiply_alpha(data);
    from_linear_rgb_straight(data);
    multiply_alpha(data);
}

/// Multiplies provided pixels alpha.
fn multiply_alpha(data: &mut [RGBA8]) {
    for p in data {
        let a = p.a as f32 / 255.0;
        p.b = (p.b as f32 * a + 0.5) as u8;
        p.g = (p.g as f32 * a + 0.5) as u8;
        p.r = (p.r as f32 * a + 0.5) as u8;
    }
}

/// Demultiplies provided pixels alpha.
fn demultiply_alpha(data: &mut [RGBA8]) {
    for p in data {
        let a = p.a as f32 / 255.0;
        p.b = (p.b as f32 / a + 0.5) as u8;
        p.g = (p.g as f32 / a + 0.5) as u8;
        p.r = (p.r as f32 / a + 0.5) as u8;
    }
}

/// Precomputed sRGB to LinearRGB table.
///
/// Since we are storing the result in `u8`, there is no need to compute those
/// values each time. Mainly because it's very expensive.
///
/// ```text
/// if (C_srgb <= 0.04045)
///     C_lin = C_srgb / 12.92;
///  else
///     C_lin = pow((C_srgb + 0.055) / 1.055, 2.4);
/// ```
#[rustfmt::skip]
const SRGB_TO_LINEAR_RGB_TABLE: &[u8; 256] = &[
    0,   0,   0,   0,   0,   0,  0,    1,   1,   1,   1,   1,   1,   1,   1,   1,
    1,   1,   2,   2,   2,   2,  2,    2,   2,   2,   3,   3,   3,   3,   3,   3,
    4,   4,   4,   4,   4,   5,  5,    5,   5,   6,   6,   6,   6,   7,   7,   7,
    8,   8,   8,   8,   9,   9,  9,   10,  10,  10,  11,  11,  12,  12,  12,  13,
    13,  13,  14,  14,  15,  15,  16,  16,  17,  17,  17,  18,  18,  19,  19,  20,
    20,  21,  22,  22,  23,  23,  24,  24,  25,  25,  26,  27,  27,  28,  29,  29,
    30,  30,  31,  32,  32,  33,  34,  35,  35,  36,  37,  37,  38,  39,  40,  41,
    41,  42,  43,  44,  45,  45,  46,  47,  48,  49,  50,  51,  51,  52,  53,  54,
    55,  56,  57,  58,  59,  60,  61,  62,  63,  64,  65,  66,  67,  68,  69,  70,
    71,  72,  73,  74,  76,  77,  78,  79,  80,  81,  82,  84,  85,  86,  87,  88,
    90,  91,  92,  93,  95,  96,  97,  99, 100, 101, 103, 104, 105, 107, 108, 109,
    111, 112, 114, 115, 116, 118, 119, 121, 122, 124, 125, 127, 128, 130, 131, 133,
    134, 136, 138, 139, 141, 142, 144, 146, 147, 149, 151, 152, 154, 156, 157, 159,
    161, 163, 164, 166, 168, 170, 171, 173, 175, 177, 179, 181, 183, 184, 186, 188,
    190, 192, 194, 196, 198, 200, 202, 204, 206, 208, 210, 212, 214, 216, 218, 220,
    222, 224, 226, 229, 231, 233, 235, 237, 239, 242, 244, 246, 248, 250, 253, 255,
];

/// Precomputed LinearRGB to sRGB table.
///
/// ```text
/// if (C_lin <= 0.0031308)
///     C_srgb = C_lin * 12.92;
/// else
///     C_srgb = 1.055 * pow(C_lin, 1.0 / 2.4) - 0.055;
/// ```
#[rustfmt::skip]
const LINEAR_RGB_TO_SRGB_TABLE: &[u8; 256] = &[
    0,  13,  22,  28,  34,  38,  42,  46,  50,  53,  56,  59,  61,  64,  66,  69,
    71,  73,  75,  77,  79,  81,  83,  85,  86,  88,  90,  92,  93,  95,  96,  98,
    99, 101, 102, 104, 105, 106, 108, 109, 110, 112, 113, 114, 115, 117, 118, 119,
    120, 121, 122, 124, 125, 126, 127, 128, 129, 130, 131, 132, 133, 134, 135, 136,
    137, 138, 139, 140, 141, 142, 143, 144, 145, 146, 147, 148, 148, 149, 150, 151,
    152, 153, 154, 155, 155, 156, 157, 158, 159, 159, 160, 161, 162, 163, 163, 164,
    165, 166, 167, 167, 168, 169, 170, 170, 171, 172, 173, 173, 174, 175, 175, 176,
    177, 178, 178, 179, 180, 180, 181, 182, 182, 183, 184, 185, 185, 186, 187, 187,
    188, 189, 189, 190, 190, 191, 192, 192, 193, 194, 194, 195, 196, 196, 197, 197,
    198, 199, 199, 200, 200, 201, 202, 202, 203, 203, 204, 205, 205, 206, 206, 207,
    208, 208, 209, 209, 210, 210, 211, 212, 212, 213, 213, 214, 214, 215, 215, 216,
    216, 217, 218, 218, 219, 219, 220, 220, 221, 221, 222, 222, 223, 223, 224, 224,
    225, 226, 226, 227, 227, 228, 228, 229, 229, 230, 230, 231, 231, 232, 232, 233,
    233, 234, 234, 235, 235, 236, 236, 237, 237, 238, 238, 238, 239, 239, 240, 240,
    241, 241, 242, 242, 243, 243, 244, 244, 245, 245, 246, 246, 246, 247, 247, 248,
    248, 249, 249, 250, 250, 251, 251, 251, 252, 252, 253, 253, 254, 254, 255, 255,
];

/// Converts pixels from sRGB into LinearRGB.
///
/// Provided pixels should have an **unpremultiplied alpha**.
fn into_linear_rgb_straight(data: &mut [RGBA8]) {
    for p in data {
        p.r = SRGB_TO_LINEAR_RGB_TABLE[p.r as usize];
        p.g = SRGB_TO_LINEAR_RGB_TABLE[p.g as usize];
        p.b = SRGB_TO_LINEAR_RGB_TABLE[p.b as usize];
    }
}

/// Converts pixels from LinearRGB into sRGB.
///
/// Provided pixels should have an **unpremultiplied alpha**.
fn from_linear_rgb_straight(data: &mut [RGBA8]) {
    for p in data {
        p.r = LINEAR_RGB_TO_SRGB_TABLE[p.r as usize];
        p.g = LINEAR_RGB_TO_SRGB_TABLE[p.g as usize];
        p.b = LINEAR_RGB_TO_SRGB_TABLE[p.b as usize];
    }
}

#[inline]
fn f64_bound(min: f64, val: f64, max: f64) -> f64 {
    debug_assert!(min.is_finite());
    debug_assert!(max.is_finite());

    if val > max {
        max
    } else if val < min {
        min
    } else {
        val
    }
}

fn num_attr(node: Node, name: &str) -> Option<f64> {
    node.attribute(name).and_then(|v| f64::from_str(v.trim()).ok())
}

/// Parses a whitespace/comma separated number list.
fn num_list(value: &str) -> Vec<f64> {
    value
        .split([',', ' ', '\t', '\n', '\r'])
        .filter(|v| !v.is_empty())
        .map_while(|v| f64::from_str(v).ok())
        .collect()
}
