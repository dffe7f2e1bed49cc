// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::str::FromStr;

use svgtypes::LengthUnit as Unit;
use tiny_skia::{IntSize, NonZeroRect, Size};

use crate::geom::{parse_aspect_ratio, ViewBox};
use crate::units::{self, DPI};
use crate::xmltree::Node;
use crate::{Error, Options};

/// The SVG default viewport.
const DEFAULT_SIZE: (f32, f32) = (300.0, 150.0);

/// The resolved document layout.
#[derive(Clone, Copy, Debug)]
pub struct Layout {
    /// Final pixmap size in pixels, the scale factor applied.
    pub size: IntSize,
    /// Viewport size in user units, before scaling.
    pub base: Size,
    /// The root viewBox. Synthesized from the viewport when absent.
    pub view_box: ViewBox,
}

/// Resolves the output dimensions from the root element.
pub fn resolve(root: Node, opt: &Options) -> Result<Layout, Error> {
    let view_box_rect = root
        .attribute("viewBox")
        .and_then(|v| svgtypes::ViewBox::from_str(v).ok())
        .and_then(|vb| {
            NonZeroRect::from_xywh(vb.x as f32, vb.y as f32, vb.w as f32, vb.h as f32)
        });

    let fallback_width = if opt.width > 0 {
        opt.width as f32
    } else if let Some(vb) = view_box_rect {
        vb.width()
    } else {
        DEFAULT_SIZE.0
    };
    let fallback_height = if opt.height > 0 {
        opt.height as f32
    } else if let Some(vb) = view_box_rect {
        vb.height()
    } else {
        DEFAULT_SIZE.1
    };

    let width = resolve_root_length(root, "width", fallback_width, opt);
    let height = resolve_root_length(root, "height", fallback_height, opt);

    let base = Size::from_wh(width, height)
        .ok_or_else(|| Error::InvalidDocument("invalid viewport size".to_string()))?;

    let pixel_width = (width * opt.scale).trunc() as i64;
    let pixel_height = (height * opt.scale).trunc() as i64;
    if pixel_width < 1 || pixel_height < 1 {
        return Err(Error::InvalidDocument(format!(
            "zero pixel size: {}x{}",
            pixel_width, pixel_height
        )));
    }
    let size = IntSize::from_wh(pixel_width as u32, pixel_height as u32)
        .ok_or_else(|| Error::InvalidDocument("invalid pixel size".to_string()))?;

    let rect = match view_box_rect {
        Some(rect) => rect,
        None => NonZeroRect::from_xywh(0.0, 0.0, width, height)
            .ok_or_else(|| Error::InvalidDocument("invalid viewport size".to_string()))?,
    };

    Ok(Layout {
        size,
        base,
        view_box: ViewBox {
            rect,
            aspect: parse_aspect_ratio(root.attribute("preserveAspectRatio")),
        },
    })
}

/// Resolves a root `width`/`height` attribute against the fallback basis.
fn resolve_root_length(root: Node, name: &str, fallback: f32, opt: &Options) -> f32 {
    let length = match root.attribute(name).and_then(units::parse_length) {
        Some(v) => v,
        None => return fallback,
    };

    let n = length.number as f32;
    match length.unit {
        Unit::None | Unit::Px => n,
        Unit::Em => n * opt.font_size,
        Unit::Ex => n * opt.font_size / 2.0,
        Unit::In => n * DPI,
        Unit::Cm => n * DPI / 2.54,
        Unit::Mm => n * DPI / 25.4,
        Unit::Pt => n * DPI / 72.0,
        Unit::Pc => n * DPI / 6.0,
        Unit::Percent => fallback * n / 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xmltree::Document;

    fn layout(svg: &str, opt: &Options) -> Result<Layout, Error> {
        let doc = Document::parse(svg).unwrap();
        resolve(doc.root_element(), opt)
    }

    #[test]
    fn explicit_size() {
        let l = layout("<svg width='40' height='30'/>", &Options::default()).unwrap();
        assert_eq!(l.size.width(), 40);
        assert_eq!(l.size.height(), 30);
        // viewBox is synthesized.
        assert_eq!(l.view_box.rect.width(), 40.0);
        assert_eq!(l.view_box.rect.height(), 30.0);
    }

    #[test]
    fn size_from_view_box() {
        let l = layout("<svg viewBox='0 0 120 60'/>", &Options::default()).unwrap();
        assert_eq!(l.size.width(), 120);
        assert_eq!(l.size.height(), 60);
    }

    #[test]
    fn options_take_precedence_over_view_box() {
        let mut opt = Options::default();
        opt.width = 50;
        opt.height = 25;
        let l = layout("<svg viewBox='0 0 120 60'/>", &opt).unwrap();
        assert_eq!(l.size.width(), 50);
        assert_eq!(l.size.height(), 25);
    }

    #[test]
    fn default_size() {
        let l = layout("<svg/>", &Options::default()).unwrap();
        assert_eq!(l.size.width(), 300);
        assert_eq!(l.size.height(), 150);
    }

    #[test]
    fn percent_resolves_against_fallback() {
        let mut opt = Options::default();
        opt.width = 200;
        opt.height = 100;
        let l = layout("<svg width='50%' height='50%'/>", &opt).unwrap();
        assert_eq!(l.size.width(), 100);
        assert_eq!(l.size.height(), 50);
    }

    #[test]
    fn physical_units() {
        let l = layout("<svg width='1in' height='72pt'/>", &Options::default()).unwrap();
        assert_eq!(l.size.width(), 96);
        assert_eq!(l.size.height(), 96);
    }

    #[test]
    fn scale_multiplies_pixels_only() {
        let mut opt = Options::default();
        opt.scale = 2.5;
        let l = layout("<svg width='40' height='30'/>", &opt).unwrap();
        assert_eq!(l.size.width(), 100);
        assert_eq!(l.size.height(), 75);
        assert_eq!(l.base.width(), 40.0);
        assert_eq!(l.view_box.rect.width(), 40.0);
    }

    #[test]
    fn zero_size_is_an_error() {
        assert!(matches!(
            layout("<svg width='0' height='10'/>", &Options::default()),
            Err(Error::InvalidDocument(_))
        ));
        assert!(matches!(
            layout("<svg width='-5' height='10'/>", &Options::default()),
            Err(Error::InvalidDocument(_))
        ));
    }
}
