// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::str::FromStr;

use svgtypes::{Length, LengthListParser, LengthUnit as Unit};
use tiny_skia::Size;

use crate::xmltree::Node;

/// CSS pixels per inch.
pub const DPI: f32 = 96.0;

/// The axis a percent length resolves against.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum LengthBase {
    /// The viewport width.
    Width,
    /// The viewport height.
    Height,
    /// The normalized viewport diagonal, `sqrt((w² + h²) / 2)`.
    Diagonal,
}

/// Parses a `<length>` attribute value.
///
/// `q` (quarter-millimeters) is handled here since the grammar parser
/// does not know the unit.
pub fn parse_length(value: &str) -> Option<Length> {
    let value = value.trim();
    if let Some(number) = value
        .strip_suffix(['q', 'Q'])
        .and_then(|v| f64::from_str(v.trim_end()).ok())
    {
        return Some(Length::new(number * 2.54 / 101.6, Unit::Cm));
    }

    Length::from_str(value).ok()
}

/// Converts a length into CSS pixels at 96 DPI.
pub fn resolve_length(length: Length, base: LengthBase, viewport: Size, font_size: f32) -> f32 {
    let n = length.number as f32;
    match length.unit {
        Unit::None | Unit::Px => n,
        Unit::Em => n * font_size,
        Unit::Ex => n * font_size / 2.0,
        Unit::In => n * DPI,
        Unit::Cm => n * DPI / 2.54,
        Unit::Mm => n * DPI / 25.4,
        Unit::Pt => n * DPI / 72.0,
        Unit::Pc => n * DPI / 6.0,
        Unit::Percent => {
            let basis = match base {
                LengthBase::Width => viewport.width(),
                LengthBase::Height => viewport.height(),
                LengthBase::Diagonal => {
                    let (w, h) = (viewport.width(), viewport.height());
                    ((w * w + h * h) / 2.0).sqrt()
                }
            };
            basis * n / 100.0
        }
    }
}

/// Resolves an element length attribute, falling back to `default`.
pub fn resolve_attr_length(
    node: Node,
    name: &str,
    base: LengthBase,
    viewport: Size,
    font_size: f32,
    default: f32,
) -> f32 {
    match node.attribute(name).and_then(parse_length) {
        Some(length) => resolve_length(length, base, viewport, font_size),
        None => default,
    }
}

/// Parses a list of lengths.
///
/// Parsing stops at the first invalid entry.
pub fn resolve_length_list(
    value: &str,
    base: LengthBase,
    viewport: Size,
    font_size: f32,
) -> Vec<f32> {
    let mut list = Vec::new();
    for length in LengthListParser::from(value) {
        match length {
            Ok(length) => list.push(resolve_length(length, base, viewport, font_size)),
            Err(_) => break,
        }
    }
    list
}

/// Resolves a `font-size` value against the parent font size.
///
/// Accepts lengths, percents and the CSS named sizes.
pub fn resolve_font_size(value: &str, parent_font_size: f32) -> Option<f32> {
    if let Some(length) = parse_length(value) {
        let n = length.number as f32;
        let size = match length.unit {
            Unit::None | Unit::Px => n,
            Unit::Em => n * parent_font_size,
            Unit::Ex => n * parent_font_size / 2.0,
            Unit::In => n * DPI,
            Unit::Cm => n * DPI / 2.54,
            Unit::Mm => n * DPI / 25.4,
            Unit::Pt => n * DPI / 72.0,
            Unit::Pc => n * DPI / 6.0,
            // Relative to the parent font size, not to the viewport.
            Unit::Percent => n * parent_font_size / 100.0,
        };
        return if size > 0.0 { Some(size) } else { None };
    }

    let factor = match value {
        "xx-small" => -3,
        "x-small" => -2,
        "small" => -1,
        "medium" => 0,
        "large" => 1,
        "x-large" => 2,
        "xx-large" => 3,
        "smaller" => -1,
        "larger" => 1,
        _ => return None,
    };

    // 'On a computer screen a scaling factor of 1.2 is suggested
    // between adjacent indexes.'
    Some(parent_font_size * 1.2f32.powi(factor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Size {
        Size::from_wh(40.0, 30.0).unwrap()
    }

    #[test]
    fn absolute_units() {
        let resolve = |v| {
            resolve_length(parse_length(v).unwrap(), LengthBase::Width, viewport(), 16.0)
        };
        assert_eq!(resolve("10"), 10.0);
        assert_eq!(resolve("10px"), 10.0);
        assert_eq!(resolve("1in"), 96.0);
        assert_eq!(resolve("72pt"), 96.0);
        assert_eq!(resolve("6pc"), 96.0);
        assert_eq!(resolve("2.54cm"), 96.0);
        assert_eq!(resolve("25.4mm"), 96.0);
        assert!((resolve("101.6q") - 96.0).abs() < 1e-3);
        assert_eq!(resolve("2em"), 32.0);
        assert_eq!(resolve("2ex"), 16.0);
    }

    #[test]
    fn percent_bases() {
        let len = parse_length("50%").unwrap();
        assert_eq!(resolve_length(len, LengthBase::Width, viewport(), 16.0), 20.0);
        assert_eq!(resolve_length(len, LengthBase::Height, viewport(), 16.0), 15.0);
        // sqrt((40² + 30²) / 2) = sqrt(1250)
        let diag = resolve_length(len, LengthBase::Diagonal, viewport(), 16.0);
        assert!((diag - 1250f32.sqrt() / 2.0).abs() < 1e-4);
    }

    #[test]
    fn equal_axes_make_all_bases_equal() {
        let vp = Size::from_wh(100.0, 100.0).unwrap();
        let len = parse_length("10%").unwrap();
        let w = resolve_length(len, LengthBase::Width, vp, 16.0);
        let h = resolve_length(len, LengthBase::Height, vp, 16.0);
        let d = resolve_length(len, LengthBase::Diagonal, vp, 16.0);
        assert!((w - h).abs() < 1e-4);
        assert!((w - d).abs() < 1e-4);
    }

    #[test]
    fn named_font_sizes() {
        assert_eq!(resolve_font_size("medium", 10.0), Some(10.0));
        assert_eq!(resolve_font_size("larger", 10.0), Some(12.0));
        assert!((resolve_font_size("xx-small", 10.0).unwrap() - 10.0 / 1.728).abs() < 1e-4);
        assert_eq!(resolve_font_size("150%", 10.0), Some(15.0));
        assert_eq!(resolve_font_size("bogus", 10.0), None);
        assert_eq!(resolve_font_size("0", 10.0), None);
    }
}
