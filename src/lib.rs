// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
`svgrast` is an SVG rasterization library.

It renders a [static](http://www.w3.org/TR/SVG11/feature#SVG-static)
[SVG Full 1.1](https://www.w3.org/TR/SVG/Overview.html) subset into
a premultiplied RGBA pixmap, aiming for Chromium-compatible output
on common constructs: shapes, paths, text, transforms, gradients,
patterns, images and filter effects.

A render is a pure function of the input bytes and the options.
Nothing is cached between calls, so independent renders can run
on independent threads.

```no_run
let opt = svgrast::Options::default();
let pixmap = svgrast::render(b"<svg width='1' height='1'/>", &opt).unwrap();
assert_eq!(pixmap.data().len(), 4);
```
*/

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::field_reassign_with_default)]
#![allow(clippy::identity_op)]
#![allow(clippy::too_many_arguments)]

pub use tiny_skia;

mod error;
mod filter;
mod geom;
mod image;
mod layout;
mod options;
mod paint_server;
mod pathdata;
mod render;
mod resources;
mod shapes;
mod style;
mod text;
mod units;
mod xmltree;

pub use error::{Error, ErrorKind};
pub use options::{CompatFlags, Options};
pub use resources::external_references;
pub use xmltree::{Attribute, Children, Document, Node, NodeId};

/// Renders an SVG document into a premultiplied RGBA pixmap.
///
/// `data` is an UTF-8 SVG string or gzip-compressed SVGZ data.
///
/// On success the pixmap has the dimensions resolved from the root
/// element, the options and the scale factor. A failed render returns
/// only the error; partial images are never exposed.
pub fn render(data: &[u8], opt: &Options) -> Result<tiny_skia::Pixmap, Error> {
    render_inner(data, opt, true)
}

pub(crate) fn render_inner(
    data: &[u8],
    opt: &Options,
    allow_image_elements: bool,
) -> Result<tiny_skia::Pixmap, Error> {
    let text = input_to_string(data)?;
    let doc = Document::parse(&text)?;

    if doc.root_element().local_name() != "svg" {
        return Err(Error::InvalidDocument(format!(
            "the root element is '{}', not 'svg'",
            doc.root_element().tag_name()
        )));
    }

    resources::check(&doc, opt)?;
    filter::validate(&doc, &opt.compat)?;

    let layout = layout::resolve(doc.root_element(), opt)?;

    let mut pixmap = tiny_skia::Pixmap::new(layout.size.width(), layout.size.height())
        .ok_or_else(|| Error::RenderFailed("failed to allocate the pixmap".to_string()))?;

    if let Some(background) = opt.background {
        pixmap.fill(background);
    }

    let mut ctx = render::Context::new(&doc, opt);
    ctx.allow_image_elements = allow_image_elements;
    render::render_document(&ctx, &layout, &mut pixmap.as_mut());

    Ok(pixmap)
}

/// Accepts plain text or gzip-compressed data.
fn input_to_string(data: &[u8]) -> Result<String, Error> {
    if data.starts_with(&[0x1f, 0x8b]) {
        use std::io::Read;

        let mut decoder = flate2::read::GzDecoder::new(data);
        let mut decoded = String::new();
        decoder
            .read_to_string(&mut decoded)
            .map_err(|_| Error::InvalidDocument("malformed gzip data".to_string()))?;
        Ok(decoded)
    } else {
        std::str::from_utf8(data)
            .map(|text| text.to_string())
            .map_err(|_| Error::InvalidDocument("not an UTF-8 string".to_string()))
    }
}
