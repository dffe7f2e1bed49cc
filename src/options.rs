// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/// Rendering options.
#[derive(Clone, Debug)]
pub struct Options {
    /// A fallback viewport width in pixels.
    ///
    /// Used when the root element has no usable `width` attribute
    /// and as the basis for percent widths. `0` means "infer from the document".
    ///
    /// Default: 0
    pub width: u32,

    /// A fallback viewport height in pixels.
    ///
    /// Default: 0
    pub height: u32,

    /// An output scale factor.
    ///
    /// Multiplies the final pixmap dimensions only.
    /// User-space coordinates are unaffected.
    ///
    /// Default: 1.0
    pub scale: f32,

    /// A background color the pixmap is cleared to before painting.
    ///
    /// `None` means no clear, i.e. a transparent background.
    ///
    /// Default: None
    pub background: Option<tiny_skia::Color>,

    /// The default font family, used when no `font-family` was set.
    ///
    /// Default: Times New Roman
    pub font_family: String,

    /// The default font size, used when no `font-size` was set.
    ///
    /// Default: 12
    pub font_size: f32,

    /// Whether `http`/`https` references are allowed at all.
    ///
    /// When disabled, a document with a remote reference fails with
    /// [`Error::ExternalResourceBlocked`](crate::Error::ExternalResourceBlocked).
    ///
    /// Default: false
    pub enable_external_resources: bool,

    /// Compatibility checks behavior.
    pub compat: CompatFlags,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            width: 0,
            height: 0,
            scale: 1.0,
            background: None,
            font_family: "Times New Roman".to_string(),
            font_size: 12.0,
            enable_external_resources: false,
            compat: CompatFlags::default(),
        }
    }
}

/// Compatibility flags for the advisory filter validator.
#[derive(Clone, Copy, Debug)]
pub struct CompatFlags {
    /// Report unsupported filter primitives as errors.
    ///
    /// Default: false
    pub strict_mode: bool,

    /// Tolerate unsupported filter primitives even in strict mode.
    ///
    /// Default: false
    pub allow_unsupported_filter_fallback: bool,
}

impl Default for CompatFlags {
    fn default() -> Self {
        CompatFlags {
            strict_mode: false,
            allow_unsupported_filter_fallback: false,
        }
    }
}

impl CompatFlags {
    /// Whether an unsupported filter primitive should fail validation.
    pub(crate) fn rejects_unsupported_filters(&self) -> bool {
        self.strict_mode && !self.allow_unsupported_filter_fallback
    }
}
