// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/// List of all errors.
#[derive(Debug)]
pub enum Error {
    /// Malformed XML, a non-`svg` root element or an invalid viewport size.
    ///
    /// Fatal at the document level.
    InvalidDocument(String),

    /// A filter primitive outside the supported set was found
    /// while strict compatibility checks were enabled.
    UnsupportedFeature(String),

    /// A remote URL reference was found while external resources are disabled.
    ///
    /// Carries the offending URL.
    ExternalResourceBlocked(String),

    /// A preflighted external resource could not be loaded.
    ///
    /// Never produced by the renderer itself. Reserved for hosts
    /// that resolve [`crate::external_references`] before rendering.
    ExternalResourceFailed(String),

    /// An internal invariant failure, like a failed pixmap allocation.
    RenderFailed(String),
}

/// A stable error code, suitable for a C-style ABI.
///
/// `None` is the absence of an error and is never carried by [`Error`].
#[allow(missing_docs)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ErrorKind {
    None = 0,
    InvalidDocument = 1,
    UnsupportedFeature = 2,
    ExternalResourceBlocked = 3,
    ExternalResourceFailed = 4,
    RenderFailed = 5,
}

impl Error {
    /// Returns the stable code of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidDocument(_) => ErrorKind::InvalidDocument,
            Error::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            Error::ExternalResourceBlocked(_) => ErrorKind::ExternalResourceBlocked,
            Error::ExternalResourceFailed(_) => ErrorKind::ExternalResourceFailed,
            Error::RenderFailed(_) => ErrorKind::RenderFailed,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidDocument(ref msg) => {
                write!(f, "invalid document: {}", msg)
            }
            Error::UnsupportedFeature(ref msg) => {
                write!(f, "unsupported feature: {}", msg)
            }
            Error::ExternalResourceBlocked(ref url) => {
                write!(f, "external resources are disabled: {}", url)
            }
            Error::ExternalResourceFailed(ref url) => {
                write!(f, "failed to load an external resource: {}", url)
            }
            Error::RenderFailed(ref msg) => {
                write!(f, "rendering failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}
