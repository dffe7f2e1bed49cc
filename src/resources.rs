// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::xmltree::Document;
use crate::{Error, Options};

/// Returns every remote reference of the document in document order.
///
/// A host that fetches resources itself can preflight these
/// before calling [`render`](crate::render).
pub fn external_references(doc: &Document) -> Vec<String> {
    doc.descendants()
        .filter_map(|node| node.href())
        .filter(|href| is_remote(href))
        .map(|href| href.to_string())
        .collect()
}

/// Enforces the external-resource policy.
///
/// Fragments, `data:` URLs and local paths are always allowed.
pub(crate) fn check(doc: &Document, opt: &Options) -> Result<(), Error> {
    if opt.enable_external_resources {
        return Ok(());
    }

    for node in doc.descendants() {
        if let Some(href) = node.href() {
            if is_remote(href) {
                return Err(Error::ExternalResourceBlocked(href.to_string()));
            }
        }
    }

    Ok(())
}

fn is_remote(href: &str) -> bool {
    let href = href.trim();
    let scheme_len = match href.find(':') {
        Some(v) => v,
        None => return false,
    };
    let scheme = &href[..scheme_len];
    scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(svg: &str) -> Document {
        Document::parse(svg).unwrap()
    }

    #[test]
    fn remote_href_is_blocked() {
        let doc = doc("<svg><image href='https://example.com/a.png'/></svg>");
        let err = check(&doc, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::ExternalResourceBlocked(ref url)
            if url == "https://example.com/a.png"));
    }

    #[test]
    fn xlink_href_is_also_checked() {
        let doc = doc("<svg><image xlink:href='HTTP://e.com/a.png'/></svg>");
        assert!(check(&doc, &Options::default()).is_err());
    }

    #[test]
    fn local_references_pass() {
        let doc = doc(
            "<svg>\
               <use href='#frag'/>\
               <image href='data:image/png;base64,aaaa'/>\
               <image href='local/path.png'/>\
             </svg>",
        );
        assert!(check(&doc, &Options::default()).is_ok());
        assert!(external_references(&doc).is_empty());
    }

    #[test]
    fn opt_in_allows_remote() {
        let doc = doc("<svg><image href='http://example.com/a.png'/></svg>");
        let mut opt = Options::default();
        opt.enable_external_resources = true;
        assert!(check(&doc, &opt).is_ok());
        assert_eq!(external_references(&doc).len(), 1);
    }
}
