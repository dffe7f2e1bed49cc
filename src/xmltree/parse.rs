// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use crate::Error;

use super::{Document, Node, NodeId, NodeKind};


/// The number of fixed-point entity substitution passes.
///
/// Bounds recursive entity definitions, so a "billion laughs" document
/// expands a finite amount and then simply stops matching.
const MAX_ENTITY_PASSES: usize = 8;

impl Document {
    /// Parses a document from a string.
    ///
    /// DOCTYPE internal entities are expanded, character entities decoded,
    /// comments/PI/declarations skipped. An unclosed tail is force-closed.
    pub fn parse(text: &str) -> Result<Document, Error> {
        parse(text)
    }
}

fn parse(text: &str) -> Result<Document, Error> {
    if text.trim().is_empty() {
        return Err(Error::InvalidDocument("the document is empty".to_string()));
    }

    let text = expand_entities(text);

    let mut doc = Document {
        nodes: Vec::new(),
        links: HashMap::new(),
    };
    doc.nodes.push(super::NodeData {
        parent: None,
        prev_sibling: None,
        next_sibling: None,
        children: None,
        kind: NodeKind::Root,
    });

    tokenize(&text, &mut doc)?;

    if doc.root().first_element_child().is_none() {
        return Err(Error::InvalidDocument("no root element".to_string()));
    }

    apply_css(&mut doc);

    // Collect all elements with an `id` attribute. First occurrence wins.
    let mut links = HashMap::new();
    for node in doc.descendants() {
        if let Some(id) = node.attribute("id") {
            if !id.is_empty() {
                links.entry(id.to_string()).or_insert(node.id());
            }
        }
    }
    doc.links = links;

    Ok(doc)
}

/// Collects `<!ENTITY name "value">` declarations from every DOCTYPE,
/// removes the DOCTYPEs and expands `&name;` references.
fn expand_entities(text: &str) -> String {
    let mut entities = HashMap::new();
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("<!DOCTYPE") {
        let decl_len = match doctype_len(&rest[start..]) {
            Some(v) => v,
            None => break,
        };

        let decl = &rest[start..start + decl_len];
        collect_entities(decl, &mut entities);

        out.push_str(&rest[..start]);
        rest = &rest[start + decl_len..];
    }
    out.push_str(rest);

    if entities.is_empty() {
        return out;
    }

    for _ in 0..MAX_ENTITY_PASSES {
        let mut expanded = String::with_capacity(out.len());
        let mut changed = false;
        let mut tail = out.as_str();

        while let Some(amp) = tail.find('&') {
            expanded.push_str(&tail[..amp]);
            let after = &tail[amp + 1..];
            match after.find(';') {
                Some(semi) if entities.contains_key(&after[..semi]) => {
                    expanded.push_str(&entities[&after[..semi]]);
                    changed = true;
                    tail = &after[semi + 1..];
                }
                _ => {
                    expanded.push('&');
                    tail = after;
                }
            }
        }
        expanded.push_str(tail);

        out = expanded;
        if !changed {
            break;
        }
    }

    out
}

/// Returns the byte length of a `<!DOCTYPE …>` declaration, honoring
/// an internal subset in brackets and quoted literals.
fn doctype_len(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote = None;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '[' => depth += 1,
                ']' => depth -= 1,
                '>' if depth <= 0 => return Some(i + 1),
                _ => {}
            },
        }
    }
    None
}

fn collect_entities(decl: &str, entities: &mut HashMap<String, String>) {
    let mut rest = decl;
    while let Some(start) = rest.find("<!ENTITY") {
        rest = &rest[start + "<!ENTITY".len()..];

        let name_start = match rest.find(|c: char| !c.is_whitespace()) {
            Some(v) => v,
            None => return,
        };
        rest = &rest[name_start..];

        // Parameter entities are not supported.
        if rest.starts_with('%') {
            continue;
        }

        let name_len = rest
            .find(|c: char| c.is_whitespace())
            .unwrap_or(rest.len());
        let name = &rest[..name_len];
        rest = &rest[name_len..];

        let quote_start = match rest.find(|c| c == '"' || c == '\'') {
            Some(v) => v,
            None => return,
        };
        let quote = rest.as_bytes()[quote_start] as char;
        rest = &rest[quote_start + 1..];

        let value_len = match rest.find(quote) {
            Some(v) => v,
            None => return,
        };

        entities
            .entry(name.to_string())
            .or_insert_with(|| rest[..value_len].to_string());
        rest = &rest[value_len + 1..];
    }
}

/// Decodes XML character entities into UTF-8.
///
/// Unknown references are kept as-is.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = match after.find(';') {
            // Entity names are short. A distant semicolon is unrelated.
            Some(v) if v <= 10 => v,
            _ => {
                out.push('&');
                rest = after;
                continue;
            }
        };

        let name = &after[..semi];
        let decoded = match name {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ if name.starts_with("#x") || name.starts_with("#X") => u32::from_str_radix(&name[2..], 16)
                .ok()
                .and_then(char::from_u32),
            _ if name.starts_with('#') => name[1..]
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32),
            _ => None,
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn tokenize(text: &str, doc: &mut Document) -> Result<(), Error> {
    let bytes = text.as_bytes();
    let mut pos = 0;
    let mut stack: Vec<NodeId> = vec![NodeId(0)];

    while pos < bytes.len() {
        if bytes[pos] != b'<' {
            let end = text[pos..]
                .find('<')
                .map(|i| pos + i)
                .unwrap_or(bytes.len());
            let chunk = &text[pos..end];
            let parent = *stack.last().unwrap();
            if parent != NodeId(0) {
                let decoded = decode_entities(chunk);
                doc.append_text(parent, &decoded);
            }
            pos = end;
            continue;
        }

        let tag = &text[pos..];
        if tag.starts_with("<!--") {
            pos = match tag.find("-->") {
                Some(i) => pos + i + 3,
                None => bytes.len(),
            };
        } else if tag.starts_with("<![CDATA[") {
            let end = match tag.find("]]>") {
                Some(i) => i,
                None => tag.len(),
            };
            let parent = *stack.last().unwrap();
            if parent != NodeId(0) {
                doc.append_text(parent, &tag["<![CDATA[".len()..end]);
            }
            pos += (end + 3).min(tag.len());
        } else if tag.starts_with("<?") {
            pos = match tag.find("?>") {
                Some(i) => pos + i + 2,
                None => bytes.len(),
            };
        } else if tag.starts_with("<!") {
            // A stray declaration. The DOCTYPE was already removed.
            pos = match doctype_len(tag) {
                Some(len) => pos + len,
                None => bytes.len(),
            };
        } else if tag.starts_with("</") {
            let end = match tag.find('>') {
                Some(i) => i,
                None => {
                    return Err(Error::InvalidDocument(
                        "unterminated closing tag".to_string(),
                    ))
                }
            };
            let name = tag[2..end].trim();

            let top = *stack.last().unwrap();
            if top == NodeId(0) {
                return Err(Error::InvalidDocument(format!(
                    "unexpected closing tag '{}'",
                    name
                )));
            }
            let top_name = match doc.get(top).kind {
                NodeKind::Root => "",
                NodeKind::Element { ref tag, .. } => tag.as_str(),
            };
            if top_name != name {
                return Err(Error::InvalidDocument(format!(
                    "expected '{}' to be closed, got '{}'",
                    top_name, name
                )));
            }
            stack.pop();
            pos += end + 1;
        } else {
            let consumed = parse_open_tag(tag, doc, &mut stack)?;
            pos += consumed;
        }
    }

    // Force-close whatever is still open. The best-effort recovery keeps
    // a truncated document renderable.
    stack.truncate(1);

    Ok(())
}

/// Parses `<name attr="v" …>` or `<name …/>` starting at `tag`.
///
/// Returns the consumed byte length.
fn parse_open_tag(tag: &str, doc: &mut Document, stack: &mut Vec<NodeId>) -> Result<usize, Error> {
    debug_assert!(tag.starts_with('<'));

    let rest = &tag[1..];
    let name_len = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    let name = &rest[..name_len];
    if name.is_empty() {
        return Err(Error::InvalidDocument("invalid tag name".to_string()));
    }

    let parent = *stack.last().unwrap();
    if parent == NodeId(0) && doc.get(NodeId(0)).children.is_some() {
        return Err(Error::InvalidDocument(
            "multiple top-level elements".to_string(),
        ));
    }

    let node_id = doc.append(
        parent,
        NodeKind::Element {
            tag: name.to_string(),
            attributes: Vec::new(),
            text: String::new(),
        },
    );

    let mut rest = &rest[name_len..];
    let mut consumed = 1 + name_len;
    let mut self_closing = false;

    loop {
        let skipped = rest
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(rest.len());
        rest = &rest[skipped..];
        consumed += skipped;

        if rest.is_empty() {
            return Err(Error::InvalidDocument(format!(
                "unterminated tag '{}'",
                name
            )));
        }

        if rest.starts_with("/>") {
            consumed += 2;
            self_closing = true;
            break;
        }
        if rest.starts_with('>') {
            consumed += 1;
            break;
        }
        if rest.starts_with('/') {
            // A stray slash. Skip it.
            rest = &rest[1..];
            consumed += 1;
            continue;
        }

        let (attr_len, attr) = parse_attribute(rest)?;
        if let Some((attr_name, attr_value)) = attr {
            // Keys are unique per element. The first occurrence wins.
            if !doc.has_attribute(node_id, attr_name) {
                let value = decode_entities(attr_value);
                doc.set_attribute(node_id, attr_name, &value);
            }
        }
        rest = &rest[attr_len..];
        consumed += attr_len;
    }

    if !self_closing {
        stack.push(node_id);
    }

    Ok(consumed)
}

/// Parses one `name="value"` pair. Returns the consumed length
/// and the name/value pair, or `None` for a valueless attribute.
fn parse_attribute(text: &str) -> Result<(usize, Option<(&str, &str)>), Error> {
    let name_len = text
        .find(|c: char| c.is_whitespace() || c == '=' || c == '>' || c == '/')
        .unwrap_or(text.len());
    if name_len == 0 {
        return Err(Error::InvalidDocument("malformed attribute".to_string()));
    }
    let name = &text[..name_len];

    let mut rest = &text[name_len..];
    let mut consumed = name_len;

    let skipped = rest
        .find(|c: char| !c.is_whitespace())
        .unwrap_or(rest.len());
    rest = &rest[skipped..];
    consumed += skipped;

    if !rest.starts_with('=') {
        // Not well-formed XML, but harmless. Treat as valueless.
        return Ok((consumed, None));
    }
    rest = &rest[1..];
    consumed += 1;

    let skipped = rest
        .find(|c: char| !c.is_whitespace())
        .unwrap_or(rest.len());
    rest = &rest[skipped..];
    consumed += skipped;

    let quote = match rest.chars().next() {
        Some(q @ ('"' | '\'')) => q,
        _ => {
            // An unquoted value. Read until whitespace or the tag end.
            let len = rest
                .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
                .unwrap_or(rest.len());
            return Ok((consumed + len, Some((name, &rest[..len]))));
        }
    };

    let value_start = 1;
    let value_len = match rest[value_start..].find(quote) {
        Some(v) => v,
        None => {
            return Err(Error::InvalidDocument(format!(
                "unterminated value of the '{}' attribute",
                name
            )))
        }
    };

    let value = &rest[value_start..value_start + value_len];
    consumed += value_start + value_len + 1;
    Ok((consumed, Some((name, value))))
}

/// Applies `<style>` element rules and then `style` attributes
/// to the element attribute maps.
///
/// After this pass plain attribute lookup observes the
/// attribute < CSS < inline-style precedence.
fn apply_css(doc: &mut Document) {
    let mut pending: Vec<(NodeId, String, String)> = Vec::new();

    {
        let mut sheet = simplecss::StyleSheet::new();
        let texts: Vec<&str> = doc
            .descendants()
            .filter(|n| n.local_name() == "style")
            .filter(|n| matches!(n.attribute("type"), None | Some("text/css")))
            .map(|n| n.text())
            .collect();
        for text in &texts {
            sheet.parse_more(text);
        }

        for node in doc.descendants() {
            for rule in &sheet.rules {
                if rule.selector.matches(&CssElement(node)) {
                    for declaration in &rule.declarations {
                        pending.push((
                            node.id(),
                            declaration.name.to_string(),
                            declaration.value.to_string(),
                        ));
                    }
                }
            }

            if let Some(style) = node.attribute("style") {
                for declaration in simplecss::DeclarationTokenizer::from(style) {
                    pending.push((
                        node.id(),
                        declaration.name.to_string(),
                        declaration.value.to_string(),
                    ));
                }
            }
        }
    }

    for (id, name, value) in pending {
        if name != "style" {
            doc.set_attribute(id, &name, &value);
        }
    }
}

struct CssElement<'a>(Node<'a>);

impl simplecss::Element for CssElement<'_> {
    fn parent_element(&self) -> Option<Self> {
        self.0.parent_element().map(CssElement)
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        self.0.prev_sibling().map(CssElement)
    }

    fn has_local_name(&self, local_name: &str) -> bool {
        self.0.local_name() == local_name
    }

    fn attribute_matches(&self, local_name: &str, operator: simplecss::AttributeOperator) -> bool {
        match self.0.attribute(local_name) {
            Some(value) => operator.matches(value),
            None => false,
        }
    }

    fn pseudo_class_matches(&self, class: simplecss::PseudoClass) -> bool {
        match class {
            simplecss::PseudoClass::FirstChild => self.prev_sibling_element().is_none(),
            // The document is static, the rest cannot match.
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_document() {
        let doc = Document::parse(
            "<svg width='10'><g><rect width=\"5\" height=\"5\"/></g></svg>",
        )
        .unwrap();
        let root = doc.root_element();
        assert_eq!(root.tag_name(), "svg");
        assert_eq!(root.attribute("width"), Some("10"));

        let g = root.children().next().unwrap();
        assert_eq!(g.tag_name(), "g");
        let rect = g.children().next().unwrap();
        assert_eq!(rect.tag_name(), "rect");
        assert_eq!(rect.attribute("height"), Some("5"));
    }

    #[test]
    fn empty_document() {
        assert!(matches!(
            Document::parse("  \n "),
            Err(Error::InvalidDocument(_))
        ));
    }

    #[test]
    fn no_root_element() {
        assert!(matches!(
            Document::parse("<!-- nothing here -->"),
            Err(Error::InvalidDocument(_))
        ));
    }

    #[test]
    fn mismatched_closing_tag() {
        assert!(matches!(
            Document::parse("<svg><g></svg></g>"),
            Err(Error::InvalidDocument(_))
        ));
    }

    #[test]
    fn multiple_top_level_elements() {
        assert!(matches!(
            Document::parse("<svg/><svg/>"),
            Err(Error::InvalidDocument(_))
        ));
    }

    #[test]
    fn unclosed_tail_is_recovered() {
        let doc = Document::parse("<svg><g><rect width='1'").unwrap();
        let g = doc.root_element().children().next().unwrap();
        assert_eq!(g.tag_name(), "g");
    }

    #[test]
    fn text_and_entities() {
        let doc = Document::parse("<svg><text>a &lt;b&gt; &amp; &#65;&#x42;</text></svg>").unwrap();
        let text = doc.root_element().children().next().unwrap();
        assert_eq!(text.text(), "a <b> & AB");
    }

    #[test]
    fn entities_in_attributes() {
        let doc = Document::parse("<svg note='&quot;q&apos; &#x2014;'/>").unwrap();
        assert_eq!(doc.root_element().attribute("note"), Some("\"q' \u{2014}"));
    }

    #[test]
    fn unknown_entity_is_kept() {
        let doc = Document::parse("<svg><text>&nope; &unterminated</text></svg>").unwrap();
        let text = doc.root_element().children().next().unwrap();
        assert_eq!(text.text(), "&nope; &unterminated");
    }

    #[test]
    fn doctype_entities() {
        let doc = Document::parse(
            "<!DOCTYPE svg [<!ENTITY red \"#ff0000\"><!ENTITY r '4'>]>\
             <svg><circle fill=\"&red;\" r=\"&r;\"/></svg>",
        )
        .unwrap();
        let circle = doc.root_element().children().next().unwrap();
        assert_eq!(circle.attribute("fill"), Some("#ff0000"));
        assert_eq!(circle.attribute("r"), Some("4"));
    }

    #[test]
    fn nested_entities() {
        let doc = Document::parse(
            "<!DOCTYPE svg [<!ENTITY a \"&b;&b;\"><!ENTITY b \"x\">]>\
             <svg id=\"&a;\"/>",
        )
        .unwrap();
        assert_eq!(doc.root_element().attribute("id"), Some("xx"));
    }

    #[test]
    fn recursive_entities_terminate() {
        // Expansion stops after a fixed number of passes.
        let res = Document::parse(
            "<!DOCTYPE svg [<!ENTITY a \"&b;&b;\"><!ENTITY b \"&a;&a;\">]>\
             <svg note=\"&a;\"/>",
        );
        assert!(res.is_ok());
    }

    #[test]
    fn duplicate_id_first_wins() {
        let doc =
            Document::parse("<svg><rect id='a' x='1'/><circle id='a' r='2'/></svg>").unwrap();
        assert_eq!(doc.element_by_id("a").unwrap().tag_name(), "rect");
    }

    #[test]
    fn duplicate_attribute_first_wins() {
        let doc = Document::parse("<svg width='1' width='2'/>").unwrap();
        assert_eq!(doc.root_element().attribute("width"), Some("1"));
    }

    #[test]
    fn css_and_inline_style() {
        let doc = Document::parse(
            "<svg>\
               <style>rect { fill: #00ff00; stroke: blue }</style>\
               <rect/>\
               <rect style='fill: #0000ff'/>\
             </svg>",
        )
        .unwrap();
        let mut rects = doc
            .root_element()
            .children()
            .filter(|n| n.tag_name() == "rect");
        let plain = rects.next().unwrap();
        assert_eq!(plain.attribute("fill"), Some("#00ff00"));
        assert_eq!(plain.attribute("stroke"), Some("blue"));
        // The inline style overrides the stylesheet.
        let styled = rects.next().unwrap();
        assert_eq!(styled.attribute("fill"), Some("#0000ff"));
    }

    #[test]
    fn comments_and_pi_are_skipped() {
        let doc = Document::parse(
            "<?xml version=\"1.0\"?><!-- a --><svg><!-- <rect/> --><g/></svg>",
        )
        .unwrap();
        assert_eq!(doc.root_element().children().count(), 1);
    }

    #[test]
    fn namespace_prefix_is_kept() {
        let doc = Document::parse("<svg xmlns:xlink='x'><use xlink:href='#a'/></svg>").unwrap();
        let use_node = doc.root_element().children().next().unwrap();
        assert_eq!(use_node.href(), Some("#a"));
    }
}
