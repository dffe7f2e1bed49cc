// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! An owned XML element tree, just enough for SVG rendering.
//!
//! The tree is stored as a flat arena in document order.
//! [`Node`] is a cheap copyable handle bound to the [`Document`] lifetime.

use std::collections::HashMap;

mod parse;

/// An XML document.
///
/// Element nodes only. Comments, processing instructions and the DOCTYPE
/// are dropped during parsing; DOCTYPE internal entities are expanded first.
pub struct Document {
    nodes: Vec<NodeData>,
    links: HashMap<String, NodeId>,
}

/// A node identifier inside the document arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(usize);

struct NodeData {
    parent: Option<NodeId>,
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
    children: Option<(NodeId, NodeId)>,
    kind: NodeKind,
}

enum NodeKind {
    Root,
    Element {
        tag: String,
        attributes: Vec<Attribute>,
        text: String,
    },
}

/// An element attribute.
#[derive(Clone, Debug)]
pub struct Attribute {
    /// Attribute name, including an optional namespace prefix, as written.
    pub name: String,
    /// Attribute value with character entities decoded.
    pub value: String,
}

impl Document {
    /// Returns the implicit super-root node.
    pub fn root(&self) -> Node {
        Node { id: NodeId(0), doc: self }
    }

    /// Returns the single top-level element.
    pub fn root_element(&self) -> Node {
        // `parse` guarantees a root element.
        self.root().first_element_child().unwrap()
    }

    /// Returns an element with the given `id` attribute.
    ///
    /// On duplicate ids the first occurrence in document order wins.
    pub fn element_by_id(&self, id: &str) -> Option<Node> {
        let node_id = *self.links.get(id)?;
        Some(Node { id: node_id, doc: self })
    }

    /// Returns an iterator over all elements in document order.
    pub fn descendants(&self) -> impl Iterator<Item = Node<'_>> + '_ {
        (1..self.nodes.len()).map(move |i| Node { id: NodeId(i), doc: self })
    }

    fn get(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    fn get_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0]
    }

    fn append(&mut self, parent_id: NodeId, kind: NodeKind) -> NodeId {
        let new_child_id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            parent: Some(parent_id),
            prev_sibling: None,
            next_sibling: None,
            children: None,
            kind,
        });

        let last_child_id = self.nodes[parent_id.0].children.map(|(_, id)| id);
        self.nodes[new_child_id.0].prev_sibling = last_child_id;

        if let Some(id) = last_child_id {
            self.nodes[id.0].next_sibling = Some(new_child_id);
        }

        self.nodes[parent_id.0].children =
            Some(if let Some((first_child_id, _)) = self.nodes[parent_id.0].children {
                (first_child_id, new_child_id)
            } else {
                (new_child_id, new_child_id)
            });

        new_child_id
    }

    fn append_text(&mut self, id: NodeId, chunk: &str) {
        if let NodeKind::Element { ref mut text, .. } = self.get_mut(id).kind {
            text.push_str(chunk);
        }
    }

    fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        match self.get(id).kind {
            NodeKind::Root => false,
            NodeKind::Element { ref attributes, .. } => {
                attributes.iter().any(|a| a.name == name)
            }
        }
    }

    fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { ref mut attributes, .. } = self.get_mut(id).kind {
            if let Some(attr) = attributes.iter_mut().find(|a| a.name == name) {
                attr.value = value.to_string();
            } else {
                attributes.push(Attribute {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Document({} nodes)", self.nodes.len())
    }
}

/// A reference to a document node.
#[derive(Clone, Copy)]
pub struct Node<'a> {
    id: NodeId,
    doc: &'a Document,
}

impl PartialEq for Node<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.doc, other.doc)
    }
}

impl<'a> Node<'a> {
    /// Returns the node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the owning document.
    pub fn document(&self) -> &'a Document {
        self.doc
    }

    fn data(&self) -> &'a NodeData {
        self.doc.get(self.id)
    }

    /// Returns the tag name as written, including a namespace prefix.
    pub fn tag_name(&self) -> &'a str {
        match self.data().kind {
            NodeKind::Root => "",
            NodeKind::Element { ref tag, .. } => tag,
        }
    }

    /// Returns the tag name with the namespace prefix stripped.
    pub fn local_name(&self) -> &'a str {
        let tag = self.tag_name();
        match tag.find(':') {
            Some(idx) => &tag[idx + 1..],
            None => tag,
        }
    }

    /// Returns an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        match self.data().kind {
            NodeKind::Root => None,
            NodeKind::Element { ref attributes, .. } => attributes
                .iter()
                .find(|a| a.name == name)
                .map(|a| a.value.as_str()),
        }
    }

    /// Returns the `href` attribute, accepting the `xlink:` prefixed spelling.
    pub fn href(&self) -> Option<&'a str> {
        self.attribute("href").or_else(|| self.attribute("xlink:href"))
    }

    /// Returns all attributes.
    pub fn attributes(&self) -> &'a [Attribute] {
        match self.data().kind {
            NodeKind::Root => &[],
            NodeKind::Element { ref attributes, .. } => attributes,
        }
    }

    /// Returns the concatenated text of the direct text children.
    pub fn text(&self) -> &'a str {
        match self.data().kind {
            NodeKind::Root => "",
            NodeKind::Element { ref text, .. } => text,
        }
    }

    /// Returns the parent node, the super-root included.
    pub fn parent(&self) -> Option<Node<'a>> {
        self.data().parent.map(|id| Node { id, doc: self.doc })
    }

    /// Returns the parent element, if any.
    pub fn parent_element(&self) -> Option<Node<'a>> {
        let parent = self.parent()?;
        match parent.data().kind {
            NodeKind::Root => None,
            NodeKind::Element { .. } => Some(parent),
        }
    }

    /// Returns the previous sibling element.
    pub fn prev_sibling(&self) -> Option<Node<'a>> {
        self.data().prev_sibling.map(|id| Node { id, doc: self.doc })
    }

    /// Returns the first child element.
    pub fn first_element_child(&self) -> Option<Node<'a>> {
        self.data()
            .children
            .map(|(id, _)| Node { id, doc: self.doc })
    }

    /// Returns `true` when the node has child elements.
    pub fn has_children(&self) -> bool {
        self.data().children.is_some()
    }

    /// Returns an iterator over the child elements.
    pub fn children(&self) -> Children<'a> {
        Children {
            next: self.first_element_child(),
        }
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Node({} {:?})", self.tag_name(), self.id)
    }
}

/// An iterator over child elements.
#[derive(Clone)]
pub struct Children<'a> {
    next: Option<Node<'a>>,
}

impl<'a> Iterator for Children<'a> {
    type Item = Node<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next.take()?;
        self.next = node
            .data()
            .next_sibling
            .map(|id| Node { id, doc: node.doc });
        Some(node)
    }
}
