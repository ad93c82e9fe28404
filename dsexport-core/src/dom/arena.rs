//! Arena-backed document tree.
//!
//! Nodes live in one vector and link to each other by index. The tree is
//! built once by the html5ever sink and read by the extraction pipeline;
//! the only mutations after parsing happen on clones made with
//! [`Document::clone_subtree`].

use html5ever::{LocalName, Namespace, QualName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_some(self) -> bool {
        self.0 != u32::MAX
    }

    pub fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

#[derive(Debug, Clone)]
pub enum NodeData {
    Document,
    Element {
        name: QualName,
        attrs: Vec<Attribute>,
        /// Split `class` attribute, kept in sync with `attrs`.
        classes: Vec<String>,
    },
    Text(String),
    Comment(String),
    Doctype {
        name: String,
    },
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: QualName,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub data: NodeData,
    pub parent: NodeId,
    pub first_child: NodeId,
    pub last_child: NodeId,
    pub prev_sibling: NodeId,
    pub next_sibling: NodeId,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId::NONE,
        };
        doc.root = doc.alloc(Node::new(NodeData::Document));
        doc
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX - 1));
        self.nodes.push(node);
        id
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn create_element(&mut self, name: QualName, attrs: Vec<Attribute>) -> NodeId {
        let classes = class_list(&attrs);
        self.alloc(Node::new(NodeData::Element {
            name,
            attrs,
            classes,
        }))
    }

    pub fn create_text(&mut self, text: String) -> NodeId {
        self.alloc(Node::new(NodeData::Text(text)))
    }

    pub fn create_comment(&mut self, text: String) -> NodeId {
        self.alloc(Node::new(NodeData::Comment(text)))
    }

    pub fn create_doctype(&mut self, name: String) -> NodeId {
        self.alloc(Node::new(NodeData::Doctype { name }))
    }

    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        let last_child = self.get(parent).map_or(NodeId::NONE, |n| n.last_child);

        if let Some(child_node) = self.get_mut(child) {
            child_node.parent = parent;
            child_node.prev_sibling = last_child;
            child_node.next_sibling = NodeId::NONE;
        }

        if let Some(last_node) = self.get_mut(last_child) {
            last_node.next_sibling = child;
        }

        if let Some(parent_node) = self.get_mut(parent) {
            if parent_node.first_child.is_none() {
                parent_node.first_child = child;
            }
            parent_node.last_child = child;
        }
    }

    pub fn insert_before(&mut self, sibling: NodeId, new_node: NodeId) {
        let (parent, prev) = self
            .get(sibling)
            .map_or((NodeId::NONE, NodeId::NONE), |n| (n.parent, n.prev_sibling));

        if let Some(new) = self.get_mut(new_node) {
            new.parent = parent;
            new.prev_sibling = prev;
            new.next_sibling = sibling;
        }

        if let Some(sib) = self.get_mut(sibling) {
            sib.prev_sibling = new_node;
        }

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = new_node;
            }
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = new_node;
        }
    }

    /// Appends text, merging into the last child when it is already a text node.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        let last_child = self.get(parent).map_or(NodeId::NONE, |n| n.last_child);

        if let Some(last) = self.get_mut(last_child)
            && let NodeData::Text(existing) = &mut last.data
        {
            existing.push_str(text);
            return;
        }

        let text_node = self.create_text(text.to_string());
        self.append(parent, text_node);
    }

    /// Unlinks a node from its parent. The node and its subtree stay in the
    /// arena but are no longer reachable from the root.
    pub fn detach(&mut self, target: NodeId) {
        let Some((parent, prev, next)) = self
            .get(target)
            .map(|n| (n.parent, n.prev_sibling, n.next_sibling))
        else {
            return;
        };

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = next;
            }
        } else if let Some(p) = self.get_mut(parent) {
            p.first_child = next;
        }

        if next.is_some() {
            if let Some(n) = self.get_mut(next) {
                n.prev_sibling = prev;
            }
        } else if let Some(p) = self.get_mut(parent) {
            p.last_child = prev;
        }

        if let Some(node) = self.get_mut(target) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
    }

    pub fn reparent_children(&mut self, from: NodeId, to: NodeId) {
        let children: Vec<_> = self.children(from).collect();
        for child in &children {
            self.detach(*child);
        }
        for child in children {
            self.append(to, child);
        }
    }

    /// Sets an attribute on an element, replacing any existing value.
    pub fn set_attr(&mut self, id: NodeId, attr_name: &str, value: &str) {
        let Some(node) = self.get_mut(id) else {
            return;
        };
        let NodeData::Element { attrs, classes, .. } = &mut node.data else {
            return;
        };

        match attrs.iter_mut().find(|a| a.name.local.as_ref() == attr_name) {
            Some(attr) => attr.value = value.to_string(),
            None => attrs.push(Attribute {
                name: QualName::new(None, Namespace::from(""), LocalName::from(attr_name)),
                value: value.to_string(),
            }),
        }
        if attr_name == "class" {
            *classes = class_list(attrs);
        }
    }

    /// Adds attributes that are not present yet.
    pub fn add_attrs_if_missing(&mut self, id: NodeId, new_attrs: Vec<Attribute>) {
        let Some(node) = self.get_mut(id) else {
            return;
        };
        if let NodeData::Element { attrs, classes, .. } = &mut node.data {
            for attr in new_attrs {
                if !attrs.iter().any(|a| a.name == attr.name) {
                    attrs.push(attr);
                }
            }
            *classes = class_list(attrs);
        }
    }

    pub fn children(&self, parent: NodeId) -> Children<'_> {
        Children {
            doc: self,
            current: self.get(parent).map_or(NodeId::NONE, |n| n.first_child),
        }
    }

    /// Pre-order walk over the descendants of `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.children(id).collect();
        stack.reverse();
        Descendants { doc: self, stack }
    }

    /// Deep-copies the subtree rooted at `id` into a fresh document whose
    /// root has the copy as its only child.
    pub fn clone_subtree(&self, id: NodeId) -> Document {
        let mut copy = Document::new();
        let root = copy.root_id();
        self.copy_into(&mut copy, id, root);
        copy
    }

    fn copy_into(&self, target: &mut Document, source: NodeId, parent: NodeId) {
        let Some(node) = self.get(source) else {
            return;
        };
        let new_id = match &node.data {
            NodeData::Document => parent,
            data => {
                let new_id = target.alloc(Node::new(data.clone()));
                target.append(parent, new_id);
                new_id
            }
        };
        for child in self.children(source) {
            self.copy_into(target, child, new_id);
        }
    }

    pub fn element_name(&self, id: NodeId) -> Option<&LocalName> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element { name, .. } => Some(&name.local),
            _ => None,
        })
    }

    pub fn element_namespace(&self, id: NodeId) -> Option<&Namespace> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element { name, .. } => Some(&name.ns),
            _ => None,
        })
    }

    pub fn attrs(&self, id: NodeId) -> &[Attribute] {
        self.get(id)
            .and_then(|n| match &n.data {
                NodeData::Element { attrs, .. } => Some(attrs.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn get_attr(&self, id: NodeId, attr_name: &str) -> Option<&str> {
        self.attrs(id)
            .iter()
            .find(|a| a.name.local.as_ref() == attr_name)
            .map(|a| a.value.as_str())
    }

    pub fn element_classes(&self, id: NodeId) -> &[String] {
        self.get(id)
            .and_then(|n| match &n.data {
                NodeData::Element { classes, .. } => Some(classes.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|n| matches!(n.data, NodeData::Element { .. }))
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }
}

fn class_list(attrs: &[Attribute]) -> Vec<String> {
    attrs
        .iter()
        .find(|a| a.name.local.as_ref() == "class")
        .map(|a| a.value.split_whitespace().map(ToString::to_string).collect())
        .unwrap_or_default()
}

pub struct Children<'a> {
    doc: &'a Document,
    current: NodeId,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        self.current = self.doc.get(id).map_or(NodeId::NONE, |n| n.next_sibling);
        Some(id)
    }
}

pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let first = self.stack.len();
        self.stack.extend(self.doc.children(id));
        self.stack[first..].reverse();
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use html5ever::ns;

    use super::*;

    fn qname(local: &str) -> QualName {
        QualName::new(None, ns!(html), LocalName::from(local))
    }

    fn attr(name: &str, value: &str) -> Attribute {
        Attribute {
            name: qname(name),
            value: value.to_string(),
        }
    }

    #[test]
    fn append_keeps_child_order() {
        let mut doc = Document::new();
        let parent = doc.create_element(qname("div"), vec![]);
        let first = doc.create_element(qname("p"), vec![]);
        let second = doc.create_element(qname("p"), vec![]);
        doc.append(doc.root_id(), parent);
        doc.append(parent, first);
        doc.append(parent, second);

        let children: Vec<_> = doc.children(parent).collect();
        assert_eq!(children, vec![first, second]);
    }

    #[test]
    fn adjacent_text_is_merged() {
        let mut doc = Document::new();
        let p = doc.create_element(qname("p"), vec![]);
        doc.append(doc.root_id(), p);
        doc.append_text(p, "Hello, ");
        doc.append_text(p, "World!");

        let children: Vec<_> = doc.children(p).collect();
        assert_eq!(children.len(), 1);
        assert_eq!(doc.text(children[0]), Some("Hello, World!"));
    }

    #[test]
    fn descendants_walk_in_document_order() {
        let mut doc = Document::new();
        let outer = doc.create_element(qname("div"), vec![]);
        let a = doc.create_element(qname("a"), vec![]);
        let b = doc.create_element(qname("b"), vec![]);
        let c = doc.create_element(qname("i"), vec![]);
        doc.append(doc.root_id(), outer);
        doc.append(outer, a);
        doc.append(a, b);
        doc.append(outer, c);

        let order: Vec<_> = doc.descendants(outer).collect();
        assert_eq!(order, vec![a, b, c]);
    }

    #[test]
    fn detach_relinks_siblings() {
        let mut doc = Document::new();
        let parent = doc.create_element(qname("div"), vec![]);
        let first = doc.create_element(qname("p"), vec![]);
        let middle = doc.create_element(qname("button"), vec![]);
        let last = doc.create_element(qname("p"), vec![]);
        doc.append(doc.root_id(), parent);
        doc.append(parent, first);
        doc.append(parent, middle);
        doc.append(parent, last);

        doc.detach(middle);
        let children: Vec<_> = doc.children(parent).collect();
        assert_eq!(children, vec![first, last]);
    }

    #[test]
    fn clone_subtree_is_independent() {
        let mut doc = Document::new();
        let div = doc.create_element(qname("div"), vec![attr("class", "chat wide")]);
        doc.append(doc.root_id(), div);
        doc.append_text(div, "hi");

        let mut copy = doc.clone_subtree(div);
        let copied_div = copy.children(copy.root_id()).next().expect("copied root");
        copy.set_attr(copied_div, "class", "clone");

        assert_eq!(doc.element_classes(div), ["chat", "wide"]);
        assert_eq!(copy.element_classes(copied_div), ["clone"]);
        let text = copy.children(copied_div).next().expect("text");
        assert_eq!(copy.text(text), Some("hi"));
    }
}
