use std::fmt;

use super::arena::{Document, NodeData, NodeId};
use super::selector::Locator;

/// Borrowed handle to one node of a [`Document`].
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("tag", &self.tag_name())
            .field("classes", &self.classes())
            .finish()
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.id == other.id
    }
}

impl Eq for NodeRef<'_> {}

impl<'a> NodeRef<'a> {
    pub fn new(doc: &'a Document, id: NodeId) -> Self {
        Self { doc, id }
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn is_element(&self) -> bool {
        self.doc.is_element(self.id)
    }

    pub fn tag_name(&self) -> Option<&'a str> {
        self.doc.element_name(self.id).map(|name| &**name)
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.doc.get_attr(self.id, name)
    }

    pub fn classes(&self) -> &'a [String] {
        self.doc.element_classes(self.id)
    }

    /// Own text when this is a text node.
    pub fn as_text(&self) -> Option<&'a str> {
        self.doc.text(self.id)
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        let parent = self.doc.get(self.id)?.parent;
        parent.is_some().then(|| Self::new(self.doc, parent))
    }

    pub fn parent_element(&self) -> Option<NodeRef<'a>> {
        self.parent().filter(NodeRef::is_element)
    }

    /// Element ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = NodeRef<'a>> + use<'a> {
        std::iter::successors(self.parent_element(), NodeRef::parent_element)
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + use<'a> {
        let doc = self.doc;
        doc.children(self.id).map(move |id| Self::new(doc, id))
    }

    pub fn element_children(&self) -> impl Iterator<Item = NodeRef<'a>> + use<'a> {
        self.children().filter(NodeRef::is_element)
    }

    pub fn first_child(&self) -> Option<NodeRef<'a>> {
        self.children().next()
    }

    pub fn descendants(&self) -> impl Iterator<Item = NodeRef<'a>> + use<'a> {
        let doc = self.doc;
        doc.descendants(self.id).map(move |id| Self::new(doc, id))
    }

    /// Concatenated text of every text node below (or at) this node.
    pub fn text_content(&self) -> String {
        if let Some(text) = self.as_text() {
            return text.to_string();
        }
        let mut out = String::new();
        for node in self.descendants() {
            if let Some(NodeData::Text(text)) = self.doc.get(node.id).map(|n| &n.data) {
                out.push_str(text);
            }
        }
        out
    }

    pub fn matches(&self, locator: &Locator) -> bool {
        self.is_element() && locator.matches(*self)
    }

    /// First descendant matching `locator`, in document order.
    pub fn select_first(&self, locator: &Locator) -> Option<NodeRef<'a>> {
        self.descendants().find(|node| node.matches(locator))
    }

    pub fn select_all(&self, locator: &Locator) -> Vec<NodeRef<'a>> {
        self.descendants()
            .filter(|node| node.matches(locator))
            .collect()
    }
}

impl Document {
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef::new(self, self.root_id())
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef::new(self, id)
    }

    pub fn select_first(&self, locator: &Locator) -> Option<NodeRef<'_>> {
        self.root().select_first(locator)
    }
}
