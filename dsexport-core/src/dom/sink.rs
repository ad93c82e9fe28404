//! html5ever `TreeSink` that builds a [`Document`].

use std::borrow::Cow;
use std::cell::RefCell;

use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::driver::ParseOpts;
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute as HtmlAttribute, QualName, parse_document};

use super::arena::{Attribute, Document, NodeData, NodeId};

/// Parses an HTML page leniently, the way a browser would.
pub fn parse_html(html: &str) -> Document {
    parse_document(DocumentSink::default(), ParseOpts::default())
        .from_utf8()
        .one(html.as_bytes())
        .into_document()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle(NodeId);

/// `TreeSink` methods take `&self`, so the document sits behind a `RefCell`.
#[derive(Default)]
pub struct DocumentSink {
    doc: RefCell<Document>,
}

impl DocumentSink {
    pub fn into_document(self) -> Document {
        self.doc.into_inner()
    }
}

fn convert_attrs(attrs: Vec<HtmlAttribute>) -> Vec<Attribute> {
    attrs
        .into_iter()
        .map(|a| Attribute {
            name: a.name,
            value: a.value.to_string(),
        })
        .collect()
}

impl TreeSink for DocumentSink {
    type Handle = Handle;
    type Output = Self;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self
    }

    fn parse_error(&self, _msg: Cow<'static, str>) {}

    fn get_document(&self) -> Self::Handle {
        Handle(self.doc.borrow().root_id())
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        static EMPTY: QualName = QualName {
            prefix: None,
            ns: html5ever::ns!(),
            local: html5ever::local_name!(""),
        };

        let doc = self.doc.borrow();
        match doc.get(target.0).map(|n| &n.data) {
            Some(NodeData::Element { name, .. }) => {
                // SAFETY: element names are never mutated after creation and
                // the tree builder uses the reference before the next sink
                // call that could grow the arena.
                unsafe { std::mem::transmute::<&QualName, &'a QualName>(name) }
            }
            _ => &EMPTY,
        }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<HtmlAttribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        Handle(
            self.doc
                .borrow_mut()
                .create_element(name, convert_attrs(attrs)),
        )
    }

    fn create_comment(&self, text: StrTendril) -> Self::Handle {
        Handle(self.doc.borrow_mut().create_comment(text.to_string()))
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        Handle(self.doc.borrow_mut().create_comment(String::new()))
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let mut doc = self.doc.borrow_mut();
        match child {
            NodeOrText::AppendNode(node) => doc.append(parent.0, node.0),
            NodeOrText::AppendText(text) => doc.append_text(parent.0, &text),
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        let parent = self.doc.borrow().get(element.0).map(|n| n.parent);
        match parent {
            Some(parent) if parent.is_some() => self.append(&Handle(parent), child),
            _ => self.append(prev_element, child),
        }
    }

    fn append_doctype_to_document(
        &self,
        name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
        let mut doc = self.doc.borrow_mut();
        let root = doc.root_id();
        let doctype = doc.create_doctype(name.to_string());
        doc.append(root, doctype);
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        *target
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        x.0 == y.0
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        let mut doc = self.doc.borrow_mut();
        let node = match new_node {
            NodeOrText::AppendNode(node) => node.0,
            NodeOrText::AppendText(text) => doc.create_text(text.to_string()),
        };
        doc.insert_before(sibling.0, node);
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<HtmlAttribute>) {
        self.doc
            .borrow_mut()
            .add_attrs_if_missing(target.0, convert_attrs(attrs));
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        self.doc.borrow_mut().detach(target.0);
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        self.doc
            .borrow_mut()
            .reparent_children(node.0, new_parent.0);
    }
}

#[cfg(test)]
mod tests {
    use super::parse_html;

    #[test]
    fn parses_nested_markup() {
        let doc = parse_html(r#"<div class="chat"><p>Hello <b>you</b></p></div>"#);
        let div = doc
            .descendants(doc.root_id())
            .find(|id| doc.element_name(*id).is_some_and(|n| n.as_ref() == "div"))
            .expect("div");

        assert_eq!(doc.element_classes(div), ["chat"]);
        let p = doc.children(div).next().expect("p");
        assert!(doc.element_name(p).is_some_and(|n| n.as_ref() == "p"));
        assert_eq!(doc.children(p).count(), 2);
    }

    #[test]
    fn tolerates_broken_markup() {
        let doc = parse_html("<div><p>open<div>still parsed");
        assert!(doc.len() > 4);
    }
}
