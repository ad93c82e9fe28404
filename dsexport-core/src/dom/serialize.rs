use super::arena::{Document, NodeData, NodeId};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

impl Document {
    /// Serializes the children of `id` (or the node itself when
    /// `include_self`) back to HTML.
    pub fn to_html(&self, id: NodeId, include_self: bool) -> String {
        let mut out = String::new();
        if include_self {
            self.write_node(&mut out, id, false);
        } else {
            for child in self.children(id) {
                self.write_node(&mut out, child, false);
            }
        }
        out
    }

    fn write_node(&self, out: &mut String, id: NodeId, raw_text: bool) {
        let Some(node) = self.get(id) else {
            return;
        };
        match &node.data {
            NodeData::Document => {
                for child in self.children(id) {
                    self.write_node(out, child, false);
                }
            }
            NodeData::Doctype { name } => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
            NodeData::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeData::Text(text) if raw_text => out.push_str(text),
            NodeData::Text(text) => out.push_str(&escape_text(text)),
            NodeData::Element { name, attrs, .. } => {
                let tag = name.local.as_ref();
                out.push('<');
                out.push_str(tag);
                for attr in attrs {
                    out.push(' ');
                    out.push_str(attr.name.local.as_ref());
                    out.push_str("=\"");
                    out.push_str(&escape_attr(&attr.value));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag) {
                    return;
                }
                let raw = RAW_TEXT_ELEMENTS.contains(&tag);
                for child in self.children(id) {
                    self.write_node(out, child, raw);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}
