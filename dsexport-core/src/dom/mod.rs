//! Owned document tree for one snapshot of the host page.

mod arena;
mod node;
mod selector;
mod serialize;
mod sink;

pub use arena::{Attribute, Document, NodeData, NodeId};
pub use node::NodeRef;
pub use selector::Locator;
pub use serialize::{escape_attr, escape_text};
pub use sink::parse_html;
