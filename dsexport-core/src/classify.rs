use crate::dom::NodeRef;
use crate::locator::LocatorProfile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    User(String),
    Assistant,
    Other,
}

/// Decides what a direct child of the conversation container holds.
pub fn classify(node: NodeRef<'_>, profile: &LocatorProfile) -> NodeKind {
    if let Some(text) = user_message(node, profile) {
        return NodeKind::User(text);
    }
    if node.matches(&profile.assistant_message) {
        return NodeKind::Assistant;
    }
    NodeKind::Other
}

/// Text of the user message inside `node`, if any.
///
/// Only the content run (the message element's first child) is read: the
/// message element can also hold edit/copy chrome. Whitespace-only text
/// counts as no message, since chrome can match before content hydrates.
pub fn user_message(node: NodeRef<'_>, profile: &LocatorProfile) -> Option<String> {
    let message = node.select_first(&profile.user_message)?;
    let text = message.first_child()?.text_content();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
