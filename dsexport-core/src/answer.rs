//! Recovers an assistant's final answer as Markdown.
//!
//! The raw markdown kept in structured state is preferred. Without it the
//! answer is rebuilt from the rendered blocks, restoring emphasis, links and
//! TeX sources that the visible text has lost.

use crate::dom::NodeRef;
use crate::locator::{InlineLocators, LocatorProfile};
use crate::structured::{MARKDOWN_KEY, StructuredContentProvider};

/// Outcome of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// The node the content lives in is not there.
    Missing,
    /// Taken verbatim from structured state.
    Structured(String),
    /// Rebuilt from the rendered tree.
    Fallback(String),
}

impl Extracted {
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Missing => None,
            Self::Structured(text) | Self::Fallback(text) => Some(text),
        }
    }
}

pub fn extract_final_answer(
    turn: NodeRef<'_>,
    profile: &LocatorProfile,
    provider: &dyn StructuredContentProvider,
) -> Extracted {
    let Some(container) = turn.select_first(&profile.final_answer) else {
        tracing::debug!(locator = %profile.final_answer, "no answer container");
        return Extracted::Missing;
    };

    if let Some(markdown) = provider.lookup(container, MARKDOWN_KEY) {
        return Extracted::Structured(markdown);
    }

    Extracted::Fallback(render_blocks(container, profile))
}

/// Markdown for the block children of `container`, in document order.
pub(crate) fn render_blocks(container: NodeRef<'_>, profile: &LocatorProfile) -> String {
    let blocks = &profile.blocks;
    let inline = &profile.inline;
    let mut output = String::new();

    for block in container.element_children() {
        if block.matches(&blocks.rule) {
            output.push_str("---\n\n");
        } else if block.matches(&blocks.heading) {
            output.push_str("### ");
            output.push_str(render_inline(block, profile).trim());
            output.push_str("\n\n");
        } else if block.matches(&blocks.display_math) {
            if let Some(tex) = math_source(block, inline) {
                output.push_str(&format!("$${tex}$$\n\n"));
            }
        } else if block.matches(&blocks.code) {
            output.push_str(&render_code_block(block));
        } else if block.matches(&blocks.quote) {
            let mut inner = render_blocks(block, profile);
            if inner.trim().is_empty() {
                inner = render_inline(block, profile);
            }
            for line in inner.trim().lines() {
                output.push_str(if line.is_empty() { ">" } else { "> " });
                output.push_str(line);
                output.push('\n');
            }
            output.push('\n');
        } else if block.matches(&blocks.unordered_list) || block.matches(&blocks.ordered_list) {
            let ordered = block.matches(&blocks.ordered_list);
            let items = block
                .element_children()
                .filter(|item| item.tag_name() == Some("li"));
            for (idx, item) in items.enumerate() {
                if ordered {
                    output.push_str(&format!("{}. ", idx + 1));
                } else {
                    output.push_str("- ");
                }
                output.push_str(render_inline(item, profile).trim());
                output.push('\n');
            }
            output.push('\n');
        } else if block.matches(&blocks.paragraph) {
            output.push_str(&render_inline(block, profile));
            output.push_str("\n\n");
        } else {
            tracing::trace!(tag = ?block.tag_name(), "skipping unrecognised block");
        }
    }

    output
}

/// Markdown for the inline content of `node`.
pub(crate) fn render_inline(node: NodeRef<'_>, profile: &LocatorProfile) -> String {
    let inline = &profile.inline;
    let mut output = String::new();

    for child in node.children() {
        if let Some(text) = child.as_text() {
            output.push_str(text);
            continue;
        }
        if !child.is_element() {
            continue;
        }

        if child.matches(&profile.blocks.display_math) {
            match math_source(child, inline) {
                Some(tex) => output.push_str(&format!("$${tex}$$")),
                None => output.push_str(&child.text_content()),
            }
        } else if child.matches(&inline.math) {
            match math_source(child, inline) {
                Some(tex) => output.push_str(&format!("${tex}$")),
                None => output.push_str(&child.text_content()),
            }
        } else if child.matches(&inline.line_break) {
            output.push('\n');
        } else if child.matches(&inline.bold) {
            output.push_str(&format!("**{}**", render_inline(child, profile)));
        } else if child.matches(&inline.italic) {
            output.push_str(&format!("*{}*", render_inline(child, profile)));
        } else if child.matches(&inline.code) {
            output.push_str(&format!("`{}`", child.text_content()));
        } else if child.matches(&inline.link) {
            let href = child.attr("href").unwrap_or_default();
            output.push_str(&format!("[{}]({href})", render_inline(child, profile)));
        } else {
            output.push_str(&render_inline(child, profile));
        }
    }

    output
}

/// TeX source of a rendered formula, read from its annotation element.
pub(crate) fn math_source(node: NodeRef<'_>, inline: &InlineLocators) -> Option<String> {
    let tex = node.select_first(&inline.math_annotation)?.text_content();
    let tex = tex.trim();
    (!tex.is_empty()).then(|| tex.to_string())
}

fn render_code_block(block: NodeRef<'_>) -> String {
    let pre = if block.tag_name() == Some("pre") {
        Some(block)
    } else {
        block.descendants().find(|n| n.tag_name() == Some("pre"))
    };
    let body = pre.unwrap_or(block);

    let language = std::iter::once(body)
        .chain(body.descendants())
        .flat_map(|n| n.classes().iter())
        .find_map(|class| class.strip_prefix("language-"))
        .unwrap_or_default();

    let code = body.text_content();
    format!("```{language}\n{}\n```\n\n", code.trim_end_matches('\n'))
}
