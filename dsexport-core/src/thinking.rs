use crate::answer::{Extracted, math_source};
use crate::dom::NodeRef;
use crate::locator::LocatorProfile;
use crate::structured::{CONTENT_KEY, StructuredContentProvider, TEXT_KEY};

/// Recovers the reasoning trace as a blockquote under `### {header}`.
///
/// Traces are optional: a scope without a thinking chain yields
/// [`Extracted::Missing`] and callers record nothing for it.
pub fn extract_thinking(
    scope: NodeRef<'_>,
    profile: &LocatorProfile,
    provider: &dyn StructuredContentProvider,
    header: &str,
) -> Extracted {
    let Some(chain) = scope.select_first(&profile.thinking_chain) else {
        return Extracted::Missing;
    };

    if let Some(content) = provider.lookup(chain, CONTENT_KEY) {
        let quoted = content.split('\n').collect::<Vec<_>>().join("\n> ");
        return Extracted::Structured(format!("### {header}\n\n> {quoted}"));
    }

    let mut lines = Vec::new();
    collect_lines(chain, profile, provider, &mut lines);
    if lines.is_empty() {
        tracing::debug!(locator = %profile.thinking_chain, "thinking chain has no readable lines");
        return Extracted::Missing;
    }

    Extracted::Fallback(format!("### {header}\n\n{}", lines.join("\n>\n")))
}

fn collect_lines(
    node: NodeRef<'_>,
    profile: &LocatorProfile,
    provider: &dyn StructuredContentProvider,
    lines: &mut Vec<String>,
) {
    for child in node.element_children() {
        if child.matches(&profile.blocks.paragraph) {
            let text = provider
                .own(child, TEXT_KEY)
                .or_else(|| provider.own(child, CONTENT_KEY))
                .unwrap_or_else(|| child.text_content());
            let text = text.trim();
            if !text.is_empty() {
                lines.push(format!("> {text}"));
            }
        } else if child.matches(&profile.blocks.display_math) {
            if let Some(tex) = math_source(child, &profile.inline) {
                lines.push(format!("> $${tex}$$"));
            }
        } else {
            // Layout wrappers around the paragraphs.
            collect_lines(child, profile, provider, lines);
        }
    }
}

/// Short status line such as "Thought for 12 seconds", rendered bold.
pub fn extract_status_hint(scope: NodeRef<'_>, profile: &LocatorProfile) -> Option<String> {
    let hint = scope.select_first(&profile.status_hint)?.text_content();
    let hint = hint.trim();
    (!hint.is_empty()).then(|| format!("**{hint}**"))
}
