use crate::answer::{Extracted, extract_final_answer};
use crate::classify::{NodeKind, classify};
use crate::dom::{Document, NodeRef};
use crate::error::{ExportError, ExtractionWarning, Result};
use crate::locator::LocatorProfile;
use crate::model::{ConversationDocument, Turn};
use crate::structured::StructuredContentProvider;
use crate::thinking::{extract_status_hint, extract_thinking};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequenced {
    pub turns: Vec<Turn>,
    pub warnings: Vec<ExtractionWarning>,
}

/// Walks the conversation container's children in document order and
/// builds one turn per user message or non-empty assistant reply.
pub fn sequence(
    document: &Document,
    profile: &LocatorProfile,
    provider: &dyn StructuredContentProvider,
    thoughts_header: &str,
) -> Result<Sequenced> {
    let container = document
        .select_first(&profile.container)
        .ok_or_else(|| ExportError::ContainerNotFound {
            selector: profile.container.to_string(),
        })?;

    let mut sequenced = Sequenced::default();
    for child in container.element_children() {
        let ordinal = sequenced.turns.len();
        match classify(child, profile) {
            NodeKind::User(text) => sequenced.turns.push(Turn::user(ordinal, text)),
            NodeKind::Assistant => {
                let turn = assistant_turn(
                    child,
                    ordinal,
                    profile,
                    provider,
                    thoughts_header,
                    &mut sequenced.warnings,
                );
                if let Some(turn) = turn {
                    sequenced.turns.push(turn);
                }
            }
            NodeKind::Other => {}
        }
    }

    for warning in &sequenced.warnings {
        tracing::debug!(%warning, "extraction fallback");
    }
    Ok(sequenced)
}

fn assistant_turn(
    node: NodeRef<'_>,
    ordinal: usize,
    profile: &LocatorProfile,
    provider: &dyn StructuredContentProvider,
    thoughts_header: &str,
    warnings: &mut Vec<ExtractionWarning>,
) -> Option<Turn> {
    let scope = node.select_first(&profile.reply_container).unwrap_or(node);

    let status_hint = extract_status_hint(scope, profile);
    let thinking_trace = extract_thinking(scope, profile, provider, thoughts_header).into_text();

    let answer = extract_final_answer(node, profile, provider);
    let locator = profile.final_answer.to_string();
    match &answer {
        Extracted::Missing => warnings.push(ExtractionWarning::ContentNodeMissing { ordinal, locator }),
        Extracted::Fallback(_) => {
            warnings.push(ExtractionWarning::StructuredStateUnavailable { ordinal, locator });
        }
        Extracted::Structured(_) => {}
    }

    Turn::assistant(ordinal, status_hint, thinking_trace, answer.into_text())
}

/// Conversation title, trimmed. A missing title is only a warning.
pub fn extract_title(
    document: &Document,
    profile: &LocatorProfile,
    warnings: &mut Vec<ExtractionWarning>,
) -> Option<String> {
    let title = document
        .select_first(&profile.title)
        .map(|node| node.text_content().trim().to_string())
        .filter(|title| !title.is_empty());
    if title.is_none() {
        warnings.push(ExtractionWarning::TitleMissing {
            locator: profile.title.to_string(),
        });
    }
    title
}

/// Title plus turns, as one snapshot of the page.
pub fn extract_conversation(
    document: &Document,
    profile: &LocatorProfile,
    provider: &dyn StructuredContentProvider,
    thoughts_header: &str,
) -> Result<ConversationDocument> {
    let Sequenced {
        turns,
        mut warnings,
    } = sequence(document, profile, provider, thoughts_header)?;
    let title = extract_title(document, profile, &mut warnings);

    Ok(ConversationDocument {
        title,
        turns,
        warnings,
    })
}
