use std::fmt;

use serde::Serialize;

use crate::error::ExtractionWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum TurnBody {
    User {
        text: String,
    },
    Assistant {
        status_hint: Option<String>,
        thinking_trace: Option<String>,
        final_answer: Option<String>,
    },
}

/// One conversation entry, numbered in traversal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub ordinal: usize,
    #[serde(flatten)]
    pub body: TurnBody,
}

impl Turn {
    pub fn user(ordinal: usize, text: impl Into<String>) -> Self {
        Self {
            ordinal,
            body: TurnBody::User { text: text.into() },
        }
    }

    /// Builds an assistant turn, or `None` when every piece is empty.
    pub fn assistant(
        ordinal: usize,
        status_hint: Option<String>,
        thinking_trace: Option<String>,
        final_answer: Option<String>,
    ) -> Option<Self> {
        let turn = Self {
            ordinal,
            body: TurnBody::Assistant {
                status_hint,
                thinking_trace,
                final_answer,
            },
        };
        (!turn.text().is_empty()).then_some(turn)
    }

    pub fn role(&self) -> Role {
        match self.body {
            TurnBody::User { .. } => Role::User,
            TurnBody::Assistant { .. } => Role::Assistant,
        }
    }

    /// Body text as it appears under the turn header: for assistants the
    /// status hint, trace and answer in that order, blank-line separated.
    pub fn text(&self) -> String {
        match &self.body {
            TurnBody::User { text } => text.trim().to_string(),
            TurnBody::Assistant {
                status_hint,
                thinking_trace,
                final_answer,
            } => {
                let mut output = String::new();
                for piece in [status_hint, thinking_trace, final_answer]
                    .into_iter()
                    .flatten()
                {
                    output.push_str(piece);
                    output.push_str("\n\n");
                }
                output.trim().to_string()
            }
        }
    }
}

/// Snapshot of one conversation, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationDocument {
    pub title: Option<String>,
    pub turns: Vec<Turn>,
    pub warnings: Vec<ExtractionWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArtifactKind {
    Markdown,
    PrintHtml,
    Png,
}

impl ArtifactKind {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Markdown => "text/markdown",
            Self::PrintHtml => "text/html",
            Self::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::PrintHtml => "html",
            Self::Png => "png",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Markdown => write!(f, "markdown"),
            Self::PrintHtml => write!(f, "print html"),
            Self::Png => write!(f, "png"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub kind: ArtifactKind,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    pub fn mime(&self) -> &'static str {
        self.kind.mime()
    }
}
