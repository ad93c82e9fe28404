//! Joins a conversation into the single normalized string every text
//! serializer starts from.

use std::borrow::Cow;
use std::fmt;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::model::{ConversationDocument, TurnBody};

pub const TURN_SEPARATOR: &str = "\n\n---\n\n";

// The interior never holds another opener, so nested pairs resolve
// innermost first.
static INLINE_MATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\\(\s*((?:[^\\\n]|\\[^(\n])*?)\s*\\\)").expect("valid regex")
});
static DISPLAY_MATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\\[((?:[^\\]|\\[^\[])*?)\\\]").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    pub user: String,
    pub assistant: String,
    pub thoughts: String,
}

impl Default for Headers {
    fn default() -> Self {
        Self {
            user: "User".to_string(),
            assistant: "Assistant".to_string(),
            thoughts: "Thought Process".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMathStyle {
    /// `$$tex$$` on one line.
    #[default]
    Inline,
    /// `$$`, the source, `$$` on separate lines.
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalOptions {
    pub headers: Headers,
    pub convert_math: bool,
    pub display_math_style: DisplayMathStyle,
}

impl Default for CanonicalOptions {
    fn default() -> Self {
        Self {
            headers: Headers::default(),
            convert_math: true,
            display_math_style: DisplayMathStyle::Inline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CanonicalString(String);

impl CanonicalString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn canonicalize(document: &ConversationDocument, options: &CanonicalOptions) -> CanonicalString {
    let mut output = String::new();
    if let Some(title) = &document.title {
        output.push_str(&format!("# {title}\n\n"));
    }

    let sections: Vec<String> = document
        .turns
        .iter()
        .map(|turn| {
            let header = match turn.body {
                TurnBody::User { .. } => &options.headers.user,
                TurnBody::Assistant { .. } => &options.headers.assistant,
            };
            format!("## {header}\n\n{}", turn.text())
        })
        .collect();
    output.push_str(&sections.join(TURN_SEPARATOR));

    if options.convert_math {
        output = fix_math_delimiters(&output, options.display_math_style);
    }
    CanonicalString(output)
}

/// Rewrites `\( x \)` to `$x$` and `\[ x \]` to `$$x$$`.
///
/// Inline math never spans lines; display math may. Passes repeat until
/// nothing matches, so nested or unbalanced delimiters that pair up only
/// after an earlier rewrite are handled here and a second call is a no-op.
pub fn fix_math_delimiters(text: &str, style: DisplayMathStyle) -> String {
    let mut current = text.to_string();
    while let Some(next) = fix_pass(&current, style) {
        current = next;
    }
    current
}

/// One rewrite of every delimiter pair, or `None` when nothing matched.
fn fix_pass(text: &str, style: DisplayMathStyle) -> Option<String> {
    let inline = INLINE_MATH_RE.replace_all(text, |caps: &Captures<'_>| format!("${}$", &caps[1]));
    let display = DISPLAY_MATH_RE.replace_all(&inline, |caps: &Captures<'_>| {
        let tex = caps[1].trim();
        match style {
            DisplayMathStyle::Inline => format!("$${tex}$$"),
            DisplayMathStyle::Block => format!("$$\n{tex}\n$$"),
        }
    });

    if matches!(inline, Cow::Borrowed(_)) && matches!(display, Cow::Borrowed(_)) {
        return None;
    }
    Some(display.into_owned())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{
        CanonicalOptions, DisplayMathStyle, Headers, canonicalize, fix_math_delimiters,
    };
    use crate::model::{ConversationDocument, Turn};

    fn hello() -> ConversationDocument {
        ConversationDocument {
            title: None,
            turns: vec![
                Turn::user(0, "Hello"),
                Turn::assistant(1, None, None, Some("Hi there\n\n".into())).expect("turn"),
            ],
            warnings: Vec::new(),
        }
    }

    #[test]
    fn hello_hi_there() {
        assert_eq!(
            canonicalize(&hello(), &CanonicalOptions::default()).as_str(),
            "## User\n\nHello\n\n---\n\n## Assistant\n\nHi there"
        );
    }

    #[test]
    fn title_and_custom_headers() {
        let mut doc = hello();
        doc.title = Some("Greeting".into());
        let options = CanonicalOptions {
            headers: Headers {
                user: "Me".into(),
                assistant: "Bot".into(),
                ..Headers::default()
            },
            ..CanonicalOptions::default()
        };
        assert_eq!(
            canonicalize(&doc, &options).as_str(),
            "# Greeting\n\n## Me\n\nHello\n\n---\n\n## Bot\n\nHi there"
        );
    }

    #[test]
    fn empty_document_is_empty() {
        let canonical = canonicalize(&ConversationDocument::default(), &CanonicalOptions::default());
        assert!(canonical.is_empty());
    }

    #[test]
    fn math_delimiters_are_rewritten() {
        assert_eq!(
            fix_math_delimiters(r"Area \( \pi r^2 \) and \[ E = mc^2 \]", DisplayMathStyle::Inline),
            r"Area $\pi r^2$ and $$E = mc^2$$"
        );
        assert_eq!(
            fix_math_delimiters("\\[\n  a + b\n\\]", DisplayMathStyle::Block),
            "$$\na + b\n$$"
        );
    }

    #[test]
    fn inline_math_does_not_cross_lines() {
        let text = "\\( a\nb \\)";
        assert_eq!(fix_math_delimiters(text, DisplayMathStyle::Inline), text);
    }

    #[test]
    fn fixing_is_idempotent() {
        let inputs = [
            r"\(x\) then \[\frac{1}{2}\] and \(y \) ",
            r"\( a \( b \) c \)",
            r"\[ a \[ b \] c \]",
            r"stray \) closer and \(x\)",
            "\\[ never closed\nwith \\(x\\)",
            r"\( a \[ b \) c \]",
            r"\(\(\)\)\)",
        ];
        for style in [DisplayMathStyle::Inline, DisplayMathStyle::Block] {
            for input in inputs {
                let once = fix_math_delimiters(input, style);
                assert_eq!(fix_math_delimiters(&once, style), once, "input: {input}");
            }
        }
    }

    #[test]
    fn nested_delimiters_resolve_inside_out() {
        assert_eq!(
            fix_math_delimiters(r"\( a \( b \) c \)", DisplayMathStyle::Inline),
            "$a $b$ c$"
        );
        assert_eq!(
            fix_math_delimiters(r"\[ a \[ b \] c \]", DisplayMathStyle::Inline),
            "$$a $$b$$ c$$"
        );
        assert_eq!(
            fix_math_delimiters(r"\[ open only", DisplayMathStyle::Block),
            r"\[ open only"
        );
    }

    #[test]
    fn conversion_can_be_disabled() {
        let doc = ConversationDocument {
            title: None,
            turns: vec![Turn::user(0, r"\(x\)")],
            warnings: Vec::new(),
        };
        let options = CanonicalOptions {
            convert_math: false,
            ..CanonicalOptions::default()
        };
        assert_eq!(canonicalize(&doc, &options).as_str(), "## User\n\n\\(x\\)");
    }
}
