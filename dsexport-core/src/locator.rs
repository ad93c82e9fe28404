//! Versioned locator profiles.
//!
//! The host page's class names change between releases, so every selector
//! the pipeline uses lives here as data. A profile is identified by its
//! `version` string; extra profiles can be loaded from a JSON file.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::dom::Locator;
use crate::error::{ExportError, Result};

pub const DEFAULT_PROFILE: &str = "deepseek-2025.03";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct LocatorProfile {
    pub version: String,
    pub container: Locator,
    pub user_message: Locator,
    pub assistant_message: Locator,
    pub reply_container: Locator,
    pub status_hint: Locator,
    pub thinking_chain: Locator,
    pub final_answer: Locator,
    pub title: Locator,
    pub blocks: BlockLocators,
    pub inline: InlineLocators,
    pub image: ImageLocators,
}

/// Block-level kinds recognised inside an answer or a thinking chain.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct BlockLocators {
    pub paragraph: Locator,
    pub heading: Locator,
    pub display_math: Locator,
    pub rule: Locator,
    pub code: Locator,
    pub quote: Locator,
    pub unordered_list: Locator,
    pub ordered_list: Locator,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct InlineLocators {
    pub math: Locator,
    pub math_annotation: Locator,
    pub bold: Locator,
    pub italic: Locator,
    pub link: Locator,
    pub code: Locator,
    pub line_break: Locator,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ImageLocators {
    /// Interactive chrome removed from the image clone.
    pub strip: Vec<Locator>,
    pub math_display: Locator,
}

#[derive(Debug, Deserialize)]
struct ProfileFile {
    profiles: Vec<LocatorProfile>,
}

fn loc(source: &str) -> Locator {
    Locator::parse(source).expect("valid built-in locator")
}

impl LocatorProfile {
    /// Class signature of the chat page as of early 2025.
    pub fn deepseek_2025() -> Self {
        Self {
            version: DEFAULT_PROFILE.to_string(),
            container: loc(".dad65929"),
            user_message: loc("._9663006 > .fbb737a4"),
            assistant_message: loc("._4f9bf79"),
            reply_container: loc("._43c05b5"),
            status_hint: loc("._58a6d71._19db599"),
            thinking_chain: loc(".e1675d8b"),
            final_answer: loc("div.ds-markdown.ds-markdown--block"),
            title: loc(".d8ed659a"),
            blocks: BlockLocators::html_defaults(),
            inline: InlineLocators::html_defaults(),
            image: ImageLocators {
                strip: vec![
                    loc("button"),
                    loc("input"),
                    loc(".ds-message-feedback-container"),
                    loc(".eb23581b.dfa60d66"),
                ],
                math_display: loc(".katex-display"),
            },
        }
    }

    pub fn builtin() -> Vec<Self> {
        vec![Self::deepseek_2025()]
    }
}

impl BlockLocators {
    fn html_defaults() -> Self {
        Self {
            paragraph: loc("p, .ds-markdown-paragraph"),
            heading: loc("h1, h2, h3, h4, h5, h6"),
            display_math: loc(".katex-display"),
            rule: loc("hr"),
            code: loc("pre, .md-code-block"),
            quote: loc("blockquote"),
            unordered_list: loc("ul"),
            ordered_list: loc("ol"),
        }
    }
}

impl InlineLocators {
    fn html_defaults() -> Self {
        Self {
            math: loc(".katex"),
            math_annotation: loc(r#"annotation[encoding="application/x-tex"]"#),
            bold: loc("strong, b"),
            italic: loc("em, i"),
            link: loc("a[href]"),
            code: loc("code"),
            line_break: loc("br"),
        }
    }
}

/// Set of known profiles: the built-ins plus any loaded from files.
/// Later registrations replace earlier ones with the same version.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: Vec<LocatorProfile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self {
            profiles: LocatorProfile::builtin(),
        }
    }
}

impl ProfileRegistry {
    pub fn register(&mut self, profile: LocatorProfile) {
        self.profiles.retain(|p| p.version != profile.version);
        self.profiles.push(profile);
    }

    /// Loads `{"profiles": [...]}` from a JSON file and registers each entry.
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let raw = fs::read_to_string(path).map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ProfileFile =
            serde_json::from_str(&raw).map_err(|source| ExportError::InvalidProfile {
                path: path.to_path_buf(),
                source,
            })?;

        let count = file.profiles.len();
        for profile in file.profiles {
            tracing::debug!(version = %profile.version, "registered locator profile");
            self.register(profile);
        }
        Ok(count)
    }

    pub fn get(&self, version: &str) -> Result<&LocatorProfile> {
        self.profiles
            .iter()
            .find(|p| p.version == version)
            .ok_or_else(|| ExportError::UnknownProfile(version.to_string()))
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.version.as_str())
    }
}
