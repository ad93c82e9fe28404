use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::canonical::{CanonicalOptions, CanonicalString, DisplayMathStyle, Headers, canonicalize};
use crate::dom::{Document, parse_html};
use crate::error::{ExportError, Result};
use crate::export::DEFAULT_FILE_PREFIX;
use crate::export::coordinator::ExportCoordinator;
use crate::export::image::{self, RasterBackend, RasterOptions};
use crate::export::markdown::markdown_artifact;
use crate::export::print::print_artifact;
use crate::locator::LocatorProfile;
use crate::model::{ConversationDocument, ExportArtifact};
use crate::prefs::{CONVERT_LATEX_DEFAULT, CONVERT_LATEX_KEY, PreferenceStore};
use crate::sequence::extract_conversation;
use crate::structured::StructuredContentProvider;

/// Reads and parses a saved page.
pub fn read_page(path: &Path) -> Result<Document> {
    let bytes = fs::read(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.is_empty() {
        return Err(ExportError::EmptyInput {
            path: path.to_path_buf(),
        });
    }

    let html = String::from_utf8(bytes).map_err(|_| ExportError::NonUtf8Input {
        path: path.to_path_buf(),
    })?;
    Ok(parse_html(&html))
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub headers: Headers,
    pub file_prefix: String,
    pub display_math_style: DisplayMathStyle,
    pub raster: RasterOptions,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            headers: Headers::default(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            display_math_style: DisplayMathStyle::default(),
            raster: RasterOptions::default(),
        }
    }
}

/// One configured export pipeline: profile, state access, preferences and
/// the image-export gate shared by every call on this value.
pub struct Exporter {
    profile: LocatorProfile,
    provider: Box<dyn StructuredContentProvider>,
    prefs: Box<dyn PreferenceStore>,
    coordinator: ExportCoordinator,
    options: ExportOptions,
}

impl Exporter {
    pub fn new(
        profile: LocatorProfile,
        provider: Box<dyn StructuredContentProvider>,
        prefs: Box<dyn PreferenceStore>,
        options: ExportOptions,
    ) -> Self {
        Self {
            profile,
            provider,
            prefs,
            coordinator: ExportCoordinator::new(),
            options,
        }
    }

    pub fn profile(&self) -> &LocatorProfile {
        &self.profile
    }

    pub fn extract(&self, document: &Document) -> Result<ConversationDocument> {
        extract_conversation(
            document,
            &self.profile,
            self.provider.as_ref(),
            &self.options.headers.thoughts,
        )
    }

    /// Canonical string for a conversation, honouring the current
    /// delimiter-conversion preference.
    pub fn canonical(&self, conversation: &ConversationDocument) -> Result<CanonicalString> {
        let convert_math = self
            .prefs
            .get_bool(CONVERT_LATEX_KEY, CONVERT_LATEX_DEFAULT)?;
        let options = CanonicalOptions {
            headers: self.options.headers.clone(),
            convert_math,
            display_math_style: self.options.display_math_style,
        };
        Ok(canonicalize(conversation, &options))
    }

    /// Text exports report a missing container the same way as an empty one.
    fn non_empty(&self, document: &Document) -> Result<(ConversationDocument, CanonicalString)> {
        let conversation = match self.extract(document) {
            Ok(conversation) => conversation,
            Err(ExportError::ContainerNotFound { selector }) => {
                tracing::warn!(%selector, "chat container not found");
                return Err(ExportError::NoChatHistory);
            }
            Err(err) => return Err(err),
        };
        if conversation.turns.is_empty() {
            tracing::warn!("container holds no turns");
            return Err(ExportError::NoChatHistory);
        }
        let canonical = self.canonical(&conversation)?;
        Ok((conversation, canonical))
    }

    pub fn export_markdown(&self, document: &Document, now: DateTime<Utc>) -> Result<ExportArtifact> {
        let (conversation, canonical) = self.non_empty(document)?;
        let artifact = markdown_artifact(
            &canonical,
            conversation.title.as_deref(),
            &self.options.file_prefix,
            now,
        );
        tracing::info!(
            file = %artifact.file_name,
            turns = conversation.turns.len(),
            "markdown export ready"
        );
        Ok(artifact)
    }

    pub fn export_print_html(&self, document: &Document, now: DateTime<Utc>) -> Result<ExportArtifact> {
        let (conversation, canonical) = self.non_empty(document)?;
        let artifact = print_artifact(
            &canonical,
            conversation.title.as_deref(),
            &self.options.headers,
            &self.options.file_prefix,
            now,
        );
        tracing::info!(
            file = %artifact.file_name,
            turns = conversation.turns.len(),
            "print view ready"
        );
        Ok(artifact)
    }

    /// `Ok(None)` when another image export is still running.
    pub fn export_png<B: RasterBackend>(
        &self,
        document: &Document,
        backend: &B,
        now: DateTime<Utc>,
    ) -> Result<Option<ExportArtifact>> {
        let result = image::export_png(
            document,
            &self.profile,
            backend,
            &self.coordinator,
            &self.options.raster,
            &self.options.file_prefix,
            now,
        );
        match &result {
            Ok(Some(artifact)) => {
                tracing::info!(file = %artifact.file_name, bytes = artifact.bytes.len(), "image export ready");
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(%err, "image export failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::{ExportOptions, Exporter, read_page};
    use crate::dom::parse_html;
    use crate::error::ExportError;
    use crate::export::image::{BackendError, RasterBackend, RasterOptions};
    use crate::locator::LocatorProfile;
    use crate::prefs::{CONVERT_LATEX_KEY, MemoryPreferenceStore, PreferenceStore};
    use crate::structured::{AttributeStateProvider, NullStateProvider};

    const PAGE: &str = r#"<html><body>
        <div class="d8ed659a">Circle area</div>
        <div class="dad65929">
            <div><div class="_9663006"><div class="fbb737a4">Area of a circle?</div></div></div>
            <div class="_4f9bf79">
                <div data-state='{"markdown":"It is \\( \\pi r^2 \\)."}'><div><div class="ds-markdown ds-markdown--block"><p>It is πr2.</p></div></div></div>
            </div>
        </div>
    </body></html>"#;

    fn exporter(prefs: MemoryPreferenceStore) -> Exporter {
        Exporter::new(
            LocatorProfile::deepseek_2025(),
            Box::new(AttributeStateProvider::default()),
            Box::new(prefs),
            ExportOptions {
                raster: RasterOptions {
                    settle: Duration::ZERO,
                    ..RasterOptions::default()
                },
                ..ExportOptions::default()
            },
        )
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).single().expect("date")
    }

    #[test]
    fn markdown_export_converts_math_by_default() {
        let artifact = exporter(MemoryPreferenceStore::default())
            .export_markdown(&parse_html(PAGE), now())
            .expect("export");

        assert_eq!(artifact.file_name, "DeepSeek_Circle_area_2025-03-01_08_30_00.md");
        assert_eq!(
            String::from_utf8(artifact.bytes).expect("utf8"),
            "# Circle area\n\n## User\n\nArea of a circle?\n\n---\n\n## Assistant\n\nIt is $\\pi r^2$."
        );
    }

    #[test]
    fn preference_disables_conversion() {
        let prefs = MemoryPreferenceStore::default();
        prefs.set_bool(CONVERT_LATEX_KEY, false).expect("set");
        let artifact = exporter(prefs)
            .export_markdown(&parse_html(PAGE), now())
            .expect("export");
        assert!(
            String::from_utf8(artifact.bytes)
                .expect("utf8")
                .ends_with("It is \\( \\pi r^2 \\).")
        );
    }

    #[test]
    fn empty_container_is_no_chat_history() {
        let err = exporter(MemoryPreferenceStore::default())
            .export_print_html(&parse_html(r#"<div class="dad65929"></div>"#), now())
            .expect_err("must fail");
        assert!(matches!(err, ExportError::NoChatHistory));
        assert_eq!(format!("{err}"), "No chat history found");
    }

    #[test]
    fn missing_container_is_no_chat_history() {
        let err = exporter(MemoryPreferenceStore::default())
            .export_markdown(&parse_html("<p>login</p>"), now())
            .expect_err("must fail");
        assert!(matches!(err, ExportError::NoChatHistory));
    }

    #[test]
    fn print_export_names_html() {
        let artifact = exporter(MemoryPreferenceStore::default())
            .export_print_html(&parse_html(PAGE), now())
            .expect("export");
        assert_eq!(artifact.file_name, "DeepSeek_Circle_area_2025-03-01_08_30_00.html");
        assert_eq!(artifact.mime(), "text/html");
        let html = String::from_utf8(artifact.bytes).expect("utf8");
        assert!(html.contains("<h1>Circle area</h1>"));
        assert!(html.contains("<div class=\"user-question\">Area of a circle?</div>"));
    }

    #[test]
    fn null_provider_uses_rendered_text() {
        let exporter = Exporter::new(
            LocatorProfile::deepseek_2025(),
            Box::new(NullStateProvider),
            Box::new(MemoryPreferenceStore::default()),
            ExportOptions::default(),
        );
        let conversation = exporter.extract(&parse_html(PAGE)).expect("extract");
        assert_eq!(conversation.turns[1].text(), "It is πr2.");
        assert_eq!(conversation.warnings.len(), 1);
    }

    struct Echo;

    impl RasterBackend for Echo {
        type Canvas = String;

        fn fonts_ready(&self) -> Result<(), BackendError> {
            Ok(())
        }

        fn rasterize(&self, html: &str, _options: &RasterOptions) -> Result<String, BackendError> {
            Ok(html.to_string())
        }

        fn encode_png(&self, canvas: String) -> Result<Vec<u8>, BackendError> {
            Ok(canvas.into_bytes())
        }
    }

    #[test]
    fn png_export_runs_backend_on_sandbox() {
        let artifact = exporter(MemoryPreferenceStore::default())
            .export_png(&parse_html(PAGE), &Echo, now())
            .expect("export")
            .expect("artifact");
        assert_eq!(artifact.file_name, "DeepSeek_2025-03-01_08_30_00.png");
        let html = String::from_utf8(artifact.bytes).expect("utf8");
        assert!(html.contains("Area of a circle?"));
        assert!(!html.contains("Circle area"));
    }

    #[test]
    fn read_page_rejects_bad_input() {
        let temp = tempdir().expect("tempdir");
        let empty = temp.path().join("empty.html");
        fs::write(&empty, "").expect("write");
        let err = read_page(&empty).expect_err("must fail");
        assert!(format!("{err}").contains("input file is empty"));

        let binary = temp.path().join("binary.html");
        fs::write(&binary, [0xff, 0xfe, 0x00]).expect("write");
        let err = read_page(&binary).expect_err("must fail");
        assert!(format!("{err}").contains("not valid UTF-8"));

        let err = read_page(&temp.path().join("missing.html")).expect_err("must fail");
        assert!(matches!(err, ExportError::Io { .. }));
    }
}
