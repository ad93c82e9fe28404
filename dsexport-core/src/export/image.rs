//! Raster export of the visible conversation.
//!
//! Unlike the text serializers this works on a disposable clone of the
//! container subtree: chrome is removed, layout-breaking inline styles are
//! neutralised and the result is framed in a fixed-width white page before a
//! [`RasterBackend`] turns it into pixels.

use std::error::Error;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use crate::dom::{Document, Locator, NodeId};
use crate::error::{ExportError, RasterStage, Result};
use crate::export::coordinator::ExportCoordinator;
use crate::export::file_name;
use crate::locator::LocatorProfile;
use crate::model::{ArtifactKind, ExportArtifact};

pub type BackendError = Box<dyn Error + Send + Sync>;

const SANDBOX_ROOT_STYLE: &str = "width: 800px !important; transform: none !important; \
overflow: visible !important; position: static !important; background: white !important; \
max-height: none !important; padding: 20px !important; margin: 0 !important; \
box-sizing: border-box !important";
const MATH_DISPLAY_STYLE: &str = "transform: none !important; position: relative !important";
const STRIPPED_PROPERTIES: &[&str] = &["width", "max-width", "max-height", "transform"];
const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

static PAGE_STYLES: Lazy<Locator> = Lazy::new(|| {
    Locator::parse(r#"head style, head link[rel="stylesheet"]"#).expect("valid locator")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterOptions {
    pub width: u32,
    pub scale: u32,
    pub background: String,
    /// Pause between font readiness and rasterization, for late reflow.
    pub settle: Duration,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            width: 800,
            scale: 2,
            background: "#FFFFFF".to_string(),
            settle: Duration::from_millis(300),
        }
    }
}

/// Turns sandbox HTML into PNG bytes in three observable steps.
pub trait RasterBackend {
    type Canvas;

    fn fonts_ready(&self) -> std::result::Result<(), BackendError>;
    fn rasterize(
        &self,
        html: &str,
        options: &RasterOptions,
    ) -> std::result::Result<Self::Canvas, BackendError>;
    fn encode_png(&self, canvas: Self::Canvas) -> std::result::Result<Vec<u8>, BackendError>;
}

/// Builds the standalone page handed to the rasterizer.
pub fn prepare_sandbox(
    document: &Document,
    profile: &LocatorProfile,
    options: &RasterOptions,
) -> Result<String> {
    let container = document
        .select_first(&profile.container)
        .ok_or_else(|| ExportError::ContainerNotFound {
            selector: profile.container.to_string(),
        })?;

    let mut clone = document.clone_subtree(container.id());
    let Some(root) = clone.children(clone.root_id()).next() else {
        return Err(ExportError::ContainerNotFound {
            selector: profile.container.to_string(),
        });
    };

    let chrome: Vec<NodeId> = clone
        .node(root)
        .descendants()
        .filter(|node| profile.image.strip.iter().any(|locator| node.matches(locator)))
        .map(|node| node.id())
        .collect();
    for id in chrome {
        clone.detach(id);
    }

    let restyled: Vec<(NodeId, String)> = clone
        .node(root)
        .descendants()
        .filter_map(|node| Some((node.id(), clean_inline_style(node.attr("style")?))))
        .collect();
    for (id, style) in restyled {
        clone.set_attr(id, "style", &style);
    }

    let math: Vec<(NodeId, String)> = clone
        .node(root)
        .descendants()
        .filter(|node| node.matches(&profile.image.math_display))
        .map(|node| {
            let style = match node.attr("style").filter(|s| !s.trim().is_empty()) {
                Some(existing) => format!("{existing}; {MATH_DISPLAY_STYLE}"),
                None => MATH_DISPLAY_STYLE.to_string(),
            };
            (node.id(), style)
        })
        .collect();
    for (id, style) in math {
        clone.set_attr(id, "style", &style);
    }

    clone.set_attr(root, "style", SANDBOX_ROOT_STYLE);

    let styles: String = document
        .root()
        .select_all(&PAGE_STYLES)
        .into_iter()
        .map(|node| document.to_html(node.id(), true))
        .collect();

    Ok(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n{styles}\n</head>\n<body style=\"margin: 0; background: {}; width: {}px;\">{}</body>\n</html>\n",
        options.background,
        options.width,
        clone.to_html(root, true)
    ))
}

/// Drops inline declarations that pin the clone to the live viewport.
fn clean_inline_style(style: &str) -> String {
    style
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            let fixed = name == "position" && value.to_ascii_lowercase().starts_with("fixed");
            (!STRIPPED_PROPERTIES.contains(&name.as_str()) && !fixed)
                .then(|| format!("{name}: {value}"))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Runs the image pipeline once. A call made while another export holds the
/// coordinator does nothing and returns `Ok(None)`.
pub fn export_png<B: RasterBackend>(
    document: &Document,
    profile: &LocatorProfile,
    backend: &B,
    coordinator: &ExportCoordinator,
    options: &RasterOptions,
    prefix: &str,
    now: DateTime<Utc>,
) -> Result<Option<ExportArtifact>> {
    let Some(_guard) = coordinator.try_acquire() else {
        tracing::debug!("image export already in progress, ignoring request");
        return Ok(None);
    };

    let html = prepare_sandbox(document, profile, options)?;

    backend.fonts_ready().map_err(failed(RasterStage::Fonts))?;
    if !options.settle.is_zero() {
        thread::sleep(options.settle);
    }
    let canvas = backend
        .rasterize(&html, options)
        .map_err(failed(RasterStage::Rasterize))?;
    let bytes = backend
        .encode_png(canvas)
        .map_err(failed(RasterStage::Encode))?;

    let kind = ArtifactKind::Png;
    Ok(Some(ExportArtifact {
        kind,
        file_name: file_name(prefix, None, now, kind.extension()),
        bytes,
    }))
}

fn failed(stage: RasterStage) -> impl Fn(BackendError) -> ExportError {
    move |err| ExportError::RasterizationFailure {
        stage,
        message: err.to_string(),
    }
}

/// Delegates rasterization to an external program that reads HTML on stdin
/// and writes PNG bytes to stdout. Width, scale and background are passed in
/// `DSEXPORT_WIDTH`, `DSEXPORT_SCALE` and `DSEXPORT_BACKGROUND`.
#[derive(Debug, Clone)]
pub struct CommandRasterBackend {
    program: String,
    args: Vec<String>,
}

impl CommandRasterBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a command line on whitespace; `None` when it is blank.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(ToString::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl RasterBackend for CommandRasterBackend {
    type Canvas = Vec<u8>;

    fn fonts_ready(&self) -> std::result::Result<(), BackendError> {
        Ok(())
    }

    fn rasterize(
        &self,
        html: &str,
        options: &RasterOptions,
    ) -> std::result::Result<Vec<u8>, BackendError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("DSEXPORT_WIDTH", options.width.to_string())
            .env("DSEXPORT_SCALE", options.scale.to_string())
            .env("DSEXPORT_BACKGROUND", &options.background)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| format!("cannot start `{}`: {err}", self.program))?;

        let mut stdin = child.stdin.take().ok_or("raster command has no stdin")?;
        let input = html.to_string();
        let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output()?;
        match writer.join() {
            Ok(result) => result?,
            Err(_) => return Err("stdin writer panicked".into()),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "`{}` exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )
            .into());
        }
        Ok(output.stdout)
    }

    fn encode_png(&self, canvas: Vec<u8>) -> std::result::Result<Vec<u8>, BackendError> {
        if canvas.starts_with(PNG_SIGNATURE) {
            Ok(canvas)
        } else {
            Err(format!("`{}` did not produce PNG data", self.program).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::mpsc::{Receiver, Sender, channel};
    use std::thread;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::{BackendError, RasterBackend, RasterOptions, export_png, prepare_sandbox};
    use crate::dom::parse_html;
    use crate::error::{ExportError, RasterStage};
    use crate::export::coordinator::ExportCoordinator;
    use crate::locator::LocatorProfile;

    const PAGE: &str = r#"<html><head><style>.x { color: red; }</style></head><body>
        <div class="dad65929" style="position: fixed; width: 300px; color: blue">
            <div class="_4f9bf79" style="max-width: 200px; transform: scale(0.5); color: red">
                <p>Answer</p>
                <button>Copy</button>
                <div class="ds-message-feedback-container">feedback</div>
                <span class="katex-display" style="width: 10px">math</span>
            </div>
            <input type="text">
        </div></body></html>"#;

    fn options() -> RasterOptions {
        RasterOptions {
            settle: Duration::ZERO,
            ..RasterOptions::default()
        }
    }

    #[test]
    fn sandbox_strips_chrome_and_layout_styles() {
        let doc = parse_html(PAGE);
        let html = prepare_sandbox(&doc, &LocatorProfile::deepseek_2025(), &options())
            .expect("sandbox");

        assert!(html.contains("<style>.x { color: red; }</style>"));
        assert!(html.contains("Answer"));
        assert!(!html.contains("<button"));
        assert!(!html.contains("<input"));
        assert!(!html.contains("feedback"));
        assert!(html.contains(r#"style="width: 800px !important; transform: none !important;"#));
        assert!(html.contains(r#"<div class="_4f9bf79" style="color: red">"#));
        assert!(html.contains(
            r#"<span class="katex-display" style="transform: none !important; position: relative !important">"#
        ));
        assert!(html.contains("background: #FFFFFF; width: 800px;"));
    }

    #[test]
    fn sandbox_leaves_source_untouched() {
        let doc = parse_html(PAGE);
        let before = doc.to_html(doc.root_id(), false);
        prepare_sandbox(&doc, &LocatorProfile::deepseek_2025(), &options()).expect("sandbox");
        assert_eq!(doc.to_html(doc.root_id(), false), before);
    }

    struct FixedBackend {
        fail_at: Option<RasterStage>,
    }

    impl RasterBackend for FixedBackend {
        type Canvas = Vec<u8>;

        fn fonts_ready(&self) -> Result<(), BackendError> {
            match self.fail_at {
                Some(RasterStage::Fonts) => Err("fonts never loaded".into()),
                _ => Ok(()),
            }
        }

        fn rasterize(&self, _html: &str, _options: &RasterOptions) -> Result<Vec<u8>, BackendError> {
            match self.fail_at {
                Some(RasterStage::Rasterize) => Err("canvas too large".into()),
                _ => Ok(vec![1, 2, 3]),
            }
        }

        fn encode_png(&self, canvas: Vec<u8>) -> Result<Vec<u8>, BackendError> {
            match self.fail_at {
                Some(RasterStage::Encode) => Err("encoder crashed".into()),
                _ => Ok(canvas),
            }
        }
    }

    #[test]
    fn successful_export_names_png() {
        let doc = parse_html(PAGE);
        let now = Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).single().expect("date");
        let artifact = export_png(
            &doc,
            &LocatorProfile::deepseek_2025(),
            &FixedBackend { fail_at: None },
            &ExportCoordinator::new(),
            &options(),
            "DeepSeek",
            now,
        )
        .expect("export")
        .expect("artifact");

        assert_eq!(artifact.file_name, "DeepSeek_2025-02-01_12_00_00.png");
        assert_eq!(artifact.mime(), "image/png");
        assert_eq!(artifact.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn failures_release_the_coordinator() {
        let doc = parse_html(PAGE);
        let coordinator = ExportCoordinator::new();
        for stage in [RasterStage::Fonts, RasterStage::Rasterize, RasterStage::Encode] {
            let err = export_png(
                &doc,
                &LocatorProfile::deepseek_2025(),
                &FixedBackend {
                    fail_at: Some(stage),
                },
                &coordinator,
                &options(),
                "DeepSeek",
                Utc::now(),
            )
            .expect_err("must fail");
            assert!(
                matches!(err, ExportError::RasterizationFailure { stage: failed, .. } if failed == stage)
            );
            assert!(!coordinator.is_busy());
        }
    }

    #[test]
    fn missing_container_fails_before_rasterizing() {
        let doc = parse_html("<p>nothing</p>");
        let coordinator = ExportCoordinator::new();
        let err = export_png(
            &doc,
            &LocatorProfile::deepseek_2025(),
            &FixedBackend { fail_at: None },
            &coordinator,
            &options(),
            "DeepSeek",
            Utc::now(),
        )
        .expect_err("must fail");
        assert!(matches!(err, ExportError::ContainerNotFound { .. }));
        assert!(!coordinator.is_busy());
    }

    struct BlockingBackend {
        entered: Sender<()>,
        release: Mutex<Receiver<()>>,
    }

    impl RasterBackend for BlockingBackend {
        type Canvas = Vec<u8>;

        fn fonts_ready(&self) -> Result<(), BackendError> {
            Ok(())
        }

        fn rasterize(&self, _html: &str, _options: &RasterOptions) -> Result<Vec<u8>, BackendError> {
            self.entered.send(()).map_err(|err| err.to_string())?;
            self.release
                .lock()
                .map_err(|err| err.to_string())?
                .recv()
                .map_err(|err| err.to_string())?;
            Ok(b"png".to_vec())
        }

        fn encode_png(&self, canvas: Vec<u8>) -> Result<Vec<u8>, BackendError> {
            Ok(canvas)
        }
    }

    #[test]
    fn concurrent_exports_yield_one_artifact() {
        let doc = parse_html(PAGE);
        let profile = LocatorProfile::deepseek_2025();
        let coordinator = ExportCoordinator::new();
        let (entered_tx, entered_rx) = channel();
        let (release_tx, release_rx) = channel();
        let backend = BlockingBackend {
            entered: entered_tx,
            release: Mutex::new(release_rx),
        };

        let (first, second) = thread::scope(|scope| {
            let running = scope.spawn(|| {
                export_png(
                    &doc,
                    &profile,
                    &backend,
                    &coordinator,
                    &options(),
                    "DeepSeek",
                    Utc::now(),
                )
            });

            entered_rx.recv().expect("first export started");
            let second = export_png(
                &doc,
                &profile,
                &backend,
                &coordinator,
                &options(),
                "DeepSeek",
                Utc::now(),
            );
            release_tx.send(()).expect("release");
            (running.join().expect("join"), second)
        });

        assert!(first.expect("first").is_some());
        assert!(second.expect("second").is_none());
        assert!(!coordinator.is_busy());
    }
}
