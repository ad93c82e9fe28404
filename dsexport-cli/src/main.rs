use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use dsexport_core::{
    AttributeStateProvider, CONVERT_LATEX_DEFAULT, CONVERT_LATEX_KEY, CommandRasterBackend,
    DEFAULT_PROFILE, DisplayMathStyle, Document, ExportArtifact, ExportError, ExportOptions,
    Exporter, JsonFilePreferenceStore, NullStateProvider, ProfileRegistry,
    StructuredContentProvider, WaitPolicy, await_container, read_page, watch_file,
};
use tracing_subscriber::EnvFilter;

/// Export DeepSeek chat pages to Markdown, print HTML and PNG
#[derive(Debug, Parser)]
#[command(name = "dsexport", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Locator profile version
    #[arg(long, global = true, default_value = DEFAULT_PROFILE)]
    profile: String,

    /// JSON file with additional locator profiles
    #[arg(long, global = true)]
    profiles: Option<PathBuf>,

    /// Ignore structured state and always read the rendered text
    #[arg(long, global = true)]
    no_structured_state: bool,

    /// Directory artifacts are written to
    #[arg(short, long, global = true, default_value = ".")]
    output_dir: PathBuf,

    /// Keep re-reading the page for up to this many milliseconds until the
    /// chat container appears
    #[arg(long, global = true, value_name = "MS")]
    wait: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Export the conversation as Markdown
    Markdown {
        /// Saved chat page
        input: PathBuf,

        /// Print to stdout instead of writing a file
        #[arg(long)]
        stdout: bool,

        /// How display math is laid out
        #[arg(long, value_enum, default_value_t = MathLayout::Inline)]
        display_math: MathLayout,
    },

    /// Write the styled print view, ready for "Save as PDF"
    Pdf {
        /// Saved chat page
        input: PathBuf,
    },

    /// Render the conversation to a PNG image
    Png {
        /// Saved chat page
        input: PathBuf,

        /// Command that reads HTML on stdin and writes PNG to stdout
        #[arg(long, value_name = "COMMAND")]
        raster_cmd: String,

        /// Milliseconds to wait after fonts are ready
        #[arg(long, default_value_t = 300)]
        settle_ms: u64,
    },

    /// Flip LaTeX delimiter conversion and print the new state
    ToggleLatex,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MathLayout {
    Inline,
    Block,
}

impl From<MathLayout> for DisplayMathStyle {
    fn from(layout: MathLayout) -> Self {
        match layout {
            MathLayout::Inline => Self::Inline,
            MathLayout::Block => Self::Block,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> dsexport_core::Result<()> {
    let prefs = JsonFilePreferenceStore::from_env_or_home()?;

    if matches!(cli.command, Commands::ToggleLatex) {
        let enabled = dsexport_core::prefs::toggle(&prefs, CONVERT_LATEX_KEY, CONVERT_LATEX_DEFAULT)?;
        let state = if enabled { "on" } else { "off" };
        println!("LaTeX delimiter conversion: {state}");
        return Ok(());
    }

    let mut registry = ProfileRegistry::default();
    if let Some(path) = &cli.profiles {
        registry.load_file(path)?;
    }
    let profile = registry.get(&cli.profile)?.clone();
    tracing::debug!(profile = %profile.version, "using locator profile");

    let provider: Box<dyn StructuredContentProvider> = if cli.no_structured_state {
        Box::new(NullStateProvider)
    } else {
        Box::new(AttributeStateProvider::default())
    };

    let mut options = ExportOptions::default();
    match &cli.command {
        Commands::Markdown { display_math, .. } => {
            options.display_math_style = (*display_math).into();
        }
        Commands::Png { settle_ms, .. } => {
            options.raster.settle = Duration::from_millis(*settle_ms);
        }
        Commands::Pdf { .. } | Commands::ToggleLatex => {}
    }

    let exporter = Exporter::new(profile, provider, Box::new(prefs), options);
    let now = Utc::now();

    match &cli.command {
        Commands::Markdown { input, stdout, .. } => {
            let document = load(input, &exporter, cli.wait)?;
            let artifact = exporter.export_markdown(&document, now)?;
            if *stdout {
                let mut out = io::stdout().lock();
                out.write_all(&artifact.bytes)
                    .and_then(|()| out.write_all(b"\n"))
                    .map_err(|source| ExportError::Io {
                        path: PathBuf::from("<stdout>"),
                        source,
                    })?;
            } else {
                save(&cli.output_dir, &artifact)?;
            }
        }
        Commands::Pdf { input } => {
            let document = load(input, &exporter, cli.wait)?;
            let artifact = exporter.export_print_html(&document, now)?;
            save(&cli.output_dir, &artifact)?;
        }
        Commands::Png {
            input, raster_cmd, ..
        } => {
            let backend = CommandRasterBackend::from_command_line(raster_cmd).ok_or_else(|| {
                ExportError::RasterizationFailure {
                    stage: dsexport_core::RasterStage::Rasterize,
                    message: "empty raster command".to_string(),
                }
            })?;
            let document = load(input, &exporter, cli.wait)?;
            if let Some(artifact) = exporter.export_png(&document, &backend, now)? {
                save(&cli.output_dir, &artifact)?;
            }
        }
        Commands::ToggleLatex => {}
    }

    Ok(())
}

fn load(input: &Path, exporter: &Exporter, wait: Option<u64>) -> dsexport_core::Result<Document> {
    let document = read_page(input)?;
    let Some(wait) = wait else {
        return Ok(document);
    };

    let watch = watch_file(input, Duration::from_millis(100));
    await_container(
        document,
        &watch.updates,
        &exporter.profile().container,
        WaitPolicy::Bounded(Duration::from_millis(wait)),
    )
}

fn save(dir: &Path, artifact: &ExportArtifact) -> dsexport_core::Result<()> {
    fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(&artifact.file_name);
    fs::write(&path, &artifact.bytes).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    println!("{}", path.display());
    Ok(())
}
