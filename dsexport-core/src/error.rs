use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("chat container not found (locator `{selector}`)")]
    ContainerNotFound { selector: String },

    #[error("No chat history found")]
    NoChatHistory,

    #[error("export failed during {stage}: {message}")]
    RasterizationFailure { stage: RasterStage, message: String },

    #[error("invalid locator `{selector}`: {reason}")]
    InvalidLocator { selector: String, reason: String },

    #[error("unknown locator profile: {0}")]
    UnknownProfile(String),

    #[error("invalid locator profile file {path}: {source}")]
    InvalidProfile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("preferences file {path} is corrupt: {source}")]
    Preferences {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("cannot determine config directory")]
    ConfigDirectoryNotFound,

    #[error("input file is empty: {path}")]
    EmptyInput { path: PathBuf },

    #[error("input file is not valid UTF-8: {path}")]
    NonUtf8Input { path: PathBuf },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Step of the image pipeline that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterStage {
    Fonts,
    Rasterize,
    Encode,
}

impl fmt::Display for RasterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fonts => write!(f, "font loading"),
            Self::Rasterize => write!(f, "rasterization"),
            Self::Encode => write!(f, "png encoding"),
        }
    }
}

/// Per-node degradation recorded while extracting. None of these abort an
/// export; the affected piece is omitted or taken from the text fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionWarning {
    ContentNodeMissing { ordinal: usize, locator: String },
    StructuredStateUnavailable { ordinal: usize, locator: String },
    TitleMissing { locator: String },
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContentNodeMissing { ordinal, locator } => {
                write!(f, "turn {ordinal}: no node matches `{locator}`")
            }
            Self::StructuredStateUnavailable { ordinal, locator } => write!(
                f,
                "turn {ordinal}: no structured state for `{locator}`, used text fallback"
            ),
            Self::TitleMissing { locator } => write!(f, "no title node matches `{locator}`"),
        }
    }
}
