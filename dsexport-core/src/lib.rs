pub mod answer;
pub mod canonical;
pub mod classify;
pub mod discovery;
pub mod dom;
pub mod error;
pub mod export;
pub mod locator;
pub mod model;
pub mod prefs;
pub mod sequence;
pub mod service;
pub mod structured;
pub mod thinking;

pub use canonical::{CanonicalOptions, CanonicalString, DisplayMathStyle, Headers, canonicalize};
pub use discovery::{FileWatch, WaitPolicy, await_container, watch_file};
pub use dom::{Document, Locator, NodeRef, parse_html};
pub use error::{ExportError, ExtractionWarning, RasterStage, Result};
pub use export::{CommandRasterBackend, ExportCoordinator, RasterBackend, RasterOptions};
pub use locator::{DEFAULT_PROFILE, LocatorProfile, ProfileRegistry};
pub use model::{ArtifactKind, ConversationDocument, ExportArtifact, Role, Turn, TurnBody};
pub use prefs::{
    CONVERT_LATEX_DEFAULT, CONVERT_LATEX_KEY, JsonFilePreferenceStore, MemoryPreferenceStore,
    PreferenceStore,
};
pub use sequence::{Sequenced, extract_conversation, sequence};
pub use service::{ExportOptions, Exporter, read_page};
pub use structured::{AttributeStateProvider, NullStateProvider, StructuredContentProvider};
