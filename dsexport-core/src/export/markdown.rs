use chrono::{DateTime, Utc};

use crate::canonical::CanonicalString;
use crate::export::file_name;
use crate::model::{ArtifactKind, ExportArtifact};

/// The canonical string as a `.md` download.
pub fn markdown_artifact(
    canonical: &CanonicalString,
    title: Option<&str>,
    prefix: &str,
    now: DateTime<Utc>,
) -> ExportArtifact {
    let kind = ArtifactKind::Markdown;
    ExportArtifact {
        kind,
        file_name: file_name(prefix, title, now, kind.extension()),
        bytes: canonical.as_str().as_bytes().to_vec(),
    }
}
