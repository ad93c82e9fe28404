//! Projections of a conversation into downloadable artifacts.

pub mod coordinator;
pub mod image;
pub mod markdown;
pub mod print;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

pub use coordinator::{ExportCoordinator, ExportGuard};
pub use image::{CommandRasterBackend, RasterBackend, RasterOptions};

pub const DEFAULT_FILE_PREFIX: &str = "DeepSeek";
pub const SAFE_TITLE_LEN: usize = 30;

static UNSAFE_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\-_\s]").expect("valid regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// File-name fragment for a title: ASCII letters, digits, `-` and `_` only,
/// whitespace runs collapsed to `_`, capped at `max_len` characters.
pub fn safe_title(title: &str, max_len: usize) -> String {
    let kept = UNSAFE_CHARS_RE.replace_all(title, "");
    let joined = WHITESPACE_RE.replace_all(&kept, "_");
    let capped: String = joined.chars().take(max_len).collect();
    capped.trim_end_matches('_').trim().to_string()
}

/// UTC timestamp as `YYYY-MM-DD_HH_MM_SS`.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d_%H_%M_%S").to_string()
}

/// `<prefix>[_<safe title>]_<timestamp>.<extension>`.
pub fn file_name(prefix: &str, title: Option<&str>, now: DateTime<Utc>, extension: &str) -> String {
    let title_part = title
        .map(|title| safe_title(title, SAFE_TITLE_LEN))
        .filter(|safe| !safe.is_empty())
        .map(|safe| format!("_{safe}"))
        .unwrap_or_default();
    format!("{prefix}{title_part}_{}.{extension}", timestamp(now))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{file_name, safe_title, timestamp};

    #[test]
    fn safe_title_drops_and_collapses() {
        assert_eq!(safe_title("Hello, World!  Rust?", 30), "Hello_World_Rust");
        assert_eq!(safe_title("数学 问题", 30), "");
        assert_eq!(safe_title("a very long title that keeps on going", 10), "a_very_lon");
        assert_eq!(safe_title("abc def ghi", 4), "abc");
    }

    #[test]
    fn timestamp_format() {
        let now = Utc.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).single().expect("date");
        assert_eq!(timestamp(now), "2025-03-07_09_05_01");
    }

    #[test]
    fn file_names_with_and_without_title() {
        let now = Utc.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).single().expect("date");
        assert_eq!(
            file_name("DeepSeek", Some("Prime numbers"), now, "md"),
            "DeepSeek_Prime_numbers_2025-03-07_09_05_01.md"
        );
        assert_eq!(
            file_name("DeepSeek", Some("???"), now, "md"),
            "DeepSeek_2025-03-07_09_05_01.md"
        );
        assert_eq!(
            file_name("DeepSeek", None, now, "png"),
            "DeepSeek_2025-03-07_09_05_01.png"
        );
    }
}
