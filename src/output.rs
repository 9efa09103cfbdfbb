//! Result types produced by the pipelines.

use crate::error::UnitError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Succeeded,
    Failed,
}

/// One unit's result as handed to every sink.
///
/// `text` is empty, never absent, when extraction failed.
#[derive(Debug, Clone)]
pub struct UnitResult {
    /// 1-based index (page number, playlist position).
    pub index: usize,
    /// Human title: "Page 3", or the video title.
    pub title: String,
    pub text: String,
    pub status: UnitStatus,
    pub error: Option<UnitError>,
    pub duration_ms: u64,
}

impl UnitResult {
    pub fn succeeded(index: usize, title: impl Into<String>, text: String, duration_ms: u64) -> Self {
        Self {
            index,
            title: title.into(),
            text,
            status: UnitStatus::Succeeded,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(index: usize, title: impl Into<String>, error: UnitError, duration_ms: u64) -> Self {
        Self {
            index,
            title: title.into(),
            text: String::new(),
            status: UnitStatus::Failed,
            error: Some(error),
            duration_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == UnitStatus::Succeeded
    }

    /// Text-free summary kept in the [`SourceReport`].
    pub fn record(&self) -> UnitRecord {
        UnitRecord {
            index: self.index,
            title: self.title.clone(),
            status: self.status,
            chars: self.text.chars().count(),
            error: self.error.clone(),
            duration_ms: self.duration_ms,
        }
    }
}

/// Per-unit bookkeeping without the text itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRecord {
    pub index: usize,
    pub title: String,
    pub status: UnitStatus,
    pub chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitError>,
    pub duration_ms: u64,
}

/// Aggregate statistics for one Source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub total_units: usize,
    pub succeeded_units: usize,
    pub failed_units: usize,
    /// Subset of `failed_units` that simply had no content.
    pub empty_units: usize,
    pub total_chars: usize,
    pub total_duration_ms: u64,
}

/// What happened to one Source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    /// One record per enumerated unit, in index order.
    pub units: Vec<UnitRecord>,
    pub stats: RunStats,
    /// Files written by the sinks.
    pub artifacts: Vec<PathBuf>,
    /// `true` if the run stopped early on a cancel request.
    pub cancelled: bool,
}

/// A Source that was abandoned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedSource {
    pub source: String,
    pub error: String,
}

/// Outcome of a directory run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: Vec<SourceReport>,
    pub failed: Vec<FailedSource>,
}

impl BatchReport {
    /// No Source was found in the input directory.
    pub fn is_empty(&self) -> bool {
        self.processed.is_empty() && self.failed.is_empty()
    }
}

/// Metadata read from a PDF without extracting it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Replace characters that are invalid in file names (`<>:"/\|?*`) with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_filename(r#"a<b>c:d"e/f\g|h?i*j"#), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("  Lecture 1: Intro  "), "Lecture 1_ Intro");
        assert_eq!(sanitize_filename("plain"), "plain");
    }

    #[test]
    fn failed_unit_has_empty_text() {
        let r = UnitResult::failed(2, "Page 2", UnitError::NoContent { index: 2 }, 5);
        assert!(r.text.is_empty());
        assert!(!r.is_success());
        let rec = r.record();
        assert_eq!(rec.chars, 0);
        assert_eq!(rec.status, UnitStatus::Failed);
    }

    #[test]
    fn record_counts_chars_not_bytes() {
        let r = UnitResult::succeeded(1, "Page 1", "سلام".into(), 1);
        assert_eq!(r.record().chars, 4);
    }
}
