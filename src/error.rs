//! Error types for the pagewise library.
//!
//! Failures are split by how far they reach:
//!
//! * [`PipelineError`] is **fatal for one Source** (or one HTTP request):
//!   unreadable input, a PDF that will not open, an output file that cannot
//!   be written. Directory runs log it and move on to the next Source.
//!
//! * [`UnitError`] is **recoverable**: one page or one video could not be
//!   extracted. The unit keeps its position in the output with empty text,
//!   and the error is stored in its [`crate::output::UnitRecord`].
//!
//! * [`SubtitleError`] and [`PlatformError`] are the typed failures of the
//!   subtitle parsers and the video-platform collaborator. The pipeline maps
//!   them into one of the two kinds above.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pagewise library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file or directory was not found at the given path.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Reading an input file (text to re-split, subtitle file) failed.
    #[error("Failed to read '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Source-level outcomes ─────────────────────────────────────────────
    /// The Source converted to zero units (empty PDF, empty playlist).
    #[error("'{source_id}' has no pages or entries to extract")]
    NoUnits { source_id: String },

    /// Every unit came back empty; nothing worth returning.
    #[error("No extractable content found for '{source_id}'")]
    NoContent { source_id: String },

    // ── Collaborator errors ───────────────────────────────────────────────
    /// The configured recognizer cannot be constructed (missing API key etc.).
    #[error("Recognizer '{engine}' is not configured.\n{hint}")]
    RecognizerNotConfigured { engine: String, hint: String },

    /// The video platform could not resolve the URL to videos.
    #[error("Could not resolve '{url}': {detail}")]
    ResolveFailed { url: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file. Aborts the Source.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n\
  • Place libpdfium next to the working directory.\n\
  • Install pdfium system-wide so the dynamic loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// `true` when the Source simply had nothing to process.
    pub fn is_nothing_to_do(&self) -> bool {
        matches!(
            self,
            PipelineError::NoUnits { .. } | PipelineError::NoContent { .. }
        )
    }
}

/// A non-fatal error for a single unit (page or video).
///
/// The unit still occupies its index in every output; its text is empty.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum UnitError {
    /// Page rasterisation or text-layer read failed.
    #[error("Unit {index}: rendering failed: {detail}")]
    RenderFailed { index: usize, detail: String },

    /// OCR or vision call failed.
    #[error("Unit {index}: recognition failed: {detail}")]
    RecognitionFailed { index: usize, detail: String },

    /// Recognition or download exceeded its timeout.
    #[error("Unit {index}: timed out after {secs}s")]
    Timeout { index: usize, secs: u64 },

    /// Extraction worked but the unit carries no text (no captions, blank page).
    #[error("Unit {index}: no content available")]
    NoContent { index: usize },

    /// Fetching the unit's payload failed (subtitle download, metadata).
    #[error("Unit {index}: fetch failed: {detail}")]
    FetchFailed { index: usize, detail: String },

    /// The payload was fetched but could not be parsed.
    #[error("Unit {index}: parse failed: {detail}")]
    ParseFailed { index: usize, detail: String },
}

impl UnitError {
    /// Index of the unit this error belongs to.
    pub fn index(&self) -> usize {
        match self {
            UnitError::RenderFailed { index, .. }
            | UnitError::RecognitionFailed { index, .. }
            | UnitError::Timeout { index, .. }
            | UnitError::NoContent { index }
            | UnitError::FetchFailed { index, .. }
            | UnitError::ParseFailed { index, .. } => *index,
        }
    }

    /// `true` for "nothing there" as opposed to "something broke".
    pub fn is_no_content(&self) -> bool {
        matches!(self, UnitError::NoContent { .. })
    }

    /// Human-readable cause without the `Unit N:` prefix.
    pub fn detail(&self) -> String {
        match self {
            UnitError::RenderFailed { detail, .. }
            | UnitError::RecognitionFailed { detail, .. }
            | UnitError::FetchFailed { detail, .. }
            | UnitError::ParseFailed { detail, .. } => detail.clone(),
            UnitError::Timeout { secs, .. } => format!("timed out after {secs}s"),
            UnitError::NoContent { .. } => "no content available".to_string(),
        }
    }
}

/// Failure to turn a subtitle document into text.
#[derive(Debug, Error)]
pub enum SubtitleError {
    /// The document is not valid for its detected format.
    #[error("malformed {format} subtitles: {detail}")]
    Malformed {
        format: &'static str,
        detail: String,
    },

    /// The document parsed but contained no words.
    #[error("no subtitle text found in {format} document")]
    NoText { format: &'static str },
}

/// Failure reported by the video-platform collaborator.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The helper binary could not be started.
    #[error("failed to launch '{binary}': {source}")]
    Launch {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The helper exited with a non-zero status.
    #[error("'{binary}' exited with {status}: {stderr}")]
    Failed {
        binary: PathBuf,
        status: String,
        stderr: String,
    },

    /// The helper did not finish in time.
    #[error("'{binary}' timed out after {secs}s")]
    Timeout { binary: PathBuf, secs: u64 },

    /// The helper's JSON metadata could not be understood.
    #[error("unexpected metadata: {0}")]
    InvalidMetadata(String),

    /// Scratch file handling failed.
    #[error("scratch I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
