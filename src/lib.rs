//! # pagewise
//!
//! Page-by-page extraction pipelines: scanned PDFs to text and EPUB, text
//! files re-split into fixed-size parts, video subtitles to transcripts.
//!
//! ## Why page by page?
//!
//! A 600-page scan at 300 DPI is gigabytes of bitmaps, and OCR of a full
//! book takes hours. Holding it all in memory or writing only at the end
//! means a crash loses everything. Every pipeline here works on one unit
//! (page or video) at a time and appends the result to disk before the
//! next one starts; a failed unit is written empty so later units keep
//! their positions.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Source (PDF / playlist)
//!  │
//!  ├─ 1. Enumerate  directory scan, local file, URL download, playlist resolve
//!  ├─ 2. Fetch      render one page via pdfium / download one subtitle file
//!  ├─ 3. Extract    tesseract, vision model, text layer / subtitle parser
//!  ├─ 4. Sink       append + sync to the text file, buffer for EPUB
//!  └─ 5. Package    EPUB container, transcript, per-Source report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagewise::{extract_directory, OutputFormat, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .input_dir("./scans")
//!         .output_dir("./books")
//!         .language_code("fa")
//!         .output_format(OutputFormat::Both)
//!         .build()?;
//!     let batch = extract_directory(&config).await?;
//!     for report in &batch.processed {
//!         eprintln!("{}: {}/{} pages",
//!             report.source,
//!             report.stats.succeeded_units,
//!             report.stats.total_units);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `pagewise` binary (clap + indicatif + anyhow + tracing-subscriber) |
//! | `server` | on      | [`server`]: axum router for NDJSON subtitle jobs |
//!
//! ## External programs
//!
//! pdfium is bound at run time (`PDFIUM_LIB_PATH`, then the working
//! directory, then the system library path). The tesseract engine calls the
//! `tesseract` binary and subtitle jobs call `yt-dlp`; both are looked up on
//! `PATH` unless configured.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chapters;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod posts;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod split;
pub mod stream;
pub mod subtitles;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chapters::{extract_chapters, ChapterRange};
pub use config::{
    Engine, EpubLayout, OutputFormat, PageSelection, PageSeparator, PipelineConfig,
    PipelineConfigBuilder, SubtitleConfig,
};
pub use convert::{extract_bytes, extract_directory, extract_directory_sync, extract_document, inspect};
pub use error::{PipelineError, PlatformError, SubtitleError, UnitError};
pub use output::{BatchReport, DocumentMetadata, FailedSource, RunStats, SourceReport, UnitResult};
pub use pipeline::{run_units, UnitExtractor, UnitSink, UnitSource};
pub use posts::{export_posts, PostsExport};
pub use progress::{CancelFlag, ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use split::{split_directory, split_file};
pub use stream::{subtitle_event_stream, JobEvent};
pub use subtitles::job::{resolve_collection, run_subtitle_job, SubtitleJobOutput};
pub use subtitles::platform::{VideoPlatform, YtDlp};
pub use subtitles::SubtitleFormat;
