//! PDF OCR entry points: one document, a directory, or raw bytes.
//!
//! ## Outputs per Source
//!
//! A Source `scan.pdf` produces, in `config.output_dir`:
//!
//! - `scan.txt`: page-delimited text, written and synced one page at a time
//!   (when the output format includes text)
//! - `scan.epub`: one chapter per page or one flowing chapter, packaged
//!   after the last page (when the output format includes EPUB)
//!
//! ## Failure scope
//!
//! A page that cannot be rendered or recognised is written empty and the
//! run continues. A document that cannot be opened, or an output file that
//! cannot be written, ends that Source only; directory runs log it in the
//! [`BatchReport`] and carry on with the next file.

use crate::config::{Engine, PipelineConfig};
use crate::error::PipelineError;
use crate::output::{sanitize_filename, BatchReport, DocumentMetadata, FailedSource, SourceReport};
use crate::pipeline::epub::{BookMetadata, EpubPackager};
use crate::pipeline::recognize::{build_recognizer, PageExtractor, Recognizer};
use crate::pipeline::render::{self, PageMode, PdfPageSource};
use crate::pipeline::sink::PageTextSink;
use crate::pipeline::{input, run_units, UnitSink};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// How pages are obtained for the configured engine.
pub fn page_mode(config: &PipelineConfig) -> PageMode {
    match config.engine {
        Engine::TextLayer => PageMode::TextLayer,
        Engine::Tesseract | Engine::Vision => PageMode::Render {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
        },
    }
}

/// Extract one PDF (local path or HTTP/HTTPS URL).
///
/// # Returns
/// `Ok(SourceReport)` once every page has been attempted, even if some
/// failed (see `report.stats.failed_units`).
///
/// # Errors
/// Source-fatal conditions only: missing or unreadable input, not a PDF,
/// encrypted without the right password, page selection out of range,
/// recognizer not configured, output not writable.
pub async fn extract_document(
    input: &str,
    config: &PipelineConfig,
) -> Result<SourceReport, PipelineError> {
    let recognizer = build_recognizer(config)?;
    let resolved = input::resolve_input(input, config.download_timeout_secs).await?;
    let title = file_title(resolved.path());
    extract_path(resolved.path(), &title, config, recognizer).await
}

/// Extract PDF bytes held in memory. `name` becomes the output file stem
/// and the book title.
pub async fn extract_bytes(
    bytes: &[u8],
    name: &str,
    config: &PipelineConfig,
) -> Result<SourceReport, PipelineError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(PipelineError::NotAPdf {
            path: name.into(),
            magic,
        });
    }

    let recognizer = build_recognizer(config)?;
    let mut tmp = tempfile::Builder::new()
        .prefix("pagewise-")
        .suffix(".pdf")
        .tempfile()
        .map_err(|e| PipelineError::Internal(format!("Failed to create temp file: {e}")))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.flush())
        .map_err(|e| PipelineError::Internal(format!("Failed to write temp file: {e}")))?;

    extract_path(tmp.path(), name, config, recognizer).await
}

/// Extract every PDF in `config.input_dir` (non-recursive).
///
/// An empty directory is not an error: the returned report is empty. When
/// the directory holds exactly one PDF its failure is returned as `Err`;
/// with several, failures are collected in [`BatchReport::failed`].
pub async fn extract_directory(config: &PipelineConfig) -> Result<BatchReport, PipelineError> {
    let files = input::scan_directory(&config.input_dir, &["pdf"])?;
    if files.is_empty() {
        warn!("No PDF files found in {}", config.input_dir.display());
        return Ok(BatchReport::default());
    }
    info!(
        "Found {} PDF file(s) in {}",
        files.len(),
        config.input_dir.display()
    );

    let recognizer = build_recognizer(config)?;
    let mut batch = BatchReport::default();

    if let [only] = files.as_slice() {
        let report = extract_path(only, &file_title(only), config, recognizer).await?;
        batch.processed.push(report);
        return Ok(batch);
    }

    for path in &files {
        if config.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            let started = batch.processed.len() + batch.failed.len();
            warn!("Cancelled; {} file(s) not started", files.len() - started);
            break;
        }
        match extract_path(path, &file_title(path), config, recognizer.clone()).await {
            Ok(report) => {
                let cancelled = report.cancelled;
                batch.processed.push(report);
                if cancelled {
                    break;
                }
            }
            Err(e) => {
                error!("{}: {}", path.display(), e);
                batch.failed.push(FailedSource {
                    source: path.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        "Batch finished: {} processed, {} failed",
        batch.processed.len(),
        batch.failed.len()
    );
    Ok(batch)
}

/// Synchronous wrapper around [`extract_directory`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_directory_sync(config: &PipelineConfig) -> Result<BatchReport, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_directory(config))
}

/// Read PDF metadata without extracting anything.
///
/// Only `password` and `download_timeout_secs` of `config` are used; no
/// recognizer is needed.
pub async fn inspect(input: &str, config: &PipelineConfig) -> Result<DocumentMetadata, PipelineError> {
    let resolved = input::resolve_input(input, config.download_timeout_secs).await?;
    render::extract_metadata(resolved.path(), config.password.as_deref()).await
}

fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// Run one opened PDF through the configured sinks.
async fn extract_path(
    pdf_path: &Path,
    title: &str,
    config: &PipelineConfig,
    recognizer: Option<Arc<dyn Recognizer>>,
) -> Result<SourceReport, PipelineError> {
    let mut source = PdfPageSource::open(
        pdf_path,
        config.password.as_deref(),
        page_mode(config),
        &config.pages,
    )
    .await?;

    let mut stem = sanitize_filename(title);
    if stem.is_empty() {
        stem = "document".to_string();
    }

    let mut text_sink = if config.output_format.wants_text() {
        let path = config.output_dir.join(format!("{stem}.txt"));
        Some(PageTextSink::create(path, config.page_separator.clone()).await?)
    } else {
        None
    };
    let mut epub = config.output_format.wants_epub().then(|| {
        EpubPackager::new(
            config.output_dir.join(format!("{stem}.epub")),
            BookMetadata::from_config(title, config),
            config.epub_layout,
        )
    });

    let mut sinks: Vec<&mut dyn UnitSink> = Vec::with_capacity(2);
    if let Some(sink) = text_sink.as_mut() {
        sinks.push(sink);
    }
    if let Some(sink) = epub.as_mut() {
        sinks.push(sink);
    }

    let extractor = PageExtractor::new(recognizer);
    run_units(
        &mut source,
        &extractor,
        &mut sinks,
        config.progress_callback.as_ref(),
        config.cancel.as_ref(),
    )
    .await
}
