//! Chapter export: named page ranges of one PDF, one text file each.
//!
//! A chapter is given as `Title=START-END` (1-based, inclusive). Each one is
//! run through the same page pipeline as a full extraction, restricted to
//! its range, and written to `{Title}.txt` with reserved characters and
//! spaces replaced by `_`.

use crate::config::{PageSelection, PageSeparator, PipelineConfig};
use crate::convert::page_mode;
use crate::error::PipelineError;
use crate::output::{sanitize_filename, BatchReport, FailedSource};
use crate::pipeline::input;
use crate::pipeline::recognize::{build_recognizer, PageExtractor};
use crate::pipeline::render::PdfPageSource;
use crate::pipeline::sink::PageTextSink;
use crate::pipeline::{run_units, UnitSink};
use std::fmt;
use std::str::FromStr;
use tracing::{error, info};

/// A titled, inclusive page range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRange {
    pub title: String,
    pub start: usize,
    pub end: usize,
}

impl ChapterRange {
    pub fn new(title: impl Into<String>, start: usize, end: usize) -> Result<Self, String> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err("chapter title must not be empty".into());
        }
        if start == 0 || end < start {
            return Err(format!("invalid page range {start}-{end} for '{title}'"));
        }
        Ok(Self { title, start, end })
    }
}

impl fmt::Display for ChapterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pages {}-{})", self.title, self.start, self.end)
    }
}

impl FromStr for ChapterRange {
    type Err = String;

    /// `Title=12-40` or `Title=7`. The title may itself contain `=`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (title, range) = s
            .rsplit_once('=')
            .ok_or_else(|| format!("expected TITLE=START-END, got '{s}'"))?;
        let parse = |n: &str| {
            n.trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid page number '{}' in '{s}'", n.trim()))
        };
        let (start, end) = match range.split_once('-') {
            Some((a, b)) => (parse(a)?, parse(b)?),
            None => {
                let p = parse(range)?;
                (p, p)
            }
        };
        ChapterRange::new(title.trim(), start, end)
    }
}

/// File-name form of a chapter title: reserved characters and spaces → `_`.
pub fn sanitize_chapter_title(title: &str) -> String {
    sanitize_filename(title).replace(' ', "_")
}

/// Extract each chapter of `pdf` (path or URL) into `config.output_dir`.
///
/// A chapter whose range lies outside the document fails alone; the others
/// are still written. Each processed report's `source` is the chapter
/// title.
pub async fn extract_chapters(
    pdf: &str,
    chapters: &[ChapterRange],
    config: &PipelineConfig,
) -> Result<BatchReport, PipelineError> {
    let resolved = input::resolve_input(pdf, config.download_timeout_secs).await?;
    let recognizer = build_recognizer(config)?;
    let extractor = PageExtractor::new(recognizer);
    let mut batch = BatchReport::default();

    for chapter in chapters {
        info!("Extracting: {}", chapter);
        let outcome = async {
            let mut source = PdfPageSource::open(
                resolved.path(),
                config.password.as_deref(),
                page_mode(config),
                &PageSelection::Range(chapter.start, chapter.end),
            )
            .await?;
            let path = config
                .output_dir
                .join(format!("{}.txt", sanitize_chapter_title(&chapter.title)));
            let mut sink = PageTextSink::create(path, PageSeparator::None).await?;
            let mut sinks: Vec<&mut dyn UnitSink> = vec![&mut sink];
            run_units(
                &mut source,
                &extractor,
                &mut sinks,
                config.progress_callback.as_ref(),
                config.cancel.as_ref(),
            )
            .await
        }
        .await;

        match outcome {
            Ok(mut report) => {
                report.source = chapter.title.clone();
                let cancelled = report.cancelled;
                batch.processed.push(report);
                if cancelled {
                    break;
                }
            }
            Err(e) => {
                error!("{}: {}", chapter, e);
                batch.failed.push(FailedSource {
                    source: chapter.title.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(batch)
}
