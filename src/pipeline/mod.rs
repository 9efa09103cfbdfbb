//! The paginated extraction pipeline and its stages.
//!
//! Every pipeline in this crate (PDF OCR, chapter export, subtitle
//! transcripts) is the same loop with different parts plugged in:
//!
//! ```text
//! UnitSource ──▶ UnitExtractor ──▶ UnitSink(s)
//! (page/video)    (OCR / parse)     (text file, EPUB, transcript)
//! ```
//!
//! [`run_units`] drives the loop strictly in index order, one unit at a
//! time. A unit that cannot be fetched or extracted is written with empty
//! text so later units keep their positions. A sink that cannot write ends
//! the Source, but only after every sink was finalised once so partial
//! artifacts are still usable.
//!
//! Stage modules:
//!
//! 1. [`input`]     — enumerate Sources (directory scan, local file, URL download)
//! 2. [`render`]    — open a PDF on a dedicated pdfium thread and hand out one
//!    page at a time (rendered image or text layer)
//! 3. [`recognize`] — turn page payloads into text (tesseract, vision model)
//! 4. [`postprocess`] — deterministic cleanup of recognised text
//! 5. [`sink`] / [`epub`] — incremental text output and EPUB packaging

pub mod encode;
pub mod epub;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod recognize;
pub mod render;
pub mod sink;

use crate::error::{PipelineError, UnitError};
use crate::output::{RunStats, SourceReport, UnitResult};
use crate::progress::{CancelFlag, ProgressCallback};
use async_trait::async_trait;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// One fetched unit, ready for extraction.
#[derive(Debug)]
pub struct Unit<P> {
    /// 1-based sequence index.
    pub index: usize,
    pub title: String,
    pub payload: P,
}

/// Produces the units of one Source.
///
/// `indices` is fixed when the source is opened; `fetch` is called once per
/// index, in order, and only one payload is alive at a time.
#[async_trait]
pub trait UnitSource: Send {
    type Payload: Send + 'static;

    /// Path or URL identifying the Source in logs and reports.
    fn source_id(&self) -> &str;

    /// Ordered 1-based indices of the units to process.
    fn indices(&self) -> Vec<usize>;

    /// Title used when `fetch` fails before a real title is known.
    fn fallback_title(&self, index: usize) -> String {
        format!("Page {index}")
    }

    async fn fetch(&mut self, index: usize) -> Result<Unit<Self::Payload>, UnitError>;
}

/// Turns one payload into text. The payload is consumed and dropped.
#[async_trait]
pub trait UnitExtractor<P: Send + 'static>: Send + Sync {
    async fn extract(&self, index: usize, payload: P) -> Result<String, UnitError>;
}

/// Receives every unit result in index order.
#[async_trait]
pub trait UnitSink: Send {
    /// Persist one unit. An error here is fatal for the Source.
    async fn write_unit(&mut self, unit: &UnitResult) -> Result<(), PipelineError>;

    /// Finalise the artifact. Called exactly once per run.
    async fn finish(&mut self) -> Result<(), PipelineError>;

    /// Path of the file this sink produces, if any.
    fn artifact(&self) -> Option<&Path> {
        None
    }
}

/// Run one Source through `extractor` into `sinks`.
///
/// # Errors
/// - [`PipelineError::NoUnits`] when the source has nothing to process
///   (no sink is touched).
/// - The first sink error; prior units stay on disk and all sinks have
///   been finalised.
pub async fn run_units<S, E>(
    source: &mut S,
    extractor: &E,
    sinks: &mut [&mut dyn UnitSink],
    progress: Option<&ProgressCallback>,
    cancel: Option<&CancelFlag>,
) -> Result<SourceReport, PipelineError>
where
    S: UnitSource + ?Sized,
    E: UnitExtractor<S::Payload> + ?Sized,
{
    let run_start = Instant::now();
    let source_id = source.source_id().to_string();
    let indices = source.indices();
    let total = indices.len();

    if total == 0 {
        return Err(PipelineError::NoUnits { source_id });
    }

    info!("Extracting {} units from {}", total, source_id);
    if let Some(cb) = progress {
        cb.on_source_start(&source_id, total);
    }

    let mut stats = RunStats {
        total_units: total,
        ..Default::default()
    };
    let mut records = Vec::with_capacity(total);
    let mut cancelled = false;
    let mut sink_error: Option<PipelineError> = None;

    for (offset, index) in indices.into_iter().enumerate() {
        let position = offset + 1;

        if cancel.is_some_and(CancelFlag::is_cancelled) {
            warn!(
                "{}: cancelled after {}/{} units",
                source_id,
                records.len(),
                total
            );
            cancelled = true;
            break;
        }

        if let Some(cb) = progress {
            cb.on_unit_start(position, total);
        }

        let unit_start = Instant::now();
        let (title, outcome) = match source.fetch(index).await {
            Ok(unit) => {
                let title = unit.title;
                (title, extractor.extract(index, unit.payload).await)
            }
            Err(e) => (source.fallback_title(index), Err(e)),
        };
        let elapsed_ms = unit_start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(text) => {
                let chars = text.chars().count();
                debug!("{}: unit {} → {} chars in {}ms", source_id, index, chars, elapsed_ms);
                if let Some(cb) = progress {
                    cb.on_unit_complete(position, total, &title, chars);
                }
                stats.succeeded_units += 1;
                stats.total_chars += chars;
                UnitResult::succeeded(index, title, text, elapsed_ms)
            }
            Err(e) => {
                if e.is_no_content() {
                    warn!("{}: {} has no content", source_id, title);
                    stats.empty_units += 1;
                } else {
                    error!("{}: {}", source_id, e);
                }
                if let Some(cb) = progress {
                    cb.on_unit_error(position, total, &title, e.is_no_content(), e.detail());
                }
                stats.failed_units += 1;
                UnitResult::failed(index, title, e, elapsed_ms)
            }
        };

        for sink in sinks.iter_mut() {
            if let Err(e) = sink.write_unit(&result).await {
                sink_error = Some(e);
                break;
            }
        }
        records.push(result.record());

        if sink_error.is_some() {
            break;
        }
    }

    let mut finish_error: Option<PipelineError> = None;
    for sink in sinks.iter_mut() {
        if let Err(e) = sink.finish().await {
            error!("{}: failed to finalise output: {}", source_id, e);
            finish_error.get_or_insert(e);
        }
    }

    if let Some(e) = sink_error.or(finish_error) {
        error!("{}: aborted after {} units: {}", source_id, records.len(), e);
        return Err(e);
    }

    stats.total_duration_ms = run_start.elapsed().as_millis() as u64;
    if let Some(cb) = progress {
        cb.on_source_complete(total, stats.succeeded_units);
    }
    info!(
        "{}: {}/{} units extracted in {}ms",
        source_id, stats.succeeded_units, total, stats.total_duration_ms
    );

    let artifacts = sinks
        .iter()
        .filter_map(|s| s.artifact().map(Path::to_path_buf))
        .collect();

    Ok(SourceReport {
        source: source_id,
        units: records,
        stats,
        artifacts,
        cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::UnitStatus;

    struct CountingSource {
        total: usize,
    }

    #[async_trait]
    impl UnitSource for CountingSource {
        type Payload = usize;

        fn source_id(&self) -> &str {
            "counting"
        }

        fn indices(&self) -> Vec<usize> {
            (1..=self.total).collect()
        }

        async fn fetch(&mut self, index: usize) -> Result<Unit<usize>, UnitError> {
            if index == 4 {
                return Err(UnitError::RenderFailed {
                    index,
                    detail: "bad page".into(),
                });
            }
            Ok(Unit {
                index,
                title: format!("Page {index}"),
                payload: index * 10,
            })
        }
    }

    struct Doubler;

    #[async_trait]
    impl UnitExtractor<usize> for Doubler {
        async fn extract(&self, index: usize, payload: usize) -> Result<String, UnitError> {
            match index {
                2 => Err(UnitError::NoContent { index }),
                _ => Ok((payload * 2).to_string()),
            }
        }
    }

    #[derive(Default)]
    struct MemorySink {
        seen: Vec<(usize, String)>,
        finished: usize,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl UnitSink for MemorySink {
        async fn write_unit(&mut self, unit: &UnitResult) -> Result<(), PipelineError> {
            if self.fail_at == Some(unit.index) {
                return Err(PipelineError::OutputWriteFailed {
                    path: "memory".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.seen.push((unit.index, unit.text.clone()));
            Ok(())
        }

        async fn finish(&mut self) -> Result<(), PipelineError> {
            self.finished += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn every_unit_reaches_every_sink() {
        let mut source = CountingSource { total: 5 };
        let mut a = MemorySink::default();
        let mut b = MemorySink::default();
        let report = {
            let mut sinks: Vec<&mut dyn UnitSink> = vec![&mut a, &mut b];
            run_units(&mut source, &Doubler, &mut sinks, None, None)
                .await
                .unwrap()
        };

        let expected = vec![
            (1, "20".to_string()),
            (2, String::new()),
            (3, "60".to_string()),
            (4, String::new()),
            (5, "100".to_string()),
        ];
        assert_eq!(a.seen, expected);
        assert_eq!(b.seen, expected);
        assert_eq!(a.finished, 1);
        assert_eq!(report.units.len(), 5);
        assert_eq!(report.stats.succeeded_units, 3);
        assert_eq!(report.stats.failed_units, 2);
        assert_eq!(report.stats.empty_units, 1);
        assert_eq!(report.units[3].status, UnitStatus::Failed);
        assert_eq!(report.units[3].title, "Page 4");
    }

    #[tokio::test]
    async fn empty_source_is_no_units() {
        let mut source = CountingSource { total: 0 };
        let mut sink = MemorySink::default();
        let mut sinks: Vec<&mut dyn UnitSink> = vec![&mut sink];
        let err = run_units(&mut source, &Doubler, &mut sinks, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoUnits { .. }));
    }

    #[tokio::test]
    async fn sink_error_aborts_but_finishes_all_sinks() {
        let mut source = CountingSource { total: 5 };
        let mut failing = MemorySink {
            fail_at: Some(3),
            ..Default::default()
        };
        let mut other = MemorySink::default();
        let err = {
            let mut sinks: Vec<&mut dyn UnitSink> = vec![&mut other, &mut failing];
            run_units(&mut source, &Doubler, &mut sinks, None, None)
                .await
                .unwrap_err()
        };
        assert!(matches!(err, PipelineError::OutputWriteFailed { .. }));
        assert_eq!(failing.seen.len(), 2);
        assert_eq!(other.seen.len(), 3);
        assert_eq!(failing.finished, 1);
        assert_eq!(other.finished, 1);
    }

    #[tokio::test]
    async fn cancel_stops_between_units() {
        let flag = CancelFlag::new();
        flag.cancel();
        let mut source = CountingSource { total: 3 };
        let mut sink = MemorySink::default();
        let report = {
            let mut sinks: Vec<&mut dyn UnitSink> = vec![&mut sink];
            run_units(&mut source, &Doubler, &mut sinks, None, Some(&flag))
                .await
                .unwrap()
        };
        assert!(report.cancelled);
        assert!(report.units.is_empty());
        assert_eq!(sink.finished, 1);
    }
}
