//! Subtitle job: a URL's videos through the unit pipeline into one transcript.
//!
//! Each video is a unit. Fetching a unit asks the platform for the title and
//! downloads the captions into a scratch directory owned by that unit; the
//! directory is removed as soon as the unit's payload is dropped, on success
//! and failure alike. The whole job runs inside a per-request scratch root
//! that is removed when the job returns.

use crate::config::SubtitleConfig;
use crate::error::{PipelineError, SubtitleError, UnitError};
use crate::output::SourceReport;
use crate::pipeline::sink::TranscriptSink;
use crate::pipeline::{run_units, Unit, UnitExtractor, UnitSink, UnitSource};
use crate::progress::ProgressCallback;
use crate::subtitles::platform::{MediaCollection, SubtitleRequest, VideoPlatform, VideoRef};
use crate::subtitles::{extract_text, SubtitleFormat};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

/// Check the URL and ask the platform what it points to.
///
/// # Errors
/// - [`PipelineError::InvalidInput`] for anything but an absolute HTTP(S) URL
/// - [`PipelineError::ResolveFailed`] when the platform cannot resolve it
pub async fn resolve_collection(
    platform: &dyn VideoPlatform,
    url: &str,
) -> Result<MediaCollection, PipelineError> {
    let url = url.trim();
    let valid = reqwest::Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false);
    if !valid {
        return Err(PipelineError::InvalidInput {
            input: url.to_string(),
        });
    }

    let collection = platform
        .resolve(url)
        .await
        .map_err(|e| PipelineError::ResolveFailed {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
    info!(
        "{} → {} ({} video(s))",
        url,
        collection.title,
        collection.entries.len()
    );
    Ok(collection)
}

/// Downloaded captions of one video. Dropping it removes the unit's scratch
/// directory.
pub struct SubtitlePayload {
    pub path: Option<PathBuf>,
    _dir: TempDir,
}

/// [`UnitSource`] over the entries of a [`MediaCollection`].
pub struct VideoSource {
    platform: Arc<dyn VideoPlatform>,
    source_id: String,
    entries: Vec<VideoRef>,
    languages: Vec<String>,
    format: SubtitleFormat,
    scratch: TempDir,
    progress: Option<ProgressCallback>,
}

impl VideoSource {
    pub fn new(
        platform: Arc<dyn VideoPlatform>,
        source_id: impl Into<String>,
        entries: Vec<VideoRef>,
        config: &SubtitleConfig,
        progress: Option<ProgressCallback>,
    ) -> Result<Self, PipelineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pagewise-subs-");
        let scratch = match config.scratch_root {
            Some(ref root) => {
                std::fs::create_dir_all(root).map_err(|source| PipelineError::OutputWriteFailed {
                    path: root.clone(),
                    source,
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| PipelineError::Internal(format!("cannot create scratch directory: {e}")))?;

        Ok(Self {
            platform,
            source_id: source_id.into(),
            entries,
            languages: config.languages.clone(),
            format: config.format,
            scratch,
            progress,
        })
    }
}

#[async_trait]
impl UnitSource for VideoSource {
    type Payload = SubtitlePayload;

    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn indices(&self) -> Vec<usize> {
        (1..=self.entries.len()).collect()
    }

    fn fallback_title(&self, index: usize) -> String {
        format!("Video {index}")
    }

    async fn fetch(&mut self, index: usize) -> Result<Unit<SubtitlePayload>, UnitError> {
        let failed = |detail: String| UnitError::FetchFailed { index, detail };
        let video = self
            .entries
            .get(index - 1)
            .ok_or_else(|| failed("no such entry".into()))?;

        let title = self
            .platform
            .video_title(video)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if let Some(ref cb) = self.progress {
            cb.on_unit_fetching(index, self.entries.len(), &title);
        }

        let dir = tempfile::Builder::new()
            .prefix(&format!("unit_{index}_"))
            .tempdir_in(self.scratch.path())
            .map_err(|e| failed(format!("scratch directory: {e}")))?;
        let request = SubtitleRequest {
            languages: self.languages.clone(),
            format: self.format,
            dest_dir: dir.path().to_path_buf(),
            stem: format!("unit_{index}"),
        };
        let path = self
            .platform
            .download_subtitles(video, &request)
            .await
            .map_err(|e| failed(e.to_string()))?;
        debug!("video {} subtitles: {:?}", index, path);

        Ok(Unit {
            index,
            title,
            payload: SubtitlePayload { path, _dir: dir },
        })
    }
}

/// [`UnitExtractor`] that parses downloaded captions.
///
/// A video without captions, or whose captions hold no words, is
/// [`UnitError::NoContent`]; a document that cannot be parsed is
/// [`UnitError::ParseFailed`].
pub struct SubtitleExtractor;

#[async_trait]
impl UnitExtractor<SubtitlePayload> for SubtitleExtractor {
    async fn extract(&self, index: usize, payload: SubtitlePayload) -> Result<String, UnitError> {
        let Some(ref path) = payload.path else {
            return Err(UnitError::NoContent { index });
        };
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| UnitError::ParseFailed {
                index,
                detail: format!("{}: {e}", path.display()),
            })?;
        match extract_text(&content) {
            Ok(text) => Ok(text),
            Err(SubtitleError::NoText { .. }) => Err(UnitError::NoContent { index }),
            Err(e) => Err(UnitError::ParseFailed {
                index,
                detail: e.to_string(),
            }),
        }
    }
}

/// Result of a subtitle job.
#[derive(Debug, Clone)]
pub struct SubtitleJobOutput {
    /// `Playlist: N videos`, or the single video's title.
    pub title: String,
    /// Combined transcript.
    pub text: String,
    pub video_count: usize,
    pub report: SourceReport,
}

impl SubtitleJobOutput {
    /// At least one video produced text.
    pub fn has_content(&self) -> bool {
        self.report.stats.succeeded_units > 0
    }
}

/// Run every video of `collection` in order and build the combined
/// transcript. `extra_sinks` receive every unit too (per-video files).
pub async fn run_subtitle_job(
    platform: Arc<dyn VideoPlatform>,
    source_id: &str,
    collection: MediaCollection,
    config: &SubtitleConfig,
    progress: Option<ProgressCallback>,
    extra_sinks: &mut [&mut dyn UnitSink],
) -> Result<SubtitleJobOutput, PipelineError> {
    let video_count = collection.entries.len();
    let mut source = VideoSource::new(
        platform,
        source_id,
        collection.entries,
        config,
        progress.clone(),
    )?;
    let mut transcript = TranscriptSink::new();

    let report = {
        let mut sinks: Vec<&mut dyn UnitSink> = Vec::with_capacity(1 + extra_sinks.len());
        sinks.push(&mut transcript);
        for sink in extra_sinks.iter_mut() {
            sinks.push(&mut **sink);
        }
        run_units(
            &mut source,
            &SubtitleExtractor,
            &mut sinks,
            progress.as_ref(),
            config.cancel.as_ref(),
        )
        .await?
    };

    let title = if collection.is_playlist {
        format!("Playlist: {video_count} videos")
    } else {
        collection.title
    };

    Ok(SubtitleJobOutput {
        title,
        text: transcript.text(),
        video_count,
        report,
    })
}
