//! Streaming subtitle jobs: progress events as they happen.
//!
//! ## Why a channel?
//!
//! A playlist takes minutes. The HTTP service answers immediately and then
//! writes one JSON object per line as the job advances, so the client can
//! show "video 3/12" instead of a spinner. The job runs as a producer task
//! pushing [`JobEvent`]s into a single-consumer channel; the response body
//! is the receiving end.
//!
//! ```text
//! {"type":"progress","message":"📋 Found playlist with 2 videos","current":0,"total":2}
//! {"type":"progress","message":"⏳ Processing video 1/2...","current":0,"total":2}
//! ...
//! {"type":"complete","success":true,"title":"Playlist: 2 videos","text":"…","video_count":2,"message":"…"}
//! ```
//!
//! When the consumer goes away (client disconnect) the next send fails, the
//! job's cancel flag is raised, and it stops before the next video.

use crate::config::SubtitleConfig;
use crate::progress::{CancelFlag, ExtractionProgressCallback, ProgressCallback};
use crate::subtitles::job::{resolve_collection, run_subtitle_job};
use crate::subtitles::platform::VideoPlatform;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, error};

/// One line of the NDJSON progress feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress {
        message: String,
        current: usize,
        total: usize,
    },
    Complete {
        success: bool,
        title: String,
        text: String,
        video_count: usize,
        message: String,
    },
    Error {
        message: String,
    },
}

impl JobEvent {
    pub fn progress(message: impl Into<String>, current: usize, total: usize) -> Self {
        JobEvent::Progress {
            message: message.into(),
            current,
            total,
        }
    }

    /// `true` for the event that ends a stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress { .. })
    }

    /// Serialise as one NDJSON line, newline included.
    pub fn to_ndjson_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"event serialisation failed: {e}"}}"#)
        });
        line.push('\n');
        line
    }
}

/// A boxed stream of job events.
pub type EventStream = Pin<Box<dyn Stream<Item = JobEvent> + Send>>;

/// First 50 characters, for progress lines.
fn short_title(title: &str) -> String {
    title.chars().take(50).collect()
}

/// Progress callback that forwards unit events into the channel.
struct ChannelProgress {
    tx: UnboundedSender<JobEvent>,
    cancel: CancelFlag,
}

impl ChannelProgress {
    fn send(&self, event: JobEvent) {
        if self.tx.send(event).is_err() && !self.cancel.is_cancelled() {
            debug!("Event consumer dropped; cancelling job");
            self.cancel.cancel();
        }
    }
}

impl ExtractionProgressCallback for ChannelProgress {
    fn on_unit_start(&self, position: usize, total_units: usize) {
        self.send(JobEvent::progress(
            format!("⏳ Processing video {position}/{total_units}..."),
            position - 1,
            total_units,
        ));
    }

    fn on_unit_fetching(&self, position: usize, total_units: usize, title: &str) {
        self.send(JobEvent::progress(
            format!("📥 Downloading: {}...", short_title(title)),
            position - 1,
            total_units,
        ));
    }

    fn on_unit_complete(&self, position: usize, total_units: usize, title: &str, _chars: usize) {
        self.send(JobEvent::progress(
            format!("✅ Completed: {}...", short_title(title)),
            position,
            total_units,
        ));
    }
}

/// Start a subtitle job for `url` and return its event feed.
///
/// The stream always ends with exactly one terminal event: `complete` on
/// success (even when some videos had no subtitles) or `error`. It ends
/// without a terminal event only if the consumer stopped listening.
///
/// Every stream gets its own cancel flag; any flag in `config` is replaced,
/// so one disconnected client never cancels another request's job.
pub fn subtitle_event_stream(
    url: String,
    platform: Arc<dyn VideoPlatform>,
    mut config: SubtitleConfig,
) -> EventStream {
    let (tx, rx) = unbounded_channel();
    let cancel = CancelFlag::new();
    config.cancel = Some(cancel.clone());

    tokio::spawn(async move {
        let progress = Arc::new(ChannelProgress {
            tx: tx.clone(),
            cancel,
        });

        let collection = match resolve_collection(platform.as_ref(), &url).await {
            Ok(c) => c,
            Err(e) => {
                error!("{}: {}", url, e);
                let _ = tx.send(JobEvent::Error {
                    message: e.to_string(),
                });
                return;
            }
        };

        let count = collection.entries.len();
        progress.send(if collection.is_playlist {
            JobEvent::progress(format!("📋 Found playlist with {count} videos"), 0, count)
        } else {
            JobEvent::progress("🎥 Processing single video...", 0, 1)
        });

        let outcome = run_subtitle_job(
            platform,
            &url,
            collection,
            &config,
            Some(progress as ProgressCallback),
            &mut [],
        )
        .await;

        let event = match outcome {
            Ok(output) if output.report.cancelled => {
                debug!("{}: job cancelled, no completion event", url);
                return;
            }
            Ok(output) => JobEvent::Complete {
                success: true,
                message: format!(
                    "✨ Completed! Extracted subtitles from {} video(s)",
                    output.video_count
                ),
                title: output.title,
                text: output.text,
                video_count: output.video_count,
            },
            Err(e) => {
                error!("{}: {}", url, e);
                JobEvent::Error {
                    message: e.to_string(),
                }
            }
        };
        let _ = tx.send(event);
    });

    Box::pin(UnboundedReceiverStream::new(rx))
}
