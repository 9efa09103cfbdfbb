//! Video-platform collaborator: URL resolution and subtitle download.
//!
//! The pipeline only needs three things from the platform, captured by
//! [`VideoPlatform`]. [`YtDlp`] implements them by shelling out to the
//! `yt-dlp` executable; tests substitute an in-process fake.
//!
//! Downloads go to a path the caller chooses up front
//! (`{dest_dir}/{stem}.{lang}.{ext}`), so the downloaded file never has to
//! be found by guessing at names the tool derived from the video title.

use crate::config::SubtitleConfig;
use crate::error::PlatformError;
use crate::subtitles::SubtitleFormat;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// One resolvable video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRef {
    pub id: Option<String>,
    pub url: String,
    /// Known when the listing carried it; otherwise fetched on demand.
    pub title: Option<String>,
}

/// What a URL resolved to: one video, or a playlist in playlist order.
#[derive(Debug, Clone)]
pub struct MediaCollection {
    pub title: String,
    pub is_playlist: bool,
    pub entries: Vec<VideoRef>,
}

/// Where and how to download one video's subtitles.
#[derive(Debug, Clone)]
pub struct SubtitleRequest {
    /// Preferred languages, first match wins.
    pub languages: Vec<String>,
    pub format: SubtitleFormat,
    pub dest_dir: PathBuf,
    /// File stem; the platform appends `.{lang}.{ext}`.
    pub stem: String,
}

#[async_trait]
pub trait VideoPlatform: Send + Sync {
    /// Resolve a URL to its videos without downloading anything.
    async fn resolve(&self, url: &str) -> Result<MediaCollection, PlatformError>;

    /// Human title of one video.
    async fn video_title(&self, video: &VideoRef) -> Result<String, PlatformError>;

    /// Download subtitles as requested. `Ok(None)` means the video has no
    /// captions in any requested language.
    async fn download_subtitles(
        &self,
        video: &VideoRef,
        request: &SubtitleRequest,
    ) -> Result<Option<PathBuf>, PlatformError>;
}

/// [`VideoPlatform`] backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
    user_agent: Option<String>,
    referer: Option<String>,
    timeout: Duration,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            user_agent: None,
            referer: None,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn from_config(config: &SubtitleConfig) -> Self {
        Self {
            binary: config.yt_dlp_bin.clone(),
            user_agent: config.user_agent.clone(),
            referer: config.referer.clone(),
            timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec!["--no-warnings".to_string(), "--quiet".to_string()];
        if let Some(ref ua) = self.user_agent {
            args.push("--add-header".into());
            args.push(format!("User-Agent:{ua}"));
        }
        if let Some(ref referer) = self.referer {
            args.push("--add-header".into());
            args.push(format!("Referer:{referer}"));
        }
        args
    }

    async fn run(&self, args: &[String]) -> Result<String, PlatformError> {
        debug!("{} {}", self.binary.display(), args.join(" "));
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| PlatformError::Timeout {
                binary: self.binary.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| PlatformError::Launch {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(PlatformError::Failed {
                binary: self.binary.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[derive(Deserialize)]
struct InfoJson {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    #[serde(default)]
    entries: Vec<Option<InfoJson>>,
}

/// Turn `yt-dlp -J --flat-playlist` output into a [`MediaCollection`].
///
/// Playlist entries without a URL are addressed by their watch URL.
pub fn parse_info_json(requested_url: &str, json: &str) -> Result<MediaCollection, PlatformError> {
    let info: InfoJson =
        serde_json::from_str(json).map_err(|e| PlatformError::InvalidMetadata(e.to_string()))?;

    if info.kind.as_deref() == Some("playlist") {
        let entries = info
            .entries
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let url = entry.url.or(entry.webpage_url).or_else(|| {
                    entry
                        .id
                        .as_ref()
                        .map(|id| format!("https://www.youtube.com/watch?v={id}"))
                })?;
                Some(VideoRef {
                    id: entry.id,
                    url,
                    title: entry.title,
                })
            })
            .collect();
        return Ok(MediaCollection {
            title: info.title.unwrap_or_else(|| "Playlist".to_string()),
            is_playlist: true,
            entries,
        });
    }

    let title = info.title.clone();
    Ok(MediaCollection {
        title: title.clone().unwrap_or_else(|| "Unknown".to_string()),
        is_playlist: false,
        entries: vec![VideoRef {
            id: info.id,
            url: info
                .webpage_url
                .unwrap_or_else(|| requested_url.to_string()),
            title,
        }],
    })
}

/// Locate the file a download produced: the first requested language that
/// exists, else any `{stem}.*` file with a subtitle extension.
pub fn find_subtitle_file(request: &SubtitleRequest) -> std::io::Result<Option<PathBuf>> {
    let ext = request.format.extension();
    for lang in &request.languages {
        let candidate = request
            .dest_dir
            .join(format!("{}.{}.{}", request.stem, lang, ext));
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
    }

    let prefix = format!("{}.", request.stem);
    let mut found: Vec<PathBuf> = std::fs::read_dir(&request.dest_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            let name_ok = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix));
            let ext_ok = path
                .extension()
                .and_then(|e| e.to_str())
                .and_then(SubtitleFormat::from_extension)
                .is_some();
            name_ok && ext_ok
        })
        .collect();
    found.sort();
    Ok(found.into_iter().next())
}

fn output_template(dest_dir: &Path, stem: &str) -> String {
    dest_dir
        .join(format!("{stem}.%(ext)s"))
        .to_string_lossy()
        .into_owned()
}

#[async_trait]
impl VideoPlatform for YtDlp {
    async fn resolve(&self, url: &str) -> Result<MediaCollection, PlatformError> {
        let mut args = self.base_args();
        args.extend(["--flat-playlist", "-J"].map(String::from));
        args.push(url.to_string());
        let json = self.run(&args).await?;
        let collection = parse_info_json(url, &json)?;
        debug!(
            "{} resolved to {} video(s) (playlist: {})",
            url,
            collection.entries.len(),
            collection.is_playlist
        );
        Ok(collection)
    }

    async fn video_title(&self, video: &VideoRef) -> Result<String, PlatformError> {
        if let Some(ref title) = video.title {
            return Ok(title.clone());
        }
        let mut args = self.base_args();
        args.extend(["--skip-download", "--no-playlist", "--print", "title"].map(String::from));
        args.push(video.url.clone());
        let title = self.run(&args).await?.trim().to_string();
        Ok(if title.is_empty() {
            "Unknown".to_string()
        } else {
            title
        })
    }

    async fn download_subtitles(
        &self,
        video: &VideoRef,
        request: &SubtitleRequest,
    ) -> Result<Option<PathBuf>, PlatformError> {
        let mut args = self.base_args();
        args.extend(
            [
                "--skip-download",
                "--no-playlist",
                "--write-subs",
                "--write-auto-subs",
                "--sub-format",
                request.format.extension(),
                "--sub-langs",
            ]
            .map(String::from),
        );
        args.push(request.languages.join(","));
        args.push("-o".to_string());
        args.push(output_template(&request.dest_dir, &request.stem));
        args.push(video.url.clone());
        self.run(&args).await?;
        Ok(find_subtitle_file(request)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_entries_keep_order_and_fallback_urls() {
        let json = r#"{"_type":"playlist","title":"Course","entries":[
            {"id":"a1","url":"https://www.youtube.com/watch?v=a1","title":"One"},
            null,
            {"id":"b2","title":"Two"}
        ]}"#;
        let c = parse_info_json("https://example.test/list", json).unwrap();
        assert!(c.is_playlist);
        assert_eq!(c.title, "Course");
        assert_eq!(c.entries.len(), 2);
        assert_eq!(c.entries[0].title.as_deref(), Some("One"));
        assert_eq!(c.entries[1].url, "https://www.youtube.com/watch?v=b2");
    }

    #[test]
    fn single_video_is_one_entry() {
        let json = r#"{"_type":"video","id":"x","title":"Talk","webpage_url":"https://www.youtube.com/watch?v=x"}"#;
        let c = parse_info_json("https://youtu.be/x", json).unwrap();
        assert!(!c.is_playlist);
        assert_eq!(c.title, "Talk");
        assert_eq!(c.entries[0].url, "https://www.youtube.com/watch?v=x");
    }

    #[test]
    fn bad_metadata_is_reported() {
        assert!(matches!(
            parse_info_json("u", "not json"),
            Err(PlatformError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn subtitle_file_prefers_requested_language() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("unit_1.de.srv3"), "<x/>").unwrap();
        std::fs::write(dir.path().join("unit_1.en.srv3"), "<x/>").unwrap();
        std::fs::write(dir.path().join("unit_2.en.srv3"), "<x/>").unwrap();
        let mut req = SubtitleRequest {
            languages: vec!["en".into()],
            format: SubtitleFormat::Srv3,
            dest_dir: dir.path().to_path_buf(),
            stem: "unit_1".into(),
        };
        assert_eq!(
            find_subtitle_file(&req).unwrap(),
            Some(dir.path().join("unit_1.en.srv3"))
        );

        req.languages = vec!["fr".into()];
        assert_eq!(
            find_subtitle_file(&req).unwrap(),
            Some(dir.path().join("unit_1.de.srv3"))
        );

        req.stem = "unit_3".into();
        assert_eq!(find_subtitle_file(&req).unwrap(), None);
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_error() {
        let p = YtDlp::new("/nonexistent/yt-dlp");
        let err = p.resolve("https://www.youtube.com/watch?v=x").await.unwrap_err();
        assert!(matches!(err, PlatformError::Launch { .. }));
    }
}
