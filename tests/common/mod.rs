//! Shared fixtures for integration tests: an in-process video platform and
//! in-memory page sources.

#![allow(dead_code)]

use async_trait::async_trait;
use pagewise::error::{PlatformError, UnitError};
use pagewise::pipeline::{Unit, UnitExtractor, UnitSource};
use pagewise::subtitles::platform::{MediaCollection, SubtitleRequest, VideoPlatform, VideoRef};
use std::collections::HashMap;
use std::path::PathBuf;

pub const JSON3_HELLO: &str = r#"{"events":[
    {"tStartMs":0,"segs":[{"utf8":"hello"},{"utf8":" world"}]},
    {"tStartMs":1500,"segs":[{"utf8":"\n"}]},
    {"tStartMs":2000,"segs":[{"utf8":"it's"},{"utf8":" fine"}]}
]}"#;

pub const SRV3_HELLO: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<timedtext format="3">
<body>
<p t="0" d="1500"><s>hello</s><s> world</s></p>
<p t="2000" d="1000"><s>it&#39;s</s><s> fine</s></p>
</body>
</timedtext>
"#;

/// One video known to [`FakePlatform`].
#[derive(Clone)]
pub struct FakeVideo {
    pub id: String,
    pub title: String,
    /// `(extension, document)`; `None` means no captions.
    pub subtitles: Option<(&'static str, String)>,
}

impl FakeVideo {
    pub fn with_json3(id: &str, title: &str, doc: &str) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subtitles: Some(("json3", doc.into())),
        }
    }

    pub fn with_srv3(id: &str, title: &str, doc: &str) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subtitles: Some(("srv3", doc.into())),
        }
    }

    pub fn without_captions(id: &str, title: &str) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subtitles: None,
        }
    }

    fn url(&self) -> String {
        format!("https://video.test/watch?v={}", self.id)
    }
}

/// [`VideoPlatform`] answering from memory. Resolving any URL containing
/// `list=` yields a playlist of every video; any other URL yields the first
/// video alone. Subtitle files are written where the request asks.
#[derive(Clone, Default)]
pub struct FakePlatform {
    pub videos: Vec<FakeVideo>,
    pub fail_resolve: bool,
}

impl FakePlatform {
    pub fn new(videos: Vec<FakeVideo>) -> Self {
        Self {
            videos,
            fail_resolve: false,
        }
    }

    fn by_url(&self) -> HashMap<String, FakeVideo> {
        self.videos.iter().map(|v| (v.url(), v.clone())).collect()
    }
}

#[async_trait]
impl VideoPlatform for FakePlatform {
    async fn resolve(&self, url: &str) -> Result<MediaCollection, PlatformError> {
        if self.fail_resolve || self.videos.is_empty() {
            return Err(PlatformError::InvalidMetadata(format!("cannot resolve {url}")));
        }
        let entry = |v: &FakeVideo| VideoRef {
            id: Some(v.id.clone()),
            url: v.url(),
            title: None,
        };
        if url.contains("list=") {
            Ok(MediaCollection {
                title: "Fake playlist".into(),
                is_playlist: true,
                entries: self.videos.iter().map(entry).collect(),
            })
        } else {
            let first = &self.videos[0];
            Ok(MediaCollection {
                title: first.title.clone(),
                is_playlist: false,
                entries: vec![entry(first)],
            })
        }
    }

    async fn video_title(&self, video: &VideoRef) -> Result<String, PlatformError> {
        self.by_url()
            .get(&video.url)
            .map(|v| v.title.clone())
            .ok_or_else(|| PlatformError::InvalidMetadata(format!("unknown video {}", video.url)))
    }

    async fn download_subtitles(
        &self,
        video: &VideoRef,
        request: &SubtitleRequest,
    ) -> Result<Option<PathBuf>, PlatformError> {
        let videos = self.by_url();
        let Some(found) = videos.get(&video.url) else {
            return Err(PlatformError::InvalidMetadata(format!(
                "unknown video {}",
                video.url
            )));
        };
        let Some((ext, doc)) = &found.subtitles else {
            return Ok(None);
        };
        let lang = request.languages.first().map(String::as_str).unwrap_or("en");
        let path = request
            .dest_dir
            .join(format!("{}.{}.{}", request.stem, lang, ext));
        std::fs::write(&path, doc)?;
        Ok(Some(path))
    }
}

/// Page source over fixed strings. Pages listed in `broken` fail to fetch.
pub struct TextPages {
    pub id: String,
    pub pages: Vec<String>,
    pub broken: Vec<usize>,
}

impl TextPages {
    pub fn new(id: &str, pages: &[&str]) -> Self {
        Self {
            id: id.into(),
            pages: pages.iter().map(|p| p.to_string()).collect(),
            broken: Vec::new(),
        }
    }

    pub fn breaking(mut self, index: usize) -> Self {
        self.broken.push(index);
        self
    }
}

#[async_trait]
impl UnitSource for TextPages {
    type Payload = String;

    fn source_id(&self) -> &str {
        &self.id
    }

    fn indices(&self) -> Vec<usize> {
        (1..=self.pages.len()).collect()
    }

    async fn fetch(&mut self, index: usize) -> Result<Unit<String>, UnitError> {
        if self.broken.contains(&index) {
            return Err(UnitError::RenderFailed {
                index,
                detail: "simulated render failure".into(),
            });
        }
        Ok(Unit {
            index,
            title: format!("Page {index}"),
            payload: self.pages[index - 1].clone(),
        })
    }
}

/// Extractor that returns the payload as the page text.
pub struct Passthrough;

#[async_trait]
impl UnitExtractor<String> for Passthrough {
    async fn extract(&self, index: usize, payload: String) -> Result<String, UnitError> {
        if payload.trim().is_empty() {
            Err(UnitError::NoContent { index })
        } else {
            Ok(payload)
        }
    }
}
