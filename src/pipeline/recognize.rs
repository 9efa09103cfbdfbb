//! Page recognizers: rendered page image → text.
//!
//! [`PageExtractor`] is the pipeline's [`UnitExtractor`] for PDF pages. It
//! passes text-layer payloads straight through and hands rendered images to
//! a [`Recognizer`]: [`TesseractRecognizer`] by default, or
//! [`crate::pipeline::llm::VisionRecognizer`].

use crate::config::{Engine, PipelineConfig};
use crate::error::{PipelineError, UnitError};
use crate::pipeline::render::PagePayload;
use crate::pipeline::{encode, llm, postprocess, UnitExtractor};
use async_trait::async_trait;
use image::DynamicImage;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;

/// Image-to-text capability used for rendered pages.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Short name for logs ("tesseract", "vision").
    fn name(&self) -> &str;

    /// Recognise one page. `index` is the 1-based page number.
    async fn recognize(&self, index: usize, image: &DynamicImage) -> Result<String, UnitError>;
}

/// Map a two-letter language code to tesseract's traineddata name.
///
/// Codes that are not two letters (`eng+fas`, `chi_tra`) pass through.
pub fn tesseract_language(code: &str) -> String {
    let code = code.trim().to_lowercase();
    let mapped = match code.as_str() {
        "ar" => "ara",
        "de" => "deu",
        "en" => "eng",
        "es" => "spa",
        "fa" => "fas",
        "fr" => "fra",
        "he" => "heb",
        "hi" => "hin",
        "it" => "ita",
        "ja" => "jpn",
        "ko" => "kor",
        "nl" => "nld",
        "pl" => "pol",
        "pt" => "por",
        "ru" => "rus",
        "tr" => "tur",
        "uk" => "ukr",
        "ur" => "urd",
        "zh" => "chi_sim",
        _ => return code,
    };
    mapped.to_string()
}

/// Runs the `tesseract` executable on each page.
pub struct TesseractRecognizer {
    binary: PathBuf,
    language: String,
    timeout: Duration,
}

impl TesseractRecognizer {
    /// `language` is a two-letter code or a tesseract language string such as `eng+fas`.
    pub fn new(binary: impl Into<PathBuf>, language: &str, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            language: tesseract_language(language),
            timeout,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

#[async_trait]
impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, index: usize, image: &DynamicImage) -> Result<String, UnitError> {
        let failed = |detail: String| UnitError::RecognitionFailed { index, detail };

        // Removed when `scratch` drops, on every path out of this function.
        let scratch = write_scratch_png(image).await.map_err(failed)?;

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg(scratch.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| UnitError::Timeout {
                index,
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| failed(format!("failed to launch {}: {e}", self.binary.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract page {} → {} bytes", index, text.len());
        Ok(text)
    }
}

/// PNG-encode `image` into a scratch file on the blocking pool.
async fn write_scratch_png(image: &DynamicImage) -> Result<NamedTempFile, String> {
    let image = image.clone();
    tokio::task::spawn_blocking(move || {
        let png = encode::encode_png(&image).map_err(|e| format!("PNG encoding: {e}"))?;
        drop(image);
        let mut scratch = tempfile::Builder::new()
            .prefix("pagewise-page-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| format!("scratch file: {e}"))?;
        scratch
            .write_all(&png)
            .and_then(|_| scratch.flush())
            .map_err(|e| format!("scratch file: {e}"))?;
        Ok(scratch)
    })
    .await
    .map_err(|e| format!("encoder task: {e}"))?
}

/// Build the recognizer for rendered pages, or `None` for text-layer runs.
pub fn build_recognizer(config: &PipelineConfig) -> Result<Option<Arc<dyn Recognizer>>, PipelineError> {
    if let Some(ref recognizer) = config.recognizer {
        return Ok(Some(Arc::clone(recognizer)));
    }

    match config.engine {
        Engine::TextLayer => Ok(None),
        Engine::Tesseract => Ok(Some(Arc::new(TesseractRecognizer::new(
            &config.tesseract_bin,
            &config.language_code,
            Duration::from_secs(config.recognize_timeout_secs),
        )))),
        Engine::Vision => {
            let provider = llm::resolve_provider(config)?;
            Ok(Some(Arc::new(llm::VisionRecognizer::new(provider, config))))
        }
    }
}

/// Extractor for PDF page payloads.
pub struct PageExtractor {
    recognizer: Option<Arc<dyn Recognizer>>,
}

impl PageExtractor {
    pub fn new(recognizer: Option<Arc<dyn Recognizer>>) -> Self {
        Self { recognizer }
    }
}

#[async_trait]
impl UnitExtractor<PagePayload> for PageExtractor {
    async fn extract(&self, index: usize, payload: PagePayload) -> Result<String, UnitError> {
        let raw = match payload {
            PagePayload::Text(text) => text,
            PagePayload::Image(image) => match &self.recognizer {
                Some(recognizer) => recognizer.recognize(index, &image).await?,
                None => {
                    return Err(UnitError::RecognitionFailed {
                        index,
                        detail: "page was rendered but no recognizer is configured".into(),
                    })
                }
            },
        };
        Ok(postprocess::clean_page_text(&raw))
    }
}
