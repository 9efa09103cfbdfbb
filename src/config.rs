//! Configuration types for the extraction pipelines.
//!
//! Every run receives its settings explicitly: PDF pipelines take a
//! [`PipelineConfig`] (built via [`PipelineConfigBuilder`]), subtitle jobs a
//! [`SubtitleConfig`]. Nothing is read from globals, so two runs with
//! different settings can share a process.

use crate::error::PipelineError;
use crate::pipeline::recognize::Recognizer;
use crate::progress::{CancelFlag, ProgressCallback};
use crate::subtitles::SubtitleFormat;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Browser user agent sent to the video platform.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Configuration for PDF extraction, re-splitting and chapter export.
///
/// # Example
/// ```rust
/// use pagewise::{Engine, OutputFormat, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .input_dir("scans")
///     .language_code("fa")
///     .engine(Engine::Tesseract)
///     .output_format(OutputFormat::Both)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 300);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Directory scanned for Sources. Default: `./input`.
    pub input_dir: PathBuf,

    /// Directory receiving text and EPUB files. Default: `./output`.
    pub output_dir: PathBuf,

    /// Two-letter language code of the documents. Default: `en`.
    ///
    /// Mapped to the engine's own code (tesseract wants `eng`, `fas`, …).
    /// Values longer than two letters are passed through untouched, so
    /// `eng+fas` works for mixed-language scans.
    pub language_code: String,

    /// Rendering DPI for OCR. Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Longest-edge cap in pixels, applied after the DPI scale. Default: 5000.
    ///
    /// A poster-sized page at 300 DPI would otherwise allocate hundreds of
    /// megabytes for a single bitmap.
    pub max_rendered_pixels: u32,

    /// Pages per output file when re-splitting. Default: 20.
    pub units_per_batch: usize,

    /// How page text is obtained. Default: [`Engine::Tesseract`].
    pub engine: Engine,

    /// Which artifacts to write per Source. Default: [`OutputFormat::Text`].
    pub output_format: OutputFormat,

    /// Chapter layout of the EPUB. Default: [`EpubLayout::PerUnit`].
    pub epub_layout: EpubLayout,

    /// Section framing in the flat text file. Default: [`PageSeparator::Delimiter`].
    pub page_separator: PageSeparator,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// EPUB creator. Default: `OCR Extracted`.
    pub book_author: String,

    /// EPUB language; falls back to `language_code`.
    pub book_language: Option<String>,

    /// Tesseract executable. Default: `tesseract` (looked up on `PATH`).
    pub tesseract_bin: PathBuf,

    /// Per-page recognition timeout in seconds. Default: 120.
    pub recognize_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Vision model identifier (engine = Vision).
    pub model: Option<String>,

    /// Vision provider name, e.g. "openai", "ollama".
    pub provider_name: Option<String>,

    /// Pre-constructed vision provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the vision model. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the vision model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Retries per page on a vision call failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom transcription prompt for the vision model.
    pub system_prompt: Option<String>,

    /// Pre-built recognizer. Overrides `engine` for rendered pages.
    pub recognizer: Option<Arc<dyn Recognizer>>,

    /// Per-unit progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative stop signal, checked between units.
    pub cancel: Option<CancelFlag>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./input"),
            output_dir: PathBuf::from("./output"),
            language_code: "en".to_string(),
            dpi: 300,
            max_rendered_pixels: 5000,
            units_per_batch: 20,
            engine: Engine::default(),
            output_format: OutputFormat::default(),
            epub_layout: EpubLayout::default(),
            page_separator: PageSeparator::default(),
            pages: PageSelection::default(),
            password: None,
            book_author: "OCR Extracted".to_string(),
            book_language: None,
            tesseract_bin: PathBuf::from("tesseract"),
            recognize_timeout_secs: 120,
            download_timeout_secs: 120,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            system_prompt: None,
            recognizer: None,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("language_code", &self.language_code)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("units_per_batch", &self.units_per_batch)
            .field("engine", &self.engine)
            .field("output_format", &self.output_format)
            .field("epub_layout", &self.epub_layout)
            .field("page_separator", &self.page_separator)
            .field("pages", &self.pages)
            .field("tesseract_bin", &self.tesseract_bin)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("recognizer", &self.recognizer.as_ref().map(|r| r.name()))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Language written into EPUB metadata.
    pub fn epub_language(&self) -> &str {
        self.book_language.as_deref().unwrap_or(&self.language_code)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn language_code(mut self, code: impl Into<String>) -> Self {
        self.config.language_code = code.into().trim().to_lowercase();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    /// Batch size for the re-splitter. `0` is rejected by [`Self::build`].
    pub fn units_per_batch(mut self, n: usize) -> Self {
        self.config.units_per_batch = n;
        self
    }

    pub fn engine(mut self, engine: Engine) -> Self {
        self.config.engine = engine;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn epub_layout(mut self, layout: EpubLayout) -> Self {
        self.config.epub_layout = layout;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn book_author(mut self, author: impl Into<String>) -> Self {
        self.config.book_author = author.into();
        self
    }

    pub fn book_language(mut self, lang: impl Into<String>) -> Self {
        self.config.book_language = Some(lang.into());
        self
    }

    pub fn tesseract_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_bin = path.into();
        self
    }

    pub fn recognize_timeout_secs(mut self, secs: u64) -> Self {
        self.config.recognize_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.config.recognizer = Some(recognizer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel(mut self, flag: CancelFlag) -> Self {
        self.config.cancel = Some(flag);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(PipelineError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.units_per_batch == 0 {
            return Err(PipelineError::InvalidConfig(
                "Units per batch must be ≥ 1".into(),
            ));
        }
        if c.language_code.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Language code must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Settings for subtitle jobs (CLI `subs` and the HTTP service).
#[derive(Debug, Clone)]
pub struct SubtitleConfig {
    /// Subtitle languages, in preference order. Default: `["en"]`.
    pub languages: Vec<String>,
    /// Format requested from the platform. Default: SRV3.
    pub format: SubtitleFormat,
    /// yt-dlp executable. Default: `yt-dlp`.
    pub yt_dlp_bin: PathBuf,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    /// Timeout for a single platform command in seconds. Default: 300.
    pub command_timeout_secs: u64,
    /// Parent of the per-request scratch directory; system temp when `None`.
    pub scratch_root: Option<PathBuf>,
    pub cancel: Option<CancelFlag>,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            format: SubtitleFormat::Srv3,
            yt_dlp_bin: PathBuf::from("yt-dlp"),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            referer: Some("https://www.youtube.com/".to_string()),
            command_timeout_secs: 300,
            scratch_root: None,
            cancel: None,
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How page text is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Engine {
    /// Render the page and run tesseract on it. (default)
    #[default]
    Tesseract,
    /// Render the page and send it to a vision model via edgequake-llm.
    Vision,
    /// Read the PDF's embedded text layer; no rendering, no OCR.
    TextLayer,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Engine::Tesseract => "tesseract",
            Engine::Vision => "vision",
            Engine::TextLayer => "text-layer",
        })
    }
}

/// Which artifacts are written per Source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Flat, page-delimited text file. (default)
    #[default]
    Text,
    /// EPUB only.
    Epub,
    /// Text file and EPUB.
    Both,
}

impl OutputFormat {
    pub fn wants_text(self) -> bool {
        matches!(self, OutputFormat::Text | OutputFormat::Both)
    }

    pub fn wants_epub(self) -> bool {
        matches!(self, OutputFormat::Epub | OutputFormat::Both)
    }
}

/// Chapter layout of generated EPUBs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EpubLayout {
    /// One chapter per page, titled "Page N". (default)
    #[default]
    PerUnit,
    /// One "Full Text" chapter with `[Page N]` blocks.
    SingleFlow,
}

/// Specifies which pages of the PDF to extract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Extract all pages (default).
    #[default]
    All,
    /// Extract a single page (1-indexed).
    Single(usize),
    /// Extract a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Extract specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into sorted, deduplicated 1-based page numbers
    /// that exist in a document of `total_pages`.
    /// Pages outside the document are dropped with a warning.
    pub fn to_page_numbers(&self, total_pages: usize) -> Vec<usize> {
        if let Some(note) = self.narrowing(total_pages) {
            warn!("{}", note);
        }
        let mut pages: Vec<usize> = match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![*p]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1);
                let e = (*end).min(total_pages);
                (s..=e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .copied()
                .filter(|&p| p >= 1 && p <= total_pages)
                .collect(),
        };
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    /// Describe how the selection shrinks in a document of `total_pages`,
    /// or `None` when every requested page exists.
    pub fn narrowing(&self, total_pages: usize) -> Option<String> {
        match self {
            PageSelection::All => None,
            PageSelection::Single(p) if *p == 0 || *p > total_pages => Some(format!(
                "page {p} does not exist (document has {total_pages} pages)"
            )),
            PageSelection::Range(start, end) if *start == 0 || *end > total_pages => {
                let s = (*start).max(1);
                let e = (*end).min(total_pages);
                if s > e {
                    Some(format!(
                        "pages {start}-{end} are all outside the document ({total_pages} pages)"
                    ))
                } else {
                    Some(format!(
                        "pages {start}-{end} narrowed to {s}-{e} (document has {total_pages} pages)"
                    ))
                }
            }
            PageSelection::Set(pages) => {
                let missing: Vec<String> = pages
                    .iter()
                    .filter(|&&p| p == 0 || p > total_pages)
                    .map(usize::to_string)
                    .collect();
                (!missing.is_empty()).then(|| {
                    format!(
                        "skipping pages {} (document has {total_pages} pages)",
                        missing.join(", ")
                    )
                })
            }
            _ => None,
        }
    }
}

/// How each page is framed in the flat text file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// `\n--- Page N ---\n{text}\n`, re-splittable by [`crate::split`]. (default)
    #[default]
    Delimiter,
    /// `[Page N]\n{trimmed text}\n\n`, the single-flow EPUB framing.
    Tagged,
    /// Raw page text and a line break (chapter export).
    None,
}

impl PageSeparator {
    /// Render one page section (page number is 1-indexed).
    pub fn render(&self, page_num: usize, text: &str) -> String {
        match self {
            PageSeparator::Delimiter => format!("\n--- Page {page_num} ---\n{text}\n"),
            PageSeparator::Tagged => format!("[Page {page_num}]\n{}\n\n", text.trim()),
            PageSeparator::None => format!("{text}\n"),
        }
    }
}
