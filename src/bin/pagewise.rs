//! CLI binary for pagewise.
//!
//! A thin shim over the library crate that maps subcommands and flags to
//! `PipelineConfig` / `SubtitleConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pagewise::chapters::{extract_chapters, ChapterRange};
use pagewise::config::{Engine, EpubLayout, OutputFormat, PageSelection, PageSeparator};
use pagewise::convert::{extract_directory, extract_document, inspect};
use pagewise::output::{BatchReport, SourceReport};
use pagewise::pipeline::sink::{combined_transcript_path, PerUnitFileSink, TranscriptSink};
use pagewise::pipeline::UnitSink;
use pagewise::posts::{export_posts, PostsExport};
use pagewise::progress::{CancelFlag, ExtractionProgressCallback, ProgressCallback};
use pagewise::split::{split_directory, split_file};
use pagewise::subtitles::job::{resolve_collection, run_subtitle_job};
use pagewise::subtitles::platform::{VideoPlatform, YtDlp};
use pagewise::subtitles::SubtitleFormat;
use pagewise::{PipelineConfig, SubtitleConfig};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One progress bar per Source, replaced when the next Source starts.
struct CliProgressCallback {
    bar: Mutex<Option<ProgressBar>>,
    /// Word used in the bar ("pages", "videos").
    noun: &'static str,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(noun: &'static str) -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
            noun,
            errors: AtomicUsize::new(0),
        })
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_source_start(&self, source: &str, total_units: usize) {
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  \
             [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {}  \
             ⏱ {{elapsed_precise}}  ETA {{eta_precise}}  {{msg}}",
            self.noun
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        let bar = ProgressBar::new(total_units as u64);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{source}: {total_units} {}", self.noun))
        ));

        self.errors.store(0, Ordering::SeqCst);
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(bar) {
                old.finish_and_clear();
            }
        }
    }

    fn on_unit_start(&self, position: usize, _total_units: usize) {
        self.with_bar(|bar| bar.set_message(format!("#{position}")));
    }

    fn on_unit_fetching(&self, _position: usize, _total_units: usize, title: &str) {
        let short: String = title.chars().take(40).collect();
        self.with_bar(|bar| bar.set_message(short));
    }

    fn on_unit_complete(&self, position: usize, total_units: usize, title: &str, chars: usize) {
        self.with_bar(|bar| {
            bar.println(format!(
                "  {} {:>4}/{:<4} {:<8}  {}",
                green("✓"),
                position,
                total_units,
                dim(&format!("{chars:>6} chars")),
                dim(title),
            ));
            bar.inc(1);
        });
    }

    fn on_unit_error(
        &self,
        position: usize,
        total_units: usize,
        title: &str,
        no_content: bool,
        error: String,
    ) {
        let mark = if no_content {
            yellow("○")
        } else {
            self.errors.fetch_add(1, Ordering::SeqCst);
            red("✗")
        };
        // Long errors would wrap the bar.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error
        };
        self.with_bar(|bar| {
            bar.println(format!(
                "  {} {:>4}/{:<4} {}  {}",
                mark,
                position,
                total_units,
                dim(title),
                if no_content { dim(&msg) } else { red(&msg) },
            ));
            bar.inc(1);
        });
    }

    fn on_source_complete(&self, total_units: usize, success_count: usize) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_and_clear();
            }
        }
        let missing = total_units.saturating_sub(success_count);
        let failed = self.errors.load(Ordering::SeqCst).min(missing);
        if missing == 0 {
            eprintln!(
                "{} {} {} extracted",
                green("✔"),
                bold(&success_count.to_string()),
                self.noun
            );
        } else {
            eprintln!(
                "{} {}/{} {} extracted  ({} failed, {} empty)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_units,
                self.noun,
                red(&failed.to_string()),
                missing - failed,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR every PDF in ./input to ./output/*.txt (Persian)
  pagewise ocr --lang fa

  # One file, text and EPUB
  pagewise ocr scan.pdf --format both -o books

  # Re-split OCR output into 20-page parts
  pagewise split --input-dir output -o parts

  # Chapters from the text layer
  pagewise chapters book.pdf -c "Introduction=1-38" -c "Growth=39-74"

  # Subtitles of a playlist, one file per video plus a combined transcript
  pagewise subs "https://www.youtube.com/playlist?list=..." -o subs

  # Subtitle API with NDJSON progress
  PORT=8000 pagewise serve

  # WordPress posts to CSV
  pagewise posts https://example.org -o posts.csv

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH          Path to the libpdfium shared library
  OPENAI_API_KEY           Vision engine credentials (also ANTHROPIC_, GEMINI_)
  PORT                     Listening port for `serve` (default 8000)
  RUST_LOG                 Overrides the log filter
"#;

/// Page-by-page extraction: PDF OCR, text re-splitting, subtitles.
#[derive(Parser, Debug)]
#[command(
    name = "pagewise",
    version,
    about = "Page-by-page extraction: PDF OCR to text/EPUB, re-splitting, subtitle transcripts",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAGEWISE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAGEWISE_QUIET")]
    quiet: bool,

    /// Disable progress bars.
    #[arg(long, global = true, env = "PAGEWISE_NO_PROGRESS")]
    no_progress: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long, global = true, env = "PAGEWISE_JSON")]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// OCR PDFs into page-delimited text and/or EPUB.
    Ocr(OcrArgs),
    /// Print PDF metadata without extracting.
    Inspect {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,
        #[arg(long, env = "PAGEWISE_PASSWORD")]
        password: Option<String>,
        /// HTTP download timeout in seconds.
        #[arg(long, env = "PAGEWISE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
        download_timeout: u64,
    },
    /// Re-split page-delimited text files into fixed-size parts.
    Split {
        /// Files to split; every .txt in --input-dir when empty.
        files: Vec<PathBuf>,
        #[arg(long, env = "PAGEWISE_INPUT_DIR", default_value = "./output")]
        input_dir: PathBuf,
        #[arg(short, long, env = "PAGEWISE_OUTPUT_DIR", default_value = "./output_split")]
        output_dir: PathBuf,
        /// Pages per part.
        #[arg(long, env = "PAGEWISE_UNITS_PER_BATCH", default_value_t = 20)]
        per_batch: usize,
    },
    /// Write named page ranges of one PDF to separate text files.
    Chapters(ChapterArgs),
    /// Download subtitles of a video or playlist as text.
    Subs(SubsArgs),
    /// Export WordPress posts to CSV.
    Posts {
        /// Site root, e.g. https://example.org
        site: String,
        #[arg(short, long, env = "PAGEWISE_POSTS_OUTPUT", default_value = "posts.csv")]
        output: PathBuf,
        #[arg(long, default_value_t = 100)]
        per_page: u32,
        #[arg(long)]
        max_pages: Option<u32>,
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Run the subtitle HTTP API.
    #[cfg(feature = "server")]
    Serve {
        #[arg(long, env = "PAGEWISE_HOST", default_value = "0.0.0.0")]
        host: std::net::IpAddr,
        /// Listening port; falls back to PORT, then 8000.
        #[arg(long, env = "PAGEWISE_PORT")]
        port: Option<u16>,
        #[command(flatten)]
        subtitles: SubtitleArgs,
    },
}

#[derive(Args, Debug)]
struct OcrArgs {
    /// One PDF (path or URL). Every PDF in --input-dir when omitted.
    input: Option<String>,

    #[arg(long, env = "PAGEWISE_INPUT_DIR", default_value = "./input")]
    input_dir: PathBuf,

    #[arg(short, long, env = "PAGEWISE_OUTPUT_DIR", default_value = "./output")]
    output_dir: PathBuf,

    /// Document language (two-letter code, e.g. en, fa).
    #[arg(short, long, env = "PAGEWISE_LANG", default_value = "en")]
    lang: String,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PAGEWISE_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    #[arg(long, env = "PAGEWISE_ENGINE", value_enum, default_value = "tesseract")]
    engine: EngineArg,

    #[arg(long, env = "PAGEWISE_FORMAT", value_enum, default_value = "text")]
    format: FormatArg,

    #[arg(long, env = "PAGEWISE_EPUB_LAYOUT", value_enum, default_value = "per-unit")]
    epub_layout: LayoutArg,

    #[arg(long, env = "PAGEWISE_SEPARATOR", value_enum, default_value = "delimiter")]
    separator: SeparatorArg,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PAGEWISE_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAGEWISE_PASSWORD")]
    password: Option<String>,

    /// EPUB author.
    #[arg(long, env = "PAGEWISE_AUTHOR")]
    author: Option<String>,

    #[arg(long, env = "PAGEWISE_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Vision model ID (engine = vision).
    #[arg(long, env = "PAGEWISE_MODEL")]
    model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama.
    #[arg(long, env = "PAGEWISE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom transcription prompt.
    #[arg(long, env = "PAGEWISE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Per-page recognition timeout in seconds.
    #[arg(long, env = "PAGEWISE_RECOGNIZE_TIMEOUT", default_value_t = 120)]
    recognize_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PAGEWISE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Args, Debug)]
struct ChapterArgs {
    /// PDF path or URL.
    input: String,

    /// Chapter as TITLE=START-END (1-based, inclusive). Repeatable.
    #[arg(short, long = "chapter", required = true)]
    chapters: Vec<ChapterRange>,

    #[arg(short, long, env = "PAGEWISE_OUTPUT_DIR", default_value = "./chapters")]
    output_dir: PathBuf,

    /// `text-layer` reads embedded text; OCR engines render each page.
    #[arg(long, env = "PAGEWISE_ENGINE", value_enum, default_value = "text-layer")]
    engine: EngineArg,

    #[arg(short, long, env = "PAGEWISE_LANG", default_value = "en")]
    lang: String,

    #[arg(long, env = "PAGEWISE_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    #[arg(long, env = "PAGEWISE_PASSWORD")]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct SubsArgs {
    /// Video or playlist URL.
    url: String,

    /// Directory for per-video files and the combined transcript.
    #[arg(short, long, env = "PAGEWISE_OUTPUT_DIR", default_value = "./subtitles")]
    output_dir: PathBuf,

    /// Combined transcript path. Default: `{output_dir}/{title}_combined.txt`.
    #[arg(long)]
    combined: Option<PathBuf>,

    /// Skip the per-video files.
    #[arg(long)]
    no_split: bool,

    #[command(flatten)]
    subtitles: SubtitleArgs,
}

#[derive(Args, Debug, Clone)]
struct SubtitleArgs {
    /// Subtitle language, in preference order. Repeatable.
    #[arg(long = "sub-lang", env = "PAGEWISE_SUB_LANGS", value_delimiter = ',', default_value = "en")]
    languages: Vec<String>,

    /// Subtitle format requested from yt-dlp: json3, srv3, vtt, ttml.
    #[arg(long, env = "PAGEWISE_SUB_FORMAT", default_value = "srv3")]
    sub_format: SubtitleFormat,

    #[arg(long, env = "PAGEWISE_YT_DLP", default_value = "yt-dlp")]
    yt_dlp: PathBuf,

    /// Timeout per yt-dlp call in seconds.
    #[arg(long, env = "PAGEWISE_COMMAND_TIMEOUT", default_value_t = 300)]
    command_timeout: u64,
}

impl SubtitleArgs {
    fn to_config(&self) -> SubtitleConfig {
        SubtitleConfig {
            languages: self.languages.clone(),
            format: self.sub_format,
            yt_dlp_bin: self.yt_dlp.clone(),
            command_timeout_secs: self.command_timeout,
            ..SubtitleConfig::default()
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EngineArg {
    Tesseract,
    Vision,
    TextLayer,
}

impl From<EngineArg> for Engine {
    fn from(v: EngineArg) -> Self {
        match v {
            EngineArg::Tesseract => Engine::Tesseract,
            EngineArg::Vision => Engine::Vision,
            EngineArg::TextLayer => Engine::TextLayer,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Text,
    Epub,
    Both,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Epub => OutputFormat::Epub,
            FormatArg::Both => OutputFormat::Both,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    PerUnit,
    SingleFlow,
}

impl From<LayoutArg> for EpubLayout {
    fn from(v: LayoutArg) -> Self {
        match v {
            LayoutArg::PerUnit => EpubLayout::PerUnit,
            LayoutArg::SingleFlow => EpubLayout::SingleFlow,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SeparatorArg {
    Delimiter,
    Tagged,
    None,
}

impl From<SeparatorArg> for PageSeparator {
    fn from(v: SeparatorArg) -> Self {
        match v {
            SeparatorArg::Delimiter => PageSeparator::Delimiter,
            SeparatorArg::Tagged => PageSeparator::Tagged,
            SeparatorArg::None => PageSeparator::None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the per-unit feedback; library INFO logs
    // would only tear it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    // `serve` has no bar and should log requests.
    #[cfg(feature = "server")]
    let filter = if matches!(cli.command, Command::Serve { .. }) && !cli.quiet && !cli.verbose {
        "info"
    } else {
        filter
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ctrl-C: finish the current unit, finalise outputs, stop ──────────
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", yellow("Interrupted; finishing the current unit…"));
                cancel.cancel();
            }
        });
    }

    let progress = |noun: &'static str| -> Option<ProgressCallback> {
        show_progress.then(|| CliProgressCallback::new(noun) as Arc<dyn ExtractionProgressCallback>)
    };

    match &cli.command {
        Command::Ocr(args) => {
            let config = build_ocr_config(args, progress("pages"), cancel).await?;
            let batch = match &args.input {
                Some(input) => {
                    let report = extract_document(input, &config)
                        .await
                        .with_context(|| format!("Extraction of {input} failed"))?;
                    BatchReport {
                        processed: vec![report],
                        failed: Vec::new(),
                    }
                }
                None => extract_directory(&config)
                    .await
                    .context("Extraction failed")?,
            };
            print_batch(&cli, &batch)?;
        }

        Command::Inspect {
            input,
            password,
            download_timeout,
        } => {
            let mut builder = PipelineConfig::builder().download_timeout_secs(*download_timeout);
            if let Some(pw) = password {
                builder = builder.password(pw.clone());
            }
            let config = builder.build().context("Invalid configuration")?;
            let meta = inspect(input, &config)
                .await
                .context("Failed to inspect PDF")?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
                );
            } else {
                println!("File:         {}", input);
                if let Some(ref t) = meta.title {
                    println!("Title:        {}", t);
                }
                if let Some(ref a) = meta.author {
                    println!("Author:       {}", a);
                }
                if let Some(ref s) = meta.subject {
                    println!("Subject:      {}", s);
                }
                println!("Pages:        {}", meta.page_count);
                println!("PDF Version:  {}", meta.pdf_version);
                if let Some(ref p) = meta.producer {
                    println!("Producer:     {}", p);
                }
                if let Some(ref c) = meta.creator {
                    println!("Creator:      {}", c);
                }
            }
        }

        Command::Split {
            files,
            input_dir,
            output_dir,
            per_batch,
        } => {
            let config = PipelineConfig::builder()
                .input_dir(input_dir)
                .output_dir(output_dir)
                .units_per_batch(*per_batch)
                .build()
                .context("Invalid configuration")?;

            let reports = if files.is_empty() {
                let batch = split_directory(&config).await.context("Split failed")?;
                for failed in &batch.failed {
                    eprintln!("{} {}: {}", red("✗"), failed.source, failed.error);
                }
                batch.processed
            } else {
                let mut reports = Vec::with_capacity(files.len());
                for file in files {
                    reports.push(
                        split_file(file, output_dir, *per_batch)
                            .await
                            .with_context(|| format!("Failed to split {}", file.display()))?,
                    );
                }
                reports
            };

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else if !cli.quiet {
                for r in &reports {
                    eprintln!(
                        "{} {}  {} pages → {} parts",
                        green("✔"),
                        bold(&r.source.display().to_string()),
                        r.pages,
                        r.parts.len()
                    );
                }
            }
        }

        Command::Chapters(args) => {
            let mut builder = PipelineConfig::builder()
                .output_dir(&args.output_dir)
                .engine(args.engine.into())
                .language_code(&args.lang)
                .dpi(args.dpi)
                .page_separator(PageSeparator::None)
                .cancel(cancel);
            if let Some(cb) = progress("pages") {
                builder = builder.progress_callback(cb);
            }
            if let Some(ref p) = args.password {
                builder = builder.password(p);
            }
            let config = builder.build().context("Invalid configuration")?;

            let batch = extract_chapters(&args.input, &args.chapters, &config)
                .await
                .context("Chapter extraction failed")?;
            print_batch(&cli, &batch)?;
        }

        Command::Subs(args) => {
            let mut config = args.subtitles.to_config();
            config.cancel = Some(cancel);
            run_subs(&cli, args, config, progress("videos")).await?;
        }

        Command::Posts {
            site,
            output,
            per_page,
            max_pages,
            timeout,
        } => {
            let job = PostsExport {
                per_page: *per_page,
                max_pages: *max_pages,
                timeout_secs: *timeout,
                ..PostsExport::new(site, output)
            };
            let rows = export_posts(&job).await.context("Export failed")?;
            if !cli.quiet {
                eprintln!(
                    "{} {} posts  →  {}",
                    green("✔"),
                    bold(&rows.to_string()),
                    output.display()
                );
            }
        }

        #[cfg(feature = "server")]
        Command::Serve {
            host,
            port,
            subtitles,
        } => {
            let config = subtitles.to_config();
            let state = pagewise::server::AppState {
                platform: Arc::new(YtDlp::from_config(&config)),
                config,
            };
            let port = port.unwrap_or_else(pagewise::server::port_from_env);
            pagewise::server::serve(std::net::SocketAddr::new(*host, port), state)
                .await
                .context("Server failed")?;
        }
    }

    Ok(())
}

async fn run_subs(
    cli: &Cli,
    args: &SubsArgs,
    config: SubtitleConfig,
    progress: Option<ProgressCallback>,
) -> Result<()> {
    let platform: Arc<dyn VideoPlatform> = Arc::new(YtDlp::from_config(&config));
    let collection = resolve_collection(platform.as_ref(), &args.url)
        .await
        .context("Failed to resolve URL")?;

    if !cli.quiet {
        if collection.is_playlist {
            eprintln!(
                "{} Found playlist with {} videos",
                cyan("◆"),
                collection.entries.len()
            );
        } else {
            eprintln!("{} Processing single video", cyan("◆"));
        }
    }

    let combined = match &args.combined {
        Some(path) => path.clone(),
        None => combined_transcript_path(&args.output_dir, &collection.title),
    };
    let mut mirror = TranscriptSink::with_mirror(&combined)
        .await
        .context("Failed to create transcript file")?;
    let mut per_video = if args.no_split {
        None
    } else {
        let mut sink = PerUnitFileSink::create(&args.output_dir)
            .await
            .context("Failed to create output directory")?;
        sink.reserve(&combined);
        Some(sink)
    };

    let output = {
        let mut extra: Vec<&mut dyn UnitSink> = vec![&mut mirror];
        if let Some(sink) = per_video.as_mut() {
            extra.push(sink);
        }
        run_subtitle_job(
            platform,
            &args.url,
            collection,
            &config,
            progress,
            &mut extra,
        )
        .await
        .context("Subtitle job failed")?
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output.report)?);
    } else if !cli.quiet {
        if !output.has_content() {
            warn!("No subtitles found for {}", args.url);
        }
        eprintln!(
            "{} {}  {}/{} videos  →  {}",
            if output.has_content() { green("✔") } else { yellow("⚠") },
            bold(&output.title),
            output.report.stats.succeeded_units,
            output.video_count,
            combined.display()
        );
        if let Some(sink) = per_video.as_ref() {
            eprintln!(
                "   {} per-video files in {}",
                dim(&sink.written().len().to_string()),
                args.output_dir.display()
            );
        }
    }
    Ok(())
}

/// Map `ocr` flags to `PipelineConfig`.
async fn build_ocr_config(
    args: &OcrArgs,
    progress: Option<ProgressCallback>,
    cancel: CancelFlag,
) -> Result<PipelineConfig> {
    let system_prompt = if let Some(ref path) = args.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = PipelineConfig::builder()
        .input_dir(&args.input_dir)
        .output_dir(&args.output_dir)
        .language_code(&args.lang)
        .dpi(args.dpi)
        .engine(args.engine.into())
        .output_format(args.format.into())
        .epub_layout(args.epub_layout.into())
        .page_separator(args.separator.into())
        .pages(parse_pages(&args.pages)?)
        .tesseract_bin(&args.tesseract)
        .recognize_timeout_secs(args.recognize_timeout)
        .download_timeout_secs(args.download_timeout)
        .cancel(cancel);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    if let Some(ref p) = args.password {
        builder = builder.password(p);
    }
    if let Some(ref a) = args.author {
        builder = builder.book_author(a);
    }
    if let Some(ref m) = args.model {
        builder = builder.model(m);
    }
    if let Some(ref p) = args.provider {
        builder = builder.provider_name(p);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

fn print_batch(cli: &Cli, batch: &BatchReport) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(batch).context("Failed to serialise report")?
        );
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }
    if batch.is_empty() {
        eprintln!("{} Nothing to do", yellow("⚠"));
        return Ok(());
    }
    for report in &batch.processed {
        print_source(report);
    }
    for failed in &batch.failed {
        eprintln!("{} {}  {}", red("✘"), bold(&failed.source), red(&failed.error));
    }
    Ok(())
}

fn print_source(report: &SourceReport) {
    let s = &report.stats;
    let artifacts = report
        .artifacts
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    eprintln!(
        "{}  {}  {}/{} units  {}ms  →  {}",
        if s.failed_units == 0 { green("✔") } else { cyan("⚠") },
        bold(&report.source),
        s.succeeded_units,
        s.total_units,
        s.total_duration_ms,
        if artifacts.is_empty() { dim("(no output)") } else { artifacts },
    );
    if report.cancelled {
        eprintln!("   {}", yellow("cancelled before the last unit"));
    }
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;
        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }
        return Ok(PageSelection::Set(pages));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}
