//! PDF pages as pipeline units, one page at a time.
//!
//! ## Why a dedicated thread?
//!
//! pdfium is not async-safe and a `PdfDocument` borrows its `Pdfium`
//! instance, so neither can cross an `.await`. [`PdfPageSource`] starts one
//! OS thread per document that owns both; the async side sends it a page
//! number and awaits a oneshot reply. The thread only ever holds the page it
//! is currently rendering, which keeps memory flat regardless of page count.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Page sizes vary wildly: an A0 poster at 300 DPI is roughly
//! 10,000 × 14,000 px. The render config scales by `dpi / 72` and then caps
//! the longest edge at `max_rendered_pixels`.

use crate::config::PageSelection;
use crate::error::{PipelineError, UnitError};
use crate::output::DocumentMetadata;
use crate::pipeline::{Unit, UnitSource};
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// What the worker produces for each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    /// Rasterise for OCR.
    Render { dpi: u32, max_pixels: u32 },
    /// Read the embedded text layer.
    TextLayer,
}

/// A page handed to the extractor.
#[derive(Debug)]
pub enum PagePayload {
    Image(DynamicImage),
    Text(String),
}

struct PageRequest {
    page: usize,
    reply: oneshot::Sender<Result<PagePayload, UnitError>>,
}

/// Bind to the pdfium shared library.
///
/// Lookup order: `PDFIUM_LIB_PATH`, a library in the working directory,
/// then the system loader path.
pub fn bind_pdfium() -> Result<Pdfium, PipelineError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        if !path.is_empty() {
            let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
                PipelineError::PdfiumBindingFailed(format!("{path}: {e:?}"))
            })?;
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| PipelineError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Map a pdfium load failure onto the fatal error taxonomy.
fn classify_load_error(path: &Path, had_password: bool, err: PdfiumError) -> PipelineError {
    let err_str = format!("{:?}", err);
    if err_str.contains("Password") || err_str.contains("password") {
        if had_password {
            PipelineError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            PipelineError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        PipelineError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}

fn read_metadata(document: &PdfDocument) -> DocumentMetadata {
    let metadata = document.metadata();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        pdf_version: format!("{:?}", document.version()),
    }
}

/// Extract document metadata without touching any page.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, PipelineError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium()?;
        let document = pdfium
            .load_pdf_from_file(&path, pwd.as_deref())
            .map_err(|e| classify_load_error(&path, pwd.is_some(), e))?;
        Ok(read_metadata(&document))
    })
    .await
    .map_err(|e| PipelineError::Internal(format!("Metadata task panicked: {}", e)))?
}

/// The pages of one open PDF.
pub struct PdfPageSource {
    source_id: String,
    pages: Vec<usize>,
    metadata: DocumentMetadata,
    requests: mpsc::Sender<PageRequest>,
}

impl PdfPageSource {
    /// Open `pdf_path` on a new pdfium worker thread.
    ///
    /// Fails (Source-fatal) when pdfium cannot be bound, the document cannot
    /// be opened, or the page selection matches no existing page.
    pub async fn open(
        pdf_path: &Path,
        password: Option<&str>,
        mode: PageMode,
        selection: &PageSelection,
    ) -> Result<Self, PipelineError> {
        let (requests, inbox) = mpsc::channel::<PageRequest>();
        let (ready_tx, ready_rx) = oneshot::channel();
        let path = pdf_path.to_path_buf();
        let pwd = password.map(str::to_string);

        std::thread::Builder::new()
            .name("pagewise-pdfium".into())
            .spawn(move || page_worker(path, pwd, mode, ready_tx, inbox))
            .map_err(|e| PipelineError::Internal(format!("Failed to start pdfium worker: {e}")))?;

        let metadata = ready_rx.await.map_err(|_| {
            PipelineError::Internal("pdfium worker exited while opening the document".into())
        })??;

        let pages = selection.to_page_numbers(metadata.page_count);
        if pages.is_empty() && metadata.page_count > 0 {
            return Err(PipelineError::PageOutOfRange {
                page: first_requested(selection),
                total: metadata.page_count,
            });
        }

        info!(
            "Opened {}: {} pages, {} selected",
            pdf_path.display(),
            metadata.page_count,
            pages.len()
        );

        Ok(Self {
            source_id: pdf_path.display().to_string(),
            pages,
            metadata,
            requests,
        })
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }
}

fn first_requested(selection: &PageSelection) -> usize {
    match selection {
        PageSelection::All => 0,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(0),
    }
}

#[async_trait]
impl UnitSource for PdfPageSource {
    type Payload = PagePayload;

    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn indices(&self) -> Vec<usize> {
        self.pages.clone()
    }

    async fn fetch(&mut self, index: usize) -> Result<Unit<PagePayload>, UnitError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(PageRequest { page: index, reply })
            .map_err(|_| UnitError::RenderFailed {
                index,
                detail: "pdfium worker is no longer running".into(),
            })?;

        let payload = response.await.map_err(|_| UnitError::RenderFailed {
            index,
            detail: "pdfium worker dropped the request".into(),
        })??;

        Ok(Unit {
            index,
            title: format!("Page {index}"),
            payload,
        })
    }
}

/// Worker loop: owns pdfium and the document until the source is dropped.
fn page_worker(
    path: PathBuf,
    password: Option<String>,
    mode: PageMode,
    ready: oneshot::Sender<Result<DocumentMetadata, PipelineError>>,
    inbox: mpsc::Receiver<PageRequest>,
) {
    let pdfium = match bind_pdfium() {
        Ok(p) => p,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let document = match pdfium.load_pdf_from_file(&path, password.as_deref()) {
        Ok(d) => d,
        Err(e) => {
            let _ = ready.send(Err(classify_load_error(&path, password.is_some(), e)));
            return;
        }
    };

    if ready.send(Ok(read_metadata(&document))).is_err() {
        return;
    }

    let render_config = match mode {
        PageMode::Render { dpi, max_pixels } => Some(
            PdfRenderConfig::new()
                .scale_page_by_factor(dpi as f32 / 72.0)
                .set_maximum_width(max_pixels as i32)
                .set_maximum_height(max_pixels as i32),
        ),
        PageMode::TextLayer => None,
    };

    // Ends when the PdfPageSource (the only sender) is dropped.
    while let Ok(PageRequest { page, reply }) = inbox.recv() {
        let result = load_page(&document, page, render_config.as_ref());
        let _ = reply.send(result);
    }

    debug!("pdfium worker for {} finished", path.display());
}

fn load_page(
    document: &PdfDocument,
    page_num: usize,
    render_config: Option<&PdfRenderConfig>,
) -> Result<PagePayload, UnitError> {
    let render_err = |detail: String| UnitError::RenderFailed {
        index: page_num,
        detail,
    };

    let page_index = page_num
        .checked_sub(1)
        .and_then(|i| PdfPageIndex::try_from(i).ok())
        .ok_or_else(|| render_err(format!("page number {page_num} is not addressable")))?;

    let page = document
        .pages()
        .get(page_index)
        .map_err(|e| render_err(format!("{:?}", e)))?;

    match render_config {
        Some(cfg) => {
            let bitmap = page
                .render_with_config(cfg)
                .map_err(|e| render_err(format!("{:?}", e)))?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                page_num,
                image.width(),
                image.height()
            );
            Ok(PagePayload::Image(image))
        }
        None => {
            let text = page
                .text()
                .map_err(|e| render_err(format!("{:?}", e)))?
                .all();
            Ok(PagePayload::Text(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_requested_page_for_errors() {
        assert_eq!(first_requested(&PageSelection::All), 0);
        assert_eq!(first_requested(&PageSelection::Single(9)), 9);
        assert_eq!(first_requested(&PageSelection::Range(4, 8)), 4);
        assert_eq!(first_requested(&PageSelection::Set(vec![7, 3])), 3);
    }

    #[test]
    fn password_errors_are_classified() {
        let path = Path::new("locked.pdf");
        let err = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError);
        assert!(matches!(
            classify_load_error(path, false, err),
            PipelineError::PasswordRequired { .. }
        ));
        let err = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError);
        assert!(matches!(
            classify_load_error(path, true, err),
            PipelineError::WrongPassword { .. }
        ));
        let err = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError);
        assert!(matches!(
            classify_load_error(path, false, err),
            PipelineError::CorruptPdf { .. }
        ));
    }
}
