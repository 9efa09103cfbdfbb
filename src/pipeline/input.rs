//! Source enumeration and input resolution.
//!
//! A directory run lists candidate files with [`scan_directory`]; each
//! candidate (or a single path/URL given directly) is then normalised to a
//! local PDF by [`resolve_input`].
//!
//! pdfium requires a file-system path, so URLs are downloaded into a
//! `TempDir` that lives as long as the [`ResolvedInput`]. The `%PDF` magic
//! bytes are checked before returning so callers get a meaningful error
//! rather than a pdfium failure.

use crate::error::PipelineError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// The resolved input: either a local path or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; PDF downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// List the files in `dir` whose extension matches one of `extensions`
/// (case-insensitive, without the dot).
///
/// Not recursive. Order is whatever the filesystem returns; Sources are
/// independent so no sort is applied.
pub fn scan_directory(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::FileNotFound {
            path: dir.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => PipelineError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => PipelineError::InputReadFailed {
            path: dir.to_path_buf(),
            source: e,
        },
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want)))
            .unwrap_or(false);
        if matches {
            found.push(path);
        }
    }

    debug!("Found {} candidate files in {}", found.len(), dir.display());
    Ok(found)
}

/// Resolve the input string to a local PDF file path.
///
/// If the input is a URL, download it to a temporary directory.
/// If the input is a local file, validate it exists and is readable.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, PipelineError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Resolve a local file path, validating existence and PDF magic bytes.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, PipelineError> {
    use std::io::Read;

    let path = PathBuf::from(path_str);
    let mut file = std::fs::File::open(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => PipelineError::PermissionDenied { path: path.clone() },
        _ => PipelineError::FileNotFound { path: path.clone() },
    })?;
    if path.is_dir() {
        return Err(PipelineError::FileNotFound { path });
    }

    let mut head = [0u8; 4];
    let n = file.read(&mut head).unwrap_or(0);
    check_magic(&head[..n], &path)?;

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Reject content that does not start with `%PDF`. Fewer than four bytes
/// are left for pdfium to judge.
fn check_magic(head: &[u8], path: &Path) -> Result<(), PipelineError> {
    if head.len() >= 4 && &head[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&head[..4]);
        return Err(PipelineError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

/// Stream a URL into a temporary directory, chunk by chunk.
///
/// The magic bytes are checked on the first chunk so an HTML error page is
/// rejected before the rest of it is read.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, PipelineError> {
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;

    let failed = |reason: String| PipelineError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            PipelineError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    info!("Downloading {}", url);
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;
    let response = client.get(url).send().await.map_err(classify)?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let temp_dir = tempfile::Builder::new()
        .prefix("pagewise-dl-")
        .tempdir()
        .map_err(|e| PipelineError::Internal(format!("Failed to create temp dir: {e}")))?;
    let file_path = temp_dir.path().join(filename_from_url(url));
    let write_failed = |e: std::io::Error| {
        PipelineError::Internal(format!("Failed to write {}: {e}", file_path.display()))
    };
    let mut file = tokio::fs::File::create(&file_path)
        .await
        .map_err(write_failed)?;

    let mut body = response.bytes_stream();
    let mut head: Vec<u8> = Vec::with_capacity(4);
    let mut received = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(classify)?;
        if head.len() < 4 {
            let take = (4 - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
            check_magic(&head, &file_path)?;
        }
        file.write_all(&chunk).await.map_err(write_failed)?;
        received += chunk.len() as u64;
    }
    file.flush().await.map_err(write_failed)?;

    info!("Downloaded {} bytes to {}", received, file_path.display());
    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL, or `downloaded.pdf`.
pub fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
