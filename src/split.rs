//! Re-split a page-delimited text file into fixed-size parts.
//!
//! The text files written by the OCR pipeline frame each page with a line
//! `--- Page N ---`. This module cuts such a file at those lines and writes
//! `{stem}_part1.txt`, `{stem}_part2.txt`, … holding `units_per_batch` pages
//! each.
//!
//! Pages are byte slices of the input that start at a delimiter line, so
//! concatenating the parts in order gives back the input unchanged. Text
//! before the first delimiter is its own page unless it is blank, in which
//! case it belongs to the first page. A file without delimiters is a single
//! page.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::FailedSource;
use crate::pipeline::input::scan_directory;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

static RE_PAGE_DELIMITER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^--- Page \d+ ---\r?$").unwrap());

/// Cut `content` into pages at delimiter lines.
pub fn split_pages(content: &str) -> Vec<&str> {
    if content.is_empty() {
        return Vec::new();
    }

    let mut bounds: Vec<usize> = RE_PAGE_DELIMITER
        .find_iter(content)
        .map(|m| m.start())
        .collect();

    match bounds.first().copied() {
        None => return vec![content],
        Some(0) => {}
        Some(first) if content[..first].trim().is_empty() => bounds[0] = 0,
        Some(_) => bounds.insert(0, 0),
    }
    bounds.push(content.len());

    bounds.windows(2).map(|w| &content[w[0]..w[1]]).collect()
}

/// Concatenate consecutive pages into groups of `per_batch`.
///
/// `per_batch` must be at least 1.
pub fn group(pages: &[&str], per_batch: usize) -> Vec<String> {
    pages
        .chunks(per_batch.max(1))
        .map(|chunk| chunk.concat())
        .collect()
}

/// What one input file was split into.
#[derive(Debug, Clone, Serialize)]
pub struct SplitReport {
    pub source: PathBuf,
    pub pages: usize,
    pub parts: Vec<PathBuf>,
}

/// Outcome of splitting a directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SplitBatchReport {
    pub processed: Vec<SplitReport>,
    pub failed: Vec<FailedSource>,
}

/// Split one file into `out_dir/{stem}_part{n}.txt`.
pub async fn split_file(
    path: &Path,
    out_dir: &Path,
    per_batch: usize,
) -> Result<SplitReport, PipelineError> {
    if per_batch == 0 {
        return Err(PipelineError::InvalidConfig(
            "Units per batch must be ≥ 1".into(),
        ));
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PipelineError::InputReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let pages = split_pages(&content);
    let groups = group(&pages, per_batch);

    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|source| PipelineError::OutputWriteFailed {
            path: out_dir.to_path_buf(),
            source,
        })?;

    let mut parts = Vec::with_capacity(groups.len());
    for (i, text) in groups.iter().enumerate() {
        let part = out_dir.join(format!("{stem}_part{}.txt", i + 1));
        tokio::fs::write(&part, text)
            .await
            .map_err(|source| PipelineError::OutputWriteFailed {
                path: part.clone(),
                source,
            })?;
        info!("Wrote {}", part.display());
        parts.push(part);
    }

    Ok(SplitReport {
        source: path.to_path_buf(),
        pages: pages.len(),
        parts,
    })
}

/// Split every `.txt` file in `config.input_dir` into `config.output_dir`.
pub async fn split_directory(config: &PipelineConfig) -> Result<SplitBatchReport, PipelineError> {
    let files = scan_directory(&config.input_dir, &["txt"])?;
    let mut batch = SplitBatchReport::default();
    if files.is_empty() {
        warn!("No .txt files found in {}", config.input_dir.display());
        return Ok(batch);
    }

    for path in files {
        match split_file(&path, &config.output_dir, config.units_per_batch).await {
            Ok(report) => batch.processed.push(report),
            Err(e) => {
                error!("{}: {}", path.display(), e);
                batch.failed.push(FailedSource {
                    source: path.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(pages: usize) -> String {
        (1..=pages)
            .map(|i| format!("\n--- Page {i} ---\ntext of page {i}\n"))
            .collect()
    }

    #[test]
    fn pages_start_at_delimiters() {
        let doc = document(3);
        let pages = split_pages(&doc);
        assert_eq!(pages.len(), 3);
        assert!(pages[0].starts_with("\n--- Page 1 ---"));
        assert!(pages[1].starts_with("--- Page 2 ---"));
        assert_eq!(pages.concat(), doc);
    }

    #[test]
    fn no_delimiter_is_one_page() {
        assert_eq!(split_pages("just text\n"), vec!["just text\n"]);
        assert!(split_pages("").is_empty());
    }

    #[test]
    fn preamble_with_text_is_kept_as_a_page() {
        let doc = "Title page\n--- Page 1 ---\nbody\n";
        let pages = split_pages(doc);
        assert_eq!(pages, vec!["Title page\n", "--- Page 1 ---\nbody\n"]);
    }

    #[test]
    fn delimiter_must_fill_the_line() {
        let doc = "--- Page 1 ---\nsee --- Page 2 --- below\n  --- Page 3 ---\n";
        assert_eq!(split_pages(doc).len(), 1);
    }

    #[test]
    fn crlf_delimiters_match() {
        let doc = "--- Page 1 ---\r\na\r\n--- Page 2 ---\r\nb\r\n";
        assert_eq!(split_pages(doc).len(), 2);
    }

    #[test]
    fn forty_five_pages_in_twenties() {
        let doc = document(45);
        let pages = split_pages(&doc);
        let groups = group(&pages, 20);
        let sizes: Vec<usize> = groups.iter().map(|g| split_pages(g).len()).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        assert_eq!(groups.concat(), doc);
    }

    #[tokio::test]
    async fn split_file_writes_numbered_parts() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("book.txt");
        std::fs::write(&input, document(5)).unwrap();

        let out = dir.path().join("parts");
        let report = split_file(&input, &out, 2).await.unwrap();
        assert_eq!(report.pages, 5);
        assert_eq!(report.parts.len(), 3);
        assert_eq!(report.parts[2], out.join("book_part3.txt"));
        let last = std::fs::read_to_string(&report.parts[2]).unwrap();
        assert_eq!(last, "--- Page 5 ---\ntext of page 5\n");
    }
}
