//! Incremental sinks: durable output one unit at a time.
//!
//! [`PageTextSink`] is the crash-safety boundary of the PDF pipeline: each
//! unit is written, flushed and `fdatasync`ed before the next one is
//! fetched, so a killed process leaves exactly the completed prefix on disk.

use crate::config::PageSeparator;
use crate::error::PipelineError;
use crate::output::{sanitize_filename, UnitResult};
use crate::pipeline::UnitSink;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

fn write_failed(path: &Path) -> impl FnOnce(std::io::Error) -> PipelineError + '_ {
    move |source| PipelineError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    }
}

async fn create_parent(path: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(write_failed(path))?;
        }
    }
    Ok(())
}

/// Flat text file with one framed section per unit.
pub struct PageTextSink {
    path: PathBuf,
    file: Option<File>,
    separator: PageSeparator,
    units_written: usize,
}

impl PageTextSink {
    /// Create (or truncate) the output file.
    pub async fn create(
        path: impl Into<PathBuf>,
        separator: PageSeparator,
    ) -> Result<Self, PipelineError> {
        let path = path.into();
        create_parent(&path).await?;
        let file = File::create(&path).await.map_err(write_failed(&path))?;
        debug!("Writing text to {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
            separator,
            units_written: 0,
        })
    }

    pub fn units_written(&self) -> usize {
        self.units_written
    }
}

#[async_trait]
impl UnitSink for PageTextSink {
    async fn write_unit(&mut self, unit: &UnitResult) -> Result<(), PipelineError> {
        let file = self.file.as_mut().ok_or_else(|| {
            PipelineError::Internal(format!("{} was already finalised", self.path.display()))
        })?;

        let section = self.separator.render(unit.index, &unit.text);
        file.write_all(section.as_bytes())
            .await
            .map_err(write_failed(&self.path))?;
        file.flush().await.map_err(write_failed(&self.path))?;
        file.sync_data().await.map_err(write_failed(&self.path))?;

        self.units_written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), PipelineError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(write_failed(&self.path))?;
            file.sync_all().await.map_err(write_failed(&self.path))?;
        }
        Ok(())
    }

    fn artifact(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Heavy rule framing each video in a combined transcript.
pub const SECTION_RULE_WIDTH: usize = 80;
pub const NO_SUBTITLES_PLACEHOLDER: &str = "[No subtitles available]";

/// Combined subtitle document, kept in memory and optionally mirrored to a file.
///
/// Each video becomes
/// `\n\n{rule}\n📹 {title}\n{rule}\n\n{text}`; videos without captions get
/// `[No subtitles available]` and failures `[Error: …]` in place of text.
#[derive(Default)]
pub struct TranscriptSink {
    sections: Vec<String>,
    mirror: Option<(PathBuf, File)>,
}

impl TranscriptSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append every section to `path` as it is produced.
    pub async fn with_mirror(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        create_parent(&path).await?;
        let file = File::create(&path).await.map_err(write_failed(&path))?;
        Ok(Self {
            sections: Vec::new(),
            mirror: Some((path, file)),
        })
    }

    /// Render the section for one unit.
    pub fn section(unit: &UnitResult) -> String {
        let rule = "=".repeat(SECTION_RULE_WIDTH);
        let body = match &unit.error {
            None => unit.text.clone(),
            Some(e) if e.is_no_content() => NO_SUBTITLES_PLACEHOLDER.to_string(),
            Some(e) => format!("[Error: {}]", e.detail()),
        };
        format!("\n\n{rule}\n📹 {}\n{rule}\n\n{body}", unit.title)
    }

    /// The combined transcript: sections joined by newlines, trimmed.
    pub fn text(&self) -> String {
        self.sections.join("\n").trim().to_string()
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }
}

#[async_trait]
impl UnitSink for TranscriptSink {
    async fn write_unit(&mut self, unit: &UnitResult) -> Result<(), PipelineError> {
        let section = Self::section(unit);

        if let Some((path, file)) = self.mirror.as_mut() {
            let chunk = if self.sections.is_empty() {
                section.trim_start().to_string()
            } else {
                format!("\n{section}")
            };
            file.write_all(chunk.as_bytes())
                .await
                .map_err(write_failed(path))?;
            file.flush().await.map_err(write_failed(path))?;
            file.sync_data().await.map_err(write_failed(path))?;
        }

        self.sections.push(section);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), PipelineError> {
        if let Some((path, file)) = self.mirror.as_mut() {
            file.write_all(b"\n").await.map_err(write_failed(path))?;
            file.sync_all().await.map_err(write_failed(path))?;
        }
        Ok(())
    }

    fn artifact(&self) -> Option<&Path> {
        self.mirror.as_ref().map(|(path, _)| path.as_path())
    }
}

/// Default location of the combined transcript: `{dir}/{title}_combined.txt`.
pub fn combined_transcript_path(dir: &Path, title: &str) -> PathBuf {
    let mut stem = sanitize_filename(title);
    if stem.is_empty() {
        stem = "transcript".to_string();
    }
    dir.join(format!("{stem}_combined.txt"))
}

/// One `{title}.txt` per successful unit inside a directory.
///
/// Units without text are skipped; the transcript records them instead.
pub struct PerUnitFileSink {
    dir: PathBuf,
    used_names: HashSet<String>,
    written: Vec<PathBuf>,
}

impl PerUnitFileSink {
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(write_failed(&dir))?;
        Ok(Self {
            dir,
            used_names: HashSet::new(),
            written: Vec::new(),
        })
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Keep per-unit files off `path` when it lives in this directory, so a
    /// unit titled like the combined transcript gets a suffixed name instead
    /// of truncating it.
    pub fn reserve(&mut self, path: &Path) {
        if path.parent() != Some(self.dir.as_path()) {
            return;
        }
        let is_txt = path.extension().is_some_and(|ext| ext == "txt");
        if let (true, Some(stem)) = (is_txt, path.file_stem()) {
            self.used_names.insert(stem.to_string_lossy().into_owned());
        }
    }

    fn file_name(&mut self, unit: &UnitResult) -> String {
        let mut stem = sanitize_filename(&unit.title);
        if stem.is_empty() {
            stem = format!("unit_{}", unit.index);
        }
        if !self.used_names.insert(stem.clone()) {
            stem = format!("{stem} ({})", unit.index);
            self.used_names.insert(stem.clone());
        }
        format!("{stem}.txt")
    }
}

#[async_trait]
impl UnitSink for PerUnitFileSink {
    async fn write_unit(&mut self, unit: &UnitResult) -> Result<(), PipelineError> {
        if !unit.is_success() {
            return Ok(());
        }
        let name = self.file_name(unit);
        let path = self.dir.join(name);
        tokio::fs::write(&path, unit.text.as_bytes())
            .await
            .map_err(write_failed(&path))?;
        debug!("Wrote {}", path.display());
        self.written.push(path);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn artifact(&self) -> Option<&Path> {
        Some(&self.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnitError;

    fn ok(index: usize, title: &str, text: &str) -> UnitResult {
        UnitResult::succeeded(index, title, text.to_string(), 1)
    }

    #[tokio::test]
    async fn text_sink_is_durable_after_each_unit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/book.txt");
        let mut sink = PageTextSink::create(&path, PageSeparator::Delimiter)
            .await
            .unwrap();

        sink.write_unit(&ok(1, "Page 1", "alpha")).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "\n--- Page 1 ---\nalpha\n"
        );

        sink.write_unit(&UnitResult::failed(
            2,
            "Page 2",
            UnitError::RecognitionFailed {
                index: 2,
                detail: "boom".into(),
            },
            1,
        ))
        .await
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "\n--- Page 1 ---\nalpha\n\n--- Page 2 ---\n\n"
        );

        sink.finish().await.unwrap();
        assert_eq!(sink.units_written(), 2);
        assert!(sink.write_unit(&ok(3, "Page 3", "late")).await.is_err());
    }

    #[test]
    fn transcript_sections() {
        let rule = "=".repeat(80);
        let s = TranscriptSink::section(&ok(1, "Intro", "hello world"));
        assert_eq!(s, format!("\n\n{rule}\n📹 Intro\n{rule}\n\nhello world"));

        let missing = UnitResult::failed(2, "Talk", UnitError::NoContent { index: 2 }, 1);
        assert!(TranscriptSink::section(&missing).ends_with("[No subtitles available]"));

        let broken = UnitResult::failed(
            3,
            "Video 3",
            UnitError::FetchFailed {
                index: 3,
                detail: "HTTP 429".into(),
            },
            1,
        );
        assert!(TranscriptSink::section(&broken).ends_with("[Error: HTTP 429]"));
    }

    #[tokio::test]
    async fn transcript_text_is_trimmed_join() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = dir.path().join("all.txt");
        let mut sink = TranscriptSink::with_mirror(&mirror).await.unwrap();
        sink.write_unit(&ok(1, "A", "one")).await.unwrap();
        sink.write_unit(&ok(2, "B", "two")).await.unwrap();
        sink.finish().await.unwrap();

        let text = sink.text();
        assert!(text.starts_with(&"=".repeat(80)));
        assert!(text.ends_with("two"));
        assert_eq!(sink.section_count(), 2);
        let on_disk = std::fs::read_to_string(&mirror).unwrap();
        assert_eq!(on_disk.trim_end(), text);
    }

    #[tokio::test]
    async fn per_unit_files_skip_failures_and_dedupe() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PerUnitFileSink::create(dir.path()).await.unwrap();
        sink.write_unit(&ok(1, "Q&A: part 1", "a")).await.unwrap();
        sink.write_unit(&ok(2, "Q&A: part 1", "b")).await.unwrap();
        sink.write_unit(&UnitResult::failed(3, "Gone", UnitError::NoContent { index: 3 }, 1))
            .await
            .unwrap();

        let names: Vec<String> = sink
            .written()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Q&A_ part 1.txt", "Q&A_ part 1 (2).txt"]);
        assert!(!dir.path().join("Gone.txt").exists());
    }

    #[tokio::test]
    async fn reserved_name_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PerUnitFileSink::create(dir.path()).await.unwrap();
        sink.reserve(&dir.path().join("Talk.txt"));
        sink.reserve(&dir.path().join("elsewhere").join("Other.txt"));
        sink.write_unit(&ok(1, "Talk", "a")).await.unwrap();
        sink.write_unit(&ok(2, "Other", "b")).await.unwrap();

        assert!(!dir.path().join("Talk.txt").exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("Talk (1).txt")).unwrap(), "a");
        assert!(dir.path().join("Other.txt").exists());
    }

    #[test]
    fn combined_path_is_suffixed() {
        let dir = Path::new("subs");
        assert_eq!(
            combined_transcript_path(dir, "Talk: one"),
            dir.join("Talk_ one_combined.txt")
        );
        assert_eq!(combined_transcript_path(dir, ""), dir.join("transcript_combined.txt"));
    }
}
