//! EPUB packaging: one chapter per unit, or one flowing chapter.
//!
//! ## Why buffer here when everything else streams?
//!
//! An EPUB is a zip archive whose manifest, spine and navigation must list
//! every chapter, so it cannot be appended to. The packager keeps only the
//! extracted text (never page images) and serialises the container once in
//! [`UnitSink::finish`]. The flat text file written alongside it remains the
//! durable record of progress.
//!
//! ## Container layout
//!
//! ```text
//! mimetype                  (stored, first entry)
//! META-INF/container.xml
//! EPUB/content.opf          metadata, manifest, spine (nav first)
//! EPUB/nav.xhtml            EPUB 3 navigation
//! EPUB/toc.ncx              NCX for EPUB 2 readers
//! EPUB/style.css
//! EPUB/page_{i}.xhtml       or EPUB/full_text.xhtml
//! ```
//!
//! The archive is written to `{name}.epub.tmp` and renamed into place, so a
//! reader never sees a half-written book.

use crate::config::{EpubLayout, PageSeparator, PipelineConfig};
use crate::error::PipelineError;
use crate::output::UnitResult;
use crate::pipeline::UnitSink;
use async_trait::async_trait;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const STYLESHEET: &str = "body { margin: 1em; }\n\
h2 { font-size: 1.1em; margin-bottom: 0.5em; }\n\
pre { white-space: pre-wrap; word-wrap: break-word; font-family: serif; }\n";

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="EPUB/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

/// Book-level metadata supplied by the caller.
#[derive(Debug, Clone)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub language: String,
}

impl BookMetadata {
    pub fn from_config(title: impl Into<String>, config: &PipelineConfig) -> Self {
        Self {
            title: title.into(),
            author: config.book_author.clone(),
            language: config.epub_language().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Chapter {
    file: String,
    title: String,
    body: String,
}

/// [`UnitSink`] that assembles an EPUB from unit results.
pub struct EpubPackager {
    path: PathBuf,
    meta: BookMetadata,
    layout: EpubLayout,
    units: Vec<(usize, String, String)>,
    finished: bool,
    written: bool,
}

impl EpubPackager {
    pub fn new(path: impl Into<PathBuf>, meta: BookMetadata, layout: EpubLayout) -> Self {
        Self {
            path: path.into(),
            meta,
            layout,
            units: Vec::new(),
            finished: false,
            written: false,
        }
    }

    /// Number of units collected so far.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    fn chapters(&self) -> Vec<Chapter> {
        match self.layout {
            EpubLayout::PerUnit => self
                .units
                .iter()
                .map(|(index, title, text)| Chapter {
                    file: format!("page_{index}.xhtml"),
                    title: title.clone(),
                    body: format!(
                        "<h2>{}</h2>\n<pre>{}</pre>",
                        xml_text(title),
                        xml_text(text)
                    ),
                })
                .collect(),
            EpubLayout::SingleFlow => {
                let flow: String = self
                    .units
                    .iter()
                    .map(|(index, _, text)| PageSeparator::Tagged.render(*index, text))
                    .collect();
                vec![Chapter {
                    file: "full_text.xhtml".to_string(),
                    title: "Full Text".to_string(),
                    body: format!("<h1>Full Text</h1>\n<pre>{}</pre>", xml_text(&flow)),
                }]
            }
        }
    }

    /// Serialise the whole container in memory.
    pub fn to_bytes(&self) -> zip::result::ZipResult<Vec<u8>> {
        let chapters = self.chapters();
        let modified = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let identifier = format!(
            "urn:pagewise:{}:{}",
            self.meta.title.replace(char::is_whitespace, "-"),
            modified
        );

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;

        zip.start_file("META-INF/container.xml", deflated)?;
        zip.write_all(CONTAINER_XML.as_bytes())?;

        zip.start_file("EPUB/content.opf", deflated)?;
        zip.write_all(self.package_document(&chapters, &identifier, &modified).as_bytes())?;

        zip.start_file("EPUB/nav.xhtml", deflated)?;
        zip.write_all(self.nav_document(&chapters).as_bytes())?;

        zip.start_file("EPUB/toc.ncx", deflated)?;
        zip.write_all(self.ncx_document(&chapters, &identifier).as_bytes())?;

        zip.start_file("EPUB/style.css", deflated)?;
        zip.write_all(STYLESHEET.as_bytes())?;

        for chapter in &chapters {
            zip.start_file(format!("EPUB/{}", chapter.file), deflated)?;
            zip.write_all(self.xhtml(&chapter.title, &chapter.body).as_bytes())?;
        }

        Ok(zip.finish()?.into_inner())
    }

    fn xhtml(&self, title: &str, body: &str) -> String {
        let lang = xml_text(&self.meta.language);
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<!DOCTYPE html>\n\
<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{lang}\" xml:lang=\"{lang}\">\n\
<head>\n<title>{}</title>\n<link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\"/>\n</head>\n\
<body>\n{body}\n</body>\n</html>\n",
            xml_text(title)
        )
    }

    fn package_document(&self, chapters: &[Chapter], identifier: &str, modified: &str) -> String {
        let mut manifest = String::new();
        let mut spine = String::new();
        for chapter in chapters {
            let id = chapter.file.trim_end_matches(".xhtml");
            manifest.push_str(&format!(
                "    <item id=\"{id}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
                chapter.file
            ));
            spine.push_str(&format!("    <itemref idref=\"{id}\"/>\n"));
        }

        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"book-id\">\n\
  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n\
    <dc:identifier id=\"book-id\">{}</dc:identifier>\n\
    <dc:title>{}</dc:title>\n\
    <dc:language>{}</dc:language>\n\
    <dc:creator>{}</dc:creator>\n\
    <meta property=\"dcterms:modified\">{modified}</meta>\n\
  </metadata>\n\
  <manifest>\n\
    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n\
    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n\
    <item id=\"style\" href=\"style.css\" media-type=\"text/css\"/>\n\
{manifest}  </manifest>\n\
  <spine toc=\"ncx\">\n\
    <itemref idref=\"nav\"/>\n\
{spine}  </spine>\n\
</package>\n",
            xml_text(identifier),
            xml_text(&self.meta.title),
            xml_text(&self.meta.language),
            xml_text(&self.meta.author),
        )
    }

    fn nav_document(&self, chapters: &[Chapter]) -> String {
        let items: String = chapters
            .iter()
            .map(|c| {
                format!(
                    "<li><a href=\"{}\">{}</a></li>\n",
                    c.file,
                    xml_text(&c.title)
                )
            })
            .collect();
        let body = format!(
            "<nav epub:type=\"toc\" id=\"toc\">\n<h1>Table of Contents</h1>\n<ol>\n{items}</ol>\n</nav>"
        );
        self.xhtml(&self.meta.title, &body)
    }

    fn ncx_document(&self, chapters: &[Chapter], identifier: &str) -> String {
        let points: String = chapters
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "    <navPoint id=\"navpoint-{n}\" playOrder=\"{n}\">\n\
      <navLabel><text>{}</text></navLabel>\n\
      <content src=\"{}\"/>\n\
    </navPoint>\n",
                    xml_text(&c.title),
                    c.file,
                    n = i + 1
                )
            })
            .collect();

        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n\
  <head>\n\
    <meta name=\"dtb:uid\" content=\"{}\"/>\n\
    <meta name=\"dtb:depth\" content=\"1\"/>\n\
    <meta name=\"dtb:totalPageCount\" content=\"0\"/>\n\
    <meta name=\"dtb:maxPageNumber\" content=\"0\"/>\n\
  </head>\n\
  <docTitle><text>{}</text></docTitle>\n\
  <navMap>\n{points}  </navMap>\n\
</ncx>\n",
            html_escape::encode_double_quoted_attribute(&strip_invalid_xml(identifier)),
            xml_text(&self.meta.title),
        )
    }
}

#[async_trait]
impl UnitSink for EpubPackager {
    async fn write_unit(&mut self, unit: &UnitResult) -> Result<(), PipelineError> {
        if self.finished {
            return Err(PipelineError::Internal(format!(
                "{} was already packaged",
                self.path.display()
            )));
        }
        self.units
            .push((unit.index, unit.title.clone(), unit.text.clone()));
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), PipelineError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        if self.units.is_empty() {
            warn!("{}: no units collected, EPUB not written", self.path.display());
            return Ok(());
        }

        let bytes = self
            .to_bytes()
            .map_err(|e| PipelineError::OutputWriteFailed {
                path: self.path.clone(),
                source: std::io::Error::other(e),
            })?;

        let write_failed = |source| PipelineError::OutputWriteFailed {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
            }
        }
        let tmp = self.path.with_extension("epub.tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(write_failed)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(write_failed)?;

        self.written = true;
        debug!("EPUB is {} bytes", bytes.len());
        info!(
            "Packaged {} units into {}",
            self.units.len(),
            self.path.display()
        );
        Ok(())
    }

    fn artifact(&self) -> Option<&Path> {
        self.written.then_some(self.path.as_path())
    }
}

/// Remove characters XML 1.0 cannot carry: C0 controls other than tab, LF
/// and CR, and the noncharacters U+FFFE/U+FFFF.
fn strip_invalid_xml(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            matches!(c, '\t' | '\n' | '\r')
                || (c >= '\u{20}' && c != '\u{FFFE}' && c != '\u{FFFF}')
        })
        .collect()
}

fn xml_text(s: &str) -> String {
    html_escape::encode_text(&strip_invalid_xml(s)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn meta() -> BookMetadata {
        BookMetadata {
            title: "My Scan".into(),
            author: "OCR Extracted".into(),
            language: "fa".into(),
        }
    }

    fn unit(index: usize, text: &str) -> UnitResult {
        UnitResult::succeeded(index, format!("Page {index}"), text.into(), 1)
    }

    fn read(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut s = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut s)
            .unwrap();
        s
    }

    #[tokio::test]
    async fn per_unit_layout_lists_chapters_in_order() {
        let mut epub = EpubPackager::new("unused.epub", meta(), EpubLayout::PerUnit);
        for (i, text) in [(1, "one"), (2, ""), (3, "a < b & c")] {
            epub.write_unit(&unit(i, text)).await.unwrap();
        }
        let bytes = epub.to_bytes().unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        {
            let first = archive.by_index(0).unwrap();
            assert_eq!(first.name(), "mimetype");
            assert_eq!(first.compression(), CompressionMethod::Stored);
        }

        let opf = read(&mut archive, "EPUB/content.opf");
        assert!(opf.contains("<dc:title>My Scan</dc:title>"));
        assert!(opf.contains("<dc:language>fa</dc:language>"));
        assert!(opf.contains("<dc:creator>OCR Extracted</dc:creator>"));
        let nav_pos = opf.find("<itemref idref=\"nav\"/>").unwrap();
        let p1 = opf.find("<itemref idref=\"page_1\"/>").unwrap();
        let p2 = opf.find("<itemref idref=\"page_2\"/>").unwrap();
        let p3 = opf.find("<itemref idref=\"page_3\"/>").unwrap();
        assert!(nav_pos < p1 && p1 < p2 && p2 < p3);

        let nav = read(&mut archive, "EPUB/nav.xhtml");
        assert!(nav.find("Page 1").unwrap() < nav.find("Page 3").unwrap());

        let page2 = read(&mut archive, "EPUB/page_2.xhtml");
        assert!(page2.contains("<h2>Page 2</h2>\n<pre></pre>"));
        let page3 = read(&mut archive, "EPUB/page_3.xhtml");
        assert!(page3.contains("<pre>a &lt; b &amp; c</pre>"));

        let ncx = read(&mut archive, "EPUB/toc.ncx");
        assert!(ncx.contains("playOrder=\"3\""));
    }

    #[tokio::test]
    async fn single_flow_layout_is_one_chapter() {
        let mut epub = EpubPackager::new("unused.epub", meta(), EpubLayout::SingleFlow);
        epub.write_unit(&unit(1, " first ")).await.unwrap();
        epub.write_unit(&unit(2, "second")).await.unwrap();
        let bytes = epub.to_bytes().unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        assert!(archive.by_name("EPUB/page_1.xhtml").is_err());
        let full = read(&mut archive, "EPUB/full_text.xhtml");
        assert!(full.contains("<h1>Full Text</h1>"));
        assert!(full.contains("[Page 1]\nfirst\n\n[Page 2]\nsecond\n\n"));
    }

    #[tokio::test]
    async fn finish_writes_once_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books/scan.epub");
        let mut epub = EpubPackager::new(&path, meta(), EpubLayout::PerUnit);
        epub.write_unit(&unit(1, "text")).await.unwrap();
        assert!(epub.artifact().is_none());

        epub.finish().await.unwrap();
        epub.finish().await.unwrap();
        assert_eq!(epub.artifact(), Some(path.as_path()));
        assert!(path.exists());
        assert!(!path.with_extension("epub.tmp").exists());
        assert!(epub.write_unit(&unit(2, "late")).await.is_err());
    }

    #[tokio::test]
    async fn empty_packager_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.epub");
        let mut epub = EpubPackager::new(&path, meta(), EpubLayout::PerUnit);
        epub.finish().await.unwrap();
        assert!(!path.exists());
        assert!(epub.artifact().is_none());
    }

    #[test]
    fn control_characters_are_dropped() {
        assert_eq!(xml_text("a\u{0}b\u{1b}c\td"), "abc\td");
    }
}
