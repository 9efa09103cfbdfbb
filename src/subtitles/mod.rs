//! Subtitle documents → plain transcript text.
//!
//! The video platform serves captions in several serialisations. All of
//! them are reduced to the same thing: the spoken words in reading order,
//! whitespace collapsed to single spaces, timing thrown away.
//!
//! | Format | Shape                                         | Parser            |
//! |--------|-----------------------------------------------|-------------------|
//! | JSON3  | `{"events":[{"segs":[{"utf8":"…"}]}]}`        | [`extract_json3`] |
//! | SRV3   | `<timedtext><body><p><s>…</s></p></body>`     | [`extract_xml`]   |
//! | TTML   | `<tt><body><div><p>…</p></div></body></tt>`   | [`extract_xml`]   |
//! | WebVTT | `WEBVTT` header, cue timings, cue text        | [`extract_vtt`]   |
//!
//! Rolling auto-captions repeat the previous line in WebVTT; consecutive
//! duplicate cue lines are dropped.

pub mod job;
pub mod platform;

use crate::error::SubtitleError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Subtitle serialisations understood by [`extract_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubtitleFormat {
    Json3,
    #[default]
    Srv3,
    Vtt,
    Ttml,
}

impl SubtitleFormat {
    pub const ALL: [SubtitleFormat; 4] = [
        SubtitleFormat::Srv3,
        SubtitleFormat::Json3,
        SubtitleFormat::Vtt,
        SubtitleFormat::Ttml,
    ];

    /// File extension used by the platform.
    pub fn extension(self) -> &'static str {
        match self {
            SubtitleFormat::Json3 => "json3",
            SubtitleFormat::Srv3 => "srv3",
            SubtitleFormat::Vtt => "vtt",
            SubtitleFormat::Ttml => "ttml",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }

    /// Guess the format from the document itself; the file name is not
    /// trusted.
    pub fn detect(content: &str) -> Self {
        let head = content.trim_start_matches('\u{FEFF}').trim_start();
        if head.starts_with("WEBVTT") {
            SubtitleFormat::Vtt
        } else if head.starts_with('<') {
            if head.contains("<tt") {
                SubtitleFormat::Ttml
            } else {
                SubtitleFormat::Srv3
            }
        } else {
            SubtitleFormat::Json3
        }
    }
}

impl fmt::Display for SubtitleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for SubtitleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s.trim()).ok_or_else(|| {
            format!("unknown subtitle format '{s}' (expected srv3, json3, vtt or ttml)")
        })
    }
}

/// Extract the transcript from a subtitle document of any supported format.
pub fn extract_text(content: &str) -> Result<String, SubtitleError> {
    match SubtitleFormat::detect(content) {
        SubtitleFormat::Json3 => extract_json3(content),
        SubtitleFormat::Srv3 | SubtitleFormat::Ttml => extract_xml(content),
        SubtitleFormat::Vtt => extract_vtt(content),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn finish(words: Vec<String>, format: &'static str) -> Result<String, SubtitleError> {
    let text = collapse_whitespace(&words.join(" "));
    if text.is_empty() {
        Err(SubtitleError::NoText { format })
    } else {
        Ok(text)
    }
}

// ── JSON3 ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Json3Document {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Deserialize)]
struct Json3Event {
    #[serde(default)]
    segs: Vec<Json3Segment>,
}

#[derive(Deserialize)]
struct Json3Segment {
    #[serde(default)]
    utf8: String,
}

/// Words from `events[].segs[].utf8`, in order. Newline-only segments are
/// line breaks, not words.
pub fn extract_json3(content: &str) -> Result<String, SubtitleError> {
    let doc: Json3Document =
        serde_json::from_str(content).map_err(|e| SubtitleError::Malformed {
            format: "json3",
            detail: e.to_string(),
        })?;

    let words = doc
        .events
        .into_iter()
        .flat_map(|event| event.segs)
        .map(|seg| seg.utf8.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect();

    finish(words, "json3")
}

// ── SRV3 / TTML ──────────────────────────────────────────────────────────

/// Text of every `<p>` element, in document order.
///
/// Entities are decoded twice: once by the XML parser and once more for the
/// HTML entities the platform double-escapes inside caption text.
pub fn extract_xml(content: &str) -> Result<String, SubtitleError> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let doc = roxmltree::Document::parse_with_options(content.trim_start_matches('\u{FEFF}'), options)
        .map_err(|e| SubtitleError::Malformed {
            format: "xml",
            detail: e.to_string(),
        })?;

    let words = doc
        .descendants()
        .filter(|n| n.has_tag_name("p"))
        .map(|p| {
            let raw: String = p
                .descendants()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect();
            collapse_whitespace(&html_escape::decode_html_entities(raw.trim()))
        })
        .filter(|w| !w.is_empty())
        .collect();

    finish(words, "xml")
}

// ── WebVTT ───────────────────────────────────────────────────────────────

static RE_VTT_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Cue text of a WebVTT document. Header, NOTE/STYLE blocks, cue
/// identifiers and timing lines are skipped; inline tags are stripped.
pub fn extract_vtt(content: &str) -> Result<String, SubtitleError> {
    let content = content.trim_start_matches('\u{FEFF}');
    if !content.trim_start().starts_with("WEBVTT") {
        return Err(SubtitleError::Malformed {
            format: "vtt",
            detail: "missing WEBVTT header".into(),
        });
    }

    let mut words: Vec<String> = Vec::new();
    let mut last_line = String::new();

    let normalised = content.replace("\r\n", "\n");
    // Blocks are separated by blank lines; the first is the header.
    for block in normalised.split("\n\n").skip(1) {
        let mut lines = block.lines().skip_while(|l| l.trim().is_empty()).peekable();
        let Some(first) = lines.peek() else {
            continue;
        };
        if first.starts_with("NOTE") || first.starts_with("STYLE") || first.starts_with("REGION") {
            continue;
        }

        let mut in_cue = false;
        for line in lines {
            if line.contains("-->") {
                in_cue = true;
                continue;
            }
            if !in_cue {
                // cue identifier
                continue;
            }
            let text = collapse_whitespace(&html_escape::decode_html_entities(
                &RE_VTT_TAG.replace_all(line, ""),
            ));
            if text.is_empty() || text == last_line {
                continue;
            }
            last_line = text.clone();
            words.push(text);
        }
    }

    finish(words, "vtt")
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON3: &str = r#"{"wireMagic":"pb3","events":[
        {"tStartMs":0,"dDurationMs":1000,"segs":[{"utf8":"hello"},{"utf8":" world","tOffsetMs":400}]},
        {"tStartMs":1000,"segs":[{"utf8":"\n"}]},
        {"tStartMs":1500},
        {"tStartMs":2000,"segs":[{"utf8":"it's"},{"utf8":"  fine "}]}
    ]}"#;

    const SRV3: &str = r#"<?xml version="1.0" encoding="utf-8" ?><timedtext format="3">
<body>
<p t="0" d="1000"><s ac="0">hello</s><s t="400"> world</s></p>
<p t="1000" d="500">
</p>
<p t="2000" d="1000">it&amp;#39;s   fine</p>
</body>
</timedtext>"#;

    #[test]
    fn json3_and_srv3_agree() {
        let a = extract_json3(JSON3).unwrap();
        let b = extract_xml(SRV3).unwrap();
        assert_eq!(a, "hello world it's fine");
        assert_eq!(a, b);
    }

    #[test]
    fn detection_follows_content() {
        assert_eq!(SubtitleFormat::detect(JSON3), SubtitleFormat::Json3);
        assert_eq!(SubtitleFormat::detect(SRV3), SubtitleFormat::Srv3);
        assert_eq!(SubtitleFormat::detect("WEBVTT\n\n"), SubtitleFormat::Vtt);
        assert_eq!(
            SubtitleFormat::detect("<tt xmlns=\"http://www.w3.org/ns/ttml\"></tt>"),
            SubtitleFormat::Ttml
        );
    }

    #[test]
    fn json3_without_words_is_no_text() {
        let err = extract_json3(r#"{"events":[{"segs":[{"utf8":"\n"}]}]}"#).unwrap_err();
        assert!(matches!(err, SubtitleError::NoText { .. }));
        let err = extract_json3("{}").unwrap_err();
        assert!(matches!(err, SubtitleError::NoText { .. }));
    }

    #[test]
    fn malformed_documents_are_reported() {
        assert!(matches!(
            extract_json3("{not json").unwrap_err(),
            SubtitleError::Malformed { format: "json3", .. }
        ));
        assert!(matches!(
            extract_xml("<timedtext><p>open").unwrap_err(),
            SubtitleError::Malformed { .. }
        ));
    }

    #[test]
    fn ttml_paragraphs_are_read() {
        let ttml = r#"<?xml version="1.0"?>
<tt xmlns="http://www.w3.org/ns/ttml"><body><div>
<p begin="00:00:00.000" end="00:00:01.000">first<br/>line</p>
<p begin="00:00:01.000" end="00:00:02.000">second</p>
</div></body></tt>"#;
        assert_eq!(extract_text(ttml).unwrap(), "firstline second");
    }

    #[test]
    fn vtt_cues_are_deduplicated() {
        let vtt = "WEBVTT\nKind: captions\nLanguage: en\n\n\
NOTE generated\n\n\
1\n00:00:00.000 --> 00:00:01.000 align:start\n<c>hello</c> <00:00:00.500><c>world</c>\n\n\
00:00:01.000 --> 00:00:02.000\nhello world\nagain &amp; again\n";
        assert_eq!(extract_vtt(vtt).unwrap(), "hello world again & again");
    }

    #[test]
    fn format_parsing() {
        assert_eq!("SRV3".parse::<SubtitleFormat>().unwrap(), SubtitleFormat::Srv3);
        assert_eq!(SubtitleFormat::Json3.to_string(), "json3");
        assert!("srt".parse::<SubtitleFormat>().is_err());
    }
}
