//! Post-processing: deterministic cleanup of recognised page text.
//!
//! Both recognizers leave artefacts that are not part of the page:
//!
//! - tesseract terminates every page with a form feed (`\x0c`)
//! - vision models sometimes wrap the answer in ` ``` ` fences despite the
//!   prompt
//! - scanned text carries CRLF endings, trailing blanks, runs of empty lines
//!   and zero-width characters from the text layer
//!
//! The rules are pure `&str → String` passes applied in a fixed order:
//! normalise line endings before trimming, strip fences before anything
//! looks at line starts.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one page of recognised text.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF/CR → LF) and drop form feeds
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. Trim blank lines at both ends
pub fn clean_page_text(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    trim_blank_edges(&s)
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```\s*$").unwrap());

fn strip_outer_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\x0c', "")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 5: Strip invisible characters ───────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{200B}' | '\u{200E}' | '\u{200F}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
            )
        })
        .collect()
}

// ── Rule 6: Trim blank edges ─────────────────────────────────────────────────

/// Drop leading empty lines and all trailing whitespace, but keep the
/// indentation of the first text line.
fn trim_blank_edges(input: &str) -> String {
    let start = input
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| input[..i].rfind('\n').map(|nl| nl + 1).unwrap_or(0))
        .unwrap_or(input.len());
    input[start..].trim_end().to_string()
}
