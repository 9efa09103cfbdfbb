//! Prompts for the vision-model recognizer.
//!
//! The recognizer wants a faithful plain-text transcription, not a
//! reformatted document: the output lands in a page-delimited text file and
//! an EPUB `<pre>` block, where Markdown syntax would only be noise.

/// Default transcription prompt. `{language}` is replaced with the
/// configured language code.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a precise OCR engine. Transcribe all text visible on this scanned page.

Rules:
1. Output the text exactly as printed, in reading order for the page's script ({language}).
2. Keep line breaks between paragraphs; join hyphenated words split across lines.
3. Do not translate, summarise, correct or explain anything.
4. Do not add Markdown, code fences, headings or page markers.
5. Ignore running headers, footers and page numbers.
6. If the page contains no text, output nothing."#;

/// Build the system prompt for one page.
pub fn transcription_prompt(custom: Option<&str>, language: &str) -> String {
    custom
        .unwrap_or(DEFAULT_SYSTEM_PROMPT)
        .replace("{language}", language)
}
