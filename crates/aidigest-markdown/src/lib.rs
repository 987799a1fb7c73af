//! Lightweight markdown-to-HTML conversion.
//!
//! This is a small, deliberately non-conforming renderer: block tokens are
//! produced by [`block::tokenize`], rendered by [`render::render`], and span
//! markup inside headings and paragraphs is handled by
//! [`inline::parse_inline`]. It never fails; unknown input degrades to
//! paragraph text.

pub mod block;
pub mod inline;
pub mod render;

pub use block::{Token, tokenize};
pub use inline::parse_inline;
pub use render::{escape_html, render};

/// Converts markdown to an HTML fragment.
pub fn markdown_to_html(markdown: &str) -> String {
    let source = preprocess(markdown);
    render(&tokenize(&source)).trim().to_string()
}

/// Normalizes line endings, opens closed ATX headings and appends a blank line.
pub fn preprocess(markdown: &str) -> String {
    let normalized = markdown.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(normalized.len() + 2);
    for (i, line) in normalized.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(open_closed_heading(line));
    }
    out.push_str("\n\n");
    out
}

/// `## Title ##` becomes `## Title `.
fn open_closed_heading(line: &str) -> &str {
    if !line.starts_with('#') {
        return line;
    }
    let body = line.trim_end();
    if !body.ends_with('#') {
        return line;
    }
    let opened = body.trim_end_matches('#');
    let after_hashes = opened.trim_start_matches('#').trim_start();
    match after_hashes.chars().next() {
        Some(c) if c != '#' => opened,
        _ => line,
    }
}
