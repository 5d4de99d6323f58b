//! Paragraph listing used to prompt the instruction generators.

use std::fmt::Write;

use serde::Serialize;

use crate::locator::TextIndex;
use crate::package::DocumentPackage;

pub const DEFAULT_STYLE: &str = "Normal";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParagraphText {
    pub index: usize,
    pub style: String,
    pub text: String,
}

/// Visible text of every paragraph, in document order.
pub fn extract_paragraphs(package: &DocumentPackage) -> Vec<ParagraphText> {
    let index = TextIndex::build(package.body().root());
    index
        .paragraphs()
        .iter()
        .enumerate()
        .map(|(i, paragraph)| ParagraphText {
            index: i,
            style: paragraph
                .style
                .clone()
                .unwrap_or_else(|| DEFAULT_STYLE.to_string()),
            text: index.text()[paragraph.span.start..paragraph.span.end].to_string(),
        })
        .collect()
}

/// One `[P{index}|{style}] {text}` line per non-blank paragraph.
pub fn render_listing(paragraphs: &[ParagraphText]) -> String {
    let mut out = String::new();
    for paragraph in paragraphs.iter().filter(|p| !p.text.trim().is_empty()) {
        let _ = writeln!(out, "[P{}|{}] {}", paragraph.index, paragraph.style, paragraph.text);
    }
    out
}
