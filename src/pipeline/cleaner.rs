//! Text normalisation for fetched documents.
//!
//! Per document: collapse blank-line runs, drop repeated short lines, drop
//! paragraphs with no substance, normalise Russian units, recount words.
//! Documents themselves are never merged or dropped here; duplicates across
//! documents are kept.

use regex::Regex;

use crate::types::{AppError, ParsedDocument, Result};

/// Lines shorter than this are boilerplate candidates when repeated
const SHORT_LINE_CHARS: usize = 50;
const MIN_PARAGRAPH_CHARS: usize = 50;
const MIN_PARAGRAPH_WORDS: usize = 5;

pub struct TextCleaner {
    blank_runs: Regex,
    figure: Regex,
    units: Vec<(Regex, &'static str)>,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| AppError::Internal(format!("Invalid pattern {}: {}", pattern, e)))
}

impl TextCleaner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            blank_runs: compile(r"\n{3,}")?,
            figure: compile(r"\d+%|\d+\s*(kW|MW|kWh)")?,
            units: vec![
                (compile(r"(\d+)\s*м\b")?, "${1} meters"),
                (compile(r"(\d+)\s*км\b")?, "${1} kilometers"),
                (compile(r"(\d+)\s*кВт\b")?, "${1} kW"),
                (compile(r"(\d+)\s*МВт\b")?, "${1} MW"),
                (compile(r"(\d+)\s*кВтч\b")?, "${1} kWh"),
            ],
        })
    }

    /// Clean every document, preserving order and count.
    pub fn clean_documents(&self, documents: Vec<ParsedDocument>) -> Vec<ParsedDocument> {
        let cleaned: Vec<ParsedDocument> = documents
            .into_iter()
            .map(|mut doc| {
                doc.cleaned_text = self.clean_text(&doc.cleaned_text);
                doc.word_count = doc.cleaned_text.split_whitespace().count();
                doc
            })
            .collect();

        tracing::info!(count = cleaned.len(), "Documents cleaned");
        cleaned
    }

    pub fn clean_text(&self, text: &str) -> String {
        let text = self.blank_runs.replace_all(text, "\n\n");
        let text = dedupe_short_lines(&text);

        let meaningful: Vec<&str> = text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| self.is_meaningful(p))
            .collect();

        let mut text = meaningful.join("\n\n");
        for (pattern, replacement) in &self.units {
            text = pattern.replace_all(&text, *replacement).into_owned();
        }
        text
    }

    fn is_meaningful(&self, paragraph: &str) -> bool {
        if paragraph.chars().count() < MIN_PARAGRAPH_CHARS && !self.figure.is_match(paragraph) {
            return false;
        }
        paragraph.split_whitespace().count() >= MIN_PARAGRAPH_WORDS
    }
}

/// Trim lines and drop short lines already seen. Blank lines survive as
/// paragraph separators (runs collapse to one).
fn dedupe_short_lines(text: &str) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in text.split('\n').map(str::trim) {
        if line.is_empty() {
            if lines.last().is_some_and(|l| !l.is_empty()) {
                lines.push("");
            }
            continue;
        }
        if line.chars().count() < SHORT_LINE_CHARS && !seen.insert(line) {
            continue;
        }
        lines.push(line);
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}
