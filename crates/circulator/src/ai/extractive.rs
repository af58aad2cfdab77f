//! Model-free summarizer used when the crate is built without the `ai`
//! feature.

use super::summarizer::{SummarizeError, Summarizer, Summary};

/// Keeps the leading sentences of the text until the word budget is spent.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    max_words: usize,
}

impl ExtractiveSummarizer {
    pub fn new(max_words: usize) -> Self {
        Self {
            max_words: max_words.max(1),
        }
    }
}

impl Summarizer for ExtractiveSummarizer {
    fn summarize(&self, text: &str) -> Result<Summary, SummarizeError> {
        let mut kept: Vec<&str> = Vec::new();

        for sentence in sentences(text) {
            let words: Vec<&str> = sentence.split_whitespace().collect();
            let remaining = self.max_words - kept.len();
            if words.len() > remaining {
                // The opening sentence alone may exceed the budget.
                if kept.is_empty() {
                    kept.extend(words.into_iter().take(remaining));
                }
                break;
            }
            kept.extend(words);
        }

        Ok(Summary::from_output(&kept.join(" ")))
    }
}

/// Splits on `.`, `!` or `?` followed by whitespace or end of text.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                let end = idx + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    out.push(sentence);
                }
                start = end;
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}
