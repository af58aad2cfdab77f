//! Summarization contract shared by the llama backend and the extractive
//! fallback.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Marker the instruction-tuned model emits at the end of its answer.
pub const STOP_MARKER: &str = "</s>";

/// Errors that can occur during summarization.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("Failed to initialize LLM backend: {0}")]
    BackendInit(String),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Failed to create context: {0}")]
    ContextCreation(String),

    #[error("Failed to tokenize input: {0}")]
    Tokenization(String),

    #[error("Prompt of {prompt_tokens} tokens plus {max_tokens} generated tokens exceeds the context window of {context_size}")]
    PromptTooLong {
        prompt_tokens: usize,
        max_tokens: usize,
        context_size: usize,
    },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Mutex poisoned - concurrent access failed")]
    MutexPoisoned,
}

/// A generated summary: trimmed, bounded by the generation budget, and free
/// of the stop marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Summary(String);

impl Summary {
    /// Cleans raw model output into a summary. Everything from the first stop
    /// marker on is dropped.
    pub fn from_output(raw: &str) -> Self {
        let text = match raw.find(STOP_MARKER) {
            Some(idx) => &raw[..idx],
            None => raw,
        };
        Self(text.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Summary {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Produces a short summary of a circular's text.
///
/// Implementations are shared across requests behind an `Arc` and may block;
/// callers on the async runtime run them in `spawn_blocking`.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, text: &str) -> Result<Summary, SummarizeError>;
}

/// Escapes instruction and sequence markers so document text cannot close
/// the instruction block or end the sequence early.
///
/// # Sequences Escaped
/// - `<s>`, `</s>` - Sequence boundaries
/// - `[INST]`, `[/INST]` - Instruction markers
/// - `<<SYS>>`, `<</SYS>>` - System prompt markers
/// - `<|...|>` - ChatML special tokens
pub fn sanitize_for_prompt(text: &str) -> String {
    text.replace("<|", "< |")
        .replace("|>", "| >")
        .replace("<s>", "< s >")
        .replace("</s>", "< / s >")
        .replace("[INST]", "[ INST ]")
        .replace("[/INST]", "[ / INST ]")
        .replace("<<SYS>>", "< < SYS > >")
        .replace("<</SYS>>", "< < / SYS > >")
}

/// Wraps the document text in the summarization instruction.
pub fn build_prompt(text: &str) -> String {
    format!(
        "[INST] Summarize the university circular:\n\n{} [/INST]",
        sanitize_for_prompt(text)
    )
}
