//! Shared fixtures for the integration tests.

#![allow(dead_code)]

pub mod builders;

use std::collections::HashMap;
use std::sync::Mutex;

use lettre::Message;

use circulator::ai::{EmbedError, Embedder};
use circulator::email::error::Result as NotifyResult;
use circulator::email::Mailer;

/// A message as handed to the relay.
#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub raw: String,
}

/// Keeps every message instead of talking to SMTP.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, message: &Message) -> NotifyResult<()> {
        let to = message
            .envelope()
            .to()
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        self.sent.lock().unwrap().push(SentMail { to, raw });
        Ok(())
    }
}

/// Department names embed to unit vectors with a chosen cosine against the
/// summary, which always embeds to `[1, 0]`.
pub struct ScoreEmbedder {
    scores: HashMap<String, f32>,
}

impl ScoreEmbedder {
    pub fn new(scores: &[(&str, f32)]) -> Self {
        Self {
            scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }
}

impl Embedder for ScoreEmbedder {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts
            .iter()
            .map(|text| match self.scores.get(*text) {
                Some(score) => vec![*score, (1.0 - score * score).sqrt()],
                None => vec![1.0, 0.0],
            })
            .collect())
    }
}

/// Roster used by most tests.
pub fn roster() -> Vec<(&'static str, &'static str, Option<&'static str>)> {
    vec![
        ("Asha", "asha@univ.edu", Some("ECE")),
        ("Ben", "ben@univ.edu", Some("CS")),
        ("Chen", "chen@univ.edu", Some("CS")),
        ("Dara", "dara@univ.edu", None),
    ]
}

