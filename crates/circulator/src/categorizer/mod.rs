//! Department detection by embedding similarity.

pub mod similarity;

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::ai::{EmbedError, Embedder};
use similarity::{cosine_similarity, first_argmax};

/// Label used when a circular goes to every student.
pub const ALL_DEPARTMENTS: &str = "ALL";

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("No departments found in the student directory")]
    NoDepartments,

    #[error("Failed to embed text: {0}")]
    Embed(#[from] EmbedError),

    #[error("Embedder returned {actual} vectors for {expected} inputs")]
    EmbeddingCount { expected: usize, actual: usize },
}

/// Target audience of a circular.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepartmentMatch {
    Department(String),
    All,
}

impl DepartmentMatch {
    /// Department labels as reported to the uploader.
    pub fn labels(&self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl fmt::Display for DepartmentMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Department(name) => f.write_str(name),
            Self::All => f.write_str(ALL_DEPARTMENTS),
        }
    }
}

impl Serialize for DepartmentMatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Picks the department whose name embedding is closest to the summary.
pub struct DepartmentMatcher {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
}

impl DepartmentMatcher {
    /// `threshold` is exclusive: a best score equal to it yields
    /// [`DepartmentMatch::All`].
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f32) -> Self {
        Self {
            embedder,
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Scores every department against the summary. Ties go to the
    /// department listed first.
    pub fn detect(
        &self,
        summary: &str,
        departments: &[String],
    ) -> Result<DepartmentMatch, MatchError> {
        if departments.is_empty() {
            return Err(MatchError::NoDepartments);
        }

        let names: Vec<&str> = departments.iter().map(String::as_str).collect();
        let department_vectors = self.embedder.embed(&names)?;
        if department_vectors.len() != departments.len() {
            return Err(MatchError::EmbeddingCount {
                expected: departments.len(),
                actual: department_vectors.len(),
            });
        }

        let summary_vector = self
            .embedder
            .embed(&[summary])?
            .into_iter()
            .next()
            .ok_or(MatchError::EmbeddingCount {
                expected: 1,
                actual: 0,
            })?;

        let scores: Vec<f32> = department_vectors
            .iter()
            .map(|v| cosine_similarity(&summary_vector, v))
            .collect();

        Ok(select_department(departments, &scores, self.threshold))
    }
}

/// First maximal score wins if it is strictly above `threshold`.
fn select_department(departments: &[String], scores: &[f32], threshold: f32) -> DepartmentMatch {
    match first_argmax(scores) {
        Some((idx, score)) if score > threshold => {
            log::debug!("Best department {:?} scored {:.4}", departments[idx], score);
            DepartmentMatch::Department(departments[idx].clone())
        }
        best => {
            log::debug!(
                "Best score {:?} not above threshold {}; targeting all students",
                best.map(|(_, s)| s),
                threshold
            );
            DepartmentMatch::All
        }
    }
}
