use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Upload storage failed: {0}")]
    Storage(#[from] crate::error::StorageError),

    #[error("Text extraction failed: {0}")]
    Extract(#[from] crate::error::ProcessError),

    #[error("Summarization failed: {0}")]
    Summarize(#[from] crate::ai::SummarizeError),

    #[error("Department matching failed: {0}")]
    Match(#[from] crate::categorizer::MatchError),

    #[error("Student directory query failed: {0}")]
    Directory(#[from] crate::db::DatabaseError),

    #[error("Notification failed: {0}")]
    Notify(#[from] crate::email::NotifyError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
