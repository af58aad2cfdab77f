//! Outbound email error types.

use thiserror::Error;

/// Errors that can occur while composing or delivering circular emails.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// A recipient or sender address could not be parsed.
    #[error("Invalid email address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The message could not be assembled.
    #[error("Failed to build message: {0}")]
    Compose(#[from] lettre::error::Error),

    /// The SMTP transport could not be configured.
    #[error("Invalid SMTP configuration: {0}")]
    Transport(String),

    /// The relay rejected or failed to accept the message.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The delivery queue no longer accepts jobs.
    #[error("Delivery queue is closed")]
    QueueClosed,
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
