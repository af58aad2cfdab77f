//! Outbound circular email.
//!
//! A dispatch composes one message per recipient, queues it on the
//! [`MailWorkerPool`](crate::worker::MailWorkerPool) and records each
//! outcome in the [`DeliveryTracker`].

pub mod error;
pub mod mailer;
pub mod message;
pub mod notifier;
pub mod tracker;

pub use error::NotifyError;
pub use mailer::{Mailer, SmtpMailer};
pub use message::{body_text, Attachment, MessageComposer};
pub use notifier::{DispatchReceipt, Notifier};
pub use tracker::{
    DeliveryCounts, DeliveryStatus, DeliveryTracker, DispatchRecord, RecipientDelivery,
};
