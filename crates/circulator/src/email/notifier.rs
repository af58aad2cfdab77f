//! Fans a summarized circular out to its recipients.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::error::{NotifyError, Result};
use super::message::Attachment;
use super::tracker::{DeliveryStatus, DeliveryTracker, DispatchRecord};
use crate::db::Recipient;
use crate::worker::{DispatchContent, EmailJob, MailWorkerPool};

/// Handle returned once every message of a dispatch is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchReceipt {
    pub id: Uuid,
    pub queued: usize,
}

pub struct Notifier {
    pool: MailWorkerPool,
    tracker: Arc<DeliveryTracker>,
}

impl Notifier {
    pub fn new(pool: MailWorkerPool, tracker: Arc<DeliveryTracker>) -> Self {
        Self { pool, tracker }
    }

    /// Queues one message per recipient, in order. Blocks while the delivery
    /// queue is full, so call it off the async runtime.
    ///
    /// Recipients that could not be queued are marked failed and
    /// [`NotifyError::QueueClosed`] is returned.
    pub fn dispatch(
        &self,
        departments: Vec<String>,
        recipients: Vec<Recipient>,
        summary: &str,
        attachment: Attachment,
    ) -> Result<DispatchReceipt> {
        let id = self.tracker.create(departments, &recipients);
        let content = Arc::new(DispatchContent {
            summary: summary.to_string(),
            attachment,
        });

        let total = recipients.len();
        for (index, recipient) in recipients.into_iter().enumerate() {
            let job = EmailJob::new(id, index, recipient, Arc::clone(&content));
            if let Err(e) = self.pool.submit(job) {
                log::error!(
                    "Dispatch {} stopped after queueing {}/{} messages: {}",
                    id,
                    index,
                    total,
                    e
                );
                for remaining in index..total {
                    self.tracker.update(
                        id,
                        remaining,
                        DeliveryStatus::Failed {
                            error: NotifyError::QueueClosed.to_string(),
                        },
                    );
                }
                return Err(e);
            }
        }

        log::info!("Dispatch {} queued {} messages", id, total);
        Ok(DispatchReceipt { id, queued: total })
    }

    pub fn status(&self, id: Uuid) -> Option<DispatchRecord> {
        self.tracker.get(id)
    }

    /// Most recent dispatches, newest first.
    pub fn recent(&self, limit: usize) -> Vec<DispatchRecord> {
        self.tracker.recent(limit)
    }

    /// Stops intake and waits for queued messages to be delivered.
    pub fn shutdown(&self) {
        self.pool.shutdown();
        self.pool.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{Mailer, MessageComposer};
    use lettre::Message;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingMailer {
        bodies: Mutex<Vec<String>>,
    }

    impl Mailer for CountingMailer {
        fn send(&self, message: &Message) -> Result<()> {
            let raw = String::from_utf8_lossy(&message.formatted()).to_string();
            self.bodies.lock().unwrap().push(raw);
            Ok(())
        }
    }

    fn notifier(mailer: Arc<CountingMailer>) -> Notifier {
        let tracker = Arc::new(DeliveryTracker::default());
        let composer = MessageComposer::new("admin@univ.edu", "University Circular Update").unwrap();
        let pool = MailWorkerPool::new(mailer, composer, Arc::clone(&tracker), 2, 2);
        Notifier::new(pool, tracker)
    }

    fn students(n: usize) -> Vec<Recipient> {
        (0..n)
            .map(|i| Recipient {
                name: format!("Student {}", i),
                email: format!("student{}@univ.edu", i),
            })
            .collect()
    }

    #[test]
    fn test_dispatch_sends_to_everyone() {
        let mailer = Arc::new(CountingMailer::default());
        let notifier = notifier(Arc::clone(&mailer));

        let receipt = notifier
            .dispatch(
                vec!["CS".to_string()],
                students(5),
                "Hackathon on Saturday.",
                Attachment::new("hackathon.pdf", Arc::new(b"%PDF-1.4".to_vec())),
            )
            .unwrap();
        assert_eq!(receipt.queued, 5);

        notifier.shutdown();

        let bodies = mailer.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 5);
        assert!(bodies.iter().all(|b| b.contains("Hackathon on Saturday.")));
        assert!(bodies.iter().any(|b| b.contains("Dear Student 3,")));

        let record = notifier.status(receipt.id).unwrap();
        assert_eq!(record.counts.sent, 5);
        assert_eq!(record.departments, vec!["CS".to_string()]);
    }

    #[test]
    fn test_dispatch_without_recipients() {
        let mailer = Arc::new(CountingMailer::default());
        let notifier = notifier(Arc::clone(&mailer));

        let receipt = notifier
            .dispatch(
                vec!["ALL".to_string()],
                Vec::new(),
                "Nobody to tell.",
                Attachment::new("empty.txt", Arc::new(Vec::new())),
            )
            .unwrap();
        notifier.shutdown();

        assert_eq!(receipt.queued, 0);
        assert!(mailer.bodies.lock().unwrap().is_empty());
        assert!(notifier.status(receipt.id).unwrap().is_complete());
    }

    #[test]
    fn test_dispatch_after_shutdown_marks_failed() {
        let notifier = notifier(Arc::new(CountingMailer::default()));
        notifier.shutdown();

        let err = notifier
            .dispatch(
                vec!["CS".to_string()],
                students(3),
                "Late notice.",
                Attachment::new("late.pdf", Arc::new(Vec::new())),
            )
            .unwrap_err();
        assert!(matches!(err, NotifyError::QueueClosed));

        let recent = notifier.recent(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].counts.failed, 3);
        assert_eq!(recent[0].counts.queued, 0);
    }

    #[test]
    fn test_unknown_dispatch_status() {
        let notifier = notifier(Arc::new(CountingMailer::default()));
        assert!(notifier.status(Uuid::new_v4()).is_none());
        notifier.shutdown();
    }
}
