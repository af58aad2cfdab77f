use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::email::{DeliveryStatus, DeliveryTracker, Mailer, MessageComposer, NotifyError};
use crate::sanitize::mask_email;
use crate::worker::job::EmailJob;

/// Fixed set of threads delivering [`EmailJob`]s from a bounded queue.
/// Submitting blocks while the queue is full.
pub struct MailWorkerPool {
    job_sender: RwLock<Option<Sender<EmailJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Arc<AtomicBool>,
}

struct WorkerContext {
    mailer: Arc<dyn Mailer>,
    composer: MessageComposer,
    tracker: Arc<DeliveryTracker>,
}

impl MailWorkerPool {
    /// Starts `worker_count` delivery threads. Zero values are raised to one.
    pub fn new(
        mailer: Arc<dyn Mailer>,
        composer: MessageComposer,
        tracker: Arc<DeliveryTracker>,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let (job_sender, job_receiver) = bounded::<EmailJob>(queue_capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let context = Arc::new(WorkerContext {
            mailer,
            composer,
            tracker,
        });

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let worker_context = Arc::clone(&context);

            let handle = thread::Builder::new()
                .name(format!("mail-worker-{}", worker_id))
                .spawn(move || run_worker(worker_id, job_rx, worker_context));

            match handle {
                Ok(handle) => workers.push(handle),
                Err(e) => error!("Failed to spawn mail worker {}: {}", worker_id, e),
            }
        }

        info!("Started {} mail workers", workers.len());

        Self {
            job_sender: RwLock::new(Some(job_sender)),
            workers: Mutex::new(workers),
            shutdown,
        }
    }

    /// Queues a job, blocking while the queue is full. Fails once the pool
    /// is shut down.
    pub fn submit(&self, job: EmailJob) -> Result<(), NotifyError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(NotifyError::QueueClosed);
        }

        // Blocking send happens outside the lock so shutdown can take the sender.
        let sender = self
            .job_sender
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match sender {
            Some(sender) => sender.send(job).map_err(|_| NotifyError::QueueClosed),
            None => Err(NotifyError::QueueClosed),
        }
    }

    /// Stops accepting jobs. Jobs already queued are still delivered.
    pub fn shutdown(&self) {
        info!("Shutting down mail worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
        // Dropping the last sender disconnects the channel once it drains.
        self.job_sender
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    /// Joins every worker. Call after [`shutdown`](Self::shutdown).
    pub fn wait(&self) {
        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Mail worker {} panicked: {:?}", i, e);
            } else {
                debug!("Mail worker {} finished", i);
            }
        }

        info!("All mail workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

impl Drop for MailWorkerPool {
    fn drop(&mut self) {
        if !self.is_shutdown() {
            self.shutdown();
        }
    }
}

fn run_worker(worker_id: usize, job_receiver: Receiver<EmailJob>, context: Arc<WorkerContext>) {
    debug!("Mail worker {} started", worker_id);

    loop {
        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(job) => {
                let status = deliver(&context, &job);
                context.tracker.update(job.dispatch_id, job.index, status);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Mail worker {} queue disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Mail worker {} stopped", worker_id);
}

fn deliver(context: &WorkerContext, job: &EmailJob) -> DeliveryStatus {
    let _span = tracing::info_span!(
        "deliver",
        dispatch = %job.dispatch_id,
        recipient = job.index
    )
    .entered();

    let masked = mask_email(&job.recipient.email);
    let result = context
        .composer
        .compose(
            &job.recipient,
            &job.content.summary,
            &job.content.attachment,
        )
        .and_then(|message| context.mailer.send(&message));

    match result {
        Ok(()) => {
            debug!("Sent circular to {}", masked);
            DeliveryStatus::Sent
        }
        Err(e) => {
            let error = e.to_string().replace(job.recipient.email.as_str(), &masked);
            warn!("Failed to send circular to {}: {}", masked, error);
            DeliveryStatus::Failed { error }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Recipient;
    use crate::email::Attachment;
    use crate::worker::job::DispatchContent;
    use lettre::Message;

    /// Records envelope recipients; fails for addresses in `reject`.
    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<String>>,
        reject: Vec<String>,
    }

    impl Mailer for RecordingMailer {
        fn send(&self, message: &Message) -> crate::email::error::Result<()> {
            let to = message
                .envelope()
                .to()
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(",");
            if self.reject.contains(&to) {
                return Err(NotifyError::Delivery(format!(
                    "550 5.1.1 <{}>: Recipient address rejected",
                    to
                )));
            }
            self.sent.lock().unwrap().push(to);
            Ok(())
        }
    }

    fn recipient(name: &str, email: &str) -> Recipient {
        Recipient {
            name: name.to_string(),
            email: email.to_string(),
        }
    }

    fn content() -> Arc<DispatchContent> {
        Arc::new(DispatchContent {
            summary: "Library hours extended.".to_string(),
            attachment: Attachment::new("notice.pdf", Arc::new(b"%PDF-1.4".to_vec())),
        })
    }

    fn pool(mailer: Arc<RecordingMailer>, tracker: Arc<DeliveryTracker>) -> MailWorkerPool {
        let composer = MessageComposer::new("admin@univ.edu", "University Circular Update").unwrap();
        MailWorkerPool::new(mailer, composer, tracker, 2, 4)
    }

    #[test]
    fn test_pool_lifecycle() {
        let pool = pool(
            Arc::new(RecordingMailer::default()),
            Arc::new(DeliveryTracker::default()),
        );
        assert!(!pool.is_shutdown());

        pool.shutdown();
        assert!(pool.is_shutdown());
        pool.wait();
    }

    #[test]
    fn test_delivers_queued_jobs_before_stopping() {
        let mailer = Arc::new(RecordingMailer::default());
        let tracker = Arc::new(DeliveryTracker::default());
        let pool = pool(Arc::clone(&mailer), Arc::clone(&tracker));

        let recipients: Vec<Recipient> = (0..10)
            .map(|i| recipient("Student", &format!("s{}@univ.edu", i)))
            .collect();
        let id = tracker.create(vec!["CS".to_string()], &recipients);
        let content = content();
        for (index, r) in recipients.into_iter().enumerate() {
            pool.submit(EmailJob::new(id, index, r, Arc::clone(&content)))
                .unwrap();
        }

        pool.shutdown();
        pool.wait();

        let mut sent = mailer.sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(sent.len(), 10);
        assert!(sent.contains(&"s9@univ.edu".to_string()));

        let record = tracker.get(id).unwrap();
        assert_eq!(record.counts.sent, 10);
        assert!(record.is_complete());
    }

    #[test]
    fn test_failures_are_per_recipient() {
        let mailer = Arc::new(RecordingMailer {
            sent: Mutex::new(Vec::new()),
            reject: vec!["bad@univ.edu".to_string()],
        });
        let tracker = Arc::new(DeliveryTracker::default());
        let pool = pool(Arc::clone(&mailer), Arc::clone(&tracker));

        let recipients = vec![
            recipient("Ann", "ann@univ.edu"),
            recipient("Bad", "bad@univ.edu"),
            recipient("Typo", "typo-at-univ"),
            recipient("Cy", "cy@univ.edu"),
        ];
        let id = tracker.create(vec!["ALL".to_string()], &recipients);
        let content = content();
        for (index, r) in recipients.into_iter().enumerate() {
            pool.submit(EmailJob::new(id, index, r, Arc::clone(&content)))
                .unwrap();
        }
        pool.shutdown();
        pool.wait();

        let record = tracker.get(id).unwrap();
        assert_eq!(record.counts.sent, 2);
        assert_eq!(record.counts.failed, 2);
        assert_eq!(record.recipients[0].status, DeliveryStatus::Sent);
        match &record.recipients[1].status {
            DeliveryStatus::Failed { error } => {
                assert!(error.contains("550"));
                assert!(error.contains("<b****@univ.edu>"));
                assert!(!error.contains("bad@univ.edu"));
            }
            other => panic!("Expected failure, got {:?}", other),
        }
        assert!(matches!(
            record.recipients[2].status,
            DeliveryStatus::Failed { .. }
        ));
    }

    #[test]
    fn test_shutdown_while_submit_blocks() {
        // No workers, so nothing drains the queue.
        let (sender, receiver) = bounded::<EmailJob>(1);
        let pool = Arc::new(MailWorkerPool {
            job_sender: RwLock::new(Some(sender)),
            workers: Mutex::new(Vec::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        });

        let id = uuid::Uuid::new_v4();
        pool.submit(EmailJob::new(id, 0, recipient("Ann", "ann@univ.edu"), content()))
            .unwrap();

        let blocked = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                pool.submit(EmailJob::new(id, 1, recipient("Cy", "cy@univ.edu"), content()))
            })
        };
        thread::sleep(Duration::from_millis(50));

        pool.shutdown();
        assert!(pool.is_shutdown());

        // Shutdown returned; the pending submit finishes once the queue has room.
        drop(receiver.recv().unwrap());
        assert!(matches!(
            blocked.join().unwrap(),
            Ok(()) | Err(NotifyError::QueueClosed)
        ));
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let tracker = Arc::new(DeliveryTracker::default());
        let pool = pool(Arc::new(RecordingMailer::default()), Arc::clone(&tracker));
        pool.shutdown();

        let job = EmailJob::new(
            uuid::Uuid::new_v4(),
            0,
            recipient("Ann", "ann@univ.edu"),
            content(),
        );
        assert!(matches!(pool.submit(job), Err(NotifyError::QueueClosed)));
        pool.wait();
    }
}
