pub mod job;
pub mod pool;

pub use job::{DispatchContent, EmailJob};
pub use pool::MailWorkerPool;
