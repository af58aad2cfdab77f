use std::sync::Arc;

use uuid::Uuid;

use crate::db::Recipient;
use crate::email::Attachment;

/// What every recipient of one dispatch receives.
#[derive(Debug)]
pub struct DispatchContent {
    pub summary: String,
    pub attachment: Attachment,
}

/// A single message to deliver.
#[derive(Debug, Clone)]
pub struct EmailJob {
    pub dispatch_id: Uuid,
    /// Position of the recipient within the dispatch.
    pub index: usize,
    pub recipient: Recipient,
    pub content: Arc<DispatchContent>,
}

impl EmailJob {
    pub fn new(
        dispatch_id: Uuid,
        index: usize,
        recipient: Recipient,
        content: Arc<DispatchContent>,
    ) -> Self {
        Self {
            dispatch_id,
            index,
            recipient,
            content,
        }
    }
}
