use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::ai::Summary;
use crate::categorizer::DepartmentMatch;
use crate::db::Recipient;
use crate::email::DispatchReceipt;
use crate::processor::{DocumentKind, ExtractedText};
use crate::storage::UploadedDocument;

pub struct PipelineContext {
    // Input
    pub client_filename: String,
    pub bytes: Arc<Vec<u8>>,

    // Guaranteed Some after step_store
    pub document: Option<UploadedDocument>,

    // Guaranteed Some after step_extract
    pub extracted: Option<ExtractedText>,

    // Guaranteed Some after step_summarize
    pub summary: Option<Summary>,

    // Guaranteed Some after step_match
    pub target: Option<DepartmentMatch>,

    pub recipients: Vec<Recipient>,

    // Guaranteed Some after step_notify
    pub receipt: Option<DispatchReceipt>,
}

impl PipelineContext {
    pub fn new(client_filename: impl Into<String>, bytes: Arc<Vec<u8>>) -> Self {
        Self {
            client_filename: client_filename.into(),
            bytes,
            document: None,
            extracted: None,
            summary: None,
            target: None,
            recipients: Vec::new(),
            receipt: None,
        }
    }
}

/// What the uploader gets back.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub summary: Summary,
    pub status: String,
    pub departments: Vec<String>,
    pub document_kind: DocumentKind,
    pub dispatch_id: Uuid,
    pub queued: usize,
}
