use std::sync::Arc;

use tracing::{debug, info, info_span, Instrument};

use crate::ai::{Summarizer, Summary};
use crate::categorizer::{DepartmentMatch, DepartmentMatcher};
use crate::db::StudentDirectory;
use crate::email::{Attachment, Notifier};
use crate::processor::TextExtractor;
use crate::sanitize;
use crate::storage::UploadStore;

use super::context::{PipelineContext, PipelineOutcome};
use super::error::PipelineError;

/// Store, extract, summarize, match, look up recipients, notify.
///
/// Every component is built once and shared across requests.
pub struct CircularPipeline {
    store: Arc<UploadStore>,
    extractor: Arc<TextExtractor>,
    summarizer: Arc<dyn Summarizer>,
    matcher: Arc<DepartmentMatcher>,
    directory: Arc<dyn StudentDirectory>,
    notifier: Arc<Notifier>,
}

impl CircularPipeline {
    pub fn new(
        store: Arc<UploadStore>,
        extractor: Arc<TextExtractor>,
        summarizer: Arc<dyn Summarizer>,
        matcher: Arc<DepartmentMatcher>,
        directory: Arc<dyn StudentDirectory>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            store,
            extractor,
            summarizer,
            matcher,
            directory,
            notifier,
        }
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Runs one uploaded circular through every stage. Nothing is returned
    /// unless all stages succeed.
    pub async fn run(
        &self,
        client_filename: &str,
        bytes: Arc<Vec<u8>>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut ctx = PipelineContext::new(client_filename, bytes);
        let span = info_span!("pipeline",
            filename = %sanitize::redact_path(std::path::Path::new(client_filename)),
            bytes = ctx.bytes.len(),
        );

        async move {
            self.step_store(&mut ctx)
                .instrument(info_span!("store"))
                .await?;
            self.step_extract(&mut ctx)
                .instrument(info_span!("extract"))
                .await?;
            self.step_summarize(&mut ctx)
                .instrument(info_span!("summarize"))
                .await?;
            self.step_match(&mut ctx)
                .instrument(info_span!("match_department"))
                .await?;
            self.step_lookup_recipients(&mut ctx)
                .instrument(info_span!("lookup_recipients"))
                .await?;
            self.step_notify(&mut ctx)
                .instrument(info_span!("notify"))
                .await?;

            Ok::<_, PipelineError>(Self::build_outcome(ctx))
        }
        .instrument(span)
        .await
    }

    async fn step_store(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let store = Arc::clone(&self.store);
        let name = ctx.client_filename.clone();
        let bytes = Arc::clone(&ctx.bytes);

        let document = tokio::task::spawn_blocking(move || store.save(&name, &bytes)).await??;
        debug!(
            "Stored {} as {}",
            document.original_name,
            sanitize::redact_path(&document.path)
        );
        ctx.document = Some(document);
        Ok(())
    }

    async fn step_extract(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let path = ctx
            .document
            .as_ref()
            .map(|d| d.path.clone())
            .ok_or_else(|| PipelineError::Task("extract ran before store".to_string()))?;
        let extractor = Arc::clone(&self.extractor);

        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&path)).await??;
        info!(
            "Extracted {} characters ({})",
            extracted.text.chars().count(),
            extracted.kind
        );
        ctx.extracted = Some(extracted);
        Ok(())
    }

    async fn step_summarize(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let text = ctx
            .extracted
            .as_ref()
            .map(|e| e.text.clone())
            .unwrap_or_default();
        let summarizer = Arc::clone(&self.summarizer);

        let summary = tokio::task::spawn_blocking(move || summarizer.summarize(&text)).await??;
        info!("Summary has {} characters", summary.as_str().chars().count());
        ctx.summary = Some(summary);
        Ok(())
    }

    async fn step_match(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let departments = self.directory.departments().await?;
        debug!("Matching against {} departments", departments.len());

        let summary = ctx
            .summary
            .as_ref()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        let matcher = Arc::clone(&self.matcher);

        let target =
            tokio::task::spawn_blocking(move || matcher.detect(&summary, &departments)).await??;
        info!("Matched department: {}", target);
        ctx.target = Some(target);
        Ok(())
    }

    async fn step_lookup_recipients(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let target = ctx.target.clone().unwrap_or(DepartmentMatch::All);
        ctx.recipients = self.directory.recipients(&target).await?;
        info!("{} recipients for {}", ctx.recipients.len(), target);
        Ok(())
    }

    async fn step_notify(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let departments = ctx
            .target
            .as_ref()
            .map(DepartmentMatch::labels)
            .unwrap_or_default();
        let summary = ctx
            .summary
            .as_ref()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        let attachment_name = ctx
            .document
            .as_ref()
            .map(|d| d.original_name.clone())
            .unwrap_or_else(|| ctx.client_filename.clone());
        let attachment = Attachment::new(attachment_name, Arc::clone(&ctx.bytes));
        let recipients = std::mem::take(&mut ctx.recipients);
        let notifier = Arc::clone(&self.notifier);

        let receipt = tokio::task::spawn_blocking(move || {
            notifier.dispatch(departments, recipients, &summary, attachment)
        })
        .await??;
        ctx.receipt = Some(receipt);
        Ok(())
    }

    fn build_outcome(ctx: PipelineContext) -> PipelineOutcome {
        let departments = ctx
            .target
            .as_ref()
            .map(DepartmentMatch::labels)
            .unwrap_or_default();
        let document_kind = ctx
            .extracted
            .as_ref()
            .map(|e| e.kind)
            .unwrap_or(crate::processor::DocumentKind::Unknown);
        let (dispatch_id, queued) = ctx
            .receipt
            .map(|r| (r.id, r.queued))
            .unwrap_or((uuid::Uuid::nil(), 0));

        PipelineOutcome {
            summary: ctx.summary.unwrap_or_else(|| Summary::from_output("")),
            status: status_message(&departments),
            departments,
            document_kind,
            dispatch_id,
            queued,
        }
    }
}

/// `"Summary sent to: CS department(s)."`
pub fn status_message(departments: &[String]) -> String {
    format!("Summary sent to: {} department(s).", departments.join(", "))
}
