use std::path::Path;

use crate::error::ProcessError;
use crate::processor::ocr::OcrProcessor;
use crate::processor::{DocumentKind, DocumentProcessor};

/// OCRs scanned circulars (PNG or JPEG).
pub struct ImageProcessor {
    ocr: OcrProcessor,
}

impl ImageProcessor {
    pub fn new(ocr: OcrProcessor) -> Self {
        Self { ocr }
    }
}

impl DocumentProcessor for ImageProcessor {
    fn process(&self, path: &Path) -> Result<String, ProcessError> {
        let _span = tracing::info_span!("processor.image").entered();

        let image_data = std::fs::read(path).map_err(|e| ProcessError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.ocr.process_image_bytes(&image_data)
    }

    fn supports(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::Image
    }
}
