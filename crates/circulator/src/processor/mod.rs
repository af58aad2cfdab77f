//! Text extraction from uploaded circulars.
//!
//! The document kind is decided by the filename extension alone. Each kind
//! has a [`DocumentProcessor`]; [`TextExtractor`] is the pipeline-facing
//! entry point that turns unsupported kinds into empty text.

pub mod docx;
pub mod image;
pub mod ocr;
pub mod pdf;

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::config::OcrConfig;
use crate::error::ProcessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Docx,
    Image,
    Unknown,
}

impl DocumentKind {
    /// Maps an extension (without the dot) to a kind, ignoring case.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "docx" => Self::Docx,
            "png" | "jpg" | "jpeg" => Self::Image,
            _ => Self::Unknown,
        }
    }

    /// Uses the text after the last `.`; a name without a dot has no
    /// extension and is [`Unknown`](Self::Unknown).
    pub fn from_filename(name: &str) -> Self {
        Self::from_extension(extension_of(name))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Image => "image",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn extension_of(name: &str) -> &str {
    name.rfind('.').map(|dot| &name[dot + 1..]).unwrap_or("")
}

/// Text pulled out of a document, tagged with the kind it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub kind: DocumentKind,
}

impl ExtractedText {
    pub fn empty(kind: DocumentKind) -> Self {
        Self {
            text: String::new(),
            kind,
        }
    }
}

pub trait DocumentProcessor: Send + Sync {
    fn process(&self, path: &Path) -> Result<String, ProcessError>;
    fn supports(&self, kind: DocumentKind) -> bool;
}

pub struct ProcessorRegistry {
    processors: Vec<Box<dyn DocumentProcessor>>,
}

impl ProcessorRegistry {
    pub fn new(ocr_config: &OcrConfig) -> Self {
        let ocr = ocr::OcrProcessor::new(&ocr_config.languages, ocr_config.dpi);
        let pdf_ocr = ocr_config.pdf_fallback.then(|| ocr.clone());

        let processors: Vec<Box<dyn DocumentProcessor>> = vec![
            Box::new(pdf::PdfProcessor::new(pdf_ocr)),
            Box::new(docx::DocxProcessor::new()),
            Box::new(image::ImageProcessor::new(ocr)),
        ];

        Self { processors }
    }

    /// Extracts text, failing with [`ProcessError::UnsupportedFormat`] for
    /// unknown kinds.
    pub fn process(&self, path: &Path) -> Result<ExtractedText, ProcessError> {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let kind = DocumentKind::from_filename(name);

        for processor in &self.processors {
            if processor.supports(kind) {
                let text = processor.process(path)?;
                return Ok(ExtractedText { text, kind });
            }
        }

        Err(ProcessError::UnsupportedFormat(
            extension_of(name).to_ascii_lowercase(),
        ))
    }
}

/// Pipeline-facing extractor: unsupported files yield empty text of kind
/// [`DocumentKind::Unknown`] instead of an error.
pub struct TextExtractor {
    registry: ProcessorRegistry,
}

impl TextExtractor {
    pub fn new(ocr_config: &OcrConfig) -> Self {
        Self {
            registry: ProcessorRegistry::new(ocr_config),
        }
    }

    pub fn extract(&self, path: &Path) -> Result<ExtractedText, ProcessError> {
        match self.registry.process(path) {
            Err(ProcessError::UnsupportedFormat(ext)) => {
                log::warn!(
                    "Unsupported file type '{}' for {}; continuing with empty text",
                    ext,
                    crate::sanitize::redact_path(path)
                );
                Ok(ExtractedText::empty(DocumentKind::Unknown))
            }
            other => other,
        }
    }
}
