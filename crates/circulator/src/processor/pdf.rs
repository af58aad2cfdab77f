use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ProcessError;
use crate::processor::ocr::OcrProcessor;
use crate::processor::{DocumentKind, DocumentProcessor};

/// Extracts the embedded text layer with lopdf. With an OCR processor
/// attached, scanned or unparsable PDFs are rendered with poppler and OCR'd.
pub struct PdfProcessor {
    ocr: Option<OcrProcessor>,
}

impl PdfProcessor {
    pub fn new(ocr: Option<OcrProcessor>) -> Self {
        Self { ocr }
    }
}

impl DocumentProcessor for PdfProcessor {
    fn process(&self, path: &Path) -> Result<String, ProcessError> {
        let _span = tracing::info_span!("processor.pdf").entered();

        let pdf_bytes = std::fs::read(path).map_err(|e| ProcessError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;

        match lopdf::Document::load_mem(&pdf_bytes) {
            Ok(doc) => {
                let text = extract_text(&doc);
                match &self.ocr {
                    Some(ocr) if should_use_ocr(&text) => {
                        let _ocr_span =
                            tracing::info_span!("processor.ocr_fallback", reason = "text_quality")
                                .entered();
                        ocr_pages(&pdf_bytes, doc.get_pages().len(), ocr)
                    }
                    _ => Ok(text),
                }
            }
            Err(e) => {
                let Some(ocr) = &self.ocr else {
                    return Err(ProcessError::PdfProcessing(format!(
                        "Failed to load PDF: {}. OCR fallback disabled.",
                        e
                    )));
                };
                tracing::warn!(
                    "lopdf failed to parse {}: {}. Falling back to OCR.",
                    crate::sanitize::redact_path(path),
                    e
                );
                let _ocr_span =
                    tracing::info_span!("processor.ocr_fallback", reason = "lopdf_parse_failed")
                        .entered();
                let page_count = count_pages(&pdf_bytes)?;
                ocr_pages(&pdf_bytes, page_count, ocr)
            }
        }
    }

    fn supports(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::Pdf
    }
}

/// Page texts joined with newlines. Pages lopdf cannot decode are skipped.
fn extract_text(doc: &lopdf::Document) -> String {
    let mut text = String::new();

    for page_num in doc.get_pages().into_keys() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => log::debug!("Skipping page {}: {}", page_num, e),
        }
    }

    text
}

fn ocr_pages(pdf_bytes: &[u8], page_count: usize, ocr: &OcrProcessor) -> Result<String, ProcessError> {
    let pdf = TempPdf::write(pdf_bytes)?;
    collect_pages(page_count, |page_num| {
        render_page(pdf.path(), page_num, ocr.dpi()).and_then(|image| ocr.process_image_bytes(&image))
    })
}

/// Joins per-page text. Failed pages are skipped; if no page succeeds the
/// last error is returned.
fn collect_pages<F>(page_count: usize, mut read_page: F) -> Result<String, ProcessError>
where
    F: FnMut(u32) -> Result<String, ProcessError>,
{
    let mut all_text = String::new();
    let mut last_error = None;
    let mut succeeded = 0;

    for page_num in 1..=page_count as u32 {
        match read_page(page_num) {
            Ok(page_text) => {
                all_text.push_str(&page_text);
                all_text.push('\n');
                succeeded += 1;
            }
            Err(e) => {
                log::warn!("OCR of page {} failed: {}", page_num, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if succeeded == 0 => Err(e),
        _ => Ok(all_text),
    }
}

/// Marker lopdf emits for CID fonts it cannot decode.
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Shorter text is accepted regardless of its character mix.
const MIN_TOTAL_CHARS: usize = 50;

/// Below this share of alphanumeric characters the text is considered garbled.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// True when the extracted text layer is empty, only font-decoding markers,
/// or mostly non-alphanumeric noise.
fn should_use_ocr(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");
    if cleaned.is_empty() {
        return true;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();

    total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT
}

/// PDF bytes written to a temp file for the poppler tools, removed on drop.
struct TempPdf {
    path: PathBuf,
}

impl TempPdf {
    fn write(bytes: &[u8]) -> Result<Self, ProcessError> {
        let path = std::env::temp_dir().join(format!("circulator_{}.pdf", uuid::Uuid::new_v4()));
        std::fs::write(&path, bytes)
            .map_err(|e| ProcessError::PdfProcessing(format!("Failed to write temp PDF: {}", e)))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempPdf {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Page count via `pdfinfo`, for PDFs lopdf cannot parse.
fn count_pages(pdf_bytes: &[u8]) -> Result<usize, ProcessError> {
    let pdf = TempPdf::write(pdf_bytes)?;

    let output = Command::new("pdfinfo").arg(pdf.path()).output().map_err(|e| {
        ProcessError::PdfProcessing(format!(
            "Failed to run pdfinfo: {}. Make sure poppler-utils is installed.",
            e
        ))
    })?;

    if !output.status.success() {
        return Err(ProcessError::PdfProcessing(format!(
            "pdfinfo failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(parse_page_count(&String::from_utf8_lossy(&output.stdout)).unwrap_or(1))
}

fn parse_page_count(pdfinfo_output: &str) -> Option<usize> {
    pdfinfo_output
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|count| count.trim().parse().ok())
}

/// Renders one page to PNG bytes with `pdftoppm`.
fn render_page(pdf_path: &Path, page_num: u32, dpi: u32) -> Result<Vec<u8>, ProcessError> {
    let output_prefix =
        std::env::temp_dir().join(format!("circulator_page_{}", uuid::Uuid::new_v4()));
    let page = page_num.to_string();

    let output = Command::new("pdftoppm")
        .args(["-png", "-singlefile", "-r", &dpi.to_string(), "-f", &page, "-l", &page])
        .arg(pdf_path)
        .arg(&output_prefix)
        .output()
        .map_err(|e| {
            ProcessError::PdfProcessing(format!(
                "Failed to run pdftoppm: {}. Make sure poppler-utils is installed.",
                e
            ))
        })?;

    if !output.status.success() {
        return Err(ProcessError::PdfProcessing(format!(
            "pdftoppm failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let image_path = output_prefix.with_extension("png");
    let image_data = std::fs::read(&image_path).map_err(|e| {
        ProcessError::PdfProcessing(format!("Failed to read rendered page: {}", e))
    })?;
    let _ = std::fs::remove_file(&image_path);

    Ok(image_data)
}
