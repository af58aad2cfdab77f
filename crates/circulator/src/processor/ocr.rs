use std::io::Cursor;
use std::sync::Arc;

use crate::error::ProcessError;

/// Tesseract OCR over in-memory images. Cheap to clone; a Tesseract instance
/// is created per call so clones can be used from several threads.
#[derive(Clone)]
pub struct OcrProcessor {
    inner: Arc<OcrProcessorInner>,
}

struct OcrProcessorInner {
    languages: String,
    dpi: u32,
}

impl OcrProcessor {
    /// `languages` are Tesseract codes combined as `eng+deu`; empty means
    /// English. `dpi` applies to rendered PDF pages.
    pub fn new(languages: &[String], dpi: u32) -> Self {
        let lang_str = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };

        Self {
            inner: Arc::new(OcrProcessorInner {
                languages: lang_str,
                dpi,
            }),
        }
    }

    pub fn dpi(&self) -> u32 {
        self.inner.dpi
    }

    pub fn languages(&self) -> &str {
        &self.inner.languages
    }

    pub fn process_image_bytes(&self, image_data: &[u8]) -> Result<String, ProcessError> {
        let _span = tracing::info_span!("processor.ocr").entered();

        let png_data = normalize_to_png(image_data)?;

        let mut lt = leptess::LepTess::new(None, &self.inner.languages).map_err(|e| {
            ProcessError::OcrFailed(format!("Failed to initialize Tesseract: {}", e))
        })?;

        lt.set_image_from_mem(&png_data)
            .map_err(|e| ProcessError::OcrFailed(format!("Failed to set image for OCR: {}", e)))?;

        lt.get_utf8_text()
            .map_err(|e| ProcessError::OcrFailed(format!("OCR failed: {}", e)))
    }
}

/// Decodes any supported raster format and re-encodes it as PNG, the
/// format leptess reads most reliably.
fn normalize_to_png(image_data: &[u8]) -> Result<Vec<u8>, ProcessError> {
    let img = image::load_from_memory(image_data)
        .map_err(|e| ProcessError::OcrFailed(format!("Failed to load image: {}", e)))?;

    let mut png_data = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
        .map_err(|e| ProcessError::OcrFailed(format!("Failed to convert image: {}", e)))?;
    Ok(png_data)
}
