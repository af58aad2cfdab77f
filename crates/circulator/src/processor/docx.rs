use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::ProcessError;
use crate::processor::{DocumentKind, DocumentProcessor};

/// Reads paragraph text from `word/document.xml`, one line per paragraph.
pub struct DocxProcessor;

impl DocxProcessor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DocxProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProcessor for DocxProcessor {
    fn process(&self, path: &Path) -> Result<String, ProcessError> {
        let _span = tracing::info_span!("processor.docx").entered();

        let file = std::fs::File::open(path).map_err(|e| ProcessError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| ProcessError::DocxProcessing(format!("Failed to open DOCX: {}", e)))?;

        extract_docx_text(&mut archive)
    }

    fn supports(&self, kind: DocumentKind) -> bool {
        kind == DocumentKind::Docx
    }
}

fn extract_docx_text<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<String, ProcessError> {
    let mut document_xml = archive
        .by_name("word/document.xml")
        .map_err(|e| ProcessError::DocxProcessing(format!("Failed to find document.xml: {}", e)))?;

    let mut xml_content = String::new();
    document_xml
        .read_to_string(&mut xml_content)
        .map_err(|e| ProcessError::DocxProcessing(format!("Failed to read document.xml: {}", e)))?;

    parse_docx_xml(&xml_content)
}

/// Collects `w:t` runs per `w:p` paragraph; `w:tab` becomes a tab and
/// `w:br`/`w:cr` a line break. Paragraphs are joined with `\n`.
fn parse_docx_xml(xml: &str) -> Result<String, ProcessError> {
    let mut reader = Reader::from_str(xml);

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current = Some(String::new()),
                b"t" => in_text_element = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match (e.local_name().as_ref(), current.as_mut()) {
                (b"p", None) => paragraphs.push(String::new()),
                (b"tab", Some(paragraph)) => paragraph.push('\t'),
                (b"br" | b"cr", Some(paragraph)) => paragraph.push('\n'),
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => {
                    if let Some(paragraph) = current.take() {
                        paragraphs.push(paragraph);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_text_element => {
                if let Some(paragraph) = current.as_mut() {
                    let decoded = e.decode().map_err(|e| {
                        ProcessError::DocxProcessing(format!("Invalid text encoding: {}", e))
                    })?;
                    paragraph.push_str(&decoded);
                }
            }
            Ok(Event::GeneralRef(r)) if in_text_element => {
                if let Some(paragraph) = current.as_mut() {
                    if let Ok(Some(ch)) = r.resolve_char_ref() {
                        paragraph.push(ch);
                    } else if let Ok(name) = r.decode() {
                        if let Some(value) = resolve_predefined_entity(&name) {
                            paragraph.push_str(value);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ProcessError::DocxProcessing(format!(
                    "XML parsing error: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(paragraphs.join("\n"))
}
