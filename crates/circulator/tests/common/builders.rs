//! Builders for documents and a fully wired pipeline.

use std::io::Write;
use std::sync::Arc;

use lopdf::{dictionary, Document, Object, Stream};
use sea_orm::{ActiveModelTrait, Set};
use tempfile::TempDir;

use circulator::ai::ExtractiveSummarizer;
use circulator::categorizer::DepartmentMatcher;
use circulator::config::OcrConfig;
use circulator::db::entities::student;
use circulator::db::{self, SeaOrmStudentDirectory};
use circulator::email::{DeliveryTracker, MessageComposer, Notifier};
use circulator::processor::TextExtractor;
use circulator::storage::UploadStore;
use circulator::worker::MailWorkerPool;
use circulator::{create_router, AppState, CircularPipeline};

use super::{RecordingMailer, ScoreEmbedder};

/// Single-page PDF whose text layer holds `line`.
pub fn pdf_with_text(line: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = format!("BT /F1 12 Tf 50 700 Td ({}) Tj ET", line);
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Minimal DOCX archive with one paragraph per entry of `paragraphs`.
pub fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    );

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

/// Pipeline over an in-memory SQLite roster, a fake embedder and a
/// recording mailer.
pub struct Harness {
    pub pipeline: Arc<CircularPipeline>,
    pub notifier: Arc<Notifier>,
    pub mailer: Arc<RecordingMailer>,
    pub upload_dir: TempDir,
}

impl Harness {
    pub async fn new(
        students: &[(&str, &str, Option<&str>)],
        department_scores: &[(&str, f32)],
    ) -> Self {
        let connection = db::connect("sqlite::memory:", true).await.unwrap();
        for (name, email, department) in students {
            student::ActiveModel {
                name: Set(name.to_string()),
                email: Set(email.to_string()),
                department: Set(department.map(String::from)),
                ..Default::default()
            }
            .insert(&connection)
            .await
            .unwrap();
        }

        let upload_dir = TempDir::new().unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let tracker = Arc::new(DeliveryTracker::default());
        let composer =
            MessageComposer::new("admin@univ.edu", "University Circular Update").unwrap();
        let pool = MailWorkerPool::new(
            Arc::clone(&mailer) as Arc<dyn circulator::email::Mailer>,
            composer,
            Arc::clone(&tracker),
            2,
            8,
        );
        let notifier = Arc::new(Notifier::new(pool, tracker));

        let ocr = OcrConfig {
            pdf_fallback: false,
            ..OcrConfig::default()
        };
        let pipeline = CircularPipeline::new(
            Arc::new(UploadStore::new(upload_dir.path())),
            Arc::new(TextExtractor::new(&ocr)),
            Arc::new(ExtractiveSummarizer::new(300)),
            Arc::new(DepartmentMatcher::new(
                Arc::new(ScoreEmbedder::new(department_scores)),
                0.5,
            )),
            Arc::new(SeaOrmStudentDirectory::new(connection)),
            Arc::clone(&notifier),
        );

        Self {
            pipeline: Arc::new(pipeline),
            notifier,
            mailer,
            upload_dir,
        }
    }

    pub fn router(&self) -> axum::Router {
        create_router(AppState::new(Arc::clone(&self.pipeline)), 10 * 1024 * 1024)
    }

    /// Waits for every queued message to be delivered.
    pub async fn drain(&self) {
        let notifier = Arc::clone(&self.notifier);
        tokio::task::spawn_blocking(move || notifier.shutdown())
            .await
            .unwrap();
    }
}
