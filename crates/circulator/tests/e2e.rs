//! End-to-end runs of the circular pipeline: upload bytes in, emails out.
//!
//! Models are replaced by the extractive summarizer and a score-table
//! embedder; the student roster lives in an in-memory SQLite database.

mod common;

use std::sync::Arc;

use circulator::categorizer::MatchError;
use circulator::email::DeliveryStatus;
use circulator::processor::DocumentKind;
use circulator::PipelineError;

use common::builders::{docx_with_paragraphs, pdf_with_text, Harness};
use common::roster;

/// One upload and what should come of it.
struct TestCase {
    name: &'static str,
    filename: &'static str,
    content: fn() -> Vec<u8>,
    scores: &'static [(&'static str, f32)],
    expected_kind: DocumentKind,
    expected_departments: &'static [&'static str],
    expected_recipients: &'static [&'static str],
    summary_contains: &'static str,
}

const TEST_CASES: &[TestCase] = &[
    TestCase {
        name: "pdf_matches_cs",
        filename: "midterms.pdf",
        content: || pdf_with_text("Midterm exams begin Monday"),
        scores: &[("CS", 0.7), ("ECE", 0.2)],
        expected_kind: DocumentKind::Pdf,
        expected_departments: &["CS"],
        expected_recipients: &["ben@univ.edu", "chen@univ.edu"],
        summary_contains: "Midterm exams begin Monday",
    },
    TestCase {
        name: "docx_matches_ece",
        filename: "Lab Notice.DOCX",
        content: || docx_with_paragraphs(&["Lab access changes.", "Oscilloscopes move to room 4."]),
        scores: &[("CS", 0.1), ("ECE", 0.9)],
        expected_kind: DocumentKind::Docx,
        expected_departments: &["ECE"],
        expected_recipients: &["asha@univ.edu"],
        summary_contains: "Lab access changes.",
    },
    TestCase {
        name: "weak_match_goes_to_everyone",
        filename: "holiday.pdf",
        content: || pdf_with_text("Campus closed for the holiday"),
        scores: &[("CS", 0.3), ("ECE", 0.4)],
        expected_kind: DocumentKind::Pdf,
        expected_departments: &["ALL"],
        expected_recipients: &["asha@univ.edu", "ben@univ.edu", "chen@univ.edu", "dara@univ.edu"],
        summary_contains: "Campus closed",
    },
    TestCase {
        name: "unsupported_type_yields_empty_text",
        filename: "notes.txt",
        content: || b"Plain text is not extracted.".to_vec(),
        scores: &[("CS", 0.2), ("ECE", 0.2)],
        expected_kind: DocumentKind::Unknown,
        expected_departments: &["ALL"],
        expected_recipients: &["asha@univ.edu", "ben@univ.edu", "chen@univ.edu", "dara@univ.edu"],
        summary_contains: "",
    },
];

async fn run_case(case: &TestCase) {
    let harness = Harness::new(&roster(), case.scores).await;
    let outcome = harness
        .pipeline
        .run(case.filename, Arc::new((case.content)()))
        .await
        .unwrap_or_else(|e| panic!("[{}] pipeline failed: {}", case.name, e));
    harness.drain().await;

    assert_eq!(outcome.document_kind, case.expected_kind, "[{}] kind", case.name);
    assert!(
        outcome.summary.as_str().contains(case.summary_contains),
        "[{}] summary {:?}",
        case.name,
        outcome.summary
    );
    assert_eq!(
        outcome.departments, case.expected_departments,
        "[{}] departments",
        case.name
    );
    assert_eq!(
        outcome.status,
        format!(
            "Summary sent to: {} department(s).",
            case.expected_departments.join(", ")
        ),
        "[{}] status",
        case.name
    );
    assert_eq!(
        outcome.queued,
        case.expected_recipients.len(),
        "[{}] queued",
        case.name
    );

    let mut sent: Vec<String> = harness.mailer.sent().into_iter().map(|m| m.to).collect();
    sent.sort();
    assert_eq!(sent, case.expected_recipients, "[{}] recipients", case.name);

    let record = harness.notifier.status(outcome.dispatch_id).unwrap();
    assert!(
        record
            .recipients
            .iter()
            .all(|r| r.status == DeliveryStatus::Sent),
        "[{}] delivery {:?}",
        case.name,
        record.recipients
    );
}

#[tokio::test]
async fn test_all_cases() {
    for case in TEST_CASES {
        run_case(case).await;
    }
}

#[tokio::test]
async fn test_email_content_and_attachment() {
    let harness = Harness::new(&roster(), &[("CS", 0.7), ("ECE", 0.2)]).await;
    let outcome = harness
        .pipeline
        .run("midterms.pdf", Arc::new(pdf_with_text("Midterm exams begin Monday")))
        .await
        .unwrap();
    harness.drain().await;

    let sent = harness.mailer.sent();
    assert_eq!(sent.len(), 2);
    let ben = sent.iter().find(|m| m.to == "ben@univ.edu").unwrap();
    assert!(ben.raw.contains("Subject: University Circular Update"));
    assert!(ben.raw.contains("From: admin@univ.edu"));
    assert!(ben.raw.contains("Dear Ben,"));
    assert!(ben.raw.contains("Here is a summary of the latest circular:"));
    assert!(ben.raw.contains(outcome.summary.as_str()));
    assert!(ben.raw.contains("filename=\"midterms.pdf\""));
    assert!(ben.raw.contains("Content-Type: application/pdf"));
}

#[tokio::test]
async fn test_uploads_are_kept_with_unique_names() {
    let harness = Harness::new(&roster(), &[("CS", 0.7)]).await;
    for _ in 0..2 {
        harness
            .pipeline
            .run("notice.pdf", Arc::new(pdf_with_text("Fee deadline Friday")))
            .await
            .unwrap();
    }
    harness.drain().await;

    let mut names: Vec<String> = std::fs::read_dir(harness.upload_dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["notice.pdf".to_string(), "notice_2.pdf".to_string()]);
}

#[tokio::test]
async fn test_empty_roster_has_no_departments() {
    let harness = Harness::new(&[], &[]).await;
    let result = harness
        .pipeline
        .run("notice.pdf", Arc::new(pdf_with_text("Anything")))
        .await;
    harness.drain().await;

    assert!(matches!(
        result,
        Err(PipelineError::Match(MatchError::NoDepartments))
    ));
    assert!(harness.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_duplicate_rows_get_duplicate_emails() {
    let students = [
        ("Eve", "eve@univ.edu", Some("Math")),
        ("Eve", "eve@univ.edu", Some("Math")),
    ];
    let harness = Harness::new(&students, &[("Math", 0.95)]).await;
    let outcome = harness
        .pipeline
        .run("seminar.pdf", Arc::new(pdf_with_text("Seminar on topology")))
        .await
        .unwrap();
    harness.drain().await;

    assert_eq!(outcome.departments, vec!["Math".to_string()]);
    assert_eq!(outcome.queued, 2);
    assert_eq!(harness.mailer.sent().len(), 2);
}
