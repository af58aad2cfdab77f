//! Circular email composition.

use std::sync::Arc;

use lettre::message::header::ContentType;
use lettre::message::{Attachment as AttachmentPart, Mailbox, MultiPart, SinglePart};
use lettre::{Address, Message};

use super::error::{NotifyError, Result};
use crate::db::Recipient;

/// The uploaded file as it is attached to every message.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: ContentType,
    /// Shared by every job of a dispatch; read once per upload.
    pub bytes: Arc<Vec<u8>>,
}

impl Attachment {
    /// Guesses the content type from the filename extension, falling back to
    /// `application/octet-stream`.
    pub fn new(filename: impl Into<String>, bytes: Arc<Vec<u8>>) -> Self {
        let filename = filename.into();
        let mime = mime_guess::from_path(&filename).first_or_octet_stream();
        let content_type = ContentType::parse(mime.essence_str())
            .or_else(|_| ContentType::parse("application/octet-stream"))
            .unwrap_or(ContentType::TEXT_PLAIN);
        Self {
            filename,
            content_type,
            bytes,
        }
    }
}

/// Plain-text body sent to each student.
pub fn body_text(name: &str, summary: &str) -> String {
    format!(
        "Dear {},\n\nHere is a summary of the latest circular:\n\n{}\n\nRegards,\nAdmin",
        name, summary
    )
}

/// Builds one message per recipient with a fixed sender and subject.
#[derive(Debug, Clone)]
pub struct MessageComposer {
    from: Mailbox,
    subject: String,
}

impl MessageComposer {
    pub fn new(from: &str, subject: impl Into<String>) -> Result<Self> {
        Ok(Self {
            from: Mailbox::new(None, parse_address(from)?),
            subject: subject.into(),
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn compose(
        &self,
        recipient: &Recipient,
        summary: &str,
        attachment: &Attachment,
    ) -> Result<Message> {
        let to = Mailbox::new(None, parse_address(&recipient.email)?);

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(self.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body_text(&recipient.name, summary)))
                    .singlepart(
                        AttachmentPart::new(attachment.filename.clone())
                            .body(attachment.bytes.as_ref().clone(), attachment.content_type.clone()),
                    ),
            )?;

        Ok(message)
    }
}

fn parse_address(address: &str) -> Result<Address> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| NotifyError::InvalidAddress {
            address: crate::sanitize::mask_email(address),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient(email: &str) -> Recipient {
        Recipient {
            name: "Ben".to_string(),
            email: email.to_string(),
        }
    }

    fn composer() -> MessageComposer {
        MessageComposer::new("admin@univ.edu", "University Circular Update").unwrap()
    }

    #[test]
    fn test_body_text_layout() {
        assert_eq!(
            body_text("Ben", "Exams begin Monday."),
            "Dear Ben,\n\nHere is a summary of the latest circular:\n\nExams begin Monday.\n\nRegards,\nAdmin"
        );
    }

    #[test]
    fn test_attachment_content_type_from_extension() {
        let bytes = Arc::new(vec![1, 2, 3]);
        assert_eq!(
            Attachment::new("notice.pdf", bytes.clone()).content_type,
            ContentType::parse("application/pdf").unwrap()
        );
        assert_eq!(
            Attachment::new("scan.JPG", bytes.clone()).content_type,
            ContentType::parse("image/jpeg").unwrap()
        );
        assert_eq!(
            Attachment::new("notes.unknownext", bytes).content_type,
            ContentType::parse("application/octet-stream").unwrap()
        );
    }

    #[test]
    fn test_compose_headers_body_and_attachment() {
        let attachment = Attachment::new("notice.pdf", Arc::new(b"%PDF-1.5".to_vec()));
        let message = composer()
            .compose(&recipient("ben@univ.edu"), "Exams begin Monday.", &attachment)
            .unwrap();

        let raw = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(raw.contains("From: admin@univ.edu"), "{}", raw);
        assert!(raw.contains("To: ben@univ.edu"), "{}", raw);
        assert!(raw.contains("Subject: University Circular Update"), "{}", raw);
        assert!(raw.contains("Dear Ben,"), "{}", raw);
        assert!(raw.contains("Exams begin Monday."), "{}", raw);
        assert!(raw.contains("filename=\"notice.pdf\""), "{}", raw);
        assert!(raw.contains("Content-Type: application/pdf"), "{}", raw);
    }

    #[test]
    fn test_invalid_recipient_address() {
        let attachment = Attachment::new("notice.pdf", Arc::new(Vec::new()));
        match composer().compose(&recipient("not-an-address"), "x", &attachment) {
            Err(NotifyError::InvalidAddress { address, .. }) => assert_eq!(address, "****"),
            other => panic!("Expected InvalidAddress, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_sender_address() {
        assert!(matches!(
            MessageComposer::new("admin at univ", "Subject"),
            Err(NotifyError::InvalidAddress { .. })
        ));
    }
}
