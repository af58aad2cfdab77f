//! Message delivery.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use super::error::{NotifyError, Result};
use crate::config::MailConfig;

/// Sends a composed message. Implementations are shared by all delivery
/// workers and may block.
pub trait Mailer: Send + Sync {
    fn send(&self, message: &Message) -> Result<()>;
}

/// SMTP relay with STARTTLS and username/password login. The underlying
/// connection pool is reused across messages.
pub struct SmtpMailer {
    transport: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::starttls_relay(&config.smtp_host)
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        log::info!(
            "SMTP relay configured: {}:{} (STARTTLS)",
            config.smtp_host,
            config.smtp_port
        );
        Ok(Self { transport })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, message: &Message) -> Result<()> {
        self.transport
            .send(message)
            .map(|_| ())
            .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}
