// SMTP delivery of composed notifications.
use crate::compose::Message;
use crate::config::SmtpConfig;
use anyhow::{Context, Result};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message as Email, SmtpTransport, Transport};

/// Collaborator contract for notification delivery. Failure is reported to
/// the caller, which logs it and moves on; there is no retry queue.
pub trait Mailer {
    fn send(&self, message: &Message) -> Result<()>;
}

/// STARTTLS SMTP relay with one fixed sender and one fixed recipient.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let transport = SmtpTransport::starttls_relay(&config.server)
            .with_context(|| format!("invalid SMTP server '{}'", config.server))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        let from = config
            .from
            .parse()
            .with_context(|| format!("invalid sender address '{}'", config.from))?;
        let to = config
            .to
            .parse()
            .with_context(|| format!("invalid recipient address '{}'", config.to))?;

        Ok(Self {
            transport,
            from,
            to,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, message: &Message) -> Result<()> {
        let email = Email::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(message.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                message.text.clone(),
                message.html.clone(),
            ))
            .context("failed to build email")?;

        self.transport
            .send(&email)
            .with_context(|| format!("failed to send '{}'", message.subject))?;
        Ok(())
    }
}
