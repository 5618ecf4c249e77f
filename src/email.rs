//! Email dispatch for finished reports.
//!
//! Delivery is best effort: a failed send is reported back in the
//! [`EmailOutcome`] and never fails report generation.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use tracing::{error, info};

use crate::error::{ReportError, Result};
use crate::Config;

// ---

/// A rendered report ready to be mailed.
#[derive(Debug, Clone)]
pub struct ReportMail {
    pub recipients: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachment_name: String,
    pub pdf: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailOutcome {
    pub sent: bool,
    pub recipients: Vec<String>,
    pub error: Option<String>,
}

impl EmailOutcome {
    pub fn delivered(recipients: &[String]) -> Self {
        EmailOutcome {
            sent: true,
            recipients: recipients.to_vec(),
            error: None,
        }
    }

    pub fn failed(recipients: &[String], error: impl Into<String>) -> Self {
        EmailOutcome {
            sent: false,
            recipients: recipients.to_vec(),
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait ReportMailer: Send + Sync {
    async fn send_report(&self, mail: ReportMail) -> EmailOutcome;
}

/// Replace everything except word characters and `-` with `_`.
pub fn sanitize_filename(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

pub fn attachment_name(entity_name: &str, period_label: &str) -> String {
    format!(
        "Report_{}_{}.pdf",
        sanitize_filename(entity_name),
        sanitize_filename(period_label)
    )
}

pub fn subject_line(entity_name: &str, period_label: &str) -> String {
    format!("Fleet Report: {entity_name} \u{2013} {period_label}")
}

// ---

/// SMTP delivery over a STARTTLS relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16, username: &str, password: &str, from: &str) -> Result<Self> {
        // ---
        let from: Mailbox = from
            .parse()
            .map_err(|e| ReportError::Validation(format!("Invalid SMTP_FROM '{from}': {e}")))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| ReportError::Internal(format!("SMTP relay '{host}': {e}")))?
            .port(port);
        if !username.is_empty() {
            builder = builder.credentials(Credentials::new(username.to_string(), password.to_string()));
        }

        Ok(SmtpMailer {
            transport: builder.build(),
            from,
        })
    }

    /// `None` when no SMTP host is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        // ---
        if !config.smtp_enabled() {
            return Ok(None);
        }
        let from = if config.smtp_from.is_empty() {
            &config.smtp_username
        } else {
            &config.smtp_from
        };
        SmtpMailer::new(
            &config.smtp_host,
            config.smtp_port,
            &config.smtp_username,
            &config.smtp_password,
            from,
        )
        .map(Some)
    }

    fn build_message(&self, mail: &ReportMail) -> std::result::Result<Message, String> {
        // ---
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(mail.subject.clone());
        for recipient in &mail.recipients {
            let to: Mailbox = recipient
                .parse()
                .map_err(|e| format!("invalid recipient '{recipient}': {e}"))?;
            builder = builder.to(to);
        }

        let pdf_type = ContentType::parse("application/pdf").map_err(|e| e.to_string())?;
        let body = MultiPart::mixed()
            .singlepart(SinglePart::html(mail.html_body.clone()))
            .singlepart(Attachment::new(mail.attachment_name.clone()).body(mail.pdf.clone(), pdf_type));

        builder.multipart(body).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ReportMailer for SmtpMailer {
    async fn send_report(&self, mail: ReportMail) -> EmailOutcome {
        // ---
        if mail.recipients.is_empty() {
            return EmailOutcome::failed(&mail.recipients, "no recipients");
        }

        let message = match self.build_message(&mail) {
            Ok(message) => message,
            Err(e) => {
                error!(recipients = ?mail.recipients, error = %e, "Could not build report email");
                return EmailOutcome::failed(&mail.recipients, e);
            }
        };

        match self.transport.send(message).await {
            Ok(_) => {
                info!(recipients = ?mail.recipients, subject = %mail.subject, "Report email sent");
                EmailOutcome::delivered(&mail.recipients)
            }
            Err(e) => {
                error!(recipients = ?mail.recipients, error = %e, "Failed to send report email");
                EmailOutcome::failed(&mail.recipients, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn mail(recipients: &[&str]) -> ReportMail {
        ReportMail {
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            subject: subject_line("North", "February 2026"),
            html_body: "<p>report</p>".into(),
            attachment_name: attachment_name("North", "February 2026"),
            pdf: b"%PDF-1.3 test".to_vec(),
        }
    }

    fn mailer() -> SmtpMailer {
        SmtpMailer::new("localhost", 2525, "", "", "Reports <reports@example.com>").unwrap()
    }

    #[test]
    fn test_filename_sanitizing() {
        // ---
        assert_eq!(sanitize_filename("North / South & Co."), "North___South___Co_");
        assert_eq!(sanitize_filename("Zürich-1"), "Zürich-1");
        assert_eq!(
            attachment_name("Estate A", "3 Feb \u{2013} 17 Mar 2026"),
            "Report_Estate_A_3_Feb___17_Mar_2026.pdf"
        );
    }

    #[test]
    fn test_subject() {
        // ---
        assert_eq!(subject_line("North", "Q1 2026"), "Fleet Report: North \u{2013} Q1 2026");
    }

    #[test]
    fn test_message_carries_attachment() {
        // ---
        let message = mailer().build_message(&mail(&["ops@example.com", "lead@example.com"])).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();

        assert!(raw.contains("Report_North_February_2026.pdf"));
        assert!(raw.contains("application/pdf"));
        assert!(raw.contains("text/html"));
        assert!(raw.contains("ops@example.com"));
        assert!(raw.contains("lead@example.com"));
    }

    #[test]
    fn test_bad_recipient_is_reported() {
        // ---
        let err = mailer().build_message(&mail(&["not an address"])).unwrap_err();
        assert!(err.contains("not an address"));
    }

    #[tokio::test]
    async fn test_bad_recipient_outcome() {
        // ---
        let outcome = mailer().send_report(mail(&["nope"])).await;
        assert!(!outcome.sent);
        assert_eq!(outcome.recipients, vec!["nope".to_string()]);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_invalid_from_rejected() {
        // ---
        assert!(SmtpMailer::new("localhost", 25, "", "", "not-a-mailbox").is_err());
    }
}
