/// Outbound email
///
/// The engine talks to an [`EmailSender`]; delivery is always best-effort.
/// [`deliver`] logs a failure and reports `false`, and no state change is
/// ever rolled back because a notification could not be sent.
///
/// Implementations:
///
/// - [`BrevoEmailSender`]: Brevo transactional API over `reqwest`
/// - [`LogEmailSender`]: logs the recipient and subject only (local runs)
/// - [`MockEmailSender`]: records messages in memory (tests)

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

pub const BREVO_ENDPOINT: &str = "https://api.brevo.com/v3/smtp/email";

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("email transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("email provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("email delivery failed: {0}")]
    Other(String),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), EmailError>;
}

/// Sends and swallows the error; `true` when the provider accepted it
pub async fn deliver(sender: &dyn EmailSender, message: &EmailMessage) -> bool {
    match sender.send(&message.to, &message.subject, &message.html_body).await {
        Ok(()) => {
            tracing::debug!(to = %message.to, subject = %message.subject, "Email sent");
            true
        }
        Err(e) => {
            tracing::error!(to = %message.to, subject = %message.subject, error = %e, "Email delivery failed");
            false
        }
    }
}

pub struct BrevoEmailSender {
    client: reqwest::Client,
    api_key: String,
    sender_email: String,
    sender_name: String,
}

impl BrevoEmailSender {
    pub fn new(api_key: impl Into<String>, sender_email: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            sender_email: sender_email.into(),
            sender_name: "Property Management".to_string(),
        }
    }
}

#[async_trait]
impl EmailSender for BrevoEmailSender {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), EmailError> {
        let response = self
            .client
            .post(BREVO_ENDPOINT)
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .json(&json!({
                "sender": { "name": self.sender_name, "email": self.sender_email },
                "to": [{ "email": to }],
                "subject": subject,
                "htmlContent": html_body,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(EmailError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Never delivers; bodies are not logged because they carry credentials
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> Result<(), EmailError> {
        tracing::info!(to, subject, "Email suppressed (no provider configured)");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// In-memory sender for tests
#[derive(Clone, Default)]
pub struct MockEmailSender {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failing: Arc<Mutex<bool>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `send` fail
    pub fn fail_deliveries(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_to(&self, to: &str) -> Vec<EmailMessage> {
        self.sent().into_iter().filter(|m| m.to == to).collect()
    }

    pub fn last_to(&self, to: &str) -> Option<EmailMessage> {
        self.sent_to(to).pop()
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), EmailError> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(EmailError::Other("mock delivery failure".into()));
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(EmailMessage {
                to: to.to_string(),
                subject: subject.to_string(),
                html_body: html_body.to_string(),
            });
        Ok(())
    }
}

/// Builds the public URLs embedded in outgoing mail
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    base_url: String,
}

impl LinkBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn activation(&self, token: &str) -> String {
        format!("{}/v1/activate/{}", self.base_url, token)
    }

    pub fn vendor_response(&self, issue_id: uuid::Uuid, token: &str) -> String {
        format!(
            "{}/v1/vendor/respond?issue_id={}&token={}",
            self.base_url, issue_id, token
        )
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn page(paragraphs: &[String]) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{}</p>", p)).collect();
    format!("<html><body>{}</body></html>", body)
}

/// Message builders for every notification the engine sends
pub mod messages {
    use super::{escape, page, EmailMessage};

    pub fn otp(to: &str, code: &str, purpose: &str, minutes: i64) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: "Your verification code".to_string(),
            html_body: page(&[
                format!("Your {} code is <strong>{}</strong>.", escape(purpose), code),
                format!("It expires in {} minutes.", minutes),
            ]),
        }
    }

    pub fn activation(to: &str, name: &str, property: &str, link: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: "Activate your tenant account".to_string(),
            html_body: page(&[
                format!("Hello {},", escape(name)),
                format!(
                    "You have been invited as a tenant of {}. Activate your account here:",
                    escape(property)
                ),
                format!("<a href=\"{0}\">{0}</a>", link),
                "If you did not expect this email, you can ignore it.".to_string(),
            ]),
        }
    }

    pub fn issue_reported(to: &str, property: &str, description: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: format!("New issue reported at {}", property),
            html_body: page(&[
                format!("A tenant of {} reported an issue:", escape(property)),
                escape(description),
            ]),
        }
    }

    pub fn vendor_assignment(to: &str, property: &str, description: &str, link: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: "New repair job assigned to you".to_string(),
            html_body: page(&[
                format!("You have been assigned a repair at {}:", escape(property)),
                escape(description),
                format!(
                    "Accept, reject or submit your bill here: <a href=\"{0}\">{0}</a>",
                    link
                ),
            ]),
        }
    }

    pub fn bill_submitted(to: &str, property: &str, amount: i64) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: format!("Repair completed at {}", property),
            html_body: page(&[
                format!(
                    "A vendor marked a repair at {} as done and billed {}.",
                    escape(property),
                    amount
                ),
                "Review and approve the bill to close the issue.".to_string(),
            ]),
        }
    }

    pub fn bill_approved(to: &str, property: &str, amount: i64) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: "Your bill was approved".to_string(),
            html_body: page(&[format!(
                "Your bill of {} for the repair at {} was approved.",
                amount,
                escape(property)
            )]),
        }
    }
}
