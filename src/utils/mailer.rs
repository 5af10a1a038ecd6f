use std::future::Future;

use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use resend_rs::types::CreateEmailBaseOptions;
use resend_rs::Resend;
use thiserror::Error;

use crate::handlers::lead_dtos::LeadInput;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail delivery is not configured: {0}")]
    Misconfigured(&'static str),
    #[error("mail delivery failed: {0}")]
    TransportFailed(String),
}

/// Seam between the submission pipeline and the outbound transports, so the
/// pipeline can be exercised without touching the network.
pub trait LeadDelivery: Send + Sync {
    fn deliver(
        &self,
        lead: &LeadInput,
        soft_warning: Option<&str>,
    ) -> impl Future<Output = Result<(), MailError>> + Send;
}

/// Hands a lead off to the configured inbox: Resend first, SMTP as fallback.
/// No retries and no backoff; a failed hand-off surfaces as a rejection and
/// the human resubmits.
pub struct Mailer {
    inbox: Option<String>,
    from: String,
    resend: Option<Resend>,
    smtp: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl Mailer {
    pub fn from_env() -> Self {
        let inbox = std::env::var("LEAD_INBOX").ok().filter(|v| !v.is_empty());
        if inbox.is_none() {
            tracing::warn!("LEAD_INBOX is not set, lead submissions will be rejected at delivery");
        }
        let from = std::env::var("LEAD_FROM").unwrap_or_else(|_| "leads@localhost".to_string());
        let resend = std::env::var("RESEND_API_KEY")
            .ok()
            .filter(|v| !v.is_empty())
            .map(|key| Resend::new(&key));
        let smtp = match (
            std::env::var("SMTP_HOST"),
            std::env::var("SMTP_USERNAME"),
            std::env::var("SMTP_PASSWORD"),
        ) {
            (Ok(host), Ok(username), Ok(password)) => {
                match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host) {
                    Ok(builder) => {
                        Some(builder.credentials(Credentials::new(username, password)).build())
                    }
                    Err(e) => {
                        tracing::error!("Failed to create SMTP relay for {}: {}", host, e);
                        None
                    }
                }
            }
            _ => None,
        };
        Self {
            inbox,
            from,
            resend,
            smtp,
        }
    }

    fn render(lead: &LeadInput, soft_warning: Option<&str>) -> (String, String, String) {
        let subject = format!("New lead: {} ({})", lead.name, lead.company);
        let whatsapp = lead.whatsapp.as_deref().unwrap_or("-");
        let note = soft_warning.unwrap_or("-");
        let text = format!(
            "Name: {}\nEmail: {}\nCompany: {}\nWhatsApp: {}\nNote: {}\n",
            lead.name, lead.email, lead.company, whatsapp, note
        );
        let html = format!(
            "<h2>New lead</h2>\
             <p><strong>Name:</strong> {}</p>\
             <p><strong>Email:</strong> {}</p>\
             <p><strong>Company:</strong> {}</p>\
             <p><strong>WhatsApp:</strong> {}</p>\
             <p><strong>Note:</strong> {}</p>",
            lead.name, lead.email, lead.company, whatsapp, note
        );
        (subject, text, html)
    }

    async fn send_via_resend(
        &self,
        inbox: &str,
        subject: &str,
        text: &str,
        html: &str,
    ) -> Result<(), String> {
        let resend = self.resend.as_ref().ok_or("resend not configured")?;
        let email = CreateEmailBaseOptions::new(&self.from, [inbox], subject)
            .with_text(text)
            .with_html(html);
        resend
            .emails
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| format!("resend: {}", e))
    }

    async fn send_via_smtp(
        &self,
        inbox: &str,
        subject: &str,
        text: &str,
        html: &str,
    ) -> Result<(), String> {
        let mailer = self.smtp.as_ref().ok_or("smtp not configured")?;
        let message = Message::builder()
            .from(self.from.parse().map_err(|e| format!("bad from address: {}", e))?)
            .to(inbox.parse().map_err(|e| format!("bad inbox address: {}", e))?)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                text.to_string(),
                html.to_string(),
            ))
            .map_err(|e| format!("failed to build message: {}", e))?;
        mailer
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| format!("smtp: {}", e))
    }
}

impl LeadDelivery for Mailer {
    async fn deliver(&self, lead: &LeadInput, soft_warning: Option<&str>) -> Result<(), MailError> {
        let inbox = self
            .inbox
            .as_deref()
            .ok_or(MailError::Misconfigured("LEAD_INBOX"))?;
        if self.resend.is_none() && self.smtp.is_none() {
            return Err(MailError::Misconfigured("no mail transport"));
        }
        let (subject, text, html) = Self::render(lead, soft_warning);

        let primary_err = match self.send_via_resend(inbox, &subject, &text, &html).await {
            Ok(()) => {
                tracing::info!("lead delivered via resend");
                return Ok(());
            }
            Err(e) => e,
        };
        if self.resend.is_some() {
            tracing::warn!("primary transport failed, trying SMTP: {}", primary_err);
        }
        match self.send_via_smtp(inbox, &subject, &text, &html).await {
            Ok(()) => {
                tracing::info!("lead delivered via smtp");
                Ok(())
            }
            Err(fallback_err) => Err(MailError::TransportFailed(format!(
                "{}; {}",
                primary_err, fallback_err
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead() -> LeadInput {
        LeadInput {
            name: "Jane".to_string(),
            email: "jane@company.com".to_string(),
            company: "ACME".to_string(),
            whatsapp: Some("+358401234567".to_string()),
            website: None,
            t0: None,
        }
    }

    #[test]
    fn render_includes_all_lead_fields() {
        let (subject, text, html) = Mailer::render(&lead(), Some("personal email"));
        assert!(subject.contains("Jane"));
        assert!(subject.contains("ACME"));
        assert!(text.contains("jane@company.com"));
        assert!(text.contains("+358401234567"));
        assert!(text.contains("personal email"));
        assert!(html.contains("jane@company.com"));
    }

    #[tokio::test]
    async fn unconfigured_mailer_reports_misconfiguration() {
        let mailer = Mailer {
            inbox: None,
            from: "leads@localhost".to_string(),
            resend: None,
            smtp: None,
        };
        match mailer.deliver(&lead(), None).await {
            Err(MailError::Misconfigured(what)) => assert_eq!(what, "LEAD_INBOX"),
            other => panic!("expected misconfiguration, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn missing_transports_report_misconfiguration() {
        let mailer = Mailer {
            inbox: Some("sales@example.com".to_string()),
            from: "leads@localhost".to_string(),
            resend: None,
            smtp: None,
        };
        assert!(matches!(
            mailer.deliver(&lead(), None).await,
            Err(MailError::Misconfigured("no mail transport"))
        ));
    }
}
