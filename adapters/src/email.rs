//! C3 `EmailSender` adapter — best-effort notification delivery.
//!
//! Email in this system is informational (invite and provisioning
//! notices), never a precondition for a pipeline step, so failures here are
//! logged rather than propagated. Primary/fallback transport pattern
//! mirrors the dual-webhook delivery shape used elsewhere in the source for
//! non-critical side effects.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text: &str, html: &str);
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text: &str, html: &str) -> Result<()>;
}

pub struct FallbackEmailSender {
    primary: Box<dyn EmailTransport>,
    secondary: Option<Box<dyn EmailTransport>>,
}

impl FallbackEmailSender {
    pub fn new(primary: Box<dyn EmailTransport>, secondary: Option<Box<dyn EmailTransport>>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl EmailSender for FallbackEmailSender {
    async fn send(&self, to: &str, subject: &str, text: &str, html: &str) {
        if let Err(err) = self.primary.send(to, subject, text, html).await {
            tracing::warn!(%err, to, "primary email transport failed");
            if let Some(secondary) = &self.secondary {
                if let Err(err) = secondary.send(to, subject, text, html).await {
                    tracing::warn!(%err, to, "secondary email transport failed");
                }
            }
        }
    }
}

/// HTTP-API transport (e.g. a transactional email provider), used as either
/// the primary or fallback leg.
pub struct HttpEmailTransport {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpEmailTransport {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(&self, to: &str, subject: &str, text: &str, html: &str) -> Result<()> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "to": to,
                "subject": subject,
                "text": text,
                "html": html,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(crate::error::AdapterError::Upstream(format!(
                "email transport returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
