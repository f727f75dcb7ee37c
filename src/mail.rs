use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::MailConfig;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Outbound email transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

/// Posts messages as JSON to a mail relay (`MAIL_API_URL`).
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(endpoint: &str, api_key: Option<String>, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            api_key,
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        let mut req = self.client.post(&self.endpoint).json(&RelayMessage {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            text: &email.text,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req.send()
            .await
            .context("mail relay request")?
            .error_for_status()
            .context("mail relay status")?;
        info!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

/// Writes messages to the log instead of delivering them.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> anyhow::Result<()> {
        info!(to = %email.to, subject = %email.subject, body = %email.text, "email not delivered: no relay configured");
        Ok(())
    }
}

pub fn from_config(cfg: &MailConfig) -> std::sync::Arc<dyn Mailer> {
    match &cfg.api_url {
        Some(url) => std::sync::Arc::new(HttpMailer::new(url, cfg.api_key.clone(), &cfg.from)),
        None => std::sync::Arc::new(LogMailer),
    }
}
