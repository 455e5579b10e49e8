//! MailSlurp disposable inbox adapter
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use regflow_core::config::MailboxConfig;
use regflow_core::{MailMessage, Mailbox};

use crate::{MailboxError, MailboxProvider};

const API_KEY_HEADER: &str = "x-api-key";

pub struct MailSlurpMailbox {
    http_client: reqwest::Client,
    api_url: Url,
    api_key: SecretString,
    inbox_name: String,
    inbox_prefix: String,
}

impl MailSlurpMailbox {
    pub fn new(config: &MailboxConfig, api_key: SecretString) -> Result<Self, MailboxError> {
        let api_url = Url::parse(&config.api_url).map_err(|e| MailboxError::Request(e.to_string()))?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MailboxError::Request(e.to_string()))?;

        Ok(Self {
            http_client,
            api_url,
            api_key,
            inbox_name: config.inbox_name.clone(),
            inbox_prefix: config.inbox_prefix.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, MailboxError> {
        self.api_url
            .join(path)
            .map_err(|e| MailboxError::Request(e.to_string()))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, MailboxError> {
        let response = request
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| MailboxError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailboxError::Status(response.status().as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| MailboxError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MailboxProvider for MailSlurpMailbox {
    fn name(&self) -> &str {
        "MailSlurp"
    }

    async fn provision(&self) -> Result<Mailbox, MailboxError> {
        let url = self.endpoint("inboxes/withOptions")?;
        let options = CreateInboxOptions {
            name: &self.inbox_name,
            prefix: &self.inbox_prefix,
        };

        let inbox: InboxDto = self.send(self.http_client.post(url).json(&options)).await?;
        info!("created inbox {} ({})", inbox.email_address, inbox.id);

        Ok(inbox.into())
    }

    async fn list_messages(&self, mailbox_id: &str) -> Result<Vec<MailMessage>, MailboxError> {
        let url = self.endpoint(&format!("inboxes/{mailbox_id}/emails"))?;
        let previews: Vec<EmailPreview> = self.send(self.http_client.get(url)).await?;

        Ok(previews.into_iter().map(MailMessage::from).collect())
    }
}

#[derive(Debug, Serialize)]
struct CreateInboxOptions<'a> {
    name: &'a str,
    prefix: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboxDto {
    id: String,
    email_address: String,
}

impl From<InboxDto> for Mailbox {
    fn from(dto: InboxDto) -> Self {
        Mailbox {
            id: dto.id,
            address: dto.email_address,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailPreview {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body_excerpt: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<EmailPreview> for MailMessage {
    fn from(p: EmailPreview) -> Self {
        MailMessage {
            from: p.from.unwrap_or_default(),
            subject: p.subject.unwrap_or_default(),
            body: p.body_excerpt.unwrap_or_default(),
            received_at: p.created_at,
        }
    }
}
