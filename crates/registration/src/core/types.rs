use async_trait::async_trait;
use url::Url;

use regflow_core::{MailMessage, Mailbox, TransportError};

use crate::{MailboxError, SolverError};

/// HTTP boundary. Implementations return the raw response body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<String, TransportError>;

    /// POST `fields` as `application/x-www-form-urlencoded`.
    async fn post_form(&self, url: &Url, fields: &[(&str, &str)]) -> Result<String, TransportError>;
}

/// Disposable mailbox service.
#[async_trait]
pub trait MailboxProvider: Send + Sync {
    /// Name of the provider, for logs
    fn name(&self) -> &str;

    async fn provision(&self) -> Result<Mailbox, MailboxError>;

    /// Messages currently in the inbox, in the provider's listing order.
    async fn list_messages(&self, mailbox_id: &str) -> Result<Vec<MailMessage>, MailboxError>;
}

/// CAPTCHA solving service. A call may block for as long as the service
/// takes; the engine imposes no timeout of its own.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    fn name(&self) -> &str;

    async fn solve(&self, site_key: &str, page_url: &Url) -> Result<String, SolverError>;
}
