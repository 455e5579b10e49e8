use chrono::{DateTime, Utc};

/// Synthetic identity used to fill the registration form. Never reused
/// across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub full_name: String,
}

impl Identity {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
        }
    }
}

/// A provisioned disposable mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Provider-side inbox id, used for listing messages.
    pub id: String,
    pub address: String,
}

/// One message as listed by the mailbox provider.
#[derive(Debug, Clone, Default)]
pub struct MailMessage {
    pub from: String,
    pub subject: String,
    pub body: String,
    pub received_at: Option<DateTime<Utc>>,
}

impl MailMessage {
    pub fn new(from: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            subject: subject.into(),
            ..Default::default()
        }
    }
}
