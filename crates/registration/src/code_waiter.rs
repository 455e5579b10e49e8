//! Code waiter - polls the disposable inbox until the verification code shows up
use std::time::Duration;

use regex::Regex;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use regflow_core::config::{MailboxConfig, WaiterConfig};
use regflow_core::{MailMessage, Mailbox};

use crate::{FlowError, MailboxError, MailboxProvider};

#[derive(Debug, thiserror::Error)]
pub enum WaiterError {
    #[error("invalid mailbox pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Bounded wait for an out-of-band code.
///
/// The inbox is listed every `poll_interval` until a message from a sender
/// matching `from` carries a subject matching `subject`; capture group 1 of
/// the subject is the code. Gives up once `timeout` has elapsed.
#[derive(Debug, Clone)]
pub struct CodeWaiter {
    from: Regex,
    subject: Regex,
    timeout: Duration,
    poll_interval: Duration,
}

impl CodeWaiter {
    pub fn new(
        from_pattern: &str,
        subject_pattern: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, WaiterError> {
        if timeout.is_zero() {
            return Err(WaiterError::ZeroDuration("timeout"));
        }
        if poll_interval.is_zero() {
            return Err(WaiterError::ZeroDuration("poll interval"));
        }
        Ok(Self {
            from: Regex::new(from_pattern)?,
            subject: Regex::new(subject_pattern)?,
            timeout,
            poll_interval,
        })
    }

    pub fn from_config(mailbox: &MailboxConfig, waiter: &WaiterConfig) -> Result<Self, WaiterError> {
        Self::new(
            &mailbox.from_pattern,
            &mailbox.subject_pattern,
            waiter.timeout(),
            waiter.poll_interval(),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// First code in listing order whose message matches both patterns.
    pub fn match_code(&self, messages: &[MailMessage]) -> Option<String> {
        messages.iter().find_map(|msg| {
            if !self.from.is_match(&msg.from) {
                return None;
            }
            self.subject
                .captures(&msg.subject)
                .and_then(|caps| caps.get(1))
                .map(|code| code.as_str().to_string())
        })
    }

    /// Poll `provider` until a matching code arrives or the timeout elapses.
    ///
    /// Transient listing failures are logged and count as an empty poll; the
    /// last one is attached to the timeout. A permanent failure (bad key,
    /// unknown inbox) ends the wait at once.
    pub async fn await_code(
        &self,
        provider: &dyn MailboxProvider,
        mailbox: &Mailbox,
    ) -> Result<String, FlowError> {
        info!(
            "📧 Waiting up to {}s for verification code at {}",
            self.timeout.as_secs(),
            mailbox.address
        );

        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut polls = 0u32;
        let mut last_error: Option<MailboxError> = None;

        loop {
            polls += 1;

            match time::timeout_at(deadline, provider.list_messages(&mailbox.id)).await {
                Ok(Ok(messages)) => {
                    debug!(attempt = polls, count = messages.len(), "inbox listed");
                    if let Some(code) = self.match_code(&messages) {
                        info!(
                            attempt = polls,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            code_len = code.len(),
                            "✓ verification code received"
                        );
                        return Ok(code);
                    }
                }
                Ok(Err(e)) if e.is_permanent() => {
                    warn!(attempt = polls, "✗ inbox unusable via {}: {}", provider.name(), e);
                    return Err(FlowError::Mailbox(e));
                }
                Ok(Err(e)) => {
                    warn!(attempt = polls, "error checking inbox via {}: {}", provider.name(), e);
                    last_error = Some(e);
                }
                // listing itself ran past the deadline
                Err(_) => break,
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            time::sleep(self.poll_interval.min(deadline - now)).await;
            if Instant::now() >= deadline {
                break;
            }
        }

        let waited = started.elapsed();
        warn!(polls, "✗ no verification code after {}s", waited.as_secs());
        Err(FlowError::CodeTimeout {
            waited,
            polls,
            last_error,
        })
    }
}
