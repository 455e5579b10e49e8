//! In-memory stand-ins for the external services.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use regflow_core::{MailMessage, Mailbox, TransportError};

use crate::{ChallengeSolver, MailboxError, MailboxProvider, SolverError, Transport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub fields: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Replies to requests with canned bodies, in order.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<String, TransportError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new<I, S>(bodies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(bodies.into_iter().map(|b| Ok(b.into())).collect()),
            requests: Mutex::default(),
        }
    }

    pub fn push_error(&self, error: TransportError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn respond(&self, request: RecordedRequest) -> Result<String, TransportError> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::Request {
                    url,
                    message: "no scripted response left".into(),
                })
            })
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &Url) -> Result<String, TransportError> {
        self.respond(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            fields: Vec::new(),
        })
    }

    async fn post_form(&self, url: &Url, fields: &[(&str, &str)]) -> Result<String, TransportError> {
        self.respond(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }
}

/// Mailbox whose inbox stays empty for `empty_polls` listings, then shows
/// `messages`.
pub struct FakeMailbox {
    address: String,
    messages: Vec<MailMessage>,
    empty_polls: u32,
    failing_polls: u32,
    failure_status: u16,
    polls: AtomicU32,
    provisions: AtomicU32,
}

impl FakeMailbox {
    pub fn with_messages(messages: Vec<MailMessage>) -> Self {
        Self {
            address: "test-3f9a@mailslurp.net".to_string(),
            messages,
            empty_polls: 0,
            failing_polls: 0,
            failure_status: 503,
            polls: AtomicU32::new(0),
            provisions: AtomicU32::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::with_messages(Vec::new())
    }

    pub fn arriving_after(mut self, empty_polls: u32) -> Self {
        self.empty_polls = empty_polls;
        self
    }

    /// The first `n` listings fail before the inbox behaves normally.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.failing_polls = n;
        self
    }

    /// HTTP status reported by failing listings (503 unless set).
    pub fn failing_with(mut self, status: u16) -> Self {
        self.failure_status = status;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn provisions(&self) -> u32 {
        self.provisions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailboxProvider for FakeMailbox {
    fn name(&self) -> &str {
        "fake"
    }

    async fn provision(&self) -> Result<Mailbox, MailboxError> {
        self.provisions.fetch_add(1, Ordering::SeqCst);
        Ok(Mailbox {
            id: "inbox-1".to_string(),
            address: self.address.clone(),
        })
    }

    async fn list_messages(&self, _mailbox_id: &str) -> Result<Vec<MailMessage>, MailboxError> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if poll <= self.failing_polls {
            return Err(MailboxError::Status(self.failure_status));
        }
        if poll <= self.failing_polls.saturating_add(self.empty_polls) {
            return Ok(Vec::new());
        }
        Ok(self.messages.clone())
    }
}

/// Solver returning a fixed token and recording what it was asked.
pub struct FakeSolver {
    token: Option<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeSolver {
    pub fn returning(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            calls: Mutex::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            token: None,
            calls: Mutex::default(),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChallengeSolver for FakeSolver {
    fn name(&self) -> &str {
        "fake"
    }

    async fn solve(&self, site_key: &str, page_url: &Url) -> Result<String, SolverError> {
        self.calls
            .lock()
            .unwrap()
            .push((site_key.to_string(), page_url.to_string()));
        self.token
            .clone()
            .ok_or_else(|| SolverError::Rejected("ERROR_CAPTCHA_UNSOLVABLE".into()))
    }
}
