// Core modules
pub mod core;
pub mod adapters;
pub mod orchestrator;

pub mod code_waiter;
pub mod identity;
pub mod math;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use crate::core::types::*;
pub use crate::core::context::*;
pub use crate::core::result::*;
pub use adapters::*;
pub use orchestrator::*;
pub use code_waiter::{CodeWaiter, WaiterError};
pub use math::MathChallenge;

use std::time::Duration;

use regflow_core::TransportError;
use regflow_parser::Field;

/// Why a stage could not complete. Every variant is terminal for the run.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("remote service rejected the request: {0}")]
    RemoteRejection(String),

    #[error("required field `{0}` not found in response")]
    FieldNotFound(Field),

    #[error("field `{field}` has an unusable value {value:?}")]
    MalformedField { field: Field, value: String },

    #[error(
        "verification code did not arrive within {secs}s ({polls} polls){cause}",
        secs = .waited.as_secs(),
        cause = listing_cause(.last_error)
    )]
    CodeTimeout {
        waited: Duration,
        polls: u32,
        /// Most recent inbox listing failure, if any poll failed.
        last_error: Option<MailboxError>,
    },

    #[error("math challenge {a} * {b} overflows")]
    MathOverflow { a: i64, b: i64 },

    #[error("stage ran before `{0}` was captured")]
    MissingCapture(&'static str),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("challenge solving failed: {0}")]
    Solving(#[from] SolverError),

    #[error("mailbox failure: {0}")]
    Mailbox(#[from] MailboxError),
}

/// A [`FlowError`] tagged with the stage the workflow was trying to reach.
#[derive(Debug, thiserror::Error)]
#[error("{stage}: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: FlowError,
}

#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("solver request failed: {0}")]
    Request(String),

    #[error("solver API returned HTTP {0}")]
    Status(u16),

    #[error("solver rejected the task: {0}")]
    Rejected(String),

    #[error("no solution after {0}s")]
    Timeout(u64),
}

fn listing_cause(last_error: &Option<MailboxError>) -> String {
    match last_error {
        Some(e) => format!("; last inbox error: {e}"),
        None => String::new(),
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MailboxError {
    #[error("mailbox request failed: {0}")]
    Request(String),

    #[error("mailbox API returned HTTP {0}")]
    Status(u16),

    #[error("unexpected mailbox response: {0}")]
    Decode(String),
}

impl MailboxError {
    /// Client errors other than rate limiting will not clear up by polling again.
    pub fn is_permanent(&self) -> bool {
        matches!(self, MailboxError::Status(status) if (400..500).contains(status) && *status != 429)
    }
}
