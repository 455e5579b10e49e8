//! Arithmetic challenge shown after the email code is accepted.
//!
//! The page shows two integers; the service expects their product back,
//! together with the page's `ts` value exactly as served.

use regflow_parser::{ChallengeDocument, Field};

use crate::FlowError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathChallenge {
    pub a: i64,
    pub b: i64,
    /// Echoed back unmodified.
    pub ts: String,
}

impl MathChallenge {
    pub fn from_document(doc: &ChallengeDocument) -> Result<Self, FlowError> {
        let ts = doc
            .get(Field::Timestamp)
            .ok_or(FlowError::FieldNotFound(Field::Timestamp))?
            .to_string();

        Ok(Self {
            a: operand(doc, Field::OperandA)?,
            b: operand(doc, Field::OperandB)?,
            ts,
        })
    }

    pub fn solve(&self) -> Result<String, FlowError> {
        combine(self.a, self.b)
            .map(|n| n.to_string())
            .ok_or(FlowError::MathOverflow {
                a: self.a,
                b: self.b,
            })
    }
}

/// The pinned combination rule.
pub fn combine(a: i64, b: i64) -> Option<i64> {
    a.checked_mul(b)
}

fn operand(doc: &ChallengeDocument, field: Field) -> Result<i64, FlowError> {
    let text = doc.get(field).ok_or(FlowError::FieldNotFound(field))?;
    text.trim()
        .parse::<i64>()
        .map_err(|_| FlowError::MalformedField {
            field,
            value: text.to_string(),
        })
}
