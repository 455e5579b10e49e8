use std::collections::HashMap;
use std::fmt;

use scraper::Html;
use tracing::debug;

use crate::html::{self, FieldRule};

/// Named values the registration flow pulls out of response documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    SessionToken,
    SiteKey,
    OperandA,
    OperandB,
    Timestamp,
    CompletionToken,
}

impl Field {
    pub fn rule(self) -> FieldRule {
        match self {
            Field::SessionToken => FieldRule::HiddenInput { name: "stoken" },
            Field::SiteKey => FieldRule::Attribute {
                attr: "data-captcha-code",
            },
            Field::OperandA => FieldRule::Text {
                path: ".verification-box b#a",
            },
            Field::OperandB => FieldRule::Text {
                path: ".verification-box b#b",
            },
            Field::Timestamp => FieldRule::HiddenInput { name: "ts" },
            Field::CompletionToken => FieldRule::Text {
                path: ".verification-box .token",
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::SessionToken => "stoken",
            Field::SiteKey => "siteKey",
            Field::OperandA => "mathOperandA",
            Field::OperandB => "mathOperandB",
            Field::Timestamp => "ts",
            Field::CompletionToken => "completionToken",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One response body plus the fields pulled out of it.
///
/// The early-error marker is checked when the document is built, before any
/// field is extracted; a rejected document carries no fields at all.
#[derive(Debug, Clone)]
pub struct ChallengeDocument {
    raw: String,
    rejection: Option<String>,
    fields: HashMap<Field, Option<String>>,
}

impl ChallengeDocument {
    /// Parse `body` once and extract each of `wanted`.
    pub fn extract(body: impl Into<String>, wanted: &[Field]) -> Self {
        let raw = body.into();
        let document = Html::parse_document(&raw);

        let rejection = html::find_error_marker(&document);
        let fields = if rejection.is_some() {
            HashMap::new()
        } else {
            wanted
                .iter()
                .map(|&field| (field, html::extract(&document, &field.rule())))
                .collect()
        };

        debug!(
            bytes = raw.len(),
            wanted = wanted.len(),
            rejected = rejection.is_some(),
            "document parsed"
        );

        Self {
            raw,
            rejection,
            fields,
        }
    }

    /// Text of the service's error marker, if the response carried one.
    pub fn rejection(&self) -> Option<&str> {
        self.rejection.as_deref()
    }

    /// Value of `field`, or `None` when it was absent (or never requested).
    pub fn get(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).and_then(|v| v.as_deref())
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}
