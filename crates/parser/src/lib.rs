//! Field extraction for the challenge pages returned by the remote service.

pub mod document;
pub mod html;

pub use document::{ChallengeDocument, Field};
pub use html::{extract, extract_from, find_error_marker, FieldRule};
