//! Input validation applied before content reaches the pipeline

use axum::http::StatusCode;
use policyguard_telemetry::metrics::REJECTED_TOTAL;
use thiserror::Error;
use tracing::warn;

/// Why a request was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("content id must not be empty")]
    MissingId,

    #[error("text must not be empty")]
    EmptyText,

    #[error("text is {length} characters, the limit is {limit}")]
    TooLong { length: usize, limit: usize },
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingId | Self::EmptyText => StatusCode::BAD_REQUEST,
            Self::TooLong { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Label used on the rejection counter
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingId => "missing_id",
            Self::EmptyText => "empty_text",
            Self::TooLong { .. } => "too_long",
        }
    }
}

/// Check an incoming item, counting every rejection
pub fn validate_content(id: &str, text: &str, max_chars: usize) -> Result<(), Rejection> {
    check(id, text, max_chars).map_err(|rejection| {
        warn!(content_id = %id, reason = rejection.reason(), "Rejected content: {}", rejection);
        metrics::counter!(REJECTED_TOTAL, "reason" => rejection.reason()).increment(1);
        rejection
    })
}

fn check(id: &str, text: &str, max_chars: usize) -> Result<(), Rejection> {
    if id.trim().is_empty() {
        return Err(Rejection::MissingId);
    }
    if text.trim().is_empty() {
        return Err(Rejection::EmptyText);
    }

    // Characters, not bytes
    let length = text.chars().count();
    if length > max_chars {
        return Err(Rejection::TooLong {
            length,
            limit: max_chars,
        });
    }

    Ok(())
}
