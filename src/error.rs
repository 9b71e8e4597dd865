//! Error types for the Univapay webhook subsystem
//!
//! This module provides the error hierarchy using `thiserror`. Verification
//! and format failures are recoverable at the caller boundary and map to a
//! 400-class HTTP rejection; handler failures never surface here (see
//! [`crate::webhook::router::HandlerOutcome`]).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::webhook::signature::SignatureScheme;

/// The main error type for webhook operations
#[derive(Error, Debug)]
pub enum Error {
    /// Signature verification failed
    #[error("Webhook verification error: {0}")]
    Verification(#[from] VerificationError),

    /// Body could not be decoded into an event
    #[error("Webhook format error: {0}")]
    Format(#[from] FormatError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Handler registration with an unusable pattern
    #[error("Invalid handler pattern: {0:?}")]
    InvalidPattern(String),

    /// The blocking dispatch task was cancelled or panicked outside a handler
    #[error("Webhook dispatch failed: {0}")]
    Dispatch(String),
}

/// Signature verification failures.
///
/// Every variant names the header that was consulted (when one was found) so
/// callers can log precisely what was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// No secret configured while verification is required
    #[error("webhook secret missing")]
    MissingSecret,

    /// None of the recognized signature headers is present
    #[error("{}", no_header_message(.header))]
    NoSignatureHeader {
        /// Explicitly requested header, `None` when probing the default list
        header: Option<String>,
    },

    /// The header value does not match any supported grammar
    #[error("unrecognized signature scheme in '{header}': {reason}")]
    UnrecognizedScheme {
        /// Header the value came from
        header: String,
        /// What was wrong with the value
        reason: String,
    },

    /// Recomputed digest matches none of the provided digests
    #[error("signature mismatch ({scheme}) in '{header}'")]
    DigestMismatch {
        /// Header the signature came from
        header: String,
        /// Scheme that was attempted
        scheme: SignatureScheme,
    },

    /// Timestamp outside the allowed window
    #[error("timestamp {timestamp} outside tolerance of {tolerance_s}s (now {now}) in '{header}'")]
    TimestampOutOfTolerance {
        /// Header the signature came from
        header: String,
        /// Timestamp embedded in the signature
        timestamp: i64,
        /// Verification time
        now: i64,
        /// Allowed skew in seconds
        tolerance_s: i64,
    },
}

fn no_header_message(header: &Option<String>) -> String {
    match header {
        Some(name) => format!("signature header '{name}' not found"),
        None => "no known signature header found".to_string(),
    }
}

impl VerificationError {
    /// Short machine-readable reason, suitable for metric labels
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingSecret => "missing_secret",
            Self::NoSignatureHeader { .. } => "no_signature_header",
            Self::UnrecognizedScheme { .. } => "unrecognized_scheme",
            Self::DigestMismatch { .. } => "digest_mismatch",
            Self::TimestampOutOfTolerance { .. } => "timestamp_out_of_tolerance",
        }
    }
}

/// Body decoding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Body is not valid UTF-8 JSON
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    /// Event carries no nested `data` object
    #[error("webhook event has no data object")]
    MissingData,

    /// Nested object does not fit the requested type
    #[error("webhook data object does not match: {0}")]
    DataMismatch(String),

    /// Body is JSON but not an object
    #[error("webhook body must be a JSON object")]
    NotAnObject,

    /// No `type`, `event` or `event_type` field
    #[error("webhook body has no identifiable event type")]
    MissingEventType,
}

impl FormatError {
    /// Short machine-readable reason, suitable for metric labels
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingEventType => "missing_event_type",
            Self::MissingData => "missing_data",
            Self::DataMismatch(_) => "data_mismatch",
        }
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Tolerance is not an integer
    #[error("Invalid tolerance: {0}")]
    InvalidTolerance(String),

    /// Boolean flag could not be parsed
    #[error("Invalid flag {name}: {value}")]
    InvalidFlag {
        /// Environment variable name
        name: String,
        /// Rejected value
        value: String,
    },

    /// Dedup capacity is zero or not a number
    #[error("Invalid dedup capacity: {0}")]
    InvalidCapacity(String),
}

/// Result type alias for webhook operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status a webhook endpoint should answer with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Verification(_) | Self::Format(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable reason
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Verification(e) => e.reason(),
            Self::Format(e) => e.reason(),
            Self::Config(_) => "config",
            Self::InvalidPattern(_) => "invalid_pattern",
            Self::Dispatch(_) => "dispatch",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Never echo digests or secrets back to the sender.
        let message = match &self {
            Self::Verification(_) => "Invalid signature",
            Self::Format(_) => "Invalid payload",
            _ => "Internal server error",
        };
        let body = json!({
            "success": false,
            "message": message,
            "reason": self.reason(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}
