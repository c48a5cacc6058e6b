//! Error taxonomy for the gateway
//!
//! Signature and protocol failures surface as raw HTTP errors. Every other
//! failure becomes a normal interaction message through [`reward_error_message`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::interaction::ProtocolError;
use crate::loyalteez::RewardError;

/// Failures returned to Discord as bare HTTP statuses
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    BadRequest(String),
}

impl From<ProtocolError> for GatewayError {
    fn from(e: ProtocolError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Downstream failure classes, decided from the ledger's error text.
///
/// The ledger has no structured error codes; these substrings are the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardFailure {
    DuplicateClaim,
    UnknownOrInactiveEvent,
    Unclassified,
}

const DUPLICATE_MARKER: &str = "Duplicate reward";
const NOT_FOUND_MARKERS: [&str; 2] = ["not found", "No active rule"];

impl RewardFailure {
    pub fn classify(message: &str) -> Self {
        if message.contains(DUPLICATE_MARKER) {
            Self::DuplicateClaim
        } else if NOT_FOUND_MARKERS.iter().any(|m| message.contains(m)) {
            Self::UnknownOrInactiveEvent
        } else {
            Self::Unclassified
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::DuplicateClaim => {
                "⏳ You've already claimed this reward recently! Please wait for the cooldown to expire."
            }
            Self::UnknownOrInactiveEvent => {
                "This reward event wasn't found or has no active rule. Please check the event ID."
            }
            Self::Unclassified => "Failed to process reward. Please try again later.",
        }
    }
}

impl From<&RewardError> for RewardFailure {
    /// Only the ledger's own error text is classified. Transport errors carry
    /// URLs and library messages that must not match the markers.
    fn from(e: &RewardError) -> Self {
        match e {
            RewardError::Api { message, .. } => Self::classify(message),
            RewardError::MissingBrandId | RewardError::Transport(_) => Self::Unclassified,
        }
    }
}

/// The one place downstream errors are turned into user-facing text
pub fn reward_error_message(e: &RewardError) -> String {
    format!("❌ {}", RewardFailure::from(e).user_message())
}

/// Shown when something other than the ledger (e.g. the config store) fails
pub fn internal_error_message() -> String {
    format!("❌ {}", RewardFailure::Unclassified.user_message())
}
