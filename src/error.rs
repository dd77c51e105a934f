//! Error types for the intent contract.

use std::time::Duration;

use thiserror::Error;

/// Any way the single interpretation attempt can fail. All of them are
/// answered with the fallback apology; none are retried.
#[derive(Error, Debug)]
pub enum IntentError {
    #[error("Intent service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Intent service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Intent service error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Intent service returned an empty response")]
    EmptyResponse,

    #[error("Intent service response is malformed: {0}")]
    Malformed(String),
}
