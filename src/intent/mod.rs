//! Intent interpretation contract.
//!
//! One transcript in, one structured [`Intent`] out, via exactly one call to an
//! external language-understanding service. The service decides what the user
//! meant; this layer only checks that the answer has the right shape.

pub mod client;
pub mod prompt;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::app::DispatchContext;
use crate::error::IntentError;

pub use client::HttpIntentService;

/// Closed set of actions the service may return. Wire names are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    SetPassengerName,
    SetPassengerPhone,
    SetDriverName,
    SetDriverPhone,
    SetDriverPlate,
    NavigatePassengerReg,
    NavigateDriverReg,
    NavigateDestination,
    ConfirmTrip,
    Cancel,
    None,
}

impl ActionKind {
    pub const ALL: [ActionKind; 11] = [
        Self::SetPassengerName,
        Self::SetPassengerPhone,
        Self::SetDriverName,
        Self::SetDriverPhone,
        Self::SetDriverPlate,
        Self::NavigatePassengerReg,
        Self::NavigateDriverReg,
        Self::NavigateDestination,
        Self::ConfirmTrip,
        Self::Cancel,
        Self::None,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SetPassengerName => "SET_PASSENGER_NAME",
            Self::SetPassengerPhone => "SET_PASSENGER_PHONE",
            Self::SetDriverName => "SET_DRIVER_NAME",
            Self::SetDriverPhone => "SET_DRIVER_PHONE",
            Self::SetDriverPlate => "SET_DRIVER_PLATE",
            Self::NavigatePassengerReg => "NAVIGATE_PASSENGER_REG",
            Self::NavigateDriverReg => "NAVIGATE_DRIVER_REG",
            Self::NavigateDestination => "NAVIGATE_DESTINATION",
            Self::ConfirmTrip => "CONFIRM_TRIP",
            Self::Cancel => "CANCEL",
            Self::None => "NONE",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured reading of one utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub action: ActionKind,
    /// Raw fragment the action applies to; sanitized by dispatch.
    #[serde(default)]
    pub value: String,
    /// What to say back to the user.
    pub speech: String,
}

impl Intent {
    /// Parse and validate a service reply. Markdown code fences around the
    /// JSON object are tolerated.
    pub fn parse(raw: &str) -> Result<Self, IntentError> {
        let body = strip_code_fence(raw.trim());
        if body.is_empty() {
            return Err(IntentError::EmptyResponse);
        }
        let intent: Intent =
            serde_json::from_str(body).map_err(|e| IntentError::Malformed(e.to_string()))?;
        if intent.speech.trim().is_empty() {
            return Err(IntentError::Malformed("speech is empty".into()));
        }
        Ok(intent)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// External language-understanding service (dyn-compatible).
pub trait IntentService: Send + Sync {
    /// Interpret `transcript` against `context`. Exactly one attempt.
    fn interpret<'a>(
        &'a self,
        transcript: &'a str,
        context: &'a DispatchContext,
    ) -> Pin<Box<dyn Future<Output = Result<Intent, IntentError>> + Send + 'a>>;
}
