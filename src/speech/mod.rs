//! Speech I/O adapters.
//!
//! Capture and synthesis are two independent single-slot resources. The core
//! only tells them to start or stop; results come back later as events tagged
//! with the capture session or utterance id they belong to.

pub mod ipc;

use serde::Serialize;

/// Events reported by the capture adapter for one capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Started,
    Transcript(String),
    Ended,
    Error(CaptureErrorCode),
}

/// Classified capture failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureErrorCode {
    /// Microphone access denied. Terminal for the session.
    PermissionDenied,
    /// Anything else (no speech, device busy, aborted, network). Left to the watchdog.
    Transient(String),
}

impl CaptureErrorCode {
    /// Classify a raw recognizer error code.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "not-allowed" | "service-not-allowed" | "permission-denied" => Self::PermissionDenied,
            other => Self::Transient(other.to_string()),
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

impl std::fmt::Display for CaptureErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "not-allowed"),
            Self::Transient(code) => write!(f, "{}", code),
        }
    }
}

/// Events reported by the synthesis adapter for one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Ended,
    Error(String),
}

/// Voice parameters passed with every utterance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechOptions {
    pub locale: String,
    pub rate: f64,
    pub pitch: f64,
    pub voice_hint: Option<String>,
}

/// Microphone side. Runs in single-utterance mode, no interim results.
pub trait CaptureAdapter: Send {
    /// Open capture for `session`. An error here is reported as if the adapter
    /// had emitted `CaptureEvent::Error`.
    fn start(&mut self, session: u64) -> Result<(), CaptureErrorCode>;

    /// Close capture for `session`. Must be safe to call when already closed.
    fn stop(&mut self, session: u64);
}

/// Speaker side.
pub trait SynthesisAdapter: Send {
    /// Speak `text`. The controller cancels any earlier utterance itself.
    fn speak(&mut self, utterance: u64, text: &str, options: &SpeechOptions);

    /// Cancel `utterance` if it is still pending or playing.
    fn cancel(&mut self, utterance: u64);
}
