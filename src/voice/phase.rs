//! Voice session phases.
//!
//! The controller is in exactly one phase at a time. Capture is only open in
//! `Listening` and synthesis only runs in `Speaking`, so the two audio
//! resources can never be active together.

use serde::Serialize;

/// What the voice subsystem is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VoicePhase {
    /// Nothing in flight. The watchdog reopens capture from here when voice is enabled.
    Idle,
    /// Capture is open and waiting for a single utterance.
    Listening,
    /// A transcript is being interpreted.
    Processing,
    /// A prompt is being spoken (or capture is waiting for the speaker to release).
    Speaking,
}

impl VoicePhase {
    /// Phases during which capture must not be (re)started.
    pub fn blocks_capture(self) -> bool {
        matches!(self, Self::Processing | Self::Speaking)
    }
}

impl std::fmt::Display for VoicePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::Processing => write!(f, "processing"),
            Self::Speaking => write!(f, "speaking"),
        }
    }
}

/// Why voice was switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisableReason {
    /// The host asked for it.
    Requested,
    /// Microphone access was denied; no automatic retries until re-enabled.
    PermissionDenied,
}

impl std::fmt::Display for DisableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::PermissionDenied => write!(f, "permission_denied"),
        }
    }
}
