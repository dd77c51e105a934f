//! IPC protocol types for communication with the UI host.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (core -> host).
//! Commands use `{"command": "<name>", ...}` format (host -> core).

pub mod bridge;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::intent::ActionKind;
use crate::voice::{DisableReason, VoicePhase};

/// Outbound event queue. A writer task drains it onto stdout.
pub type Outbox = mpsc::UnboundedSender<VoiceEvent>;

// ---------------------------------------------------------------------------
// Events: core -> host (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the host via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum VoiceEvent {
    Starting {},
    Ready {},
    PhaseChange { phase: VoicePhase },
    VoiceDisabled { reason: DisableReason },
    CaptureStart {
        session: u64,
        locale: String,
        continuous: bool,
        interim_results: bool,
        max_alternatives: u32,
    },
    CaptureStop { session: u64 },
    Speak {
        utterance: u64,
        text: String,
        locale: String,
        rate: f64,
        pitch: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        voice_hint: Option<String>,
    },
    SpeakCancel { utterance: u64 },
    Transcription { text: String },
    Intent {
        action: ActionKind,
        value: String,
        speech: String,
    },
    IntentFailed { message: String },
    GuardMiss { action: ActionKind, view: String },
    State { state: serde_json::Value },
    DestinationFailed { hint: String, message: String },
    TripMatched {
        trip_id: String,
        driver_name: String,
        plate: String,
    },
    DriverPosition { lat: f64, lng: f64 },
    DriverArrived { trip_id: String },
    Error { message: String },
    Pong {},
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: host -> core (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the host via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum VoiceCommand {
    EnableVoice {},
    DisableVoice {},
    CaptureStarted {
        session: u64,
    },
    CaptureResult {
        session: u64,
        transcript: String,
    },
    CaptureEnd {
        session: u64,
    },
    CaptureError {
        session: u64,
        code: String,
    },
    SpeechEnd {
        utterance: u64,
    },
    SpeechError {
        utterance: u64,
        #[serde(default)]
        message: Option<String>,
    },
    Back {},
    CompleteTrip {},
    SetLocation {
        lat: f64,
        lng: f64,
    },
    GetState {},
    Ping {},
    Stop {},
}
