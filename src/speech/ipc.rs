//! Host-backed speech adapters.
//!
//! The UI host owns the actual recognizer and synthesizer. These adapters turn
//! start/stop/speak requests into outbound events; the host reports results
//! back with `capture_*` and `speech_*` commands.

use tracing::debug;

use super::{CaptureAdapter, CaptureErrorCode, SpeechOptions, SynthesisAdapter};
use crate::ipc::{Outbox, VoiceEvent};

/// Capture through the host's recognizer.
pub struct IpcCapture {
    outbox: Outbox,
    locale: String,
}

impl IpcCapture {
    pub fn new(outbox: Outbox, locale: &str) -> Self {
        Self {
            outbox,
            locale: locale.to_string(),
        }
    }
}

impl CaptureAdapter for IpcCapture {
    fn start(&mut self, session: u64) -> Result<(), CaptureErrorCode> {
        debug!(session, "Requesting capture from host");
        self.outbox
            .send(VoiceEvent::CaptureStart {
                session,
                locale: self.locale.clone(),
                continuous: false,
                interim_results: false,
                max_alternatives: 1,
            })
            .map_err(|_| CaptureErrorCode::Transient("host-disconnected".into()))
    }

    fn stop(&mut self, session: u64) {
        let _ = self.outbox.send(VoiceEvent::CaptureStop { session });
    }
}

/// Synthesis through the host's speech engine. Cancels are only sent when the
/// controller asks for them, so the host never sees one for a finished
/// utterance.
pub struct IpcSynthesis {
    outbox: Outbox,
}

impl IpcSynthesis {
    pub fn new(outbox: Outbox) -> Self {
        Self { outbox }
    }
}

impl SynthesisAdapter for IpcSynthesis {
    fn speak(&mut self, utterance: u64, text: &str, options: &SpeechOptions) {
        debug!(utterance, text = %text, "Requesting speech from host");
        let _ = self.outbox.send(VoiceEvent::Speak {
            utterance,
            text: text.to_string(),
            locale: options.locale.clone(),
            rate: options.rate,
            pitch: options.pitch,
            voice_hint: options.voice_hint.clone(),
        });
    }

    fn cancel(&mut self, utterance: u64) {
        debug!(utterance, "Cancelling speech");
        let _ = self.outbox.send(VoiceEvent::SpeakCancel { utterance });
    }
}
