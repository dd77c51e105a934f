//! Voice session state machine.
//!
//! Every input (host request, adapter callback, timer) goes through a method
//! on [`VoiceController`], which updates the phase and returns the effects the
//! runtime must carry out. The controller never touches I/O itself.
//!
//! Capture sessions and utterances get fresh ids, so a late callback from an
//! earlier session or utterance is recognized and dropped.

use tracing::{debug, info, warn};

use super::{DisableReason, VoicePhase};
use crate::speech::{CaptureErrorCode, CaptureEvent, SynthesisEvent};

/// Side effects requested by a transition, in the order they must run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEffect {
    StartCapture { session: u64 },
    StopCapture { session: u64 },
    Speak { utterance: u64, text: String },
    CancelSpeech { utterance: u64 },
    /// Snapshot the dispatch context and interpret `transcript`.
    Interpret { cycle: u64, transcript: String },
    /// Wait for the capture hardware to release, then report `release_elapsed`.
    ScheduleRelease { utterance: u64 },
    /// Drop any in-flight interpretation and pending release timer.
    CancelPending,
    PhaseChanged(VoicePhase),
    Disabled(DisableReason),
}

/// Fixed prompts spoken by the controller itself.
#[derive(Debug, Clone)]
pub struct Prompts {
    pub greeting: String,
    pub fallback: String,
}

#[derive(Debug)]
pub struct VoiceController {
    phase: VoicePhase,
    voice_enabled: bool,
    /// Open capture session, if any.
    capture: Option<u64>,
    /// Utterance currently being synthesized, if any.
    utterance: Option<u64>,
    /// Finished utterance whose release delay is running.
    releasing: Option<u64>,
    next_id: u64,
    cycle: u64,
    prompts: Prompts,
}

impl VoiceController {
    pub fn new(prompts: Prompts) -> Self {
        Self {
            phase: VoicePhase::Idle,
            voice_enabled: false,
            capture: None,
            utterance: None,
            releasing: None,
            next_id: 0,
            cycle: 0,
            prompts,
        }
    }

    pub fn phase(&self) -> VoicePhase {
        self.phase
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled
    }

    pub fn capture_active(&self) -> bool {
        self.capture.is_some()
    }

    pub fn synthesis_active(&self) -> bool {
        self.utterance.is_some()
    }

    /// Capture and synthesis are never active together, and each is only
    /// active in its own phase.
    pub fn invariant_holds(&self) -> bool {
        let exclusive = !(self.capture.is_some() && self.utterance.is_some());
        let capture_phase = self.capture.is_none() || self.phase == VoicePhase::Listening;
        let listening_has_capture = self.phase != VoicePhase::Listening || self.capture.is_some();
        let speech_phase = self.utterance.is_none() || self.phase == VoicePhase::Speaking;
        exclusive && capture_phase && listening_has_capture && speech_phase
    }

    /// Turn voice on and speak the greeting.
    pub fn enable(&mut self) -> Vec<VoiceEffect> {
        if self.voice_enabled {
            debug!("Voice already enabled");
            return Vec::new();
        }
        info!("Voice enabled");
        self.voice_enabled = true;
        self.cycle += 1;
        let mut effects = Vec::new();
        let greeting = self.prompts.greeting.clone();
        self.speak(greeting, &mut effects);
        effects
    }

    /// Turn voice off from any phase.
    pub fn disable(&mut self, reason: DisableReason) -> Vec<VoiceEffect> {
        info!(%reason, phase = %self.phase, "Voice disabled");
        let mut effects = vec![VoiceEffect::CancelPending];
        if let Some(utterance) = self.utterance.take() {
            effects.push(VoiceEffect::CancelSpeech { utterance });
        }
        if let Some(session) = self.capture.take() {
            effects.push(VoiceEffect::StopCapture { session });
        }
        self.releasing = None;
        self.voice_enabled = false;
        self.cycle += 1;
        self.set_phase(VoicePhase::Idle, &mut effects);
        effects.push(VoiceEffect::Disabled(reason));
        effects
    }

    /// Re-entrancy guarded request to open capture.
    pub fn start_listening(&mut self) -> Vec<VoiceEffect> {
        let mut effects = Vec::new();
        if !self.voice_enabled {
            debug!("start_listening ignored: voice disabled");
        } else if self.phase.blocks_capture() {
            debug!(phase = %self.phase, "start_listening ignored");
        } else if self.capture.is_some() {
            debug!("start_listening ignored: capture already active");
        } else {
            self.open_capture(&mut effects);
        }
        effects
    }

    /// Watchdog tick. Reopens capture when voice should be listening but is not.
    pub fn heartbeat(&mut self) -> Vec<VoiceEffect> {
        if self.voice_enabled
            && self.phase == VoicePhase::Idle
            && self.capture.is_none()
            && self.utterance.is_none()
        {
            debug!("Watchdog restarting capture");
            self.start_listening()
        } else {
            Vec::new()
        }
    }

    /// Callback from the capture adapter.
    pub fn on_capture(&mut self, session: u64, event: CaptureEvent) -> Vec<VoiceEffect> {
        let mut effects = Vec::new();
        if self.capture != Some(session) {
            debug!(session, ?event, "Ignoring capture event from stale session");
            return effects;
        }

        match event {
            CaptureEvent::Started => {
                debug!(session, "Capture started");
            }
            CaptureEvent::Transcript(text) => {
                let transcript = text.trim().to_string();
                if transcript.is_empty() {
                    debug!(session, "Ignoring empty transcript");
                    return effects;
                }
                self.capture = None;
                self.cycle += 1;
                effects.push(VoiceEffect::StopCapture { session });
                self.set_phase(VoicePhase::Processing, &mut effects);
                effects.push(VoiceEffect::Interpret {
                    cycle: self.cycle,
                    transcript,
                });
            }
            CaptureEvent::Ended => {
                self.capture = None;
                if self.phase == VoicePhase::Listening {
                    self.set_phase(VoicePhase::Idle, &mut effects);
                }
            }
            CaptureEvent::Error(CaptureErrorCode::PermissionDenied) => {
                warn!(session, "Microphone permission denied");
                self.capture = None;
                return self.disable(DisableReason::PermissionDenied);
            }
            CaptureEvent::Error(CaptureErrorCode::Transient(code)) => {
                debug!(session, code = %code, "Transient capture error");
                self.capture = None;
                if self.phase == VoicePhase::Listening {
                    self.set_phase(VoicePhase::Idle, &mut effects);
                }
            }
        }
        effects
    }

    /// True if an interpretation result for `cycle` is still wanted.
    pub fn awaiting_interpretation(&self, cycle: u64) -> bool {
        self.phase == VoicePhase::Processing && self.cycle == cycle
    }

    /// Interpretation for `cycle` finished. `prompt` is `None` on contract
    /// failure, in which case the fallback apology is spoken.
    pub fn finish_processing(&mut self, cycle: u64, prompt: Option<String>) -> Vec<VoiceEffect> {
        let mut effects = Vec::new();
        if !self.awaiting_interpretation(cycle) {
            debug!(cycle, current = self.cycle, "Dropping stale interpretation result");
            return effects;
        }
        let text = prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| self.prompts.fallback.clone());
        self.speak(text, &mut effects);
        effects
    }

    /// Callback from the synthesis adapter.
    pub fn on_synthesis(&mut self, utterance: u64, event: SynthesisEvent) -> Vec<VoiceEffect> {
        let mut effects = Vec::new();
        if self.utterance != Some(utterance) {
            debug!(utterance, ?event, "Ignoring synthesis event for stale utterance");
            return effects;
        }
        if let SynthesisEvent::Error(message) = &event {
            debug!(utterance, message = %message, "Synthesis error");
        }
        self.utterance = None;
        if self.voice_enabled {
            // Stay in Speaking until the release delay elapses so the
            // watchdog cannot reopen capture while the speaker drains.
            self.releasing = Some(utterance);
            effects.push(VoiceEffect::ScheduleRelease { utterance });
        } else {
            self.set_phase(VoicePhase::Idle, &mut effects);
        }
        effects
    }

    /// The post-speech release delay for `utterance` elapsed.
    pub fn release_elapsed(&mut self, utterance: u64) -> Vec<VoiceEffect> {
        let mut effects = Vec::new();
        if self.releasing != Some(utterance) {
            debug!(utterance, "Ignoring stale release timer");
            return effects;
        }
        self.releasing = None;
        if self.voice_enabled && self.phase == VoicePhase::Speaking {
            self.open_capture(&mut effects);
        } else {
            self.set_phase(VoicePhase::Idle, &mut effects);
        }
        effects
    }

    fn open_capture(&mut self, effects: &mut Vec<VoiceEffect>) {
        let session = self.fresh_id();
        self.capture = Some(session);
        self.set_phase(VoicePhase::Listening, effects);
        effects.push(VoiceEffect::StartCapture { session });
    }

    fn speak(&mut self, text: String, effects: &mut Vec<VoiceEffect>) {
        if let Some(session) = self.capture.take() {
            effects.push(VoiceEffect::StopCapture { session });
        }
        if let Some(previous) = self.utterance.take() {
            effects.push(VoiceEffect::CancelSpeech {
                utterance: previous,
            });
        }
        self.releasing = None;
        let utterance = self.fresh_id();
        self.utterance = Some(utterance);
        self.set_phase(VoicePhase::Speaking, effects);
        effects.push(VoiceEffect::Speak { utterance, text });
    }

    fn set_phase(&mut self, phase: VoicePhase, effects: &mut Vec<VoiceEffect>) {
        if self.phase != phase {
            debug!(from = %self.phase, to = %phase, "Phase change");
            self.phase = phase;
            effects.push(VoiceEffect::PhaseChanged(phase));
        }
    }

    fn fresh_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}
