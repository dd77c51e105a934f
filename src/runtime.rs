//! Main event loop.
//!
//! One task owns the voice controller, the application state and every
//! timer. Host commands, interpretation results, release delays, geocoding
//! results and trip matches all arrive on a single channel, and the watchdog
//! and simulation timers are polled in the same `select!`, so no two handlers
//! ever run at the same time and each sees a consistent state.

use std::collections::VecDeque;
use std::future::pending;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::app::{AppState, Coordinate, DispatchContext, Followup, Mutation, Place};
use crate::config::AppConfig;
use crate::dispatch;
use crate::error::IntentError;
use crate::geo::Geocoder;
use crate::intent::{Intent, IntentService};
use crate::ipc::{Outbox, VoiceCommand, VoiceEvent};
use crate::simulation::SimulationTick;
use crate::speech::{
    CaptureAdapter, CaptureErrorCode, CaptureEvent, SpeechOptions, SynthesisAdapter,
    SynthesisEvent,
};
use crate::voice::{DisableReason, VoiceController, VoiceEffect};

/// Everything the loop can be woken by, apart from its own timers.
#[derive(Debug)]
pub enum Inbound {
    Command(VoiceCommand),
    IntentResolved {
        cycle: u64,
        context: DispatchContext,
        outcome: Result<Intent, IntentError>,
    },
    ReleaseElapsed {
        utterance: u64,
    },
    DestinationResolved {
        generation: u64,
        hint: String,
        result: anyhow::Result<(Place, Place)>,
    },
    TripMatched {
        trip_id: String,
    },
}

/// Cloneable sender into the runtime.
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl RuntimeHandle {
    /// Forward a host command. Returns false once the runtime is gone.
    pub fn command(&self, cmd: VoiceCommand) -> bool {
        self.tx.send(Inbound::Command(cmd)).is_ok()
    }
}

/// External collaborators the runtime drives.
pub struct Services {
    pub capture: Box<dyn CaptureAdapter>,
    pub synthesis: Box<dyn SynthesisAdapter>,
    pub intent: Arc<dyn IntentService>,
    pub geocoder: Arc<dyn Geocoder>,
}

pub struct Runtime {
    config: AppConfig,
    speech: SpeechOptions,
    controller: VoiceController,
    app: AppState,
    services: Services,
    outbox: Outbox,
    tx: mpsc::UnboundedSender<Inbound>,
    rx: mpsc::UnboundedReceiver<Inbound>,
    watchdog: Option<Interval>,
    simulation: Option<Interval>,
    pending_intent: Option<JoinHandle<()>>,
    pending_release: Option<JoinHandle<()>>,
    /// Bumped whenever an outstanding destination lookup stops being wanted.
    destination_gen: u64,
}

/// Wait for the next tick of an optional timer; never resolves when absent.
async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}

fn periodic(period: std::time::Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl Runtime {
    pub fn new(config: AppConfig, services: Services, outbox: Outbox) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            speech: config.voice.speech_options(),
            controller: VoiceController::new(config.voice.prompts()),
            app: AppState::new(config.geo.home()),
            config,
            services,
            outbox,
            tx,
            rx,
            watchdog: None,
            simulation: None,
            pending_intent: None,
            pending_release: None,
            destination_gen: 0,
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            tx: self.tx.clone(),
        }
    }

    /// Run until a `stop` command arrives.
    pub async fn run(mut self) {
        self.emit(VoiceEvent::Ready {});
        self.emit_state();
        info!("Runtime ready");

        loop {
            tokio::select! {
                msg = self.rx.recv() => {
                    match msg {
                        Some(Inbound::Command(VoiceCommand::Stop {})) | None => break,
                        Some(msg) => self.handle_inbound(msg),
                    }
                }
                _ = next_tick(&mut self.watchdog) => {
                    let effects = self.controller.heartbeat();
                    self.run_effects(effects);
                }
                _ = next_tick(&mut self.simulation) => {
                    self.simulation_tick();
                }
            }
            self.sync_timers();
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        info!("Runtime shutting down");
        if self.controller.voice_enabled() {
            let effects = self.controller.disable(DisableReason::Requested);
            self.run_effects(effects);
        }
        self.cancel_pending();
        self.watchdog = None;
        self.simulation = None;
        self.emit(VoiceEvent::Stopping {});
    }

    fn handle_inbound(&mut self, msg: Inbound) {
        match msg {
            Inbound::Command(cmd) => self.handle_command(cmd),
            Inbound::IntentResolved {
                cycle,
                context,
                outcome,
            } => self.on_intent(cycle, context, outcome),
            Inbound::ReleaseElapsed { utterance } => {
                self.pending_release = None;
                let effects = self.controller.release_elapsed(utterance);
                self.run_effects(effects);
            }
            Inbound::DestinationResolved {
                generation,
                hint,
                result,
            } => self.on_destination(generation, hint, result),
            Inbound::TripMatched { trip_id } => {
                let driver = self.config.simulation.driver();
                let plate = driver.plate.clone().unwrap_or_default();
                let name = driver.name.clone();
                if self
                    .app
                    .accept_trip(&trip_id, driver, self.config.simulation.driver_offset())
                {
                    self.emit(VoiceEvent::TripMatched {
                        trip_id,
                        driver_name: name,
                        plate,
                    });
                    self.emit_state();
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: VoiceCommand) {
        let effects = match cmd {
            VoiceCommand::EnableVoice {} => self.controller.enable(),
            VoiceCommand::DisableVoice {} => {
                if self.controller.voice_enabled() {
                    self.controller.disable(DisableReason::Requested)
                } else {
                    debug!("Voice already disabled");
                    Vec::new()
                }
            }
            VoiceCommand::CaptureStarted { session } => {
                self.controller.on_capture(session, CaptureEvent::Started)
            }
            VoiceCommand::CaptureResult {
                session,
                transcript,
            } => self
                .controller
                .on_capture(session, CaptureEvent::Transcript(transcript)),
            VoiceCommand::CaptureEnd { session } => {
                self.controller.on_capture(session, CaptureEvent::Ended)
            }
            VoiceCommand::CaptureError { session, code } => self.controller.on_capture(
                session,
                CaptureEvent::Error(CaptureErrorCode::from_code(&code)),
            ),
            VoiceCommand::SpeechEnd { utterance } => {
                self.controller.on_synthesis(utterance, SynthesisEvent::Ended)
            }
            VoiceCommand::SpeechError { utterance, message } => self.controller.on_synthesis(
                utterance,
                SynthesisEvent::Error(message.unwrap_or_default()),
            ),
            VoiceCommand::Back {} => {
                let mutations = dispatch::go_back(&self.app.snapshot());
                self.apply_mutations(mutations);
                Vec::new()
            }
            VoiceCommand::CompleteTrip {} => {
                self.destination_gen += 1;
                self.app.complete_trip();
                self.emit_state();
                Vec::new()
            }
            VoiceCommand::SetLocation { lat, lng } => {
                self.app.current_location = Coordinate::new(lat, lng);
                self.emit_state();
                Vec::new()
            }
            VoiceCommand::GetState {} => {
                self.emit_state();
                Vec::new()
            }
            VoiceCommand::Ping {} => {
                self.emit(VoiceEvent::Pong {});
                Vec::new()
            }
            VoiceCommand::Stop {} => Vec::new(),
        };
        self.run_effects(effects);
    }

    fn on_intent(
        &mut self,
        cycle: u64,
        context: DispatchContext,
        outcome: Result<Intent, IntentError>,
    ) {
        self.pending_intent = None;
        if !self.controller.awaiting_interpretation(cycle) {
            debug!(cycle, "Interpretation no longer wanted");
            return;
        }

        let prompt = match outcome {
            Ok(intent) => {
                info!(action = %intent.action, value = %intent.value, "Intent resolved");
                self.emit(VoiceEvent::Intent {
                    action: intent.action,
                    value: intent.value.clone(),
                    speech: intent.speech.clone(),
                });
                let outcome = dispatch::dispatch(&intent, &context);
                if outcome.guard_missed {
                    self.emit(VoiceEvent::GuardMiss {
                        action: intent.action,
                        view: context.view.to_string(),
                    });
                }
                self.apply_mutations(outcome.mutations);
                Some(outcome.prompt)
            }
            Err(e) => {
                warn!("Intent interpretation failed: {}", e);
                self.emit(VoiceEvent::IntentFailed {
                    message: e.to_string(),
                });
                None
            }
        };

        let effects = self.controller.finish_processing(cycle, prompt);
        self.run_effects(effects);
    }

    fn on_destination(
        &mut self,
        generation: u64,
        hint: String,
        result: anyhow::Result<(Place, Place)>,
    ) {
        if generation != self.destination_gen {
            debug!(hint = %hint, "Destination lookup superseded, dropping result");
            return;
        }
        match result {
            Ok((pickup, destination)) => {
                if self.app.active_trip.is_some() {
                    debug!(hint = %hint, "Trip already active, ignoring resolved destination");
                    return;
                }
                self.app.set_destination(pickup, destination);
                self.emit_state();
            }
            Err(e) => {
                warn!(hint = %hint, "Destination lookup failed: {}", e);
                self.emit(VoiceEvent::DestinationFailed {
                    hint,
                    message: e.to_string(),
                });
            }
        }
    }

    fn apply_mutations(&mut self, mutations: Vec<Mutation>) {
        if mutations.is_empty() {
            return;
        }
        for mutation in mutations {
            if self.supersedes_destination(&mutation) {
                self.destination_gen += 1;
            }
            if let Some(followup) = self.app.apply(mutation) {
                self.start_followup(followup);
            }
        }
        self.emit_state();
    }

    /// Whether `mutation` makes any in-flight destination lookup stale.
    fn supersedes_destination(&self, mutation: &Mutation) -> bool {
        match mutation {
            Mutation::ResolveDestination { .. }
            | Mutation::ClearTripRequest
            | Mutation::CancelTrip => true,
            Mutation::SetRole(role) => *role != self.app.role,
            Mutation::SetView(view) => *view != self.app.view,
            _ => false,
        }
    }

    fn start_followup(&mut self, followup: Followup) {
        let tx = self.tx.clone();
        match followup {
            Followup::ResolveDestination { hint } => {
                let geocoder = Arc::clone(&self.services.geocoder);
                let current = self.app.current_location;
                let generation = self.destination_gen;
                tokio::spawn(async move {
                    let result = resolve_destination(geocoder.as_ref(), &hint, current).await;
                    let _ = tx.send(Inbound::DestinationResolved {
                        generation,
                        hint,
                        result,
                    });
                });
            }
            Followup::MatchTrip { trip_id } => {
                let delay = self.config.simulation.matching_delay();
                debug!(trip_id = %trip_id, ?delay, "Searching for a driver");
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Inbound::TripMatched { trip_id });
                });
            }
        }
    }

    fn run_effects(&mut self, effects: Vec<VoiceEffect>) {
        let mut queue: VecDeque<VoiceEffect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                VoiceEffect::StartCapture { session } => {
                    if let Err(code) = self.services.capture.start(session) {
                        debug!(session, code = %code, "Capture failed to start");
                        queue.extend(
                            self.controller
                                .on_capture(session, CaptureEvent::Error(code)),
                        );
                    }
                }
                VoiceEffect::StopCapture { session } => self.services.capture.stop(session),
                VoiceEffect::Speak { utterance, text } => {
                    self.services.synthesis.speak(utterance, &text, &self.speech)
                }
                VoiceEffect::CancelSpeech { utterance } => {
                    self.services.synthesis.cancel(utterance)
                }
                VoiceEffect::Interpret { cycle, transcript } => {
                    info!(text = %transcript, "Transcription result");
                    self.emit(VoiceEvent::Transcription {
                        text: transcript.clone(),
                    });
                    self.spawn_interpretation(cycle, transcript);
                }
                VoiceEffect::ScheduleRelease { utterance } => {
                    let delay = self.config.voice.release_delay();
                    let tx = self.tx.clone();
                    if let Some(previous) = self.pending_release.take() {
                        previous.abort();
                    }
                    self.pending_release = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(Inbound::ReleaseElapsed { utterance });
                    }));
                }
                VoiceEffect::CancelPending => self.cancel_pending(),
                VoiceEffect::PhaseChanged(phase) => {
                    self.emit(VoiceEvent::PhaseChange { phase });
                }
                VoiceEffect::Disabled(reason) => {
                    self.emit(VoiceEvent::VoiceDisabled { reason });
                }
            }
        }
        debug_assert!(self.controller.invariant_holds());
    }

    /// Snapshot the context now and interpret on a separate task.
    fn spawn_interpretation(&mut self, cycle: u64, transcript: String) {
        let context = self.app.snapshot();
        let service = Arc::clone(&self.services.intent);
        let timeout = self.config.intent.timeout();
        let tx = self.tx.clone();
        if let Some(previous) = self.pending_intent.take() {
            previous.abort();
        }
        self.pending_intent = Some(tokio::spawn(async move {
            let outcome =
                match tokio::time::timeout(timeout, service.interpret(&transcript, &context)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(IntentError::Timeout(timeout)),
                };
            let _ = tx.send(Inbound::IntentResolved {
                cycle,
                context,
                outcome,
            });
        }));
    }

    fn cancel_pending(&mut self) {
        if let Some(task) = self.pending_intent.take() {
            task.abort();
        }
        if let Some(task) = self.pending_release.take() {
            task.abort();
        }
    }

    fn simulation_tick(&mut self) {
        let Some((current, target)) = self.app.simulation_target() else {
            self.simulation = None;
            return;
        };
        let outcome = SimulationTick {
            current,
            target,
            speed_per_tick: self.config.simulation.step_per_tick,
            arrival_epsilon: self.config.simulation.arrival_epsilon,
        }
        .step();
        let position = outcome.position();
        self.app.set_driver_position(position, outcome.arrived());
        self.emit(VoiceEvent::DriverPosition {
            lat: position.lat,
            lng: position.lng,
        });
        if outcome.arrived() {
            if let Some(trip) = &self.app.active_trip {
                info!(trip_id = %trip.id, "Driver arrived at pickup");
                let trip_id = trip.id.clone();
                self.emit(VoiceEvent::DriverArrived { trip_id });
            }
        }
    }

    /// Start or drop the periodic timers to match the current state.
    fn sync_timers(&mut self) {
        match (self.controller.voice_enabled(), self.watchdog.is_some()) {
            (true, false) => {
                debug!("Watchdog armed");
                self.watchdog = Some(periodic(self.config.voice.heartbeat()));
            }
            (false, true) => {
                debug!("Watchdog cancelled");
                self.watchdog = None;
            }
            _ => {}
        }

        match (self.app.simulation_target().is_some(), self.simulation.is_some()) {
            (true, false) => {
                debug!("Driver simulation started");
                self.simulation = Some(periodic(self.config.simulation.tick()));
            }
            (false, true) => {
                debug!("Driver simulation stopped");
                self.simulation = None;
            }
            _ => {}
        }
    }

    fn emit(&self, event: VoiceEvent) {
        let _ = self.outbox.send(event);
    }

    fn emit_state(&self) {
        match serde_json::to_value(&self.app) {
            Ok(state) => self.emit(VoiceEvent::State { state }),
            Err(e) => warn!("Failed to serialize state: {}", e),
        }
    }
}

/// Geocode the destination and label the current location as pickup.
async fn resolve_destination(
    geocoder: &dyn Geocoder,
    hint: &str,
    current: Coordinate,
) -> anyhow::Result<(Place, Place)> {
    let destination = geocoder.geocode(hint).await?;
    let address = match geocoder.reverse_geocode(current).await {
        Ok(address) => address,
        Err(e) => {
            debug!("Reverse geocoding failed, using coordinates: {}", e);
            current.to_string()
        }
    };
    let pickup = Place {
        coord: current,
        address,
    };
    Ok((pickup, destination))
}
