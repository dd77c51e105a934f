//! End-to-end runs of the event loop with in-memory speech, intent and
//! geocoding fakes. Time is paused, so timers fire deterministically.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use ride_voice::app::{Coordinate, DispatchContext, Place};
use ride_voice::config::AppConfig;
use ride_voice::error::IntentError;
use ride_voice::geo::Geocoder;
use ride_voice::intent::{ActionKind, Intent, IntentService};
use ride_voice::ipc::{VoiceCommand, VoiceEvent};
use ride_voice::runtime::{Runtime, RuntimeHandle, Services};
use ride_voice::speech::{CaptureAdapter, CaptureErrorCode, SpeechOptions, SynthesisAdapter};
use ride_voice::voice::{DisableReason, VoicePhase};

const RELEASE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
enum Call {
    StartCapture(u64),
    StopCapture(u64),
    Speak(u64, String),
    CancelSpeech(u64),
}

type Calls = Arc<Mutex<Vec<Call>>>;

struct FakeCapture(Calls);

impl CaptureAdapter for FakeCapture {
    fn start(&mut self, session: u64) -> Result<(), CaptureErrorCode> {
        self.0.lock().unwrap().push(Call::StartCapture(session));
        Ok(())
    }

    fn stop(&mut self, session: u64) {
        self.0.lock().unwrap().push(Call::StopCapture(session));
    }
}

struct FakeSynthesis(Calls);

impl SynthesisAdapter for FakeSynthesis {
    fn speak(&mut self, utterance: u64, text: &str, _options: &SpeechOptions) {
        self.0
            .lock()
            .unwrap()
            .push(Call::Speak(utterance, text.to_string()));
    }

    fn cancel(&mut self, utterance: u64) {
        self.0.lock().unwrap().push(Call::CancelSpeech(utterance));
    }
}

/// Replies with queued intents in order, after an optional delay.
struct ScriptedIntents {
    replies: Mutex<VecDeque<Intent>>,
    delay: Duration,
}

impl ScriptedIntents {
    fn new(replies: Vec<Intent>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            delay: Duration::ZERO,
        }
    }
}

impl IntentService for ScriptedIntents {
    fn interpret<'a>(
        &'a self,
        _transcript: &'a str,
        _context: &'a DispatchContext,
    ) -> Pin<Box<dyn Future<Output = Result<Intent, IntentError>> + Send + 'a>> {
        let next = self.replies.lock().unwrap().pop_front();
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            next.ok_or(IntentError::EmptyResponse)
        })
    }
}

/// Never answers.
struct HangingIntents;

impl IntentService for HangingIntents {
    fn interpret<'a>(
        &'a self,
        _transcript: &'a str,
        _context: &'a DispatchContext,
    ) -> Pin<Box<dyn Future<Output = Result<Intent, IntentError>> + Send + 'a>> {
        Box::pin(std::future::pending())
    }
}

/// Resolves every hint to the same spot. Lookups take the queued delays in
/// order, then answer immediately.
#[derive(Default)]
struct FixedGeocoder {
    delays: Mutex<VecDeque<Duration>>,
}

impl FixedGeocoder {
    fn with_delays(delays: Vec<Duration>) -> Self {
        Self {
            delays: Mutex::new(delays.into()),
        }
    }
}

impl Geocoder for FixedGeocoder {
    fn geocode<'a>(
        &'a self,
        hint: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Place>> + Send + 'a>> {
        let delay = self.delays.lock().unwrap().pop_front().unwrap_or_default();
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(Place {
                coord: Coordinate::new(4.70, -74.03),
                address: hint.to_string(),
            })
        })
    }

    fn reverse_geocode(
        &self,
        _coord: Coordinate,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        Box::pin(async { Ok("Calle 26 # 13-19".to_string()) })
    }
}

struct Harness {
    config: AppConfig,
    handle: RuntimeHandle,
    events: mpsc::UnboundedReceiver<VoiceEvent>,
    calls: Calls,
    task: JoinHandle<()>,
}

impl Harness {
    fn start(intent: Arc<dyn IntentService>) -> Self {
        Self::with_geocoder(intent, FixedGeocoder::default())
    }

    fn with_geocoder(intent: Arc<dyn IntentService>, geocoder: FixedGeocoder) -> Self {
        let config = AppConfig::default();
        let calls: Calls = Arc::default();
        let (outbox, events) = mpsc::unbounded_channel();
        let services = Services {
            capture: Box::new(FakeCapture(calls.clone())),
            synthesis: Box::new(FakeSynthesis(calls.clone())),
            intent,
            geocoder: Arc::new(geocoder),
        };
        let runtime = Runtime::new(config.clone(), services, outbox);
        let handle = runtime.handle();
        let task = tokio::spawn(runtime.run());
        Self {
            config,
            handle,
            events,
            calls,
            task,
        }
    }

    fn send(&self, cmd: VoiceCommand) {
        assert!(self.handle.command(cmd));
    }

    fn drain(&mut self) -> Vec<VoiceEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn capture_starts(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::StartCapture(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn spoken(&self) -> Vec<(u64, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Speak(u, text) => Some((u, text)),
                _ => None,
            })
            .collect()
    }

    fn last_session(&self) -> u64 {
        *self.capture_starts().last().expect("no capture opened")
    }

    fn last_utterance(&self) -> u64 {
        self.spoken().last().expect("nothing spoken").0
    }

    /// Enable voice, finish the greeting and wait until capture reopens.
    async fn greet(&mut self) -> u64 {
        self.send(VoiceCommand::EnableVoice {});
        settle().await;
        let (utterance, text) = self.spoken().last().cloned().expect("no greeting");
        assert_eq!(text, self.config.voice.greeting);
        self.send(VoiceCommand::SpeechEnd { utterance });
        tokio::time::sleep(RELEASE).await;
        self.last_session()
    }

    /// Deliver a transcript on the open session, then finish the reply.
    async fn say(&mut self, transcript: &str) {
        let session = self.last_session();
        self.send(VoiceCommand::CaptureResult {
            session,
            transcript: transcript.to_string(),
        });
        settle().await;
        let utterance = self.last_utterance();
        self.send(VoiceCommand::SpeechEnd { utterance });
        tokio::time::sleep(RELEASE).await;
    }

    async fn stop(self) -> Vec<VoiceEvent> {
        self.send(VoiceCommand::Stop {});
        let Harness {
            task, mut events, ..
        } = self;
        task.await.unwrap();
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn phases(events: &[VoiceEvent]) -> Vec<VoicePhase> {
    events
        .iter()
        .filter_map(|e| match e {
            VoiceEvent::PhaseChange { phase } => Some(*phase),
            _ => None,
        })
        .collect()
}

fn last_state(events: &[VoiceEvent]) -> serde_json::Value {
    events
        .iter()
        .rev()
        .find_map(|e| match e {
            VoiceEvent::State { state } => Some(state.clone()),
            _ => None,
        })
        .expect("no state event")
}

fn intent(action: ActionKind, value: &str, speech: &str) -> Intent {
    Intent {
        action,
        value: value.into(),
        speech: speech.into(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_greeting_then_listening() {
    let mut h = Harness::start(Arc::new(ScriptedIntents::new(vec![])));
    let session = h.greet().await;

    let events = h.drain();
    assert!(matches!(events.first(), Some(VoiceEvent::Ready {})));
    assert_eq!(phases(&events), vec![VoicePhase::Speaking, VoicePhase::Listening]);
    assert_eq!(h.capture_starts(), vec![session]);

    let events = h.stop().await;
    assert!(matches!(events.last(), Some(VoiceEvent::Stopping {})));
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_restarts_capture_once_per_tick() {
    let mut h = Harness::start(Arc::new(ScriptedIntents::new(vec![])));
    let heartbeat = h.config.voice.heartbeat();
    let first = h.greet().await;

    h.send(VoiceCommand::CaptureEnd { session: first });
    settle().await;
    assert_eq!(phases(&h.drain()).last(), Some(&VoicePhase::Idle));

    tokio::time::sleep(heartbeat + Duration::from_millis(50)).await;
    assert_eq!(h.capture_starts().len(), 2);

    // Capture is open; further ticks must not stack another session.
    tokio::time::sleep(heartbeat * 2).await;
    assert_eq!(h.capture_starts().len(), 2);
    assert_eq!(phases(&h.drain()), vec![VoicePhase::Listening]);

    // A late end for the first session changes nothing.
    h.send(VoiceCommand::CaptureEnd { session: first });
    tokio::time::sleep(heartbeat).await;
    assert_eq!(h.capture_starts().len(), 2);

    let second = h.last_session();
    h.send(VoiceCommand::CaptureEnd { session: second });
    tokio::time::sleep(heartbeat + Duration::from_millis(50)).await;
    assert_eq!(h.capture_starts().len(), 3);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_transient_error_recovers_on_next_tick() {
    let mut h = Harness::start(Arc::new(ScriptedIntents::new(vec![])));
    let heartbeat = h.config.voice.heartbeat();
    let session = h.greet().await;

    h.send(VoiceCommand::CaptureError {
        session,
        code: "no-speech".into(),
    });
    tokio::time::sleep(heartbeat + Duration::from_millis(50)).await;

    assert_eq!(h.capture_starts().len(), 2);
    let events = h.drain();
    assert!(!events
        .iter()
        .any(|e| matches!(e, VoiceEvent::VoiceDisabled { .. })));
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_disables_voice() {
    let mut h = Harness::start(Arc::new(ScriptedIntents::new(vec![])));
    let heartbeat = h.config.voice.heartbeat();
    let session = h.greet().await;
    h.drain();

    h.send(VoiceCommand::CaptureError {
        session,
        code: "not-allowed".into(),
    });
    tokio::time::sleep(heartbeat * 3).await;

    let events = h.drain();
    assert!(events.contains(&VoiceEvent::VoiceDisabled {
        reason: DisableReason::PermissionDenied
    }));
    assert_eq!(phases(&events), vec![VoicePhase::Idle]);
    assert_eq!(h.capture_starts().len(), 1);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_enable_disable_round_trip() {
    let mut h = Harness::start(Arc::new(ScriptedIntents::new(vec![])));
    let heartbeat = h.config.voice.heartbeat();
    let session = h.greet().await;
    h.drain();

    h.send(VoiceCommand::DisableVoice {});
    settle().await;
    let events = h.drain();
    assert_eq!(phases(&events), vec![VoicePhase::Idle]);
    assert!(events.contains(&VoiceEvent::VoiceDisabled {
        reason: DisableReason::Requested
    }));
    assert!(h.calls().contains(&Call::StopCapture(session)));

    // No watchdog while disabled.
    tokio::time::sleep(heartbeat * 3).await;
    assert_eq!(h.capture_starts().len(), 1);
    assert!(h.drain().is_empty());

    // Re-enable greets again, then disable mid-greeting cancels speech.
    h.send(VoiceCommand::EnableVoice {});
    settle().await;
    let utterance = h.last_utterance();
    assert_eq!(h.spoken().len(), 2);
    h.send(VoiceCommand::DisableVoice {});
    settle().await;
    assert!(h.calls().contains(&Call::CancelSpeech(utterance)));

    // The host's late end event for the cancelled greeting is ignored.
    h.send(VoiceCommand::SpeechEnd { utterance });
    tokio::time::sleep(heartbeat * 2).await;
    assert_eq!(h.capture_starts().len(), 1);
    assert_eq!(
        phases(&h.drain()),
        vec![VoicePhase::Speaking, VoicePhase::Idle]
    );

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_intent_timeout_speaks_fallback_once() {
    let mut h = Harness::start(Arc::new(HangingIntents));
    let timeout = h.config.intent.timeout();
    h.greet().await;
    h.drain();

    let session = h.last_session();
    h.send(VoiceCommand::CaptureResult {
        session,
        transcript: "llévame al centro".into(),
    });
    tokio::time::sleep(timeout + Duration::from_millis(100)).await;

    let events = h.drain();
    assert_eq!(
        phases(&events),
        vec![VoicePhase::Processing, VoicePhase::Speaking]
    );
    let failures = events
        .iter()
        .filter(|e| matches!(e, VoiceEvent::IntentFailed { .. }))
        .count();
    assert_eq!(failures, 1);
    assert!(!events.iter().any(|e| matches!(e, VoiceEvent::State { .. })));

    let spoken = h.spoken();
    assert_eq!(spoken.len(), 2);
    assert_eq!(spoken[1].1, h.config.voice.fallback_prompt);

    h.send(VoiceCommand::SpeechEnd {
        utterance: spoken[1].0,
    });
    tokio::time::sleep(RELEASE).await;
    assert_eq!(phases(&h.drain()), vec![VoicePhase::Listening]);
    assert_eq!(h.capture_starts().len(), 2);

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_result_after_disable_is_dropped() {
    let intents = ScriptedIntents {
        replies: Mutex::new(
            vec![intent(ActionKind::NavigateDriverReg, "", "Vamos a registrarte")].into(),
        ),
        delay: Duration::from_millis(500),
    };
    let mut h = Harness::start(Arc::new(intents));
    let session = h.greet().await;

    h.send(VoiceCommand::CaptureResult {
        session,
        transcript: "quiero manejar".into(),
    });
    settle().await;
    h.send(VoiceCommand::DisableVoice {});
    tokio::time::sleep(Duration::from_secs(2)).await;

    let events = h.drain();
    assert!(!events.iter().any(|e| matches!(e, VoiceEvent::Intent { .. })));
    assert_eq!(h.spoken().len(), 1);
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_guard_miss_still_speaks() {
    let replies = vec![intent(ActionKind::ConfirmTrip, "", "Pidiendo tu viaje")];
    let mut h = Harness::start(Arc::new(ScriptedIntents::new(replies)));
    h.greet().await;
    h.drain();

    h.say("confirma").await;

    let events = h.drain();
    assert!(events.contains(&VoiceEvent::GuardMiss {
        action: ActionKind::ConfirmTrip,
        view: "home".into(),
    }));
    assert_eq!(h.spoken().last().unwrap().1, "Pidiendo tu viaje");
    assert!(!events.iter().any(|e| matches!(e, VoiceEvent::State { .. })));
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_full_trip_flow() {
    let replies = vec![
        intent(ActionKind::NavigatePassengerReg, "", "Registremos tu cuenta"),
        intent(ActionKind::SetPassengerName, "Ana", "Hola Ana"),
        intent(ActionKind::NavigateDestination, "Usaquén", "Buscando Usaquén"),
        intent(ActionKind::ConfirmTrip, "", "Buscando conductor"),
    ];
    let mut h = Harness::start(Arc::new(ScriptedIntents::new(replies)));
    let sim = h.config.simulation.clone();
    h.greet().await;

    h.say("quiero pedir un carro").await;
    h.say("me llamo Ana").await;
    h.say("llévame a Usaquén").await;

    let state = last_state(&h.drain());
    assert_eq!(state["view"], "passenger_dashboard");
    assert_eq!(state["passenger"]["name"], "Ana");
    assert_eq!(state["trip_request"]["destination"]["address"], "Usaquén");
    assert_eq!(state["trip_request"]["pickup"]["address"], "Calle 26 # 13-19");
    assert!(state["trip_request"]["price"].as_u64().unwrap() > 4_000);

    h.say("sí, confirma").await;
    let state = last_state(&h.drain());
    assert_eq!(state["active_trip"]["status"], "searching");

    tokio::time::sleep(sim.matching_delay()).await;
    let events = h.drain();
    assert!(events
        .iter()
        .any(|e| matches!(e, VoiceEvent::TripMatched { plate, .. } if plate == "KXT482")));

    tokio::time::sleep(sim.tick() * 20).await;
    let events = h.drain();
    let positions: Vec<(f64, f64)> = events
        .iter()
        .filter_map(|e| match e {
            VoiceEvent::DriverPosition { lat, lng } => Some((*lat, *lng)),
            _ => None,
        })
        .collect();
    assert!((14..=15).contains(&positions.len()), "{} ticks", positions.len());
    assert_eq!(positions.last(), Some(&(4.60, -74.08)));
    let arrivals = events
        .iter()
        .filter(|e| matches!(e, VoiceEvent::DriverArrived { .. }))
        .count();
    assert_eq!(arrivals, 1);

    h.send(VoiceCommand::CompleteTrip {});
    settle().await;
    let state = last_state(&h.drain());
    assert!(state["active_trip"].is_null());
    assert!(state["trip_request"]["destination"].is_null());

    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_back_command_walks_home() {
    let replies = vec![intent(ActionKind::NavigateDriverReg, "", "Registro de conductor")];
    let mut h = Harness::start(Arc::new(ScriptedIntents::new(replies)));
    h.greet().await;
    h.say("quiero manejar").await;
    assert_eq!(last_state(&h.drain())["view"], "driver_registration");

    h.send(VoiceCommand::Back {});
    settle().await;
    let state = last_state(&h.drain());
    assert_eq!(state["view"], "home");
    assert_eq!(state["role"], "none");

    h.send(VoiceCommand::Ping {});
    settle().await;
    assert!(h.drain().contains(&VoiceEvent::Pong {}));
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_back_discards_pending_destination() {
    let replies = vec![
        intent(ActionKind::NavigatePassengerReg, "", "Registremos tu cuenta"),
        intent(ActionKind::NavigateDestination, "Usaquén", "Buscando Usaquén"),
    ];
    let geocoder = FixedGeocoder::with_delays(vec![Duration::from_secs(3)]);
    let mut h = Harness::with_geocoder(Arc::new(ScriptedIntents::new(replies)), geocoder);
    h.greet().await;
    h.say("quiero pedir un carro").await;
    h.say("llévame a Usaquén").await;
    assert_eq!(last_state(&h.drain())["view"], "passenger_dashboard");

    h.send(VoiceCommand::Back {});
    tokio::time::sleep(Duration::from_secs(4)).await;

    let state = last_state(&h.drain());
    assert_eq!(state["view"], "home");
    assert_eq!(state["role"], "none");
    assert!(state["trip_request"]["destination"].is_null());
    h.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_latest_destination_wins() {
    let replies = vec![
        intent(ActionKind::NavigatePassengerReg, "", "Registremos tu cuenta"),
        intent(ActionKind::NavigateDestination, "Usaquén", "Buscando Usaquén"),
        intent(ActionKind::NavigateDestination, "Chapinero", "Mejor Chapinero"),
    ];
    let geocoder =
        FixedGeocoder::with_delays(vec![Duration::from_secs(3), Duration::from_millis(100)]);
    let mut h = Harness::with_geocoder(Arc::new(ScriptedIntents::new(replies)), geocoder);
    h.greet().await;
    h.say("quiero pedir un carro").await;
    h.say("llévame a Usaquén").await;
    h.say("no, mejor a Chapinero").await;
    tokio::time::sleep(Duration::from_secs(4)).await;

    let state = last_state(&h.drain());
    assert_eq!(state["trip_request"]["destination"]["address"], "Chapinero");
    h.stop().await;
}
