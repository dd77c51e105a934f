use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use ride_voice::config::read_app_config;
use ride_voice::geo::NominatimGeocoder;
use ride_voice::intent::HttpIntentService;
use ride_voice::ipc::bridge::{emit_event, spawn_stdin_reader, spawn_stdout_writer};
use ride_voice::ipc::VoiceEvent;
use ride_voice::logging;
use ride_voice::runtime::{Runtime, Services};
use ride_voice::speech::ipc::{IpcCapture, IpcSynthesis};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = logging::init() {
        logging::init_console();
        warn!("File logging unavailable: {:#}", e);
    }

    // Let the host know we're alive before anything can fail.
    emit_event(&VoiceEvent::Starting {});

    if let Err(e) = run().await {
        error!("Fatal: {:#}", e);
        emit_event(&VoiceEvent::Error {
            message: format!("{:#}", e),
        });
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = read_app_config();
    info!(voice = ?config.voice, model = %config.intent.model, "Configuration loaded");

    let (outbox, writer) = spawn_stdout_writer();

    let services = Services {
        capture: Box::new(IpcCapture::new(outbox.clone(), &config.voice.locale)),
        synthesis: Box::new(IpcSynthesis::new(outbox.clone())),
        intent: Arc::new(HttpIntentService::new(&config.intent, &config.voice.locale)?),
        geocoder: Arc::new(NominatimGeocoder::new(&config.geo)?),
    };

    let runtime = Runtime::new(config, services, outbox.clone());
    spawn_stdin_reader(runtime.handle(), outbox);
    runtime.run().await;

    // The stdin thread keeps an outbox sender alive, so bound the final drain.
    let _ = tokio::time::timeout(Duration::from_millis(500), writer).await;
    info!("Ride voice stopped");
    Ok(())
}
