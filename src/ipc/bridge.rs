//! IPC bridge: stdin reader and stdout event emitter.
//!
//! A blocking stdin reader thread deserializes commands and forwards them into
//! the runtime inbox, and a writer task drains the outbox onto stdout as JSON
//! lines.

use std::io::{self, BufRead, Write};

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{VoiceCommand, VoiceEvent};
use crate::runtime::RuntimeHandle;

/// Emit a `VoiceEvent` as a JSON line on stdout and flush.
pub fn emit_event(event: &VoiceEvent) {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            return;
        }
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    // Ignore write/flush errors; the pipe may be closed.
    let _ = writeln!(handle, "{}", json);
    let _ = handle.flush();
}

/// Create the outbox and spawn the task that writes it to stdout.
pub fn spawn_stdout_writer() -> (super::Outbox, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<VoiceEvent>();
    let task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            emit_event(&event);
        }
        debug!("stdout writer exiting");
    });
    (tx, task)
}

/// Normalize incoming JSON: if it has a `"type"` field but no `"command"`
/// field, rename `"type"` to `"command"` so serde can deserialize it.
fn normalize_command_json(input: &str) -> String {
    if let Ok(mut obj) = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(input)
    {
        if !obj.contains_key("command") {
            if let Some(type_val) = obj.remove("type") {
                obj.insert("command".to_string(), type_val);
                if let Ok(json) = serde_json::to_string(&obj) {
                    return json;
                }
            }
        }
    }
    input.to_string()
}

/// Parse one stdin line into a command. Blank lines yield `Ok(None)`.
pub fn parse_command_line(line: &str) -> Result<Option<VoiceCommand>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let normalized = normalize_command_json(trimmed);
    serde_json::from_str::<VoiceCommand>(&normalized).map(Some)
}

/// Spawn a blocking thread that reads JSON lines from stdin and forwards the
/// commands to the runtime.
///
/// The thread exits when stdin is closed (host process gone), on an
/// unrecoverable read error, or when the runtime has shut down. Closing stdin
/// is reported to the runtime as a `stop` command.
pub fn spawn_stdin_reader(runtime: RuntimeHandle, outbox: super::Outbox) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        let reader = stdin.lock();
        for line in reader.lines() {
            match line {
                Ok(text) => match parse_command_line(&text) {
                    Ok(Some(cmd)) => {
                        debug!(?cmd, "Received command from host");
                        if !runtime.command(cmd) {
                            return; // Runtime is gone.
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("Invalid JSON command: {} (input: {})", e, text.trim());
                        let _ = outbox.send(VoiceEvent::Error {
                            message: format!("Invalid JSON command: {}", e),
                        });
                    }
                },
                Err(e) => {
                    error!("stdin read error: {}", e);
                    break;
                }
            }
        }
        debug!("stdin closed, requesting shutdown");
        runtime.command(VoiceCommand::Stop {});
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_key_is_accepted() {
        let cmd = parse_command_line(r#"{"type":"enable_voice"}"#).unwrap();
        assert_eq!(cmd, Some(VoiceCommand::EnableVoice {}));
    }

    #[test]
    fn test_command_key_wins_over_type() {
        let cmd = parse_command_line(r#"{"command":"ping","type":"stop"}"#).unwrap();
        assert_eq!(cmd, Some(VoiceCommand::Ping {}));
    }

    #[test]
    fn test_blank_line_is_skipped() {
        assert_eq!(parse_command_line("   ").unwrap(), None);
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(parse_command_line("{not json").is_err());
    }
}
