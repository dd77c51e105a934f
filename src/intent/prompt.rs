//! Prompt construction for the intent service.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::ActionKind;

/// Transcripts longer than this are cut before being sent.
pub const MAX_TRANSCRIPT_CHARS: usize = 500;

/// One-line description of each action, in wire order.
fn describe(action: ActionKind) -> &'static str {
    match action {
        ActionKind::SetPassengerName => "user states their name while registering as a passenger",
        ActionKind::SetPassengerPhone => "user states their phone number as a passenger",
        ActionKind::SetDriverName => "user states their name while registering as a driver",
        ActionKind::SetDriverPhone => "user states their phone number as a driver",
        ActionKind::SetDriverPlate => "driver states the vehicle plate number",
        ActionKind::NavigatePassengerReg => "user wants to ride / register as a passenger",
        ActionKind::NavigateDriverReg => "user wants to drive / register as a driver",
        ActionKind::NavigateDestination => "user names where they want to go (value = place)",
        ActionKind::ConfirmTrip => "user confirms or requests the trip",
        ActionKind::Cancel => "user wants to cancel or go back",
        ActionKind::None => "anything else; just answer",
    }
}

/// System instructions: role, output schema, and the current screen context.
pub fn system_prompt(locale: &str, context: &BTreeMap<String, String>) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are the voice assistant of a ride-hailing app. Read the user's utterance and \
         decide the single action it asks for."
    );
    let _ = writeln!(
        prompt,
        "Reply with one JSON object and nothing else: \
         {{\"speech\": string, \"action\": string, \"value\": string}}."
    );
    let _ = writeln!(
        prompt,
        "\"speech\" is a short spoken confirmation in the language of locale {}.",
        locale
    );
    let _ = writeln!(
        prompt,
        "\"value\" is the exact fragment the action needs (name, phone, plate, place), or \"\"."
    );
    let _ = writeln!(prompt, "\"action\" must be one of:");
    for action in ActionKind::ALL {
        let _ = writeln!(prompt, "- {}: {}", action.as_str(), describe(action));
    }
    let _ = writeln!(prompt, "Current app context:");
    for (key, value) in context {
        let _ = writeln!(prompt, "- {}: {}", key, value);
    }
    prompt
}

/// User turn: the transcript, bounded in length.
pub fn user_message(transcript: &str) -> String {
    transcript.chars().take(MAX_TRANSCRIPT_CHARS).collect()
}
