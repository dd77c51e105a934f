//! Voice session: phases and the controller that owns them.

pub mod controller;
pub mod phase;

pub use controller::{Prompts, VoiceController, VoiceEffect};
pub use phase::{DisableReason, VoicePhase};
