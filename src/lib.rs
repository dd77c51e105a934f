//! Ride Voice: hands-free voice control loop for a ride-hailing demo.
//!
//! The binary talks to a host UI over JSON lines on stdin/stdout. The host
//! owns the microphone and the speaker; this crate owns the voice loop state
//! machine, intent interpretation, the action dispatch table, the trip state
//! and the driver position simulation.

pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod geo;
pub mod intent;
pub mod ipc;
pub mod logging;
pub mod runtime;
pub mod simulation;
pub mod speech;
pub mod voice;
