//! Configuration reading.
//!
//! `config.json` lives in the data directory. Every field has a default, so a
//! missing, partial or unreadable file still yields a usable configuration.

pub mod paths;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::{Coordinate, Counterpart};
use crate::speech::SpeechOptions;
use crate::voice::Prompts;

use paths::get_data_dir;

/// Environment variable consulted when `intent.apiKey` is not set.
pub const API_KEY_ENV: &str = "RIDE_VOICE_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub intent: IntentConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub geo: GeoConfig,
}

/// Speech parameters, fixed prompts and voice loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_one")]
    pub rate: f64,
    #[serde(default = "default_one")]
    pub pitch: f64,
    #[serde(default)]
    pub voice_hint: Option<String>,
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_fallback")]
    pub fallback_prompt: String,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    #[serde(default = "default_release_delay_ms")]
    pub release_delay_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            rate: 1.0,
            pitch: 1.0,
            voice_hint: None,
            greeting: default_greeting(),
            fallback_prompt: default_fallback(),
            heartbeat_ms: default_heartbeat_ms(),
            release_delay_ms: default_release_delay_ms(),
        }
    }
}

impl VoiceConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms.max(1))
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_delay_ms)
    }

    pub fn speech_options(&self) -> SpeechOptions {
        SpeechOptions {
            locale: self.locale.clone(),
            rate: self.rate,
            pitch: self.pitch,
            voice_hint: self.voice_hint.clone(),
        }
    }

    pub fn prompts(&self) -> Prompts {
        Prompts {
            greeting: self.greeting.clone(),
            fallback: self.fallback_prompt.clone(),
        }
    }
}

/// OpenAI-compatible chat completions endpoint used for intent extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentConfig {
    #[serde(default = "default_intent_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_intent_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_intent_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_intent_endpoint(),
            model: default_intent_model(),
            api_key: None,
            timeout_ms: default_intent_timeout_ms(),
        }
    }
}

impl IntentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Configured key, else the environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

/// Trip matching and driver movement simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_step")]
    pub step_per_tick: f64,
    #[serde(default = "default_step")]
    pub arrival_epsilon: f64,
    #[serde(default = "default_matching_delay_ms")]
    pub matching_delay_ms: u64,
    #[serde(default = "default_driver_offset")]
    pub driver_offset_lat: f64,
    #[serde(default = "default_driver_offset")]
    pub driver_offset_lng: f64,
    #[serde(default = "default_driver_name")]
    pub driver_name: String,
    #[serde(default = "default_driver_phone")]
    pub driver_phone: String,
    #[serde(default = "default_driver_plate")]
    pub driver_plate: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            step_per_tick: default_step(),
            arrival_epsilon: default_step(),
            matching_delay_ms: default_matching_delay_ms(),
            driver_offset_lat: default_driver_offset(),
            driver_offset_lng: default_driver_offset(),
            driver_name: default_driver_name(),
            driver_phone: default_driver_phone(),
            driver_plate: default_driver_plate(),
        }
    }
}

impl SimulationConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn matching_delay(&self) -> Duration {
        Duration::from_millis(self.matching_delay_ms)
    }

    pub fn driver_offset(&self) -> Coordinate {
        Coordinate::new(self.driver_offset_lat, self.driver_offset_lng)
    }

    /// The simulated driver who accepts every trip.
    pub fn driver(&self) -> Counterpart {
        Counterpart {
            name: self.driver_name.clone(),
            phone: self.driver_phone.clone(),
            plate: Some(self.driver_plate.clone()),
        }
    }
}

/// Geocoding endpoint and the starting location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoConfig {
    #[serde(default = "default_geocoder_endpoint")]
    pub geocoder_endpoint: String,
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(default = "default_home_lat")]
    pub home_lat: f64,
    #[serde(default = "default_home_lng")]
    pub home_lng: f64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            geocoder_endpoint: default_geocoder_endpoint(),
            country_code: default_country_code(),
            home_lat: default_home_lat(),
            home_lng: default_home_lng(),
        }
    }
}

impl GeoConfig {
    pub fn home(&self) -> Coordinate {
        Coordinate::new(self.home_lat, self.home_lng)
    }
}

fn default_locale() -> String {
    "es-CO".into()
}
fn default_one() -> f64 {
    1.0
}
fn default_greeting() -> String {
    "Hola, soy tu asistente de viajes. ¿Quieres viajar como pasajero o como conductor?".into()
}
fn default_fallback() -> String {
    "Lo siento, no pude entenderte. ¿Puedes repetirlo?".into()
}
fn default_heartbeat_ms() -> u64 {
    2_000
}
fn default_release_delay_ms() -> u64 {
    200
}
fn default_intent_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".into()
}
fn default_intent_model() -> String {
    "gpt-4o-mini".into()
}
fn default_intent_timeout_ms() -> u64 {
    8_000
}
fn default_tick_ms() -> u64 {
    1_000
}
fn default_step() -> f64 {
    0.0005
}
fn default_matching_delay_ms() -> u64 {
    4_000
}
fn default_driver_offset() -> f64 {
    0.005
}
fn default_driver_name() -> String {
    "Carlos Rodríguez".into()
}
fn default_driver_phone() -> String {
    "3001234567".into()
}
fn default_driver_plate() -> String {
    "KXT482".into()
}
fn default_geocoder_endpoint() -> String {
    "https://nominatim.openstreetmap.org".into()
}
fn default_country_code() -> String {
    "co".into()
}
fn default_home_lat() -> f64 {
    4.60
}
fn default_home_lng() -> f64 {
    -74.08
}

/// Read config.json from the data directory.
pub fn read_app_config() -> AppConfig {
    read_app_config_from(&get_config_path())
}

/// Read a config file, falling back to defaults.
pub fn read_app_config_from(path: &Path) -> AppConfig {
    read_json_file(path).unwrap_or_default()
}

/// Path to config.json.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
