//! Platform-specific data directory paths.
//!
//!   Windows: %APPDATA%/ride-voice/data
//!   macOS:   ~/Library/Application Support/ride-voice/data
//!   Linux:   $XDG_CONFIG_HOME/ride-voice/data (default ~/.config)
//!
//! `RIDE_VOICE_DATA_DIR` overrides all of the above.

use std::ffi::OsString;
use std::path::PathBuf;

/// Environment variable that replaces the platform data directory.
pub const DATA_DIR_ENV: &str = "RIDE_VOICE_DATA_DIR";

/// Get the data directory (cross-platform).
pub fn get_data_dir() -> PathBuf {
    data_dir_from(std::env::var_os(DATA_DIR_ENV))
}

/// Directory for rolling log files.
pub fn get_log_dir() -> PathBuf {
    get_data_dir().join("logs")
}

fn data_dir_from(override_dir: Option<OsString>) -> PathBuf {
    match override_dir.filter(|dir| !dir.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ride-voice")
            .join("data"),
    }
}
