//! Persistent configuration.
//!
//! The configuration is a single JSON document. Every key is optional, and unknown keys are
//! ignored so documents written for other firmware revisions still load:
//!
//! ```json
//! {
//!   "ntpServer": "de.pool.ntp.org",
//!   "timezone": "CET-1CEST,M3.5.0/02,M10.5.0/03",
//!   "timeCorrectionOffset": 0,
//!   "output": { "kind": "gpio", "pin": 17, "activeLow": true },
//!   "realtime": true,
//!   "resyncIntervalSecs": 3600
//! }
//! ```

use std::fs;
use std::io;
use std::path::Path;
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::error::AppError;

/// Default NTP server.
pub const DEFAULT_NTP_SERVER: &str = "de.pool.ntp.org";
/// Central European time with EU daylight saving rules.
pub const DEFAULT_TIMEZONE: &str = "CET-1CEST,M3.5.0/02,M10.5.0/03";
/// Default path of the configuration file.
pub const DEFAULT_PATH: &str = "dcf77.json";

/// Where the pulses go.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OutputConfig {
	/// Modulate a carrier on the default audio output.
	#[default]
	Audio,
	/// Drive a sysfs GPIO pin.
	#[serde(rename_all = "camelCase")]
	Gpio {
		pin: u32,
		#[serde(default = "default_true")]
		active_low: bool
	},
	/// Only log edges.
	Log
}

/// Emulator configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// NTP server used to discipline the clock. Empty to trust the system clock.
	pub ntp_server: String,
	/// POSIX TZ string for local time.
	pub timezone: String,
	/// Whole seconds added to local time before encoding.
	pub time_correction_offset: i32,
	pub output: OutputConfig,
	/// Request real-time scheduling for the tick thread.
	pub realtime: bool,
	/// Seconds between NTP measurements.
	pub resync_interval_secs: u64
}

impl Default for Config {
	fn default() -> Self {
		Config {
			ntp_server: DEFAULT_NTP_SERVER.to_string(),
			timezone: DEFAULT_TIMEZONE.to_string(),
			time_correction_offset: 0,
			output: OutputConfig::default(),
			realtime: true,
			resync_interval_secs: 3600
		}
	}
}

fn default_true() -> bool {
	true
}

impl Config {
	/// Load the configuration at `path`, falling back to defaults if the file does not exist.
	///
	/// # Errors
	///
	/// Returns [`AppError::ConfigIo`] if the file exists but cannot be read, or
	/// [`AppError::ConfigFormat`] if it is not a valid configuration document.
	pub fn load(path: &Path) -> Result<Config, AppError> {
		let text = match fs::read_to_string(path) {
			Ok(t) => t,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				info!("no config file at {}, using defaults", path.display());
				return Ok(Config::default());
			},
			Err(source) => return Err(AppError::ConfigIo { path: path.to_path_buf(), source })
		};
		let config = serde_json::from_str(&text)
			.map_err(|source| AppError::ConfigFormat { path: path.to_path_buf(), source })?;
		info!("loaded config from {}", path.display());
		Ok(config)
	}

	/// Write the configuration to `path` as pretty-printed JSON.
	pub fn save(&self, path: &Path) -> Result<(), AppError> {
		let text = serde_json::to_string_pretty(self)
			.map_err(|source| AppError::ConfigFormat { path: path.to_path_buf(), source })?;
		fs::write(path, text + "\n")
			.map_err(|source| AppError::ConfigIo { path: path.to_path_buf(), source })?;
		info!("saved config to {}", path.display());
		Ok(())
	}

	/// Whether NTP is enabled.
	pub fn ntp_enabled(&self) -> bool {
		!self.ntp_server.trim().is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_file_test() {
		let dir = tempfile::tempdir().unwrap();
		let c = Config::load(&dir.path().join("absent.json")).unwrap();
		assert_eq!(c, Config::default());
		assert!(c.ntp_enabled());
	}

	#[test]
	fn partial_file_test() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("dcf77.json");
		fs::write(&path, r#"{
			"ntpServer": "",
			"timeCorrectionOffset": -2,
			"otaPassword": "ignored",
			"output": { "kind": "gpio", "pin": 4 }
		}"#).unwrap();

		let c = Config::load(&path).unwrap();
		assert_eq!(c.time_correction_offset, -2);
		assert!(!c.ntp_enabled());
		assert_eq!(c.timezone, DEFAULT_TIMEZONE);
		assert_eq!(c.output, OutputConfig::Gpio { pin: 4, active_low: true });
		assert!(c.realtime);
	}

	#[test]
	fn malformed_file_test() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("dcf77.json");
		fs::write(&path, "{ \"timeCorrectionOffset\": \"soon\" }").unwrap();
		assert!(matches!(Config::load(&path), Err(AppError::ConfigFormat { .. })));

		fs::write(&path, "{").unwrap();
		assert!(matches!(Config::load(&path), Err(AppError::ConfigFormat { .. })));
	}

	#[test]
	fn save_load_test() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("dcf77.json");
		let c = Config {
			ntp_server: "ptbtime1.ptb.de".to_string(),
			timezone: "UTC0".to_string(),
			time_correction_offset: 3,
			output: OutputConfig::Log,
			realtime: false,
			resync_interval_secs: 600
		};
		c.save(&path).unwrap();

		let text = fs::read_to_string(&path).unwrap();
		assert!(text.contains("\"ntpServer\": \"ptbtime1.ptb.de\""));
		assert!(text.contains("\"kind\": \"log\""));
		assert_eq!(Config::load(&path).unwrap(), c);
	}
}
