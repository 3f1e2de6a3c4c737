//! Error types used across modules.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The error type for setting up and running the emulator.
#[derive(Error, Debug)]
pub enum AppError {
	/// Reading or writing the configuration file failed.
	#[error("config file {path}: {source}")]
	ConfigIo {
		path: PathBuf,
		#[source]
		source: io::Error
	},
	/// The configuration file is not valid JSON for [`Config`](crate::config::Config).
	#[error("config file {path}: {source}")]
	ConfigFormat {
		path: PathBuf,
		#[source]
		source: serde_json::Error
	},
	#[error(transparent)]
	Arguments(#[from] crate::args::ArgumentsError),
	/// The timezone string cannot be handed to the C library.
	#[error("invalid timezone {0:?}")]
	Timezone(String),
	/// No audio output device is available.
	#[error("no default audio output device")]
	NoAudioDevice,
	#[error("failed to build audio stream: {0}")]
	BuildStream(#[from] cpal::BuildStreamError),
	#[error("failed to play audio stream: {0}")]
	PlayStream(#[from] cpal::PlayStreamError),
	/// Setting up or driving a sysfs GPIO line failed.
	#[error("GPIO {pin}: {source}")]
	Gpio {
		pin: u32,
		#[source]
		source: io::Error
	},
	#[error(transparent)]
	Ticker(#[from] dcf77::TickerError)
}
