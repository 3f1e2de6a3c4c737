//! Support for command line argument parsing.
//!
//! See [crate] documentation for details on command line arguments and examples.

use std::num::NonZero;
use std::path::PathBuf;
use clap::{Parser, ValueEnum};
use crate::config::{self, Config, OutputConfig};

/// Output line kinds selectable on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputKind {
	/// Modulate a carrier on the default audio output
	Audio,
	/// Drive a sysfs GPIO pin (requires --gpio-pin)
	Gpio,
	/// Only log line edges
	Log
}

/// DCF77 transmitter emulator.
///
/// Every value given here overrides the configuration file.
#[derive(Debug, Parser)]
#[command(name = "dcf77-emulator", version, long_about = None)]
pub struct Arguments {
	/// Path to the JSON configuration file.
	#[arg(short = 'c', long = "config", default_value = config::DEFAULT_PATH)]
	pub config: PathBuf,

	/// POSIX TZ string for local time, e.g. "CET-1CEST,M3.5.0/02,M10.5.0/03".
	#[arg(short = 'z', long = "timezone")]
	pub timezone: Option<String>,

	/// NTP server, or "" to use the system clock as-is.
	#[arg(long = "ntp")]
	pub ntp: Option<String>,

	/// Whole seconds added to local time before encoding.
	#[arg(long = "offset", allow_negative_numbers = true)]
	pub offset: Option<i32>,

	/// Output line.
	#[arg(long = "output", value_enum)]
	pub output: Option<OutputKind>,

	/// GPIO pin number for --output gpio.
	#[arg(long = "gpio-pin")]
	pub gpio_pin: Option<u32>,

	/// Assert the GPIO pin by driving it high instead of low.
	#[arg(long = "active-high", conflicts_with = "active_low")]
	pub active_high: bool,

	/// Assert the GPIO pin by driving it low.
	#[arg(long = "active-low")]
	pub active_low: bool,

	/// Stop after this many transmissions.
	#[arg(short = 'n', long = "cycles")]
	pub cycles: Option<NonZero<usize>>,

	/// Do not request real-time scheduling for the tick thread.
	#[arg(long = "no-realtime")]
	pub no_realtime: bool,

	/// Write the merged configuration back to the configuration file.
	#[arg(long = "save-config")]
	pub save_config: bool
}

/// The error type for merging arguments into a configuration.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentsError {
	#[error("--output gpio requires --gpio-pin, or a GPIO output in the config file")]
	MissingGpioPin
}

impl Arguments {
	/// Apply the command line overrides to `config`.
	///
	/// # Errors
	///
	/// Returns [`ArgumentsError::MissingGpioPin`] if GPIO output is selected without a pin.
	pub fn apply(&self, config: &mut Config) -> Result<(), ArgumentsError> {
		if let Some(tz) = &self.timezone {
			config.timezone = tz.clone();
		}
		if let Some(ntp) = &self.ntp {
			config.ntp_server = ntp.clone();
		}
		if let Some(offset) = self.offset {
			config.time_correction_offset = offset;
		}
		if self.no_realtime {
			config.realtime = false;
		}

		let (pin, active_low) = match config.output {
			OutputConfig::Gpio { pin, active_low } => (Some(pin), active_low),
			_ => (None, true)
		};
		let pin = self.gpio_pin.or(pin);
		let active_low = if self.active_high {
			false
		} else {
			self.active_low || active_low
		};

		match self.output {
			Some(OutputKind::Audio) => config.output = OutputConfig::Audio,
			Some(OutputKind::Log) => config.output = OutputConfig::Log,
			Some(OutputKind::Gpio) => {
				let pin = pin.ok_or(ArgumentsError::MissingGpioPin)?;
				config.output = OutputConfig::Gpio { pin, active_low };
			},
			None => if let OutputConfig::Gpio { .. } = config.output {
				// Pin and polarity can be overridden without repeating --output
				if let Some(pin) = pin {
					config.output = OutputConfig::Gpio { pin, active_low };
				}
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(args: &[&str]) -> Arguments {
		Arguments::try_parse_from(std::iter::once("dcf77-emulator").chain(args.iter().copied())).unwrap()
	}

	#[test]
	fn defaults_test() {
		let a = parse(&[]);
		assert_eq!(a.config, PathBuf::from("dcf77.json"));
		assert!(a.cycles.is_none());

		let mut c = Config::default();
		a.apply(&mut c).unwrap();
		assert_eq!(c, Config::default());
	}

	#[test]
	fn override_test() {
		let a = parse(&[
			"-c", "/etc/dcf77.json", "-z", "UTC0", "--ntp", "", "--offset", "-3",
			"--output", "log", "-n", "2", "--no-realtime", "--save-config"
		]);
		assert_eq!(a.config, PathBuf::from("/etc/dcf77.json"));
		assert_eq!(a.cycles, NonZero::new(2));
		assert!(a.save_config);

		let mut c = Config::default();
		a.apply(&mut c).unwrap();
		assert_eq!(c.timezone, "UTC0");
		assert!(!c.ntp_enabled());
		assert_eq!(c.time_correction_offset, -3);
		assert_eq!(c.output, OutputConfig::Log);
		assert!(!c.realtime);
	}

	#[test]
	fn gpio_test() {
		let mut c = Config::default();
		assert_eq!(parse(&["--output", "gpio"]).apply(&mut c), Err(ArgumentsError::MissingGpioPin));

		parse(&["--output", "gpio", "--gpio-pin", "17"]).apply(&mut c).unwrap();
		assert_eq!(c.output, OutputConfig::Gpio { pin: 17, active_low: true });

		// Config file pin is kept, polarity overridden
		parse(&["--active-high"]).apply(&mut c).unwrap();
		assert_eq!(c.output, OutputConfig::Gpio { pin: 17, active_low: false });
		parse(&["--gpio-pin", "4", "--active-low"]).apply(&mut c).unwrap();
		assert_eq!(c.output, OutputConfig::Gpio { pin: 4, active_low: true });

		assert!(Arguments::try_parse_from(["x", "--active-high", "--active-low"]).is_err());
		assert!(Arguments::try_parse_from(["x", "--output", "radio"]).is_err());
		assert!(Arguments::try_parse_from(["x", "-n", "0"]).is_err());
	}
}
