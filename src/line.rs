//! Concrete output lines.
//!
//! - [`AudioLine`] radiates the signal as stray RF from the audio hardware, by playing a
//!   sub-harmonic of the 77.5 kHz DCF77 carrier and reducing its amplitude during pulses.
//! - [`GpioLine`] drives a Linux sysfs GPIO pin, e.g. to key a small transmitter.
//! - [`LogLine`] only logs edges.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use dcf77::OutputLine;
use tracing::{debug, error};
use crate::error::AppError;

/// Audio sample rate.
const SAMPLE_RATE: u32 = 48000;
/// Fifth sub-harmonic of the 77.5 kHz carrier.
const CARRIER_HZ: u32 = 77500 / 5;
/// Carrier amplitude while a pulse is asserted.
const REDUCED_AMPLITUDE: f32 = 0.15;
/// Root of the sysfs GPIO interface.
const GPIO_ROOT: &str = "/sys/class/gpio";

/// Fill `data` with the carrier, reduced if `asserted`, advancing the sample position `pos`.
fn write_carrier(asserted: bool, pos: &mut u32, data: &mut [f32]) {
	let power = if asserted { REDUCED_AMPLITUDE } else { 1.0 };
	for sample in data.iter_mut() {
		// The carrier is a whole number of cycles per second, so wrapping each second is seamless
		let cycle = (*pos as u64 * CARRIER_HZ as u64 % SAMPLE_RATE as u64) as f32 / SAMPLE_RATE as f32;
		*sample = power * (std::f32::consts::TAU * cycle).sin();
		*pos = (*pos + 1) % SAMPLE_RATE;
	}
}

/// Error handler for audio streaming.
fn audio_error(error: cpal::StreamError) {
	error!("error occurred on the audio stream: {}", error);
}

/// Playing audio stream backing an [`AudioLine`].
///
/// The stream stops when this is dropped. It must stay on the thread that created it.
pub struct AudioOutput {
	_stream: cpal::Stream
}

impl AudioOutput {
	/// Start the carrier on the default output device at 48 kHz, mono.
	///
	/// # Errors
	///
	/// Returns [`AppError::NoAudioDevice`] without an output device, or
	/// [`AppError::BuildStream`] / [`AppError::PlayStream`] if the stream cannot be started.
	pub fn open() -> Result<(AudioOutput, AudioLine), AppError> {
		let host = cpal::default_host();
		let device = host.default_output_device().ok_or(AppError::NoAudioDevice)?;
		let config = cpal::StreamConfig {
			channels: 1,
			sample_rate: cpal::SampleRate(SAMPLE_RATE),
			buffer_size: cpal::BufferSize::Fixed(1024),
		};

		let level = Arc::new(AtomicBool::new(false));
		let asserted = level.clone();
		let mut pos = 0;
		let stream = device.build_output_stream(
			&config,
			move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
				write_carrier(asserted.load(Ordering::Relaxed), &mut pos, data);
			},
			audio_error,
			None)?;
		stream.play()?;
		debug!(device = ?device.name().ok(), "audio carrier started");

		Ok((AudioOutput { _stream: stream }, AudioLine { level }))
	}
}

/// [`OutputLine`] switching the amplitude of an [`AudioOutput`] carrier.
///
/// Amplitude changes take effect at the next audio buffer (about 21 ms at 1024 samples), which
/// shifts every edge by the same amount.
#[derive(Clone)]
pub struct AudioLine {
	level: Arc<AtomicBool>
}

impl OutputLine for AudioLine {
	fn set(&mut self, asserted: bool) {
		self.level.store(asserted, Ordering::Relaxed);
	}
}

/// [`OutputLine`] driving a sysfs GPIO pin.
pub struct GpioLine {
	pin: u32,
	active_low: bool,
	value: File,
	/// Last level written, to skip redundant writes
	level: Option<bool>
}

impl GpioLine {
	/// Export `pin` and configure it as an output at its idle level.
	///
	/// With `active_low`, a pulse pulls the pin to 0.
	///
	/// # Errors
	///
	/// Returns [`AppError::Gpio`] if the pin cannot be exported or configured.
	pub fn open(pin: u32, active_low: bool) -> Result<GpioLine, AppError> {
		Self::open_at(Path::new(GPIO_ROOT), pin, active_low)
	}

	fn open_at(root: &Path, pin: u32, active_low: bool) -> Result<GpioLine, AppError> {
		let gpio_err = |source| AppError::Gpio { pin, source };
		let dir = root.join(format!("gpio{}", pin));
		if !dir.exists() {
			fs::write(root.join("export"), pin.to_string()).map_err(gpio_err)?;
		}
		// udev may need a moment to fix permissions on a freshly exported pin
		let direction = dir.join("direction");
		let idle = if active_low { "high" } else { "low" };
		retry(|| fs::write(&direction, idle)).map_err(gpio_err)?;
		let value = OpenOptions::new().write(true).open(dir.join("value")).map_err(gpio_err)?;

		debug!(pin, active_low, "GPIO configured");
		let mut line = GpioLine { pin, active_low, value, level: None };
		line.set(false);
		Ok(line)
	}
}

/// Run `f` up to five times, 100 ms apart, until it succeeds.
fn retry<F: FnMut() -> io::Result<()>>(mut f: F) -> io::Result<()> {
	let mut result = f();
	for _ in 1..5 {
		match result {
			Err(ref e) if e.kind() == io::ErrorKind::PermissionDenied => {
				thread::sleep(Duration::from_millis(100));
				result = f();
			},
			_ => break
		}
	}
	result
}

impl OutputLine for GpioLine {
	fn set(&mut self, asserted: bool) {
		if self.level == Some(asserted) {
			return;
		}
		let high = asserted != self.active_low;
		match self.value.write_all_at(if high { b"1" } else { b"0" }, 0) {
			Ok(()) => self.level = Some(asserted),
			Err(e) => error!(pin = self.pin, "failed to write GPIO value: {}", e)
		}
	}
}

impl Drop for GpioLine {
	fn drop(&mut self) {
		self.set(false);
	}
}

/// [`OutputLine`] that only logs edges at `debug` level.
#[derive(Default)]
pub struct LogLine {
	level: bool
}

impl OutputLine for LogLine {
	fn set(&mut self, asserted: bool) {
		if self.level != asserted {
			debug!(asserted, "line edge");
			self.level = asserted;
		}
	}
}

/// The output line selected at startup.
pub enum Line {
	Audio(AudioLine),
	Gpio(GpioLine),
	Log(LogLine)
}

impl OutputLine for Line {
	fn set(&mut self, asserted: bool) {
		match self {
			Line::Audio(l) => l.set(asserted),
			Line::Gpio(l) => l.set(asserted),
			Line::Log(l) => l.set(asserted)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn peak(data: &[f32]) -> f32 {
		data.iter().fold(0f32, |m, v| m.max(v.abs()))
	}

	#[test]
	fn carrier_test() {
		let mut pos = 0;
		let mut data = vec![0f32; SAMPLE_RATE as usize];
		write_carrier(false, &mut pos, &mut data);
		assert_eq!(pos, 0);
		assert!(peak(&data) > 0.999);

		write_carrier(true, &mut pos, &mut data[..1024]);
		assert_eq!(pos, 1024);
		let p = peak(&data[..1024]);
		assert!(p <= REDUCED_AMPLITUDE + 1e-6 && p > 0.14, "{}", p);
	}

	#[test]
	fn audio_line_test() {
		let mut line = AudioLine { level: Arc::new(AtomicBool::new(false)) };
		let shared = line.level.clone();
		line.set(true);
		assert!(shared.load(Ordering::Relaxed));
		line.set(false);
		assert!(!shared.load(Ordering::Relaxed));
	}

	fn fake_sysfs(pin: u32) -> tempfile::TempDir {
		let root = tempfile::tempdir().unwrap();
		let dir = root.path().join(format!("gpio{}", pin));
		fs::create_dir(&dir).unwrap();
		fs::write(dir.join("value"), "").unwrap();
		root
	}

	fn value(root: &Path, pin: u32) -> String {
		fs::read_to_string(root.join(format!("gpio{}", pin)).join("value")).unwrap()
	}

	#[test]
	fn gpio_active_low_test() {
		let root = fake_sysfs(17);
		let mut line = GpioLine::open_at(root.path(), 17, true).unwrap();
		let dir = root.path().join("gpio17");
		assert_eq!(fs::read_to_string(dir.join("direction")).unwrap(), "high");
		assert_eq!(value(root.path(), 17), "1");
		// Already exported
		assert!(!root.path().join("export").exists());

		line.set(true);
		assert_eq!(value(root.path(), 17), "0");
		line.set(false);
		assert_eq!(value(root.path(), 17), "1");
		line.set(true);
		drop(line);
		assert_eq!(value(root.path(), 17), "1");
	}

	#[test]
	fn gpio_active_high_test() {
		let root = fake_sysfs(4);
		let mut line = GpioLine::open_at(root.path(), 4, false).unwrap();
		assert_eq!(value(root.path(), 4), "0");
		line.set(true);
		assert_eq!(value(root.path(), 4), "1");
	}

	#[test]
	fn gpio_export_test() {
		let root = tempfile::tempdir().unwrap();
		// Nothing creates gpio5 here, so configuring it fails after exporting
		let err = GpioLine::open_at(root.path(), 5, true).err().unwrap();
		assert!(matches!(err, AppError::Gpio { pin: 5, .. }));
		assert_eq!(fs::read_to_string(root.path().join("export")).unwrap(), "5");
	}

	#[test]
	fn line_dispatch_test() {
		let mut line = Line::Log(LogLine::default());
		line.set(true);
		line.set(true);
		let Line::Log(l) = &line else { unreachable!() };
		assert!(l.level);
	}
}
