//! Emulate a DCF77 time signal transmitter.
//!
//! This application encodes local time as DCF77 minute frames and plays them out in real time on
//! an output line: the default audio device (whose stray RF emissions reach nearby radio clocks,
//! as with a small loop antenna), a sysfs GPIO pin keying a transmitter, or just the log.
//!
//! About once a minute, the emulator reads the (optionally NTP-disciplined) clock, encodes the
//! current minute and the next two, and starts transmitting at second 58 so the first frame begins
//! exactly on the minute boundary. A full transmission takes a little over three minutes.
//!
//! # Command Line Arguments
//!
//! General form: `dcf77-emulator [options...]`
//!
//! | Short form | Long form         | Argument             | Default                   | Description                              |
//! | ---------- | ----------------- | -------------------- | ------------------------- | ---------------------------------------- |
//! | `-c`       | `--config`        | Path                 | `dcf77.json`              | JSON configuration file                  |
//! | `-z`       | `--timezone`      | [TZ string]          | Central European Time     | Local timezone and DST rules             |
//! |            | `--ntp`           | Hostname or IP       | `de.pool.ntp.org`         | NTP server; `""` trusts the system clock |
//! |            | `--offset`        | Integer              | 0                         | Seconds added to local time              |
//! |            | `--output`        | `audio`/`gpio`/`log` | `audio`                   | Output line                              |
//! |            | `--gpio-pin`      | Integer              | None                      | GPIO pin for `--output gpio`             |
//! |            | `--active-low`    |                      | Set                       | Pull the GPIO pin low for a pulse        |
//! |            | `--active-high`   |                      |                           | Drive the GPIO pin high for a pulse      |
//! | `-n`       | `--cycles`        | Integer > 0          | Run forever               | Stop after this many transmissions       |
//! |            | `--no-realtime`   |                      |                           | Keep the tick thread at normal priority  |
//! |            | `--save-config`   |                      |                           | Write the merged configuration back      |
//!
//! Command line values override the configuration file, see [`config`]. Log verbosity follows
//! `RUST_LOG` (default `info`; `debug` shows every encoded frame).
//!
//! [TZ string]: https://www.gnu.org/software/libc/manual/html_node/TZ-Variable.html
//!
//! # Examples
//!
//! Transmit over the audio output using defaults
//! ```sh
//! dcf77-emulator
//! ```
//!
//! Key a transmitter on GPIO 17 for two transmissions, trusting the system clock
//! ```sh
//! dcf77-emulator --output gpio --gpio-pin 17 --ntp "" -n 2
//! ```

use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use clap::Parser;
use dcf77::{Coordinator, ThreadDelay, Ticker, TickerConfig, TransmissionEngine};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use args::Arguments;
use clock::SystemClock;
use config::{Config, OutputConfig};
use error::AppError;
use line::{AudioOutput, GpioLine, Line, LogLine};

mod args;
mod clock;
mod config;
mod error;
mod line;
mod poll;

/// Load configuration, set up the line and tick thread, and run the polling loop.
///
/// # Errors
///
/// Returns [`AppError`] if the configuration cannot be loaded, merged or saved, or if the output
/// line or tick thread cannot be set up. Once transmitting, failures are logged and retried.
fn run(args: Arguments) -> Result<(), AppError> {
	let mut config = Config::load(&args.config)?;
	args.apply(&mut config)?;
	if args.save_config {
		config.save(&args.config)?;
	}

	// Before any other thread exists
	clock::set_timezone(&config.timezone)?;
	info!(
		timezone = %config.timezone,
		ntp = %config.ntp_server,
		offset = config.time_correction_offset,
		output = ?config.output,
		"configuration"
	);

	// The audio stream must outlive the engine driving it
	let mut _audio = None;
	let line = match config.output {
		OutputConfig::Audio => {
			let (output, line) = AudioOutput::open()?;
			_audio = Some(output);
			Line::Audio(line)
		},
		OutputConfig::Gpio { pin, active_low } => Line::Gpio(GpioLine::open(pin, active_low)?),
		OutputConfig::Log => Line::Log(LogLine::default())
	};

	let engine = Arc::new(Mutex::new(TransmissionEngine::new(line)));
	let ticker = Ticker::drive(engine.clone(), TickerConfig {
		realtime: config.realtime,
		..Default::default()
	})?;

	let ntp = config.ntp_enabled().then(|| config.ntp_server.trim().to_string());
	let mut clock = SystemClock::new(ntp, Duration::from_secs(config.resync_interval_secs));
	clock.sync();

	let correction = config.time_correction_offset as i64;
	let mut coordinator = Coordinator::new(clock, ThreadDelay, engine, correction);
	poll::run(&mut coordinator, &mut ThreadDelay, args.cycles, |clock| {
		clock.sync_if_due();
	});

	ticker.stop();
	Ok(())
}

fn main() -> ExitCode {
	// Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug)
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	let args = Arguments::parse();
	match run(args) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("{}", e);
			ExitCode::FAILURE
		}
	}
}
