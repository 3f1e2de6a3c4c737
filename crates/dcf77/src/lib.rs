//! Emulate a DCF77 transmitter on a single digital output line.
//!
//! This crate packs local calendar time into [DCF77] minute frames and plays them out in real time
//! as a train of 100 ms / 200 ms pulses, which radio-controlled clocks placed near the line (or an
//! antenna driven by it) decode as if they were listening to the Mainflingen transmitter.
//!
//! The crate is split the same way the signal flows:
//! - [`encoder`] turns a [`CalendarSample`] into a [`Frame`] of 60 [`PulseSymbol`]s.
//! - [`buffer`] holds three consecutive frames plus guard pulses in a [`TransmissionBuffer`].
//! - [`engine`] is the 100 ms tick state machine ([`TransmissionEngine`]) that drives the line.
//! - [`ticker`] runs the engine at a fixed rate on its own thread.
//! - [`coordinator`] fetches the time, seals the buffer and aligns the start to the minute.
//!
//! Collaborators are expressed as traits: [`TimeSource`] supplies local calendar time,
//! [`OutputLine`] toggles the physical line, and [`Delay`] performs the coordinator's coarse waits.
//!
//! [DCF77]: https://en.wikipedia.org/wiki/DCF77
//!
//! # Examples
//!
//! ```
//! # use std::sync::{Arc, Mutex};
//! # use dcf77::{CalendarSample, OutputLine, TransmissionEngine, encoder};
//! struct Pin(bool);
//! impl OutputLine for Pin {
//! 	fn set(&mut self, asserted: bool) { self.0 = asserted }
//! }
//!
//! // Sunday, October 18, 2026. 14:07:12 CEST.
//! let now = CalendarSample {
//! 	second: 12, minute: 7, hour: 14, day: 18, weekday: 0, month: 10, year: 2026, dst: true
//! };
//! let frames = encoder::encode_window(&now);
//!
//! let engine = Arc::new(Mutex::new(TransmissionEngine::new(Pin(false))));
//! let mut e = engine.lock().unwrap();
//! e.seal(&frames).unwrap();
//! e.start().unwrap();
//! assert!(e.is_active());
//! ```

use std::thread;
use std::time::Duration;

pub mod symbol;
pub mod calendar;
pub mod encoder;
pub mod buffer;
pub mod engine;
pub mod ticker;
pub mod coordinator;
pub mod error;

pub use symbol::{Frame, PulseSymbol, FRAME_LEN};
pub use calendar::CalendarSample;
pub use buffer::TransmissionBuffer;
pub use engine::{SharedEngine, Tick, TransmissionEngine};
pub use ticker::{Ticker, TickerConfig};
pub use coordinator::{Coordinator, CycleOutcome};
pub use error::{CoordinatorError, DecodeError, EngineError, TickerError, TimeSourceError};

/// Source of the current local calendar time.
///
/// Implementations are expected to return time already adjusted for the local timezone and
/// daylight saving time. The [`Coordinator`] only applies its configured whole-second correction
/// on top.
pub trait TimeSource {
	/// Get the current local calendar time.
	///
	/// # Errors
	///
	/// Returns [`TimeSourceError`] if no trustworthy time is available.
	fn now(&mut self) -> Result<CalendarSample, TimeSourceError>;
}

/// A single digital output line.
///
/// "Asserted" marks a pulse (reduced carrier, or a pulled-low pin on the original hardware), and
/// "deasserted" is the idle level. Implementations must tolerate repeated writes of the same level
/// and must be cheap enough to call from the 100 ms tick thread.
pub trait OutputLine: Send {
	/// Drive the line to the pulse level (`true`) or idle level (`false`).
	fn set(&mut self, asserted: bool);
}

/// Coarse waits used by the [`Coordinator`] for minute alignment and transmission completion.
pub trait Delay {
	/// Pause the calling thread for `duration`.
	fn delay(&mut self, duration: Duration);
}

/// [`Delay`] that blocks the current thread with [`thread::sleep`].
///
/// The pulse timing never depends on this wait, since the [`Ticker`] runs on its own thread.
#[derive(Default, Clone, Copy, Debug)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
	fn delay(&mut self, duration: Duration) {
		thread::sleep(duration);
	}
}

#[cfg(test)]
pub(crate) mod testing {
	use std::time::Duration;
	use super::*;

	/// Output line that records every write.
	#[derive(Default)]
	pub struct RecordingLine {
		/// Current level.
		pub level: bool,
		/// Every level written, in order.
		pub writes: Vec<bool>
	}

	impl OutputLine for RecordingLine {
		fn set(&mut self, asserted: bool) {
			self.level = asserted;
			self.writes.push(asserted);
		}
	}

	/// Delay that returns immediately and remembers what was requested.
	#[derive(Default)]
	pub struct RecordingDelay(pub Vec<Duration>);

	impl Delay for RecordingDelay {
		fn delay(&mut self, duration: Duration) {
			self.0.push(duration);
		}
	}

	/// Time source that always answers with the same sample.
	pub struct FixedSource(pub CalendarSample);

	impl TimeSource for FixedSource {
		fn now(&mut self) -> Result<CalendarSample, TimeSourceError> {
			Ok(self.0)
		}
	}

	/// Sunday, October 18, 2026. 14:07:`second` CEST.
	pub fn sample(second: u8) -> CalendarSample {
		CalendarSample {
			second,
			minute: 7,
			hour: 14,
			day: 18,
			weekday: 0,
			month: 10,
			year: 2026,
			dst: true
		}
	}
}
