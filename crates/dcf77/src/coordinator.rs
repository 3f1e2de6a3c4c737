//! One transmission cycle, from reading the clock to the end of the third frame.
//!
//! A cycle runs as follows:
//! 1. Read local time and apply the whole-second correction offset.
//! 2. If the (corrected) second is past [`LATEST_START_SECOND`], give up and ask the caller to
//!    come back [`DEFER`] later. Nothing is written.
//! 3. Encode frames for this minute and the next two, and seal them into the engine.
//! 4. Wait until second [`START_SECOND`], then start the engine. The head guard pulse plays at
//!    second 58, the gap at 59, and frame 0 begins exactly on the minute boundary.
//! 5. Wait [`COMPLETION_WAIT`], then keep waiting in [`SETTLE_STEP`]s until the engine has
//!    finished the tail guard. The three frames end 182 s after the start, so the cycle returns
//!    just past second 0 with the engine idle and ready for the next seal.
//!
//! The waits go through a [`Delay`] and never affect pulse timing, which is owned entirely by the
//! [`Ticker`](crate::Ticker) thread.

use std::time::Duration;
use tracing::{debug, info, warn};
use crate::buffer::BUFFER_LEN;
use crate::engine;
use crate::{encoder, CalendarSample, CoordinatorError, Delay, OutputLine, SharedEngine, TimeSource};

/// Latest second of the minute at which a cycle may still start.
pub const LATEST_START_SECOND: u8 = 56;
/// Second of the minute at which the engine is started.
pub const START_SECOND: u8 = 58;
/// How much later the caller should retry after a late start.
pub const DEFER: Duration = Duration::from_secs(30);
/// Time allowed for a transmission to complete after starting.
pub const COMPLETION_WAIT: Duration = Duration::from_secs(150);
/// Poll interval while waiting for the engine to go idle after [`COMPLETION_WAIT`].
pub const SETTLE_STEP: Duration = Duration::from_secs(1);
/// Give up waiting for the engine after this many [`SETTLE_STEP`]s (a whole transmission).
const MAX_SETTLE_STEPS: usize = BUFFER_LEN;

/// Outcome of a successful [`Coordinator::run_cycle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
	/// Too late in the minute; retry after the given extra delay.
	Deferred(Duration),
	/// Three frames were transmitted, the first encoding `first`.
	Transmitted {
		/// Corrected time the cycle started at
		first: CalendarSample
	}
}

/// Runs transmission cycles against a shared engine.
pub struct Coordinator<T, D, L> {
	source: T,
	delay: D,
	engine: SharedEngine<L>,
	/// Whole seconds added to every time reading
	correction: i64
}

impl<T, D, L> Coordinator<T, D, L>
where
	T: TimeSource,
	D: Delay,
	L: OutputLine
{
	/// Create a coordinator reading time from `source` and waiting with `delay`.
	pub fn new(source: T, delay: D, engine: SharedEngine<L>, correction: i64) -> Self {
		Coordinator { source, delay, engine, correction }
	}

	/// Run one cycle, blocking until the transmission has completed or the cycle is deferred.
	///
	/// # Errors
	///
	/// - [`CoordinatorError::Time`] if the time source fails. Nothing is written.
	/// - [`CoordinatorError::Engine`] if the engine is still transmitting from a previous cycle.
	pub fn run_cycle(&mut self) -> Result<CycleOutcome, CoordinatorError> {
		let now = self.source.now()?.add_seconds(self.correction);
		if now.second > LATEST_START_SECOND {
			warn!(second = now.second, "too late in the minute, deferring");
			return Ok(CycleOutcome::Deferred(DEFER));
		}

		let frames = encoder::encode_window(&now);
		for (n, frame) in frames.iter().enumerate() {
			debug!(frame = n, "{}", frame);
		}
		engine::lock(&self.engine).seal(&frames)?;

		let skip = START_SECOND - now.second;
		debug!(second = now.second, skip, "waiting for minute alignment");
		self.delay.delay(Duration::from_secs(skip as u64));

		engine::lock(&self.engine).start()?;
		info!(
			"transmitting {:04}-{:02}-{:02} {:02}:{:02} and the following 2 minutes, dst={}",
			now.year, now.month, now.day, now.hour, now.minute, now.dst
		);
		self.delay.delay(COMPLETION_WAIT);
		self.settle();

		Ok(CycleOutcome::Transmitted { first: now })
	}

	/// Wait until the engine is idle, or warn if the tick thread does not get it there.
	fn settle(&mut self) {
		for _ in 0..MAX_SETTLE_STEPS {
			if !engine::lock(&self.engine).is_active() {
				return;
			}
			self.delay.delay(SETTLE_STEP);
		}
		let e = engine::lock(&self.engine);
		if e.is_active() {
			warn!(slot = e.slot_index(), "transmission did not complete, is the tick thread running?");
		}
	}

	/// The time source, e.g. to resynchronise it between cycles.
	pub fn time_source_mut(&mut self) -> &mut T {
		&mut self.source
	}

	/// The shared engine.
	pub fn engine(&self) -> &SharedEngine<L> {
		&self.engine
	}

	/// The configured correction offset in seconds.
	pub fn correction(&self) -> i64 {
		self.correction
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::Cell;
	use std::rc::Rc;
	use std::sync::{Arc, Mutex};
	use crate::engine::{TICKS_PER_SLOT, TICK_PERIOD};
	use crate::testing::{sample, FixedSource, RecordingDelay, RecordingLine};
	use crate::{EngineError, Frame, TimeSourceError, TransmissionEngine};

	type TestCoordinator = Coordinator<FixedSource, RecordingDelay, RecordingLine>;

	fn coordinator(t: CalendarSample, correction: i64) -> TestCoordinator {
		let engine = Arc::new(Mutex::new(TransmissionEngine::new(RecordingLine::default())));
		Coordinator::new(FixedSource(t), RecordingDelay::default(), engine, correction)
	}

	#[test]
	fn proceed_test() {
		let mut c = coordinator(sample(56), 0);
		assert_eq!(c.run_cycle(), Ok(CycleOutcome::Transmitted { first: sample(56) }));
		assert_eq!(c.delay.0[..2], [Duration::from_secs(2), COMPLETION_WAIT]);
		// Nothing ticks the engine, so settling gives up after a whole transmission
		assert_eq!(c.delay.0.len(), 2 + MAX_SETTLE_STEPS);
		assert!(c.delay.0[2..].iter().all(|d| *d == SETTLE_STEP));

		let e = engine::lock(c.engine());
		assert!(e.is_active());
		assert_eq!((e.slot_index(), e.sub_tick()), (0, 0));
		let minutes: Vec<u8> = (0..3).map(|n| e.buffer().frame(n).decode().unwrap().minute).collect();
		assert_eq!(minutes, vec![7, 8, 9]);
		assert!(e.buffer().frame(0).decode().unwrap().dst);
	}

	#[test]
	fn skip_seconds_test() {
		let mut c = coordinator(sample(0), 0);
		c.run_cycle().unwrap();
		assert_eq!(c.delay.0[0], Duration::from_secs(58));
	}

	#[test]
	fn defer_test() {
		for second in [57, 58, 59] {
			let mut c = coordinator(sample(second), 0);
			assert_eq!(c.run_cycle(), Ok(CycleOutcome::Deferred(DEFER)));
			assert!(c.delay.0.is_empty());

			let e = engine::lock(c.engine());
			assert!(!e.is_active());
			assert_eq!(e.buffer().frame(0), Frame::default());
			assert_eq!(e.line().writes, vec![false]);
		}
	}

	#[test]
	fn correction_test() {
		// 14:07:50 + 10 s lands on 14:08:00
		let mut c = coordinator(sample(50), 10);
		assert_eq!(c.correction(), 10);
		let first = sample(0).next_minute();
		assert_eq!(c.run_cycle(), Ok(CycleOutcome::Transmitted { first }));
		assert_eq!(c.delay.0[0], Duration::from_secs(58));
		assert_eq!(engine::lock(c.engine()).buffer().frame(0).decode().unwrap().minute, 8);

		// 14:07:02 - 5 s lands on 14:06:57, which is too late
		let mut c = coordinator(sample(2), -5);
		assert_eq!(c.run_cycle(), Ok(CycleOutcome::Deferred(DEFER)));

		// 14:07:59 - 3 s is just in time
		let mut c = coordinator(sample(59), -3);
		c.run_cycle().unwrap();
		assert_eq!(c.delay.0[0], Duration::from_secs(2));
	}

	#[test]
	fn busy_test() {
		let mut c = coordinator(sample(10), 0);
		c.run_cycle().unwrap();
		let before = engine::lock(c.engine()).buffer().frame(0);

		// The engine was never ticked, so it is still transmitting the first cycle
		c.time_source_mut().0 = sample(10).next_minute();
		assert_eq!(c.run_cycle(), Err(CoordinatorError::Engine(EngineError::Busy)));
		assert_eq!(c.delay.0.len(), 2 + MAX_SETTLE_STEPS);
		assert_eq!(engine::lock(c.engine()).buffer().frame(0), before);
	}

	/// Virtual wall clock counting engine ticks since `start`.
	struct VirtualClock {
		start: CalendarSample,
		ticks: Rc<Cell<u64>>
	}

	impl TimeSource for VirtualClock {
		fn now(&mut self) -> Result<CalendarSample, TimeSourceError> {
			let per_second = 1000 / TICK_PERIOD.as_millis() as u64;
			Ok(self.start.add_seconds((self.ticks.get() / per_second) as i64))
		}
	}

	/// Delay that ticks the engine at its real rate while advancing the virtual clock.
	struct TickingDelay {
		engine: SharedEngine<RecordingLine>,
		ticks: Rc<Cell<u64>>,
		waits: Vec<Duration>
	}

	impl Delay for TickingDelay {
		fn delay(&mut self, duration: Duration) {
			self.waits.push(duration);
			for _ in 0..duration.as_millis() / TICK_PERIOD.as_millis() {
				engine::lock(&self.engine).on_tick();
				self.ticks.set(self.ticks.get() + 1);
			}
		}
	}

	#[test]
	fn back_to_back_test() {
		let engine = Arc::new(Mutex::new(TransmissionEngine::new(RecordingLine::default())));
		let ticks = Rc::new(Cell::new(0));
		let source = VirtualClock { start: sample(10), ticks: ticks.clone() };
		let delay = TickingDelay { engine: engine.clone(), ticks: ticks.clone(), waits: Vec::new() };
		let mut c = Coordinator::new(source, delay, engine, 0);

		assert_eq!(c.run_cycle(), Ok(CycleOutcome::Transmitted { first: sample(10) }));
		assert!(!engine::lock(c.engine()).is_active());

		// 48 s to second 58, then one slot per second until the tail guard ends
		let transmission = BUFFER_LEN as u64 * TICKS_PER_SLOT as u64;
		assert_eq!(ticks.get(), 480 + transmission);
		assert_eq!(c.delay.waits.iter().sum::<Duration>(), Duration::from_secs(48 + BUFFER_LEN as u64));
		assert_eq!(c.delay.waits.len(), 2 + BUFFER_LEN - 150);

		// 14:07:58 + 183 s is 14:11:01, early enough for the next cycle to go straight ahead
		let next = sample(10).add_seconds(48 + BUFFER_LEN as i64);
		assert_eq!((next.minute, next.second), (11, 1));
		assert_eq!(c.run_cycle(), Ok(CycleOutcome::Transmitted { first: next }));
		assert!(!engine::lock(c.engine()).is_active());
		assert_eq!(engine::lock(c.engine()).line().writes.last(), Some(&false));
	}

	#[test]
	fn time_source_error_test() {
		struct Broken;
		impl TimeSource for Broken {
			fn now(&mut self) -> Result<CalendarSample, TimeSourceError> {
				Err(TimeSourceError::Unavailable("no clock".to_string()))
			}
		}

		let engine = Arc::new(Mutex::new(TransmissionEngine::new(RecordingLine::default())));
		let mut c = Coordinator::new(Broken, RecordingDelay::default(), engine, 0);
		let err = c.run_cycle().unwrap_err();
		assert_eq!(err, CoordinatorError::Time(TimeSourceError::Unavailable("no clock".to_string())));
		assert!(c.delay.0.is_empty());
		assert!(!engine::lock(c.engine()).is_active());
	}
}
