//! The pulse scheduler: a 100 ms tick state machine that plays the buffer out on the line.
//!
//! Every slot of the [`TransmissionBuffer`] lasts ten ticks (one second):
//!
//! | Sub-tick | Action                                                          |
//! | -------- | --------------------------------------------------------------- |
//! | 0        | Assert the line, unless the slot is [`PulseSymbol::NoPulse`]      |
//! | 1        | Deassert if the slot is [`PulseSymbol::ShortPulse`] (100 ms)     |
//! | 2        | Deassert unconditionally (ends a 200 ms pulse)                  |
//! | 3-8      | Idle                                                            |
//! | 9        | Advance to the next slot, stopping after the last one           |
//!
//! Ownership of the buffer moves between the coordinator and the scheduler through the engine's
//! `active` flag: frames can only be sealed while the engine is idle, and once started only the
//! tick path reads them until the engine stops itself after [`LAST_SLOT`]. Sharing the engine
//! behind a [`Mutex`] ([`SharedEngine`]) makes the flag transition and buffer access atomic.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use crate::buffer::{FRAME_COUNT, LAST_SLOT};
use crate::{EngineError, Frame, OutputLine, PulseSymbol, TransmissionBuffer};

/// Period between ticks.
pub const TICK_PERIOD: Duration = Duration::from_millis(100);
/// Ticks per one-second slot.
pub const TICKS_PER_SLOT: u8 = 10;

/// An engine shared between the coordinator and the tick thread.
pub type SharedEngine<L> = Arc<Mutex<TransmissionEngine<L>>>;

/// Lock a shared engine.
///
/// A panic while holding the lock cannot leave the engine half-updated in a way that matters (the
/// worst case is a slot played twice), so a poisoned lock is simply taken over.
pub fn lock<L>(engine: &Mutex<TransmissionEngine<L>>) -> MutexGuard<'_, TransmissionEngine<L>> {
	engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of a single tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
	/// The engine is not transmitting; nothing happened.
	Idle,
	/// The engine is transmitting.
	Running,
	/// The final slot was just consumed and the engine stopped itself.
	Finished
}

/// Owns the pulse buffer, the playback position and the output line.
///
/// # Examples
///
/// ```
/// # use dcf77::{CalendarSample, OutputLine, Tick, TransmissionEngine, encoder};
/// struct Pin(bool);
/// impl OutputLine for Pin {
/// 	fn set(&mut self, asserted: bool) { self.0 = asserted }
/// }
///
/// let t = CalendarSample {
/// 	second: 0, minute: 0, hour: 0, day: 1, weekday: 4, month: 1, year: 2026, dst: false
/// };
/// let mut engine = TransmissionEngine::new(Pin(false));
/// engine.seal(&encoder::encode_window(&t)).unwrap();
/// engine.start().unwrap();
///
/// // The first slot is the short head guard pulse
/// assert_eq!(engine.on_tick(), Tick::Running);
/// assert!(engine.line().0);
/// assert_eq!(engine.on_tick(), Tick::Running);
/// assert!(!engine.line().0);
///
/// // Run the remaining 182.8 seconds
/// let mut ticks = 2;
/// while engine.on_tick() != Tick::Finished {
/// 	ticks += 1;
/// }
/// assert_eq!(ticks + 1, 1830);
/// assert!(!engine.is_active());
/// ```
pub struct TransmissionEngine<L> {
	buffer: TransmissionBuffer,
	/// Current position in the buffer, [0, LAST_SLOT]
	slot: usize,
	/// Position within the current slot, [0, TICKS_PER_SLOT)
	sub_tick: u8,
	/// Whether the tick path owns the buffer and drives the line
	active: bool,
	/// Whether frames have been written since the last transmission
	sealed: bool,
	line: L
}

impl<L: OutputLine> TransmissionEngine<L> {
	/// Create an idle engine driving `line`, which is set to its idle level.
	pub fn new(mut line: L) -> Self {
		line.set(false);
		TransmissionEngine {
			buffer: TransmissionBuffer::new(),
			slot: 0,
			sub_tick: 0,
			active: false,
			sealed: false,
			line
		}
	}

	/// Write the frames for the next transmission.
	///
	/// Frames may be sealed any number of times before [`start`](Self::start); the last call wins.
	///
	/// # Errors
	///
	/// Returns [`EngineError::Busy`] if a transmission is in progress. The buffer is untouched.
	pub fn seal(&mut self, frames: &[Frame; FRAME_COUNT]) -> Result<(), EngineError> {
		if self.active {
			return Err(EngineError::Busy);
		}
		self.buffer.write_frames(frames);
		self.sealed = true;
		Ok(())
	}

	/// Hand the sealed buffer to the tick path, starting at the head guard slot.
	///
	/// # Errors
	///
	/// Returns [`EngineError::Busy`] if a transmission is already in progress, or
	/// [`EngineError::NotSealed`] if no frames were sealed since the last transmission.
	pub fn start(&mut self) -> Result<(), EngineError> {
		if self.active {
			return Err(EngineError::Busy);
		}
		if !self.sealed {
			return Err(EngineError::NotSealed);
		}
		self.slot = 0;
		self.sub_tick = 0;
		self.active = true;
		Ok(())
	}

	/// Whether a transmission is in progress.
	#[inline(always)]
	pub fn is_active(&self) -> bool {
		self.active
	}

	/// Advance the state machine by one 100 ms tick.
	///
	/// Does nothing unless the engine is active. See the [module documentation](self) for the
	/// per-tick actions.
	pub fn on_tick(&mut self) -> Tick {
		if !self.active {
			return Tick::Idle;
		}

		let symbol = self.buffer.get(self.slot);
		match self.sub_tick {
			0 => if symbol != PulseSymbol::NoPulse {
				self.line.set(true);
			},
			1 => if symbol == PulseSymbol::ShortPulse {
				self.line.set(false);
			},
			2 => self.line.set(false),
			9 => {
				self.sub_tick = 0;
				if self.slot == LAST_SLOT {
					self.slot = 0;
					self.active = false;
					self.sealed = false;
					return Tick::Finished;
				}
				self.slot += 1;
				return Tick::Running;
			},
			_ => ()
		}
		self.sub_tick += 1;
		Tick::Running
	}

	/// Current slot index.
	pub fn slot_index(&self) -> usize {
		self.slot
	}

	/// Current position within the slot.
	pub fn sub_tick(&self) -> u8 {
		self.sub_tick
	}

	/// The pulse buffer.
	pub fn buffer(&self) -> &TransmissionBuffer {
		&self.buffer
	}

	/// The output line.
	pub fn line(&self) -> &L {
		&self.line
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::buffer::{frame_offset, BUFFER_LEN};
	use crate::encoder::encode_window;
	use crate::testing::{sample, RecordingLine};

	fn started() -> TransmissionEngine<RecordingLine> {
		let mut e = TransmissionEngine::new(RecordingLine::default());
		e.seal(&encode_window(&sample(10))).unwrap();
		e.start().unwrap();
		e.line.writes.clear();
		e
	}

	/// Run ticks until the engine sits at the start of `slot`.
	fn seek(e: &mut TransmissionEngine<RecordingLine>, slot: usize) {
		while e.slot_index() != slot || e.sub_tick() != 0 {
			e.on_tick();
		}
		e.line.writes.clear();
	}

	/// Record the line level after each of the ten ticks of the current slot.
	fn levels(e: &mut TransmissionEngine<RecordingLine>) -> Vec<bool> {
		(0..TICKS_PER_SLOT).map(|_| { e.on_tick(); e.line.level }).collect()
	}

	#[test]
	fn idle_test() {
		let mut e = TransmissionEngine::new(RecordingLine::default());
		assert_eq!(e.line.writes, vec![false]);
		for _ in 0..100 {
			assert_eq!(e.on_tick(), Tick::Idle);
		}
		assert_eq!(e.line.writes, vec![false]);
		assert_eq!((e.slot_index(), e.sub_tick()), (0, 0));
	}

	#[test]
	fn ownership_test() {
		let mut e = TransmissionEngine::new(RecordingLine::default());
		assert_eq!(e.start(), Err(EngineError::NotSealed));

		let frames = encode_window(&sample(10));
		e.seal(&frames).unwrap();
		e.start().unwrap();
		assert_eq!(e.seal(&frames), Err(EngineError::Busy));
		assert_eq!(e.start(), Err(EngineError::Busy));
	}

	#[test]
	fn long_pulse_test() {
		let mut e = started();
		// Slot 20 of every frame is always a long pulse
		let slot = frame_offset(0) + 20;
		assert_eq!(e.buffer().get(slot), PulseSymbol::LongPulse);
		seek(&mut e, slot);

		let l = levels(&mut e);
		assert_eq!(l, vec![true, true, false, false, false, false, false, false, false, false]);
		// Assert on tick 0, deassert on tick 2, nothing else
		assert_eq!(e.line.writes, vec![true, false]);
		assert_eq!((e.slot_index(), e.sub_tick()), (slot + 1, 0));
	}

	#[test]
	fn short_pulse_test() {
		let mut e = started();
		let slot = frame_offset(1);
		assert_eq!(e.buffer().get(slot), PulseSymbol::ShortPulse);
		seek(&mut e, slot);

		let l = levels(&mut e);
		assert_eq!(l, vec![true, false, false, false, false, false, false, false, false, false]);
		// Tick 2 repeats the deassert, which is harmless
		assert_eq!(e.line.writes, vec![true, false, false]);
	}

	#[test]
	fn no_pulse_test() {
		let mut e = started();
		let slot = frame_offset(0) + 59;
		seek(&mut e, slot);

		let l = levels(&mut e);
		assert!(l.iter().all(|&v| !v));
		assert_eq!(e.line.writes, vec![false]);

		// Head guard gap behaves the same
		let mut e = started();
		seek(&mut e, 1);
		assert!(levels(&mut e).iter().all(|&v| !v));
	}

	#[test]
	fn self_termination_test() {
		let mut e = started();
		seek(&mut e, LAST_SLOT);
		for _ in 0..TICKS_PER_SLOT - 1 {
			assert_eq!(e.on_tick(), Tick::Running);
		}
		assert_eq!(e.on_tick(), Tick::Finished);
		assert!(!e.is_active());
		assert_eq!((e.slot_index(), e.sub_tick()), (0, 0));
		assert_eq!(e.line.writes, vec![true, false, false]);

		// No further output, and the old frames cannot be replayed without sealing again
		e.line.writes.clear();
		for _ in 0..50 {
			assert_eq!(e.on_tick(), Tick::Idle);
		}
		assert!(e.line.writes.is_empty());
		assert_eq!(e.start(), Err(EngineError::NotSealed));
	}

	#[test]
	fn full_transmission_test() {
		let mut e = started();
		let mut ticks = 0;
		let mut asserted = 0;
		let mut pulses = Vec::new();
		loop {
			let was = e.line.level;
			let t = e.on_tick();
			ticks += 1;
			if e.line.level {
				asserted += 1;
			} else if was {
				pulses.push(asserted);
				asserted = 0;
			}
			if t == Tick::Finished {
				break;
			}
		}
		assert_eq!(ticks, BUFFER_LEN * TICKS_PER_SLOT as usize);

		// Rebuild the symbols from the measured pulse widths
		let mut expected: Vec<usize> = Vec::new();
		for slot in 0..BUFFER_LEN {
			match e.buffer().get(slot) {
				PulseSymbol::NoPulse => (),
				PulseSymbol::ShortPulse => expected.push(1),
				PulseSymbol::LongPulse => expected.push(2)
			}
		}
		assert_eq!(pulses, expected);
		assert!(!e.line.level);
	}
}
