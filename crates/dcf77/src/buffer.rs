//! The shared pulse buffer played out by the [`engine`](crate::engine).
//!
//! A transmission is three consecutive minute frames, framed by guard slots:
//!
//! ```text
//! index:  0      1      2 ........ 61  62 ....... 121  122 ...... 181  182
//!         short  none   frame 0        frame 1         frame 2         short
//! ```
//!
//! The head guard (a short pulse followed by a gap) is played during seconds 58 and 59 of the
//! minute before the first frame, so receivers see a minute marker right before frame 0. The tail
//! guard closes the gap after frame 2.

use crate::{Frame, PulseSymbol, FRAME_LEN};

/// Number of frames in one transmission.
pub const FRAME_COUNT: usize = 3;
/// Guard slots before the first frame.
pub const GUARD_HEAD: usize = 2;
/// Guard slots after the last frame.
pub const GUARD_TAIL: usize = 1;
/// Total number of slots in a transmission.
pub const BUFFER_LEN: usize = GUARD_HEAD + FRAME_COUNT * FRAME_LEN + GUARD_TAIL;
/// Index of the final slot, after which the engine stops.
pub const LAST_SLOT: usize = BUFFER_LEN - 1;

/// Slot index at which frame `n` begins.
pub const fn frame_offset(n: usize) -> usize {
	GUARD_HEAD + n * FRAME_LEN
}

const _: () = assert!(BUFFER_LEN == 183);
const _: () = assert!(frame_offset(0) == 2 && frame_offset(1) == 62 && frame_offset(2) == 122);
const _: () = assert!(frame_offset(FRAME_COUNT) + GUARD_TAIL == BUFFER_LEN);

/// Fixed-size sequence of [`BUFFER_LEN`] pulse symbols.
///
/// Guard slots are set once in [`TransmissionBuffer::new`] and can never be overwritten; only the
/// three frame regions are writable, one whole frame at a time.
///
/// # Examples
///
/// ```
/// # use dcf77::{PulseSymbol, TransmissionBuffer, buffer::LAST_SLOT};
/// let buffer = TransmissionBuffer::new();
/// assert_eq!(buffer.get(0), PulseSymbol::ShortPulse);
/// assert_eq!(buffer.get(1), PulseSymbol::NoPulse);
/// assert_eq!(buffer.get(LAST_SLOT), PulseSymbol::ShortPulse);
/// ```
#[derive(Clone)]
pub struct TransmissionBuffer {
	slots: [PulseSymbol; BUFFER_LEN]
}

impl TransmissionBuffer {
	/// Create a buffer with guard slots set and empty frames.
	pub fn new() -> Self {
		let mut slots = [PulseSymbol::NoPulse; BUFFER_LEN];
		slots[0] = PulseSymbol::ShortPulse;
		slots[1] = PulseSymbol::NoPulse;
		slots[LAST_SLOT] = PulseSymbol::ShortPulse;
		TransmissionBuffer { slots }
	}

	/// Overwrite all frame regions with `frames`, in order.
	pub fn write_frames(&mut self, frames: &[Frame; FRAME_COUNT]) {
		for (n, frame) in frames.iter().enumerate() {
			let start = frame_offset(n);
			self.slots[start..start + FRAME_LEN].copy_from_slice(frame.symbols());
		}
	}

	/// Get the symbol at `slot`.
	///
	/// # Panics
	///
	/// Panics if `slot >= BUFFER_LEN`.
	#[inline(always)]
	pub fn get(&self, slot: usize) -> PulseSymbol {
		self.slots[slot]
	}

	/// Copy out frame `n`.
	///
	/// # Panics
	///
	/// Panics if `n >= FRAME_COUNT`.
	pub fn frame(&self, n: usize) -> Frame {
		assert!(n < FRAME_COUNT, "frame index out of range: {}", n);
		let mut frame = Frame::default();
		let start = frame_offset(n);
		frame.0.copy_from_slice(&self.slots[start..start + FRAME_LEN]);
		frame
	}

	/// All slots, in transmission order.
	pub fn as_slice(&self) -> &[PulseSymbol] {
		&self.slots
	}
}

impl Default for TransmissionBuffer {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::encoder::encode_window;
	use crate::testing::sample;

	#[test]
	fn layout_test() {
		let b = TransmissionBuffer::new();
		assert_eq!(b.as_slice().len(), 183);
		assert_eq!(LAST_SLOT, 182);
		for n in 0..FRAME_COUNT {
			assert_eq!(b.frame(n), Frame::default());
		}
	}

	#[test]
	fn write_frames_test() {
		let frames = encode_window(&sample(20));
		let mut b = TransmissionBuffer::new();
		b.write_frames(&frames);

		for n in 0..FRAME_COUNT {
			assert_eq!(b.frame(n), frames[n]);
			assert_eq!(b.get(frame_offset(n) + FRAME_LEN - 1), PulseSymbol::NoPulse);
		}

		// Guards survive
		assert_eq!(b.get(0), PulseSymbol::ShortPulse);
		assert_eq!(b.get(1), PulseSymbol::NoPulse);
		assert_eq!(b.get(LAST_SLOT), PulseSymbol::ShortPulse);

		// Rewriting replaces the frames completely
		let later = encode_window(&sample(20).next_minute().next_minute().next_minute());
		b.write_frames(&later);
		assert_eq!(b.frame(0), later[0]);
		assert_eq!(b.frame(0).decode().unwrap().minute, 10);
	}

	#[test]
	#[should_panic]
	fn frame_out_of_range_test() {
		TransmissionBuffer::new().frame(FRAME_COUNT);
	}
}
