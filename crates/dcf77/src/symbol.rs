//! Pulse symbols and one-minute frames.

use core::fmt;
use core::ops::Index;

/// Number of one-second slots in a minute frame.
pub const FRAME_LEN: usize = 60;

/// What happens on the line during one second.
///
/// DCF77 reduces the carrier at the start of every second except the 59th. The length of the
/// reduction carries the bit: 100 ms for a logical 0, 200 ms for a logical 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PulseSymbol {
	/// No pulse at all, marking the upcoming minute boundary.
	#[default]
	NoPulse,
	/// 100 ms pulse, logical 0.
	ShortPulse,
	/// 200 ms pulse, logical 1.
	LongPulse
}

impl PulseSymbol {
	/// Get the symbol encoding a logical bit.
	///
	/// # Examples
	///
	/// ```
	/// # use dcf77::PulseSymbol;
	/// assert_eq!(PulseSymbol::from_bit(false), PulseSymbol::ShortPulse);
	/// assert_eq!(PulseSymbol::from_bit(true), PulseSymbol::LongPulse);
	/// ```
	#[inline(always)]
	pub fn from_bit(bit: bool) -> PulseSymbol {
		if bit { PulseSymbol::LongPulse } else { PulseSymbol::ShortPulse }
	}

	/// Get the logical bit carried by this symbol, or `None` for [`PulseSymbol::NoPulse`].
	#[inline(always)]
	pub fn bit(self) -> Option<bool> {
		match self {
			PulseSymbol::NoPulse => None,
			PulseSymbol::ShortPulse => Some(false),
			PulseSymbol::LongPulse => Some(true)
		}
	}
}

impl fmt::Display for PulseSymbol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let c = match self {
			PulseSymbol::NoPulse => '-',
			PulseSymbol::ShortPulse => '0',
			PulseSymbol::LongPulse => '1'
		};
		write!(f, "{}", c)
	}
}

/// One minute of time code: exactly [`FRAME_LEN`] symbols.
///
/// Frames are produced by the [`encoder`](crate::encoder), which guarantees the last slot is
/// always [`PulseSymbol::NoPulse`]. The [`Display`](fmt::Display) form renders one character per
/// slot (`-`, `0` or `1`), which is handy for logs.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame(pub(crate) [PulseSymbol; FRAME_LEN]);

impl Frame {
	/// Get the symbols of this frame.
	pub fn symbols(&self) -> &[PulseSymbol; FRAME_LEN] {
		&self.0
	}
}

impl Default for Frame {
	fn default() -> Self {
		Frame([PulseSymbol::NoPulse; FRAME_LEN])
	}
}

impl Index<usize> for Frame {
	type Output = PulseSymbol;

	fn index(&self, index: usize) -> &Self::Output {
		&self.0[index]
	}
}

impl fmt::Display for Frame {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.iter().try_for_each(|s| fmt::Display::fmt(s, f))
	}
}

impl fmt::Debug for Frame {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Frame({})", self)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn symbol_test() {
		assert_eq!(PulseSymbol::default(), PulseSymbol::NoPulse);
		assert_eq!(PulseSymbol::NoPulse.bit(), None);
		assert_eq!(PulseSymbol::ShortPulse.bit(), Some(false));
		assert_eq!(PulseSymbol::LongPulse.bit(), Some(true));
		assert_eq!(PulseSymbol::from_bit(true).bit(), Some(true));
	}

	#[test]
	fn frame_display_test() {
		let mut f = Frame::default();
		f.0[0] = PulseSymbol::ShortPulse;
		f.0[1] = PulseSymbol::LongPulse;
		let s = format!("{}", f);
		assert_eq!(s.len(), FRAME_LEN);
		assert!(s.starts_with("01-"));
		assert_eq!(format!("{:?}", Frame::default()), format!("Frame({})", "-".repeat(60)));
	}
}
