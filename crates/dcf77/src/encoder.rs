//! Pack calendar time into DCF77 minute frames.
//!
//! See [DCF77 documentation](https://en.wikipedia.org/wiki/DCF77#Time_code_details) for the
//! layout. Each frame is 60 one-second slots:
//!
//! | Slots   | Content                                                  |
//! | ------- | -------------------------------------------------------- |
//! | 0-19    | Civil warning / status bits, all logical 0               |
//! | 17, 18  | Daylight saving indicator (17 if DST, else 18)           |
//! | 20      | Start of time code, always logical 1                     |
//! | 21-27   | Minute, BCD, LSB first                                   |
//! | 28      | Even parity over 21-27                                   |
//! | 29-34   | Hour, BCD, LSB first                                     |
//! | 35      | Even parity over 29-34                                   |
//! | 36-41   | Day of month, BCD                                        |
//! | 42-44   | Day of week, BCD                                         |
//! | 45-49   | Month, BCD                                               |
//! | 50-57   | Year within century, BCD                                 |
//! | 58      | Even parity over 36-57                                   |
//! | 59      | No pulse, minute marker                                  |
//!
//! Only one of the two daylight saving bits is ever set, and there is no announcement of an
//! upcoming change (bit 16) or leap second (bit 19).
//!
//! # Examples
//!
//! ```
//! # use dcf77::{CalendarSample, PulseSymbol, encoder};
//! // Sunday, October 18, 2026. 14:07:12 CEST.
//! let t = CalendarSample {
//! 	second: 12, minute: 7, hour: 14, day: 18, weekday: 0, month: 10, year: 2026, dst: true
//! };
//! let frame = encoder::encode(&t);
//! assert_eq!(frame[20], PulseSymbol::LongPulse);
//! assert_eq!(frame[59], PulseSymbol::NoPulse);
//!
//! let fields = frame.decode().unwrap();
//! assert_eq!((fields.hour, fields.minute), (14, 7));
//! ```

use core::ops::Range;
use crate::buffer::FRAME_COUNT;
use crate::{CalendarSample, DecodeError, Frame, PulseSymbol, FRAME_LEN};

/// Leading status bits, all sent as logical 0.
const STATUS: Range<usize> = 0..20;
/// Set when daylight saving time is in effect.
const DST_ON: usize = 17;
/// Set when standard time is in effect.
const DST_OFF: usize = 18;
/// Start of encoded time, always set.
const TIME_START: usize = 20;
const MINUTE: Range<usize> = 21..28;
const MINUTE_PARITY: usize = 28;
const HOUR: Range<usize> = 29..35;
const HOUR_PARITY: usize = 35;
const DAY: Range<usize> = 36..42;
const WEEKDAY: Range<usize> = 42..45;
const MONTH: Range<usize> = 45..50;
const YEAR: Range<usize> = 50..58;
const DATE_PARITY: usize = 58;
/// Missing pulse before the minute boundary.
const MINUTE_MARK: usize = 59;

/// Convert a value in [0, 99] to packed binary-coded decimal.
///
/// Values below 10 are returned unchanged; otherwise the tens digit goes in the high nibble and the
/// ones digit in the low nibble. Inputs of 100 or more have no BCD form and are not produced by any
/// valid calendar field.
///
/// # Examples
///
/// ```
/// # use dcf77::encoder::to_bcd;
/// assert_eq!(to_bcd(7), 0x07);
/// assert_eq!(to_bcd(59), 0x59);
/// assert_eq!(to_bcd(10), 0x10);
/// ```
#[inline(always)]
pub fn to_bcd(value: u8) -> u8 {
	debug_assert!(value < 100, "BCD input out of range: {}", value);
	if value < 10 {
		value
	} else {
		((value / 10) << 4) | (value % 10)
	}
}

/// Convert packed binary-coded decimal back to its value.
#[inline(always)]
pub fn from_bcd(bcd: u8) -> u8 {
	(bcd >> 4) * 10 + (bcd & 0xf)
}

/// Write the bits of `value` into `slots`, LSB first, one bit per slot.
///
/// Only as many bits as there are slots are written. Returns the number of logical 1s written so
/// the caller can accumulate parity.
fn write_bits(slots: &mut [PulseSymbol], value: u8) -> u32 {
	let mut v = value;
	let mut ones = 0;
	for slot in slots.iter_mut() {
		let bit = v & 1 == 1;
		*slot = PulseSymbol::from_bit(bit);
		ones += bit as u32;
		v >>= 1;
	}
	ones
}

/// Even parity symbol for a count of logical 1s.
#[inline(always)]
fn parity(ones: u32) -> PulseSymbol {
	PulseSymbol::from_bit(ones & 1 == 1)
}

/// Encode `time` into `dest`, overwriting all [`FRAME_LEN`] slots.
///
/// The year is taken modulo 100. Fields are not range checked; out-of-range values are truncated
/// to their field width.
pub fn encode_into(time: &CalendarSample, dest: &mut [PulseSymbol; FRAME_LEN]) {
	dest[STATUS].fill(PulseSymbol::ShortPulse);
	if time.dst {
		dest[DST_ON] = PulseSymbol::LongPulse;
	} else {
		dest[DST_OFF] = PulseSymbol::LongPulse;
	}
	dest[TIME_START] = PulseSymbol::LongPulse;

	let ones = write_bits(&mut dest[MINUTE], to_bcd(time.minute));
	dest[MINUTE_PARITY] = parity(ones);

	let ones = write_bits(&mut dest[HOUR], to_bcd(time.hour));
	dest[HOUR_PARITY] = parity(ones);

	// Date parity runs across all four date fields
	let ones = write_bits(&mut dest[DAY], to_bcd(time.day))
			 + write_bits(&mut dest[WEEKDAY], to_bcd(time.weekday))
			 + write_bits(&mut dest[MONTH], to_bcd(time.month))
			 + write_bits(&mut dest[YEAR], to_bcd(time.year_of_century()));
	dest[DATE_PARITY] = parity(ones);

	dest[MINUTE_MARK] = PulseSymbol::NoPulse;
}

/// Encode `time` into a new [`Frame`].
pub fn encode(time: &CalendarSample) -> Frame {
	let mut frame = Frame::default();
	encode_into(time, &mut frame.0);
	frame
}

/// Encode the three consecutive minutes starting at `time`.
///
/// This is the content of one transmission: the minute of `time`, then the two minutes after it.
/// Each step renormalizes the date, so a window may cross midnight or the end of the year.
pub fn encode_window(time: &CalendarSample) -> [Frame; FRAME_COUNT] {
	let mut t = *time;
	let mut frames = [Frame::default(); FRAME_COUNT];
	for frame in frames.iter_mut() {
		encode_into(&t, &mut frame.0);
		t = t.next_minute();
	}
	frames
}

/// Fields recovered from a [`Frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedTime {
	/// Minutes, ranged [0, 59]
	pub minute: u8,
	/// Hours, ranged [0, 23]
	pub hour: u8,
	/// Day of the month, ranged [1, 31]
	pub day: u8,
	/// Day of the week, ranged [0, 6]
	pub weekday: u8,
	/// Month of the year, ranged [1, 12]
	pub month: u8,
	/// Year within the century, ranged [0, 99]
	pub year: u8,
	/// Daylight saving indicator
	pub dst: bool
}

/// Read the bits of a field back, LSB first, returning the value and the count of logical 1s.
fn read_bits(frame: &Frame, range: Range<usize>) -> Result<(u8, u32), DecodeError> {
	let mut value = 0;
	let mut ones = 0;
	for (i, slot) in range.clone().enumerate() {
		let bit = frame[slot].bit().ok_or(DecodeError::UnexpectedGap(slot))?;
		value |= (bit as u8) << i;
		ones += bit as u32;
	}
	Ok((value, ones))
}

/// Check that the parity slot makes the count of logical 1s even.
fn check_parity(frame: &Frame, slot: usize, ones: u32, field: &'static str) -> Result<(), DecodeError> {
	let bit = frame[slot].bit().ok_or(DecodeError::UnexpectedGap(slot))?;
	if (ones + bit as u32) & 1 == 0 {
		Ok(())
	} else {
		Err(DecodeError::Parity(field))
	}
}

impl Frame {
	/// Decode this frame back into calendar fields, verifying every parity bit.
	///
	/// # Errors
	///
	/// - [`DecodeError::MissingMinuteMark`] if slot 59 carries a pulse.
	/// - [`DecodeError::UnexpectedGap`] if any other slot carries no pulse.
	/// - [`DecodeError::TimeNotValid`] if the start-of-time bit (slot 20) is 0.
	/// - [`DecodeError::Parity`] if a parity bit does not match its field.
	pub fn decode(&self) -> Result<DecodedTime, DecodeError> {
		if self[MINUTE_MARK] != PulseSymbol::NoPulse {
			return Err(DecodeError::MissingMinuteMark);
		}
		if let Some(slot) = (0..MINUTE_MARK).find(|&s| self[s] == PulseSymbol::NoPulse) {
			return Err(DecodeError::UnexpectedGap(slot));
		}
		if self[TIME_START] != PulseSymbol::LongPulse {
			return Err(DecodeError::TimeNotValid);
		}

		let (minute, ones) = read_bits(self, MINUTE)?;
		check_parity(self, MINUTE_PARITY, ones, "minute")?;
		let (hour, ones) = read_bits(self, HOUR)?;
		check_parity(self, HOUR_PARITY, ones, "hour")?;

		let (day, d) = read_bits(self, DAY)?;
		let (weekday, w) = read_bits(self, WEEKDAY)?;
		let (month, m) = read_bits(self, MONTH)?;
		let (year, y) = read_bits(self, YEAR)?;
		check_parity(self, DATE_PARITY, d + w + m + y, "date")?;

		Ok(DecodedTime {
			minute: from_bcd(minute),
			hour: from_bcd(hour),
			day: from_bcd(day),
			weekday: from_bcd(weekday),
			month: from_bcd(month),
			year: from_bcd(year),
			dst: self[DST_ON] == PulseSymbol::LongPulse
		})
	}
}
