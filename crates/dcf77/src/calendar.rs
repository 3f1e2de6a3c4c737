//! Local calendar time as handed to the encoder.
//!
//! [`CalendarSample`] is a broken-down local time, similar to C's `struct tm`, but with 1-based
//! months and the full Gregorian year. The only arithmetic it needs is shifting by whole seconds
//! (for the correction offset and for advancing to the next minute's frame), which renormalizes
//! every field, including the weekday.
//!
//! The conversions use the [days from civil] algorithms: rotate the year to start in March so the
//! leap day is the last day of the year, then work in 400-year eras.
//!
//! [days from civil]: http://howardhinnant.github.io/date_algorithms.html

/// Seconds per minute.
const SECONDS_PER_MINUTE: i64 = 60;
/// Seconds per hour.
const SECONDS_PER_HOUR: i64 = SECONDS_PER_MINUTE * 60;
/// Seconds per day.
const SECONDS_PER_DAY: i64 = SECONDS_PER_HOUR * 24;
/// Days per 400-year era.
const DAYS_PER_ERA: i64 = 146097;
/// Days from March 1, 0000 to January 1, 1970.
const DAYS_FROM_MARCH_0000_TO_JAN_1970: i64 = 719468;

/// Local calendar time, already corrected for timezone and daylight saving time.
///
/// # Examples
///
/// ```
/// # use dcf77::CalendarSample;
/// // Thursday, December 31, 2026. 23:59:30 CET.
/// let t = CalendarSample {
/// 	second: 30, minute: 59, hour: 23, day: 31, weekday: 4, month: 12, year: 2026, dst: false
/// };
/// let n = t.next_minute();
/// assert_eq!((n.year, n.month, n.day, n.hour, n.minute), (2027, 1, 1, 0, 0));
/// assert_eq!(n.weekday, 5); // Friday
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalendarSample {
	/// Seconds, ranged [0, 59]
	pub second: u8,
	/// Minutes, ranged [0, 59]
	pub minute: u8,
	/// Hours, ranged [0, 23]
	pub hour: u8,
	/// Day of the month, ranged [1, 31]
	pub day: u8,
	/// Day of the week, ranged [0, 6] => [Sunday, Saturday]
	pub weekday: u8,
	/// Month of the year, ranged [1, 12]
	pub month: u8,
	/// Absolute Gregorian calendar year, e.g. 2026
	pub year: u16,
	/// Whether daylight saving time is in effect
	pub dst: bool
}

impl CalendarSample {
	/// Year within the century, ranged [0, 99].
	#[inline(always)]
	pub fn year_of_century(&self) -> u8 {
		(self.year % 100) as u8
	}

	/// Shift this time by `seconds` (which may be negative), renormalizing all fields.
	///
	/// The daylight saving flag is carried over unchanged; a DST transition inside the shifted
	/// interval is not detected.
	///
	/// # Examples
	///
	/// ```
	/// # use dcf77::CalendarSample;
	/// // Friday, March 1, 2024. 00:00:02 CET.
	/// let t = CalendarSample {
	/// 	second: 2, minute: 0, hour: 0, day: 1, weekday: 5, month: 3, year: 2024, dst: false
	/// };
	/// let p = t.add_seconds(-5);
	/// assert_eq!((p.month, p.day, p.hour, p.minute, p.second), (2, 29, 23, 59, 57));
	/// assert_eq!(p.weekday, 4);
	/// ```
	pub fn add_seconds(&self, seconds: i64) -> CalendarSample {
		let days = days_from_civil(self.year as i64, self.month, self.day);
		let t = days * SECONDS_PER_DAY
			  + self.hour as i64 * SECONDS_PER_HOUR
			  + self.minute as i64 * SECONDS_PER_MINUTE
			  + self.second as i64
			  + seconds;
		let days = t.div_euclid(SECONDS_PER_DAY);
		let rem = t.rem_euclid(SECONDS_PER_DAY);
		let (year, month, day) = civil_from_days(days);

		CalendarSample {
			second: (rem % SECONDS_PER_MINUTE) as u8,
			minute: ((rem % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE) as u8,
			hour: (rem / SECONDS_PER_HOUR) as u8,
			day,
			weekday: (days + 4).rem_euclid(7) as u8, // Jan 1, 1970 was a Thursday
			month,
			year: year as u16,
			dst: self.dst
		}
	}

	/// The same second of the following minute.
	#[inline(always)]
	pub fn next_minute(&self) -> CalendarSample {
		self.add_seconds(SECONDS_PER_MINUTE)
	}
}

/// Days since January 1, 1970 for a given year, 1-based month and day of month.
fn days_from_civil(year: i64, month: u8, day: u8) -> i64 {
	let y = if month <= 2 { year - 1 } else { year };
	let era = y.div_euclid(400);
	let yoe = y.rem_euclid(400);
	// Months counted from March
	let mp = (month as i64 + 9) % 12;
	let doy = (153 * mp + 2) / 5 + day as i64 - 1;
	let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
	era * DAYS_PER_ERA + doe - DAYS_FROM_MARCH_0000_TO_JAN_1970
}

/// Year, 1-based month and day of month for a number of days since January 1, 1970.
fn civil_from_days(days: i64) -> (i64, u8, u8) {
	let z = days + DAYS_FROM_MARCH_0000_TO_JAN_1970;
	let era = z.div_euclid(DAYS_PER_ERA);
	let doe = z.rem_euclid(DAYS_PER_ERA);
	let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
	let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
	let mp = (5 * doy + 2) / 153;
	let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
	let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
	let year = yoe + era * 400 + (month <= 2) as i64;
	(year, month, day)
}
