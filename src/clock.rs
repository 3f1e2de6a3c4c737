//! Local time from the system clock, optionally disciplined by NTP.
//!
//! Wall clock time is corrected by the last measured [`ClockOffset`] and then converted to local
//! calendar time by the C library, using a POSIX TZ string (e.g. `CET-1CEST,M3.5.0/02,M10.5.0/03`)
//! for the timezone and daylight saving rules.

use std::ffi::CString;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use std::{env, mem};
use dcf77::{CalendarSample, TimeSource, TimeSourceError};
use sntp::ClockOffset;
use tracing::{info, warn};
use crate::error::AppError;

// POSIX tzset(3); the libc crate only binds it on Windows.
unsafe extern "C" {
	fn tzset();
}

/// Set the process timezone used by [`local_time`].
///
/// Must be called before any other threads are started.
///
/// # Errors
///
/// Returns [`AppError::Timezone`] if `tz` is empty or contains a NUL byte.
pub fn set_timezone(tz: &str) -> Result<(), AppError> {
	if tz.is_empty() || CString::new(tz).is_err() {
		return Err(AppError::Timezone(tz.to_string()));
	}
	// SAFETY: the binary calls this before starting any other thread. Tests in this crate that
	// reach libc environment readers (`tzset`, name resolution) hold a shared lock, and std
	// serialises its own env access. `tzset` re-reads it.
	unsafe {
		env::set_var("TZ", tz);
		tzset();
	}
	Ok(())
}

/// Convert `time` to local calendar time in the process timezone.
pub fn local_time(time: SystemTime) -> Result<CalendarSample, TimeSourceError> {
	let secs = time.duration_since(UNIX_EPOCH)
		.map_err(|_| TimeSourceError::Unavailable("system time before 1970".to_string()))?
		.as_secs();
	let secs = libc::time_t::try_from(secs)
		.map_err(|_| TimeSourceError::Unavailable("system time out of range".to_string()))?;

	// SAFETY: tm is plain old data, and localtime_r only writes through the provided pointer.
	let mut tm: libc::tm = unsafe { mem::zeroed() };
	if unsafe { libc::localtime_r(&secs, &mut tm) }.is_null() {
		return Err(TimeSourceError::Unavailable("localtime_r failed".to_string()));
	}

	Ok(CalendarSample {
		// A leap second (60) is reported as the last regular second
		second: tm.tm_sec.clamp(0, 59) as u8,
		minute: tm.tm_min as u8,
		hour: tm.tm_hour as u8,
		day: tm.tm_mday as u8,
		weekday: tm.tm_wday as u8,
		month: (tm.tm_mon + 1) as u8,
		year: (tm.tm_year + 1900) as u16,
		dst: tm.tm_isdst > 0
	})
}

/// [`TimeSource`] reading the system clock.
///
/// With an NTP server configured, the offset to that server is measured by [`sync`](Self::sync)
/// and applied to every reading. Until the first successful measurement the system clock is used
/// as-is.
pub struct SystemClock {
	ntp_server: Option<String>,
	offset: ClockOffset,
	resync_interval: Duration,
	last_sync: Option<Instant>
}

impl SystemClock {
	/// Create a clock, optionally disciplined by `ntp_server`.
	pub fn new(ntp_server: Option<String>, resync_interval: Duration) -> Self {
		SystemClock { ntp_server, offset: ClockOffset::ZERO, resync_interval, last_sync: None }
	}

	/// Measure the NTP offset now. Failures keep the previous offset.
	///
	/// Returns whether a new offset was measured.
	pub fn sync(&mut self) -> bool {
		let Some(server) = &self.ntp_server else {
			return false;
		};
		match sntp::query_offset(server) {
			Ok(offset) => {
				info!(
					server = %server,
					offset_ms = offset.offset_nanos / 1_000_000,
					error_ms = offset.error.as_millis() as u64,
					"clock synchronised"
				);
				self.offset = offset;
				self.last_sync = Some(Instant::now());
				true
			},
			Err(e) => {
				warn!(server = %server, "NTP query failed, keeping previous offset: {}", e);
				false
			}
		}
	}

	/// Measure the NTP offset if the resync interval has elapsed since the last success.
	pub fn sync_if_due(&mut self) -> bool {
		if !self.sync_due() {
			return false;
		}
		self.sync()
	}

	fn sync_due(&self) -> bool {
		self.ntp_server.is_some()
			&& self.last_sync.is_none_or(|t| t.elapsed() >= self.resync_interval)
	}

	/// The offset currently applied.
	pub fn offset(&self) -> ClockOffset {
		self.offset
	}
}

impl TimeSource for SystemClock {
	fn now(&mut self) -> Result<CalendarSample, TimeSourceError> {
		local_time(self.offset.apply(SystemTime::now()))
	}
}
