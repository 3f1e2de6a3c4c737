//! The outer loop invoking the [`Coordinator`] about once a minute.
//!
//! Checks are spaced [`CHECK_INTERVAL`] apart, measured from the start of the previous check. A
//! deferred cycle pushes the next check back by the requested amount. A transmission blocks for
//! longer than the interval, so the next check follows it immediately.

use std::num::NonZero;
use std::time::{Duration, Instant};
use dcf77::{Coordinator, CycleOutcome, Delay, OutputLine, TimeSource};
use tracing::{error, info};

/// Time between the starts of consecutive checks.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// When the next check is due.
#[derive(Debug, Default)]
pub struct CheckSchedule {
	last_check: Option<Instant>
}

impl CheckSchedule {
	/// How long to wait from `now` until the next check. Zero if due.
	pub fn wait(&self, now: Instant) -> Duration {
		match self.last_check {
			Some(t) => (t + CHECK_INTERVAL).saturating_duration_since(now),
			None => Duration::ZERO
		}
	}

	/// Record that a check started at `now`.
	pub fn checked(&mut self, now: Instant) {
		self.last_check = Some(now);
	}

	/// Push the next check back by `by`.
	pub fn defer(&mut self, by: Duration) {
		if let Some(t) = &mut self.last_check {
			*t += by;
		}
	}
}

/// Run cycles until `cycles` transmissions have completed, or forever.
///
/// `before_cycle` runs ahead of every cycle with access to the time source, e.g. to resynchronise
/// it while the line is idle. Failed cycles are logged and retried at the next check.
pub fn run<T, D, L, W, F>(
	coordinator: &mut Coordinator<T, D, L>,
	wait: &mut W,
	cycles: Option<NonZero<usize>>,
	mut before_cycle: F
) where
	T: TimeSource,
	D: Delay,
	L: OutputLine,
	W: Delay,
	F: FnMut(&mut T)
{
	let mut schedule = CheckSchedule::default();
	let mut done = 0;
	loop {
		let w = schedule.wait(Instant::now());
		if !w.is_zero() {
			wait.delay(w);
		}
		schedule.checked(Instant::now());

		before_cycle(coordinator.time_source_mut());
		match coordinator.run_cycle() {
			Ok(CycleOutcome::Deferred(by)) => schedule.defer(by),
			Ok(CycleOutcome::Transmitted { .. }) => {
				done += 1;
				if cycles.is_some_and(|n| done >= n.get()) {
					info!(transmissions = done, "done");
					return;
				}
			},
			Err(e) => error!("transmission cycle failed: {}", e)
		}
	}
}
