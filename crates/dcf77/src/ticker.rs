//! Fixed-rate tick thread.
//!
//! The [`Ticker`] calls a closure every [`TickerConfig::period`] on a dedicated thread, keeping
//! an absolute deadline so that scheduling jitter does not accumulate over a 183 second
//! transmission. A late tick is run immediately to catch up; if the thread falls more than
//! [`MAX_LAG_TICKS`] behind (e.g. the machine was suspended) the deadline is reset instead.
//!
//! On Linux the thread can request `SCHED_FIFO` scheduling. Failing to get it (usually for lack
//! of `CAP_SYS_NICE`) only logs a warning; the ticker still runs at normal priority.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use crate::engine::{self, TICK_PERIOD};
use crate::{OutputLine, SharedEngine, Tick, TickerError};

/// Ticks the thread may fall behind before it gives up catching up.
pub const MAX_LAG_TICKS: u32 = 10;

/// Configuration for a [`Ticker`].
#[derive(Clone, Debug)]
pub struct TickerConfig {
	/// Thread name
	pub name: String,
	/// Time between ticks
	pub period: Duration,
	/// Whether to request real-time scheduling
	pub realtime: bool,
	/// `SCHED_FIFO` priority, ranged [1, 99]
	pub priority: i32
}

impl Default for TickerConfig {
	fn default() -> Self {
		TickerConfig {
			name: "dcf77-tick".to_string(),
			period: TICK_PERIOD,
			realtime: true,
			priority: 80
		}
	}
}

/// Handle to a running tick thread.
///
/// Dropping the handle stops the thread and waits for it to exit.
///
/// # Examples
///
/// ```
/// # use std::sync::Arc;
/// # use std::sync::atomic::{AtomicUsize, Ordering};
/// # use std::time::Duration;
/// # use dcf77::{Ticker, TickerConfig};
/// let count = Arc::new(AtomicUsize::new(0));
/// let c = count.clone();
/// let config = TickerConfig { period: Duration::from_millis(1), realtime: false, ..Default::default() };
/// let ticker = Ticker::spawn(config, move || { c.fetch_add(1, Ordering::Relaxed); }).unwrap();
/// std::thread::sleep(Duration::from_millis(20));
/// drop(ticker);
/// assert!(count.load(Ordering::Relaxed) > 0);
/// ```
pub struct Ticker {
	stop: Arc<AtomicBool>,
	handle: Option<JoinHandle<()>>
}

impl Ticker {
	/// Spawn a thread calling `tick` once per `config.period`, starting immediately.
	///
	/// # Errors
	///
	/// Returns [`TickerError::Spawn`] if the thread could not be created.
	pub fn spawn<F>(config: TickerConfig, mut tick: F) -> Result<Ticker, TickerError>
	where F: FnMut() + Send + 'static
	{
		let stop = Arc::new(AtomicBool::new(false));
		let flag = stop.clone();
		let handle = thread::Builder::new()
			.name(config.name.clone())
			.spawn(move || {
				if config.realtime {
					match set_priority(config.priority) {
						Ok(()) => debug!(priority = config.priority, "tick thread running SCHED_FIFO"),
						Err(e) => warn!("{}, pulse timing may jitter", e)
					}
				}
				run(&config, &flag, &mut tick);
			})
			.map_err(TickerError::Spawn)?;

		Ok(Ticker { stop, handle: Some(handle) })
	}

	/// Spawn a thread ticking `engine`.
	///
	/// Logs when a transmission completes. The engine stays idle between transmissions, so the
	/// thread can run for the lifetime of the program.
	pub fn drive<L>(engine: SharedEngine<L>, config: TickerConfig) -> Result<Ticker, TickerError>
	where L: OutputLine + 'static
	{
		Ticker::spawn(config, move || {
			if engine::lock(&engine).on_tick() == Tick::Finished {
				info!("transmission complete");
			}
		})
	}

	/// Stop the thread and wait for it to exit.
	pub fn stop(mut self) {
		self.shutdown();
	}

	fn shutdown(&mut self) {
		self.stop.store(true, Ordering::Relaxed);
		if let Some(handle) = self.handle.take() {
			if handle.join().is_err() {
				warn!("tick thread panicked");
			}
		}
	}
}

impl Drop for Ticker {
	fn drop(&mut self) {
		self.shutdown();
	}
}

/// Tick loop, run until `stop` is set.
fn run<F: FnMut()>(config: &TickerConfig, stop: &AtomicBool, tick: &mut F) {
	let max_lag = config.period * MAX_LAG_TICKS;
	let mut deadline = Instant::now();

	while !stop.load(Ordering::Relaxed) {
		tick();

		deadline += config.period;
		let now = Instant::now();
		if deadline > now {
			thread::sleep(deadline - now);
		} else if now - deadline > max_lag {
			warn!(lag = ?(now - deadline), "tick thread fell behind, resetting deadline");
			deadline = now;
		}
	}
}

/// Switch the calling thread to `SCHED_FIFO` at `priority`.
#[cfg(target_os = "linux")]
fn set_priority(priority: i32) -> Result<(), TickerError> {
	// SAFETY: sched_param is plain old data, and pid 0 refers to the calling thread.
	let result = unsafe {
		let mut param: libc::sched_param = std::mem::zeroed();
		param.sched_priority = priority.clamp(1, 99);
		libc::sched_setscheduler(0, libc::SCHED_FIFO, &param)
	};
	if result != 0 {
		return Err(TickerError::Priority(std::io::Error::last_os_error()));
	}
	Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_priority(_priority: i32) -> Result<(), TickerError> {
	Err(TickerError::Priority(std::io::Error::from(std::io::ErrorKind::Unsupported)))
}
