//! Measure the offset of the system clock against an NTP server.
//!
//! This crate provides a single public function ([`query_offset`]) that makes five SNTPv4 requests
//! and keeps the response with the smallest error bound. If the address resolves to multiple IPs,
//! the requests cycle through them. The result is a [`ClockOffset`] to be added to system time,
//! rather than an absolute time, so callers can keep applying it between queries.
//!
//! # Examples
//!
//! ```
//! # use sntp::query_offset;
//! match query_offset("time.google.com") {
//! 	Ok(o) => println!("clock is off by {} ns (+/- {:?})", o.offset_nanos, o.error),
//! 	Err(e) => eprintln!("Error querying time.google.com: {e}")
//! }
//! assert!(query_offset("").is_err());
//! ```

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::ops::Sub;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Offset to adjust a Unix timestamp (epoch Jan 1, 1970) to NTP time stamp (epoch Jan 1, 1900)
const UNIX_TO_NTP_EPOCH_ADJUST: u64 = (70 * 365 + 17) * 86400; // 17 leap years between 1900-1970
/// Number of requests made per query.
const REQUESTS: usize = 5;
/// Socket read and write timeout.
const TIMEOUT: Duration = Duration::from_secs(1);

/// Length of an NTP message without extensions.
const MESSAGE_LEN: usize = 48;
/// Byte offsets of the message fields used here.
const ROOT_DELAY: usize = 4;
const ROOT_DISPERSION: usize = 8;
const ORIGIN_TIME: usize = 24;
const RX_TIME: usize = 32;
const TX_TIME: usize = 40;

/// Offset of the system clock relative to an NTP server.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockOffset {
	/// Nanoseconds to add to system time to get server time
	pub offset_nanos: i64,
	/// Estimated maximum error of `offset_nanos` (+/-)
	pub error: Duration
}

impl ClockOffset {
	/// An offset of zero with no error, i.e. trust the system clock.
	pub const ZERO: ClockOffset = ClockOffset { offset_nanos: 0, error: Duration::ZERO };

	/// Apply this offset to `time`.
	///
	/// # Examples
	///
	/// ```
	/// # use std::time::{Duration, UNIX_EPOCH};
	/// # use sntp::ClockOffset;
	/// let o = ClockOffset { offset_nanos: -1_500_000_000, error: Duration::ZERO };
	/// let t = UNIX_EPOCH + Duration::from_secs(10);
	/// assert_eq!(o.apply(t), UNIX_EPOCH + Duration::from_millis(8500));
	/// ```
	pub fn apply(&self, time: SystemTime) -> SystemTime {
		let magnitude = Duration::from_nanos(self.offset_nanos.unsigned_abs());
		if self.offset_nanos >= 0 {
			time + magnitude
		} else {
			time - magnitude
		}
	}
}

/// An NTP timestamp in seconds since Jan 1, 1900.
///
/// NTP uses a 64-bit fixed point format, with 32 bits before the decimal and 32 bits after, for a
/// granularity of 233 picoseconds. The timestamp rolls over every 136 years, with the first
/// rollover on February 7, 2036.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct NtpTimestamp(u64);

impl NtpTimestamp {
	/// Create a new NTP timestamp from components before and after the decimal place.
	fn new(sec: u32, frac: u32) -> Self {
		Self((sec as u64) << 32 | frac as u64)
	}

	/// Convert a system time, which must be after the Unix epoch.
	fn from_system_time(time: SystemTime) -> io::Result<Self> {
		let d = time.duration_since(UNIX_EPOCH)
			.map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "System time before 1970"))?;
		let sec = d.as_secs() + UNIX_TO_NTP_EPOCH_ADJUST;
		let frac = ((d.subsec_nanos() as u64) << 32) / 1_000_000_000;
		Ok(NtpTimestamp::new(sec as u32, frac as u32))
	}

	/// Read a big endian timestamp at `offset` in `buf`.
	fn read(buf: &[u8; MESSAGE_LEN], offset: usize) -> Self {
		let mut b = [0; 8];
		b.copy_from_slice(&buf[offset..offset + 8]);
		Self(u64::from_be_bytes(b))
	}

	/// Read a big endian short timestamp (16.16 fixed point) at `offset` in `buf`.
	fn read_short(buf: &[u8; MESSAGE_LEN], offset: usize) -> Self {
		let mut b = [0; 4];
		b.copy_from_slice(&buf[offset..offset + 4]);
		Self((u32::from_be_bytes(b) as u64) << 16)
	}

	/// Write this timestamp big endian at `offset` in `buf`.
	fn write(self, buf: &mut [u8; MESSAGE_LEN], offset: usize) {
		buf[offset..offset + 8].copy_from_slice(&self.0.to_be_bytes());
	}
}

impl Sub for NtpTimestamp {
	type Output = NtpTimestampDiff;

	fn sub(self, rhs: Self) -> Self::Output {
		// Wrapping sub to enable reinterpretation of overflow as negative numbers
		NtpTimestampDiff(self.0.wrapping_sub(rhs.0) as i64)
	}
}

/// A signed difference between two [`NtpTimestamp`]s, in the same 32.32 fixed point format.
///
/// Differences up to +-68 years are representable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct NtpTimestampDiff(i64);

impl NtpTimestampDiff {
	/// Convert to nanoseconds, rounding towards negative infinity.
	fn nanos(self) -> i64 {
		((self.0 as i128 * 1_000_000_000) >> 32) as i64
	}
}

impl Sub for NtpTimestampDiff {
	type Output = Self;

	fn sub(self, rhs: Self) -> Self::Output {
		// Only meaningless with invalid packets, but must not panic in debug builds either
		Self(self.0.wrapping_sub(rhs.0))
	}
}

/// Build a client request transmitted at `t1`.
fn request(t1: NtpTimestamp) -> [u8; MESSAGE_LEN] {
	let mut buf = [0; MESSAGE_LEN];
	buf[0] = 0x23; // 0x4 (version) << 3 | 0x3 (client mode)
	t1.write(&mut buf, TX_TIME);
	buf
}

/// Compute the clock offset from a server response to a request sent at `t1` and received at `t4`.
///
/// # Errors
///
/// Returns [`io::ErrorKind::InvalidData`] if the response is not a server reply to this request.
fn evaluate(buf: &[u8; MESSAGE_LEN], t1: NtpTimestamp, t4: NtpTimestamp) -> io::Result<ClockOffset> {
	if buf[0] & 0x7 != 4 {
		return Err(io::Error::new(io::ErrorKind::InvalidData, "NTP response is not in server mode"));
	}
	if buf[1] == 0 {
		return Err(io::Error::new(io::ErrorKind::InvalidData, "NTP server sent kiss-of-death"));
	}
	if NtpTimestamp::read(buf, ORIGIN_TIME) != t1 {
		return Err(io::Error::new(io::ErrorKind::InvalidData, "NTP response does not match request"));
	}

	let t2 = NtpTimestamp::read(buf, RX_TIME);
	let t3 = NtpTimestamp::read(buf, TX_TIME);
	let delay = t4 - t1 - (t3 - t2);
	let offset = NtpTimestampDiff(((t2 - t1).0 >> 1).wrapping_add((t3 - t4).0 >> 1));
	let error = delay.0.unsigned_abs()
			  + (NtpTimestamp::read_short(buf, ROOT_DELAY).0 >> 1)
			  + NtpTimestamp::read_short(buf, ROOT_DISPERSION).0;

	Ok(ClockOffset {
		offset_nanos: offset.nanos(),
		error: Duration::from_nanos(NtpTimestampDiff(error as i64).nanos().max(0) as u64)
	})
}

/// A client to query NTP servers, reusing one socket per address family.
struct NtpService {
	/// IPv4 socket, initialized on first use.
	sockv4: Option<UdpSocket>,
	/// IPv6 socket, initialized on first use.
	sockv6: Option<UdpSocket>
}

impl NtpService {
	fn new() -> Self {
		Self { sockv4: None, sockv6: None }
	}

	/// Get the socket for `addr`'s family, binding it on first use.
	fn socket(&mut self, addr: &SocketAddr) -> io::Result<&UdpSocket> {
		let (slot, local): (_, SocketAddr) = if addr.is_ipv4() {
			(&mut self.sockv4, (Ipv4Addr::UNSPECIFIED, 0).into())
		} else {
			(&mut self.sockv6, (Ipv6Addr::UNSPECIFIED, 0).into())
		};
		if slot.is_none() {
			let s = UdpSocket::bind(local)?;
			s.set_read_timeout(Some(TIMEOUT))?;
			s.set_write_timeout(Some(TIMEOUT))?;
			*slot = Some(s);
		}
		slot.as_ref().ok_or_else(|| io::Error::other("NTP socket unavailable"))
	}

	/// Make one request to `addr`.
	fn query_server(&mut self, addr: &SocketAddr) -> io::Result<ClockOffset> {
		let socket = self.socket(addr)?;
		socket.connect(addr)?;

		let t1 = NtpTimestamp::from_system_time(SystemTime::now())?;
		socket.send(&request(t1))?;
		let mut buf = [0; MESSAGE_LEN];
		let bytes = socket.recv(&mut buf)?;
		let t4 = NtpTimestamp::from_system_time(SystemTime::now())?;
		if bytes != MESSAGE_LEN {
			return Err(io::Error::new(io::ErrorKind::InvalidData, "Invalid message returned from NTP server"));
		}
		evaluate(&buf, t1, t4)
	}
}

/// Normalize an address for use by [`ToSocketAddrs::to_socket_addrs`].
///
/// This function adds a default port (123 for NTP) if none is given, and supports domain names and
/// IP addresses (IPv4 and IPv6).
///
/// # Errors
///
/// Returns [`io::Error`] if the `addr` is empty.
fn normalize_address(addr: &str) -> io::Result<String> {
	if addr.is_empty() {
		return Err(io::Error::new(io::ErrorKind::InvalidInput, "Empty SNTP server address"));
	}

	let Some(i) = addr.find(':') else {
		// Host name or IPv4, no port
		return Ok(format!("{}:123", addr));
	};
	if !addr[i + 1..].contains(':') {
		// Host name or IPv4 with port
		return Ok(addr.to_string());
	}
	// IPv6: a port can only follow a closing bracket
	match addr.rfind(']') {
		Some(k) if addr[k..].contains(':') => Ok(addr.to_string()),
		Some(_) => Ok(format!("{}:123", addr)),
		None => Ok(format!("[{}]:123", addr))
	}
}

/// Measure the offset of the system clock against the NTP server at `addr`.
///
/// Makes five requests and returns the one with the smallest error bound. If the address resolves
/// to multiple IPs, up to five different IPs are tried, cycling if fewer than five.
///
/// # Errors
///
/// Returns [`io::Error`] if the address is empty or does not resolve, or if every request failed
/// (the last failure is returned).
pub fn query_offset(addr: &str) -> io::Result<ClockOffset> {
	let addrs: Vec<SocketAddr> = normalize_address(addr)?.to_socket_addrs()?.collect();
	if addrs.is_empty() {
		return Err(io::Error::new(io::ErrorKind::NotFound, "Address did not resolve to any IPs"));
	}

	let mut ntp = NtpService::new();
	let mut best: Option<ClockOffset> = None;
	let mut last_error = None;
	for addr in addrs.iter().cycle().take(REQUESTS) {
		match ntp.query_server(addr) {
			Ok(o) => {
				debug!(%addr, offset_nanos = o.offset_nanos, error = ?o.error, "NTP sample");
				if best.is_none_or(|b| o.error < b.error) {
					best = Some(o);
				}
			},
			Err(e) => {
				debug!(%addr, "NTP request failed: {}", e);
				last_error = Some(e);
			}
		}
	}

	match (best, last_error) {
		(Some(o), _) => Ok(o),
		(None, Some(e)) => Err(e),
		(None, None) => Err(io::Error::other("No NTP requests made"))
	}
}
