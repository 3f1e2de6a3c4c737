//! Error types for the encoder, engine, tick thread and coordinator.

use std::io;
use thiserror::Error;

/// Errors from [`TransmissionEngine`](crate::TransmissionEngine) ownership transitions.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
	#[error("transmission in progress")]
	Busy,
	#[error("no frames sealed since the last transmission")]
	NotSealed
}

/// Errors from a [`TimeSource`](crate::TimeSource).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeSourceError {
	#[error("time unavailable: {0}")]
	Unavailable(String)
}

/// Errors from a single [`Coordinator`](crate::Coordinator) cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
	#[error(transparent)]
	Time(#[from] TimeSourceError),
	#[error(transparent)]
	Engine(#[from] EngineError)
}

/// Errors from starting a [`Ticker`](crate::Ticker).
#[derive(Error, Debug)]
pub enum TickerError {
	#[error("failed to spawn tick thread: {0}")]
	Spawn(#[source] io::Error),
	#[error("failed to raise tick thread priority: {0}")]
	Priority(#[source] io::Error)
}

/// Reasons a [`Frame`](crate::Frame) does not decode to a valid time.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
	#[error("slot 59 is not a minute mark")]
	MissingMinuteMark,
	#[error("unexpected gap at slot {0}")]
	UnexpectedGap(usize),
	#[error("start of time bit not set")]
	TimeNotValid,
	#[error("{0} parity mismatch")]
	Parity(&'static str)
}
