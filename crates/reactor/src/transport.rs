// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::os::fd::RawFd;

use crate::{
	backend::Backend,
	io::{Input, Output},
};

/// Transport layer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	/// Made progress (or a subsequent call would).
	Ok,
	/// Peer closed / EOF.
	Close,
	/// Fatal IO error.
	Error,
	/// Arm read edge interest and retry on the next readable edge.
	WantRead,
	/// Arm write edge interest and retry on the next writable edge.
	WantWrite,
}

impl Status {
	pub fn as_str(&self) -> &'static str {
		match self {
			Status::Ok => "ok",
			Status::Close => "close",
			Status::Error => "error",
			Status::WantRead => "want_read",
			Status::WantWrite => "want_write",
		}
	}
}

/// A transport stack (plain, TLS, ...) and the per-connection endpoint it
/// opens over a connected descriptor.
pub trait Transport<B: Backend> {
	type Config: Clone;
	type Endpoint: Endpoint<B>;

	/// One-shot endpoint construction. `None` is surfaced by the state
	/// machine as an error transition without endpoint teardown.
	fn open(fd: RawFd, config: &Self::Config) -> Option<Self::Endpoint>;
}

/// Per-connection transport state.
///
/// `handshake_step` and `shutdown_step` are optional capabilities; the state
/// machine consults the `HAS_*` consts and skips the corresponding states
/// when a transport does not declare them.
pub trait Endpoint<B: Backend> {
	const HAS_HANDSHAKE: bool = false;
	const HAS_SHUTDOWN: bool = false;

	/// Called repeatedly from the `Transport` state until it returns
	/// [`Status::Ok`].
	fn handshake_step(&mut self, _net: &B) -> Status {
		Status::Ok
	}

	/// Reads zero or more bytes into `rx`, advancing `wrote`. Must return
	/// [`Status::Ok`] iff at least one byte was written or a subsequent
	/// call would make progress.
	fn read(&mut self, net: &B, rx: Output<'_>) -> Status;

	/// Writes from `tx`, advancing `read`. A well-behaved endpoint consumes
	/// at least one byte per [`Status::Ok`].
	fn write(&mut self, net: &B, tx: Input<'_>) -> Status;

	/// Called repeatedly in `CloseTransport` until `Ok` (clean) or a
	/// non-ok terminal status.
	fn shutdown_step(&mut self, _net: &B) -> Status {
		Status::Ok
	}

	/// Releases transport resources. The descriptor is owned and closed by
	/// the connection, not the endpoint.
	fn destroy(&mut self) {}
}
