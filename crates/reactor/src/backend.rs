// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::{io, net::SocketAddr, os::fd::RawFd};

/// Cookie installed by [`Connection::attach`] and echoed back on every event
/// so the reactor can route readiness to the owning connection.
///
/// [`Connection::attach`]: crate::connection::Connection::attach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub usize);

/// A single readiness edge delivered by [`Backend::poll`].
///
/// Backends translate their native event type into this classification;
/// `signal` events carry no token.
#[derive(Debug, Clone, Copy, Default)]
pub struct Event {
	pub token: Token,
	pub readable: bool,
	pub writable: bool,
	pub error: bool,
	pub closed: bool,
	pub signal: bool,
}

impl Default for Token {
	fn default() -> Self {
		Token(usize::MAX)
	}
}

/// Network backend contract: non-blocking sockets plus edge-triggered event
/// demultiplexing.
///
/// All descriptor operations follow POSIX semantics surfaced through
/// `io::Result`: `WouldBlock` where the call would block, `Interrupted` for
/// EINTR, `Ok(0)` from `read` for EOF. `connect` reports an in-flight
/// asynchronous connect with raw os error `EINPROGRESS`.
///
/// Edge-triggered means a given readiness fires once per level transition;
/// consumers must drain until `WouldBlock` and then re-arm via `subscribe`.
pub trait Backend {
	const NAME: &'static str;

	/// Creates a non-blocking TCP stream socket.
	fn socket(&self) -> io::Result<RawFd>;

	fn connect(&self, fd: RawFd, addr: &SocketAddr) -> io::Result<()>;

	/// Fetches and clears the pending socket error (`SO_ERROR`).
	fn take_error(&self, fd: RawFd) -> io::Result<Option<io::Error>>;

	fn read(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize>;

	fn write(&self, fd: RawFd, buf: &[u8]) -> io::Result<usize>;

	fn close(&self, fd: RawFd);

	/// Atomically (re-)arms edge interest for `fd`. A prior subscription is
	/// replaced, never merged; at least one of `want_read`/`want_write`
	/// must be set.
	fn subscribe(&self, token: Token, fd: RawFd, want_read: bool, want_write: bool);

	/// Removes every subscription for `fd`.
	fn clear(&self, fd: RawFd);

	/// Blocks up to ~100 ms and appends readiness events to `events`.
	///
	/// `Interrupted` polls yield zero events instead of an error.
	fn poll(&mut self, events: &mut Vec<Event>) -> io::Result<()>;

	/// Posts a wake observable as exactly one `signal` event by the next
	/// poll. Callable from any thread.
	fn signal(&self);

	/// Terminates the reactor loop driving this backend.
	fn stop(&self);

	fn stopped(&self) -> bool;
}
