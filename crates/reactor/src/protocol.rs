// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use crate::io::{Io, Output};

/// Protocol layer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	Ok,
	/// Initiate graceful protocol shutdown.
	Close,
	/// Fatal protocol violation.
	Error,
}

/// Per-connection protocol state, rebuilt from the stored config on every
/// restart.
///
/// `on_data` is the only required operation. The optional operations are
/// capability-gated: the state machine dispatches them only when the
/// matching `HAS_*` const is set, so a default body is never reached through
/// the machine.
pub trait Session {
	type Config: Clone;

	const HAS_ON_CONNECT: bool = false;
	const HAS_SHUTDOWN: bool = false;
	const HAS_HEARTBEAT: bool = false;

	fn create(host: &str, port: u16, config: &Self::Config) -> Self;

	/// Consumes buffered RX bytes and produces TX bytes. Returning `Ok`
	/// without consuming means "need more input".
	fn on_data(&mut self, io: &mut Io<'_>) -> Status;

	/// Called once on entering the protocol state; typically writes a
	/// handshake request into TX.
	fn on_connect(&mut self, _io: &mut Io<'_>) -> Status {
		Status::Ok
	}

	/// Drives graceful teardown while still reading; called repeatedly
	/// until it returns [`Status::Close`].
	fn on_shutdown(&mut self, _io: &mut Io<'_>) -> Status {
		Status::Close
	}

	/// Periodic tick, delivered only while the connection is in the
	/// protocol state.
	fn heartbeat(&mut self, _tx: &mut Output<'_>) {}

	/// Releases session-owned resources before the descriptor closes.
	fn teardown(&mut self) {}
}
