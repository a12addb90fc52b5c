// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::{cell::RefCell, collections::VecDeque, os::fd::RawFd, rc::Rc};

use reifydb_reactor::{
	backend::Backend,
	io::{Input, Output},
	transport::{Endpoint, Status, Transport},
};

/// Deque-driven transport script. Empty deques fall back to permissive
/// defaults: handshake/shutdown succeed immediately, reads report EOF,
/// writes accept and record everything.
#[derive(Default)]
pub struct TransportScript {
	pub handshake_results: VecDeque<Status>,

	pub read_fragments: VecDeque<Vec<u8>>,
	pub read_status: VecDeque<Status>,

	pub write_status: VecDeque<Status>,

	/// Everything the state machine wrote through this endpoint.
	pub output: Vec<u8>,

	pub shutdown_results: VecDeque<Status>,
}

/// Transport whose endpoint replays a shared [`TransportScript`].
pub struct ScriptedTransport;

pub struct ScriptedEndpoint {
	script: Rc<RefCell<TransportScript>>,
}

impl<B: Backend> Transport<B> for ScriptedTransport {
	type Config = Rc<RefCell<TransportScript>>;
	type Endpoint = ScriptedEndpoint;

	fn open(_fd: RawFd, config: &Self::Config) -> Option<ScriptedEndpoint> {
		Some(ScriptedEndpoint {
			script: Rc::clone(config),
		})
	}
}

impl<B: Backend> Endpoint<B> for ScriptedEndpoint {
	const HAS_HANDSHAKE: bool = true;
	const HAS_SHUTDOWN: bool = true;

	fn handshake_step(&mut self, _net: &B) -> Status {
		let mut script = self.script.borrow_mut();

		// default: no handshake
		script.handshake_results.pop_front().unwrap_or(Status::Ok)
	}

	fn read(&mut self, _net: &B, mut rx: Output<'_>) -> Status {
		let mut script = self.script.borrow_mut();

		// default: EOF
		let Some(status) = script.read_status.pop_front() else {
			return Status::Close;
		};

		if status == Status::Ok {
			let Some(chunk) = script.read_fragments.front_mut() else {
				// script bug
				return Status::Error;
			};

			let n = chunk.len().min(rx.wbuf().len());
			rx.wbuf()[..n].copy_from_slice(&chunk[..n]);
			rx.wrote(n);

			chunk.drain(..n);
			if chunk.is_empty() {
				script.read_fragments.pop_front();
			}
		}

		status
	}

	fn write(&mut self, _net: &B, mut tx: Input<'_>) -> Status {
		let mut script = self.script.borrow_mut();

		// default: accept and record everything
		let Some(status) = script.write_status.pop_front() else {
			let len = tx.rbuf().len();
			let taken = tx.rbuf().to_vec();
			script.output.extend_from_slice(&taken);
			tx.read(len);
			return Status::Ok;
		};

		if status == Status::Ok {
			let len = tx.rbuf().len();
			let taken = tx.rbuf().to_vec();
			script.output.extend_from_slice(&taken);
			tx.read(len);
		}

		status
	}

	fn shutdown_step(&mut self, _net: &B) -> Status {
		let mut script = self.script.borrow_mut();

		script.shutdown_results.pop_front().unwrap_or(Status::Ok)
	}
}

/// Script that delivers `fragments` with one `Ok` each, then EOF, with
/// optional handshake/write/shutdown overrides.
pub fn happypath(
	fragments: &[&[u8]],
	handshake: &[Status],
	write_status: &[Status],
	shutdown: &[Status],
) -> TransportScript {
	let mut script = TransportScript::default();

	script.handshake_results.extend(handshake.iter().copied());

	for fragment in fragments {
		script.read_fragments.push_back(fragment.to_vec());

		// each fragment is delivered by one Ok read
		script.read_status.push_back(Status::Ok);
	}

	// EOF
	script.read_status.push_back(Status::Close);

	script.write_status.extend(write_status.iter().copied());
	script.shutdown_results.extend(shutdown.iter().copied());

	script
}
