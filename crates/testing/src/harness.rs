// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::collections::VecDeque;

use reifydb_reactor::{
	backend::{Backend, Token},
	connection::{Conn, Connection},
	protocol::Session,
	transport::Transport,
};

use crate::net::{FdAction, FdScript, Sentinel, TestNet};

/// Observable results of a scripted single-connection run.
pub struct Outputs {
	/// Bytes the connection wrote to the backend descriptor. Runs over
	/// [`crate::transport::ScriptedTransport`] capture output in the
	/// transport script instead.
	pub output: Vec<u8>,
	/// One entry per restart the reactor would have performed; restarts
	/// are recorded, not executed, so terminal states stay observable.
	pub restarts: Vec<usize>,
	pub all_done: bool,
}

/// Drives one connection over [`TestNet`] until the script runs out.
///
/// Mirrors the production reactor loop except that a `closed()` connection
/// is recorded instead of restarted.
pub fn run_single<T, S>(
	connect_async: bool,
	input: &[u8],
	actions: impl Into<VecDeque<FdAction>>,
	transport_config: T::Config,
	protocol_config: S::Config,
) -> Outputs
where
	T: Transport<TestNet>,
	S: Session,
{
	let script = FdScript {
		actions: actions.into(),
		sentinel: Sentinel::Hup,
		input: input.to_vec(),
		connect_async,
	};

	let mut net = TestNet::new([script]);

	let mut conn: Connection<TestNet, T, S> = Connection::new("localhost", 101, transport_config, protocol_config);
	conn.attach(&net, Token(0));

	let mut restarts = Vec::new();
	let mut events = Vec::new();

	while !net.stopped() {
		net.poll(&mut events).expect("test poll");

		for ev in &events {
			if ev.signal {
				continue;
			}

			if !conn.done() {
				conn.handle_event(&net, ev);

				if conn.closed() {
					restarts.push(0);
				}
			}
		}
	}

	Outputs {
		output: net.output(0),
		restarts,
		all_done: conn.done(),
	}
}

/// Grants a read and a write quota per fragment, the scripting shorthand
/// used by the close/echo suites.
pub fn gen_script(inputs: &[&[u8]]) -> VecDeque<FdAction> {
	let mut script = VecDeque::new();

	for input in inputs {
		script.push_back(FdAction::GrantRead(input.len()));
		script.push_back(FdAction::GrantWrite(input.len()));
	}

	script
}
