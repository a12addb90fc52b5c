// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::{cell::Cell, rc::Rc};

use reifydb_reactor::{
	backend::{Backend, Token},
	connection::{Conn, Connection},
	io::{Io, Output},
	protocol::{Session, Status},
	reactor::Reactor,
};
use reifydb_testing::{
	FdAction::{GrantRead as R, GrantWrite as W},
	FdScript, TestNet,
};
use reifydb_transport::Plain;

/// Counts session constructions so restarts become observable.
struct CountingSession {
	_created: usize,
}

impl Session for CountingSession {
	type Config = Rc<Cell<usize>>;

	fn create(_host: &str, _port: u16, config: &Self::Config) -> Self {
		config.set(config.get() + 1);
		CountingSession {
			_created: config.get(),
		}
	}

	fn on_data(&mut self, io: &mut Io<'_>) -> Status {
		// consume silently, then ask for close
		let len = io.rx.rbuf().len();
		io.rx.read(len);
		Status::Close
	}
}

/// Counts graceful shutdown invocations.
struct ShutdownCountSession {
	calls: Rc<Cell<usize>>,
}

impl Session for ShutdownCountSession {
	type Config = Rc<Cell<usize>>;

	const HAS_SHUTDOWN: bool = true;

	fn create(_host: &str, _port: u16, config: &Self::Config) -> Self {
		ShutdownCountSession {
			calls: Rc::clone(config),
		}
	}

	fn on_data(&mut self, io: &mut Io<'_>) -> Status {
		let len = io.rx.rbuf().len();
		io.rx.read(len);
		Status::Ok
	}

	fn on_shutdown(&mut self, _io: &mut Io<'_>) -> Status {
		self.calls.set(self.calls.get() + 1);
		Status::Close
	}
}

/// Emits a beat into TX on every heartbeat tick.
struct HeartbeatSession;

impl Session for HeartbeatSession {
	type Config = ();

	const HAS_HEARTBEAT: bool = true;

	fn create(_host: &str, _port: u16, _config: &()) -> Self {
		HeartbeatSession
	}

	fn on_data(&mut self, io: &mut Io<'_>) -> Status {
		let len = io.rx.rbuf().len();
		io.rx.read(len);
		Status::Ok
	}

	fn heartbeat(&mut self, tx: &mut Output<'_>) {
		tx.wbuf()[..2].copy_from_slice(b"hb");
		tx.wrote(2);
	}
}

fn idle_script(polls: usize) -> FdScript {
	FdScript {
		actions: (0..polls).map(|_| W(0)).collect(),
		input: Vec::new(),
		connect_async: false,
		..FdScript::default()
	}
}

#[test]
fn signal_fans_out_stop_and_terminates() {
	let calls = Rc::new(Cell::new(0));

	let net = TestNet::new([idle_script(100)]);
	net.signal();

	let conn: Connection<TestNet, Plain, ShutdownCountSession> =
		Connection::new("localhost", 101, (), Rc::clone(&calls));

	let mut reactor = Reactor::new(net, vec![Box::new(conn)]);
	reactor.run().expect("reactor run");

	// one signal suffices; stop drove the graceful shutdown exactly once
	assert_eq!(calls.get(), 1);
}

#[test]
fn closed_connection_is_restarted() {
	let created = Rc::new(Cell::new(0));

	let close_script = FdScript {
		actions: [R(1), W(4)].into(),
		input: b"x".to_vec(),
		connect_async: false,
		..FdScript::default()
	};

	// the restarted connection dials again and lands on the second script
	let net = TestNet::new([close_script, idle_script(3)]);

	let conn: Connection<TestNet, Plain, CountingSession> = Connection::new("localhost", 101, (), Rc::clone(&created));

	let mut reactor = Reactor::new(net, vec![Box::new(conn)]);
	reactor.run().expect("reactor run");

	// initial session plus one rebuild on restart
	assert_eq!(created.get(), 2);
}

#[test]
fn failed_dial_never_restarts() {
	let created = Rc::new(Cell::new(0));

	// no scripts: socket creation fails, the connection errors out
	let net = TestNet::new([]);

	let conn: Connection<TestNet, Plain, CountingSession> = Connection::new("localhost", 101, (), Rc::clone(&created));

	let mut reactor = Reactor::new(net, vec![Box::new(conn)]);
	reactor.run().expect("reactor run");

	assert_eq!(created.get(), 1);
}

#[test]
fn heartbeat_reaches_protocol_sessions() {
	// enough idle polls to pass the 64-tick heartbeat, then quota to flush
	let mut script = idle_script(70);
	script.actions.push_back(W(2));

	let net = TestNet::new([script]);

	let conn: Connection<TestNet, Plain, HeartbeatSession> = Connection::new("localhost", 101, (), ());

	let mut reactor = Reactor::new(net, vec![Box::new(conn)]);

	reactor.run().expect("reactor run");

	assert_eq!(reactor.net().output(0), b"hb");
}

#[test]
fn stop_is_idempotent() {
	let net = TestNet::new([FdScript {
		connect_async: true,
		..FdScript::default()
	}]);

	let mut conn: Connection<TestNet, Plain, HeartbeatSession> = Connection::new("localhost", 101, (), ());
	conn.attach(&net, Token(0));

	// stop from InProgress closes cleanly; a second stop is a no-op
	conn.stop(&net);
	assert!(conn.closed());

	conn.stop(&net);
	assert!(conn.closed());
}

#[test]
fn restart_requires_closed() {
	// dial fails outright: Error, which restart must refuse to revive
	let net = TestNet::new([]);

	let mut conn: Connection<TestNet, Plain, HeartbeatSession> = Connection::new("localhost", 101, (), ());
	conn.attach(&net, Token(0));

	assert!(conn.done());
	assert!(!conn.closed());

	conn.restart(&net);

	assert!(conn.done());
	assert!(!conn.closed());
}
