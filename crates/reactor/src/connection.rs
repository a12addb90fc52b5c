// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::os::fd::RawFd;

use tracing::{error, info, trace};

use crate::{
	backend::{Backend, Event, Token},
	buffer::Buffer,
	dial::{dial, Dial},
	io::{Input, Io, Output, RX_CAP, TX_CAP},
	protocol::{self, Session},
	transport::{self, Endpoint, Transport},
};

/// Per-connection configuration. The connection keeps the transport and
/// protocol parts so the session can be rebuilt on restart.
#[derive(Clone)]
pub struct ConnectionConfig<TC, PC> {
	pub host: String,
	pub port: u16,
	pub transport: TC,
	pub protocol: PC,
}

/// Type-erased connection interface.
///
/// Hides the concrete `<Transport, Session>` pair so a reactor can own a
/// heterogeneous, statically sized set of connections.
pub trait Conn<B: Backend> {
	/// Installs the routing token and performs the first dial. Must be
	/// called exactly once before `handle_event`.
	fn attach(&mut self, net: &B, token: Token);

	/// Steps the state machine with a new edge event.
	fn handle_event(&mut self, net: &B, ev: &Event);

	/// Periodic tick; forwarded to the session only in the protocol state.
	fn heartbeat(&mut self, net: &B);

	/// Triggers graceful shutdown.
	fn stop(&mut self, net: &B);

	/// Tears down and dials again. Only takes effect when `closed()`;
	/// connections that ended in error stay down.
	fn restart(&mut self, net: &B);

	fn closed(&self) -> bool;

	fn done(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	/// Transient: about to dial.
	Uninit,
	/// Socket created; waiting for the writable edge that completes an
	/// asynchronous connect.
	InProgress,
	/// Transport handshake in progress.
	Transport,
	/// Normal operation: drain RX into the session, flush TX.
	Protocol,
	/// Graceful protocol shutdown while still reading.
	CloseProtocol,
	/// Protocol finished: empty RX, flush TX, then close the transport.
	DrainProtocol,
	/// Transport shutdown handshake.
	CloseTransport,
	/// Clean end; eligible for restart.
	Closed,
	/// Unclean end; never restarted.
	Error,
}

impl State {
	fn as_str(&self) -> &'static str {
		match self {
			State::Uninit => "uninit",
			State::InProgress => "in_progress",
			State::Transport => "transport",
			State::Protocol => "protocol",
			State::CloseProtocol => "close_protocol",
			State::DrainProtocol => "drain_protocol",
			State::CloseTransport => "close_transport",
			State::Closed => "closed",
			State::Error => "error",
		}
	}
}

/// Which consumer runs when the read pump delivers fresh RX bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
enum ReadMode {
	Protocol,
	CloseProtocol,
	Drain,
}

enum Handler {
	OnConnect,
	OnData,
}

/// Edge-triggered, non-blocking connection state machine over three layers:
///
/// - network: descriptors and event demultiplexing,
/// - transport: IO plus optional handshake/shutdown,
/// - protocol: frame handling plus optional connect/heartbeat/shutdown.
///
/// Gracefully closed connections restart from the stored configuration; an
/// error state is terminal.
pub struct Connection<B: Backend, T: Transport<B>, S: Session> {
	host: String,
	port: u16,

	rx: Buffer,
	tx: Buffer,

	endpoint: Option<T::Endpoint>,
	session: S,

	transport_config: T::Config,
	protocol_config: S::Config,

	token: Option<Token>,
	fd: Option<RawFd>,
	state: State,
}

impl<B: Backend, T: Transport<B>, S: Session> Connection<B, T, S> {
	pub fn new(host: impl Into<String>, port: u16, transport_config: T::Config, protocol_config: S::Config) -> Self {
		let host = host.into();
		let session = S::create(&host, port, &protocol_config);

		Self {
			host,
			port,
			rx: Buffer::new(RX_CAP),
			tx: Buffer::new(TX_CAP),
			endpoint: None,
			session,
			transport_config,
			protocol_config,
			token: None,
			fd: None,
			state: State::Uninit,
		}
	}

	pub fn from_config(config: ConnectionConfig<T::Config, S::Config>) -> Self {
		Self::new(config.host, config.port, config.transport, config.protocol)
	}

	/// Runs the machine until the state stabilizes or the current event is
	/// exhausted.
	fn steps(&mut self, net: &B, ev: Option<&Event>) {
		loop {
			let before = self.state;

			match before {
				// transient: attach/restart transition out immediately
				State::Uninit => return,
				State::InProgress => {
					let Some(ev) = ev else {
						return;
					};
					self.step_in_progress(net, ev);
				}
				State::Transport => self.step_transport(net),
				State::Protocol => {
					let Some(ev) = ev else {
						return;
					};
					self.step_protocol(net, ev);
				}
				State::CloseProtocol => {
					let Some(ev) = ev else {
						return;
					};
					self.step_close_protocol(net, ev);
				}
				State::DrainProtocol => self.step_drain_protocol(net, ev),
				State::CloseTransport => self.step_close_transport(net),
				State::Closed | State::Error => return,
			}

			if self.state == before {
				return;
			}
		}
	}

	fn enter_uninit(&mut self, net: &B) {
		self.state = State::Uninit;

		self.rx.clear();
		self.tx.clear();

		let Some(token) = self.token else {
			return;
		};

		match dial(net, &self.host, self.port) {
			Ok(Dial {
				fd,
				pending: true,
			}) => {
				// next event will be writable
				self.fd = Some(fd);
				self.state = State::InProgress;
				net.subscribe(token, fd, false, true);
			}
			Ok(Dial {
				fd,
				pending: false,
			}) => {
				// dial completed synchronously; kick the machine off
				self.fd = Some(fd);
				self.enter_connected(net);
				self.steps(net, None);
			}
			Err(e) => {
				error!(host = %self.host, port = self.port, error = %e, "dial failed");
				self.fd = None;
				self.state = State::Error;
			}
		}
	}

	fn enter_connected(&mut self, net: &B) {
		let Some(fd) = self.fd else {
			self.state = State::Error;
			return;
		};

		match T::open(fd, &self.transport_config) {
			Some(endpoint) => self.endpoint = Some(endpoint),
			None => {
				// error transition, but there is no endpoint to
				// destroy
				self.state = State::Error;
				self.session.teardown();
				net.clear(fd);
				net.close(fd);
				self.fd = None;
				return;
			}
		}

		if T::Endpoint::HAS_HANDSHAKE {
			// let step_transport continue
			self.state = State::Transport;
		} else if let Some(token) = self.token {
			net.subscribe(token, fd, true, false);
			self.enter_protocol(net);
		}
	}

	fn enter_protocol(&mut self, net: &B) {
		self.state = State::Protocol;

		if S::HAS_ON_CONNECT {
			self.bind_protocol(net, Handler::OnConnect);
		} else {
			self.transport_write(net, true);
		}
	}

	fn enter_close_protocol(&mut self, net: &B) {
		if !S::HAS_SHUTDOWN {
			self.enter_close_transport();
			return;
		}

		self.state = State::CloseProtocol;

		loop {
			let before = self.rx.rbuf().len();

			let status = self.session.on_shutdown(&mut Io {
				rx: Input(&mut self.rx),
				tx: Output(&mut self.tx),
			});

			match status {
				protocol::Status::Ok => {
					self.transport_write(net, true);
					if self.state != State::CloseProtocol {
						return; // done/error
					}
					if before <= self.rx.rbuf().len() {
						return; // no progress
					}
				}
				protocol::Status::Close => {
					// protocol shutdown done: drain tx
					self.state = State::DrainProtocol;
					return;
				}
				protocol::Status::Error => {
					self.enter_error(net);
					return;
				}
			}
		}
	}

	fn enter_close_transport(&mut self) {
		self.state = State::CloseTransport;
	}

	fn enter_error(&mut self, net: &B) {
		self.state = State::Error;
		self.teardown(net);
	}

	fn enter_closed(&mut self, net: &B) {
		self.state = State::Closed;
		self.teardown(net);
	}

	fn step_in_progress(&mut self, net: &B, ev: &Event) {
		let Some(fd) = self.fd else {
			self.enter_error(net);
			return;
		};

		if ev.writable {
			match net.take_error(fd) {
				Ok(None) => {
					info!(host = %self.host, port = self.port, fd, "connected");
					self.enter_connected(net);
				}
				Ok(Some(err)) => {
					error!(host = %self.host, fd, error = %err, "connect failed");
					self.enter_error(net);
				}
				Err(e) => {
					error!(host = %self.host, fd, error = %e, "SO_ERROR fetch failed");
					self.enter_error(net);
				}
			}
		} else if ev.error || ev.closed {
			self.enter_error(net);
		}
	}

	fn step_transport(&mut self, net: &B) {
		let Some(endpoint) = self.endpoint.as_mut() else {
			self.enter_error(net);
			return;
		};

		match endpoint.handshake_step(net) {
			transport::Status::Ok => self.enter_protocol(net),
			// peer rejected the handshake
			transport::Status::Close => self.enter_error(net),
			status => self.arm(net, status),
		}
	}

	fn step_protocol(&mut self, net: &B, ev: &Event) {
		if ev.readable {
			// keep reading from the transport while the session stays
			// in the protocol state
			self.transport_read(net, ReadMode::Protocol);
		}

		if ev.writable {
			self.transport_write(net, true);
		}
	}

	fn step_close_protocol(&mut self, net: &B, ev: &Event) {
		if ev.readable {
			self.transport_read(net, ReadMode::CloseProtocol);
		}

		if ev.writable {
			self.transport_write(net, true);
		}
	}

	fn step_drain_protocol(&mut self, net: &B, ev: Option<&Event>) {
		if let Some(ev) = ev {
			if ev.readable {
				// drain rx and ignore incoming data
				self.transport_read(net, ReadMode::Drain);
				self.rx.clear();
			}
		}

		if self.transport_write(net, false) {
			self.enter_close_transport();
		}
	}

	fn step_close_transport(&mut self, net: &B) {
		if !T::Endpoint::HAS_SHUTDOWN {
			self.enter_closed(net);
			return;
		}

		let Some(endpoint) = self.endpoint.as_mut() else {
			self.enter_error(net);
			return;
		};

		match endpoint.shutdown_step(net) {
			transport::Status::Ok => self.enter_closed(net),
			transport::Status::Close | transport::Status::Error => self.enter_error(net),
			status => self.arm(net, status),
		}
	}

	/// Re-subscribes with exactly the edge interest the machine needs next.
	fn arm(&mut self, net: &B, status: transport::Status) {
		let (Some(token), Some(fd)) = (self.token, self.fd) else {
			return;
		};

		match status {
			transport::Status::WantRead => {
				net.subscribe(token, fd, true, !self.tx.rbuf().is_empty());
			}
			transport::Status::WantWrite => {
				let want_read = matches!(self.state, State::Protocol | State::CloseProtocol);
				net.subscribe(token, fd, want_read, true);
			}
			transport::Status::Error => self.enter_error(net),
			// handled by the caller
			_ => {}
		}
	}

	/// Invokes a session handler and maps its status onto the machine.
	fn bind_protocol(&mut self, net: &B, handler: Handler) {
		let mut io = Io {
			rx: Input(&mut self.rx),
			tx: Output(&mut self.tx),
		};

		let status = match handler {
			Handler::OnConnect => self.session.on_connect(&mut io),
			Handler::OnData => self.session.on_data(&mut io),
		};

		match status {
			protocol::Status::Ok => {
				self.transport_write(net, true);
			}
			protocol::Status::Close => {
				self.transport_write(net, true);

				if S::HAS_SHUTDOWN {
					if self.state == State::Protocol {
						self.enter_close_protocol(net);
					} else {
						self.enter_close_transport();
					}
				} else if self.transport_write(net, true) {
					self.enter_close_transport();
				} else {
					self.state = State::DrainProtocol;
				}
			}
			protocol::Status::Error => self.enter_error(net),
		}
	}

	/// Feeds buffered RX bytes to `on_data` until the session leaves the
	/// protocol state or stops consuming.
	fn protocol_consume(&mut self, net: &B) {
		loop {
			let before = self.rx.rbuf().len();
			if before == 0 {
				return;
			}

			self.bind_protocol(net, Handler::OnData);

			// session changed state -> done
			if self.state != State::Protocol {
				return;
			}

			// no progress -> done
			if before <= self.rx.rbuf().len() {
				return;
			}
		}
	}

	/// Consumes freshly read RX bytes according to `mode`. Returns whether
	/// the read pump should keep draining.
	fn consume(&mut self, net: &B, mode: ReadMode) -> bool {
		match mode {
			ReadMode::Protocol => {
				self.protocol_consume(net);
				self.state == State::Protocol
			}
			ReadMode::CloseProtocol => {
				if !S::HAS_SHUTDOWN {
					self.state = State::DrainProtocol;
					return false;
				}

				// call on_shutdown repeatedly in case of multiple
				// buffered frames
				loop {
					let before = self.rx.rbuf().len();

					let status = self.session.on_shutdown(&mut Io {
						rx: Input(&mut self.rx),
						tx: Output(&mut self.tx),
					});

					match status {
						protocol::Status::Ok => {
							self.transport_write(net, true);
							// early done:
							if self.state != State::CloseProtocol {
								return false;
							}
							// no progress -> keep draining,
							// arming happens in the pump
							if before <= self.rx.rbuf().len() {
								return true;
							}
						}
						protocol::Status::Close => {
							self.state = State::DrainProtocol;
							return false;
						}
						protocol::Status::Error => {
							self.enter_error(net);
							return false;
						}
					}
				}
			}
			ReadMode::Drain => {
				self.rx.clear();
				true
			}
		}
	}

	/// Edge-triggered read pump: drains the transport into RX until it
	/// reports `want_*`, close, or error, consuming after every chunk.
	fn transport_read(&mut self, net: &B, mode: ReadMode) {
		loop {
			if self.rx.full() {
				error!(fd = self.fd, cap = RX_CAP, "rx buffer overflow");
				self.enter_error(net);
				return;
			}

			let before = self.rx.rbuf().len();

			let status = {
				let Some(endpoint) = self.endpoint.as_mut() else {
					self.enter_error(net);
					return;
				};
				endpoint.read(net, Output(&mut self.rx))
			};

			if self.rx.rbuf().len() != before && !self.consume(net, mode) {
				return;
			}

			match status {
				// keep draining until want_read/close/error
				transport::Status::Ok => continue,
				transport::Status::Close => {
					if mode != ReadMode::Drain {
						self.enter_close_transport();
					}
					return;
				}
				transport::Status::WantRead | transport::Status::WantWrite => {
					self.arm(net, status);
					return;
				}
				transport::Status::Error => {
					self.enter_error(net);
					return;
				}
			}
		}
	}

	/// Flushes TX through the transport. Returns whether TX is empty.
	///
	/// With `re_arm`, a fully flushed TX in the protocol states
	/// re-subscribes read-only interest.
	fn transport_write(&mut self, net: &B, re_arm: bool) -> bool {
		while self.fd.is_some() && !self.tx.rbuf().is_empty() {
			let before = self.tx.rbuf().len();

			let status = {
				let Some(endpoint) = self.endpoint.as_mut() else {
					self.enter_error(net);
					return false;
				};
				endpoint.write(net, Input(&mut self.tx))
			};

			if status == transport::Status::Close && self.state != State::Error {
				self.enter_close_transport();
				return false;
			} else if status != transport::Status::Ok {
				self.arm(net, status);
				return false;
			}

			if self.tx.rbuf().len() == before {
				// ok without consuming a byte: treat as
				// backpressure instead of spinning
				self.arm(net, transport::Status::WantWrite);
				return false;
			}
		}

		if re_arm && matches!(self.state, State::Protocol | State::CloseProtocol) {
			if let (Some(token), Some(fd)) = (self.token, self.fd) {
				net.subscribe(token, fd, true, false);
			}
		}

		true
	}

	fn teardown(&mut self, net: &B) {
		if let Some(fd) = self.fd.take() {
			self.session.teardown();

			if let Some(mut endpoint) = self.endpoint.take() {
				endpoint.destroy();
			}

			net.clear(fd);
			net.close(fd);
		}
	}
}

impl<B: Backend, T: Transport<B>, S: Session> Conn<B> for Connection<B, T, S> {
	fn attach(&mut self, net: &B, token: Token) {
		if self.token.is_some() {
			error!(fd = self.fd, token = token.0, "already attached");
			return;
		}

		self.token = Some(token);

		// kick off the connection
		self.enter_uninit(net);
	}

	fn handle_event(&mut self, net: &B, ev: &Event) {
		trace!(
			fd = self.fd,
			state = self.state.as_str(),
			signal = ev.signal,
			closed = ev.closed,
			error = ev.error,
			readable = ev.readable,
			writable = ev.writable,
			"handle_event"
		);

		self.steps(net, Some(ev));
	}

	fn heartbeat(&mut self, net: &B) {
		if S::HAS_HEARTBEAT && self.state == State::Protocol {
			self.session.heartbeat(&mut Output(&mut self.tx));
			self.transport_write(net, true);
		}
	}

	fn stop(&mut self, net: &B) {
		match self.state {
			State::Uninit | State::InProgress => self.enter_closed(net),
			State::Transport => self.enter_close_transport(),
			State::Protocol => self.enter_close_protocol(net),
			_ => {}
		}

		self.steps(net, None);
	}

	fn restart(&mut self, net: &B) {
		if !self.closed() {
			return;
		}

		self.teardown(net);

		self.session = S::create(&self.host, self.port, &self.protocol_config);

		self.enter_uninit(net);
	}

	fn closed(&self) -> bool {
		self.state == State::Closed
	}

	fn done(&self) -> bool {
		matches!(self.state, State::Closed | State::Error)
	}
}
