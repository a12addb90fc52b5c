// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::{
	cell::RefCell,
	collections::{BTreeMap, VecDeque},
	io,
	net::SocketAddr,
	os::fd::RawFd,
};

use reifydb_reactor::backend::{Backend, Event, Token};

/// One scripted poll step: grant read or write quota to the descriptor.
#[derive(Debug, Clone, Copy)]
pub enum FdAction {
	GrantRead(usize),
	GrantWrite(usize),
}

/// How a descriptor ends once its action script is exhausted.
#[derive(Debug, Clone, Copy, Default)]
pub enum Sentinel {
	ConnReset,
	#[default]
	Hup,
}

/// Script attached to the next socket the backend hands out.
#[derive(Debug, Clone, Default)]
pub struct FdScript {
	pub actions: VecDeque<FdAction>,
	pub sentinel: Sentinel,
	/// Bytes the peer will send, metered by read quota.
	pub input: Vec<u8>,
	pub connect_async: bool,
}

#[derive(Default)]
struct FdState {
	token: Option<Token>,

	want_read: bool,
	want_write: bool,

	connected: bool,
	hup: bool,
	err: bool,

	delivered_hup: bool,
	delivered_err: bool,

	rquota: usize,
	wquota: usize,

	winprogress: bool,

	prev_read_ready: bool,
	prev_write_ready: bool,

	script: FdScript,
	input_pos: usize,
}

#[derive(Default)]
struct Inner {
	alive: bool,
	scripts: VecDeque<FdScript>,
	next_fd: RawFd,
	signals: usize,
	sockets: BTreeMap<RawFd, FdState>,
	outputs: BTreeMap<RawFd, Vec<u8>>,
}

/// Scripted, deterministic backend emulating edge-triggered readiness.
///
/// Each `poll` advances one script action per live socket, then fires edges
/// for readiness transitions only: a level that was already reported stays
/// silent until a `subscribe` re-arms it. Exhausted scripts terminate the
/// socket via their sentinel (HUP or connection reset).
pub struct TestNet {
	inner: RefCell<Inner>,
}

impl TestNet {
	pub fn new(scripts: impl Into<VecDeque<FdScript>>) -> Self {
		Self {
			inner: RefCell::new(Inner {
				alive: true,
				scripts: scripts.into(),
				..Inner::default()
			}),
		}
	}

	/// Everything connections wrote to `fd`, in order.
	pub fn output(&self, fd: RawFd) -> Vec<u8> {
		self.inner.borrow().outputs.get(&fd).cloned().unwrap_or_default()
	}
}

impl Backend for TestNet {
	const NAME: &'static str = "test";

	fn socket(&self) -> io::Result<RawFd> {
		let mut inner = self.inner.borrow_mut();

		// a script must be attached to every fd
		let Some(script) = inner.scripts.pop_front() else {
			return Err(io::Error::from_raw_os_error(libc::ENOBUFS));
		};

		let fd = inner.next_fd;
		inner.next_fd += 1;

		inner.sockets.insert(
			fd,
			FdState {
				script,
				..FdState::default()
			},
		);
		inner.outputs.entry(fd).or_default();

		Ok(fd)
	}

	fn connect(&self, fd: RawFd, _addr: &SocketAddr) -> io::Result<()> {
		let mut inner = self.inner.borrow_mut();

		let Some(socket) = inner.sockets.get_mut(&fd) else {
			return Err(io::Error::from_raw_os_error(libc::ENOTSOCK));
		};

		if socket.connected {
			return Err(io::Error::from_raw_os_error(libc::EISCONN));
		}

		socket.connected = true;

		if socket.script.connect_async {
			socket.winprogress = true;
			return Err(io::Error::from_raw_os_error(libc::EINPROGRESS));
		}

		Ok(())
	}

	fn take_error(&self, _fd: RawFd) -> io::Result<Option<io::Error>> {
		Ok(None)
	}

	fn read(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
		let mut inner = self.inner.borrow_mut();

		let Some(socket) = inner.sockets.get_mut(&fd) else {
			return Err(io::Error::from_raw_os_error(libc::EBADF));
		};

		let remaining = socket.script.input.len() - socket.input_pos;
		let consumed = socket.rquota.min(buf.len()).min(remaining);
		if consumed == 0 {
			return Err(io::Error::from(io::ErrorKind::WouldBlock));
		}

		buf[..consumed].copy_from_slice(&socket.script.input[socket.input_pos..socket.input_pos + consumed]);

		socket.input_pos += consumed;
		socket.rquota -= consumed;

		Ok(consumed)
	}

	fn write(&self, fd: RawFd, buf: &[u8]) -> io::Result<usize> {
		let mut inner = self.inner.borrow_mut();

		let Some(socket) = inner.sockets.get_mut(&fd) else {
			return Err(io::Error::from_raw_os_error(libc::EBADF));
		};

		let consumed = socket.wquota.min(buf.len());
		if consumed == 0 {
			// backpressure
			return Err(io::Error::from(io::ErrorKind::WouldBlock));
		}

		socket.wquota -= consumed;

		let chunk = buf[..consumed].to_vec();
		inner.outputs.entry(fd).or_default().extend_from_slice(&chunk);

		Ok(consumed)
	}

	fn close(&self, fd: RawFd) {
		self.inner.borrow_mut().sockets.remove(&fd);
	}

	fn subscribe(&self, token: Token, fd: RawFd, want_read: bool, want_write: bool) {
		debug_assert!(want_read || want_write);

		let mut inner = self.inner.borrow_mut();
		let Some(socket) = inner.sockets.get_mut(&fd) else {
			return;
		};

		socket.token = Some(token);
		socket.want_read = want_read;
		socket.want_write = want_write;

		// re-arming reports the current level as a fresh edge
		socket.prev_read_ready = false;
		socket.prev_write_ready = false;
	}

	fn clear(&self, fd: RawFd) {
		let mut inner = self.inner.borrow_mut();
		let Some(socket) = inner.sockets.get_mut(&fd) else {
			return;
		};

		socket.token = None;
		socket.want_read = false;
		socket.want_write = false;

		socket.prev_read_ready = false;
		socket.prev_write_ready = false;
	}

	fn poll(&mut self, events: &mut Vec<Event>) -> io::Result<()> {
		events.clear();

		let mut inner = self.inner.borrow_mut();

		if inner.signals > 0 {
			inner.signals -= 1;
			events.push(Event {
				signal: true,
				..Event::default()
			});
		}

		let mut finished = Vec::new();

		for (fd, socket) in inner.sockets.iter_mut() {
			if !socket.err && !socket.hup {
				// advance the script action (or the sentinel)
				match socket.script.actions.pop_front() {
					Some(FdAction::GrantRead(quota)) => socket.rquota += quota,
					Some(FdAction::GrantWrite(quota)) => socket.wquota += quota,
					None => match socket.script.sentinel {
						Sentinel::Hup => socket.hup = true,
						Sentinel::ConnReset => socket.err = true,
					},
				}
			}

			let input_left = socket.script.input.len() - socket.input_pos;
			let read_ready = socket.want_read && socket.rquota > 0 && input_left > 0;
			let write_ready = socket.want_write && (socket.winprogress || socket.wquota > 0);

			// edge detection
			let fire_read = read_ready && !socket.prev_read_ready;
			let fire_write = write_ready && !socket.prev_write_ready;

			let fire_err = socket.err && !socket.delivered_err;
			let fire_hup = socket.hup && !socket.delivered_hup;

			if fire_read || fire_write || fire_err || fire_hup {
				events.push(Event {
					token: socket.token.unwrap_or_default(),
					readable: fire_read,
					writable: fire_write,
					error: fire_err,
					closed: fire_hup,
					signal: false,
				});

				if fire_write {
					socket.winprogress = false;
				}
				if fire_err {
					socket.delivered_err = true;
				}
				if fire_hup {
					socket.delivered_hup = true;
				}
			}

			socket.prev_read_ready = read_ready;
			socket.prev_write_ready = write_ready;

			if socket.delivered_err || socket.delivered_hup {
				finished.push(*fd);
			}
		}

		for fd in finished {
			inner.sockets.remove(&fd);
		}

		Ok(())
	}

	fn signal(&self) {
		self.inner.borrow_mut().signals += 1;
	}

	fn stop(&self) {
		self.inner.borrow_mut().alive = false;
	}

	fn stopped(&self) -> bool {
		let inner = self.inner.borrow();
		!inner.alive || inner.sockets.is_empty()
	}
}
