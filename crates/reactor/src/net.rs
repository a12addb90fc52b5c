// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::{
	io,
	net::SocketAddr,
	os::fd::{BorrowedFd, IntoRawFd, RawFd},
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use mio::{unix::SourceFd, Events, Interest, Poll, Waker};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tracing::{error, warn};

use crate::backend::{Backend, Event, Token};

const WAKE: mio::Token = mio::Token(usize::MAX);

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Handle for posting wake signals from outside the reactor thread
/// (typically a signal handler thread).
#[derive(Clone)]
pub struct Signaler {
	waker: Arc<Waker>,
	signals: Arc<AtomicUsize>,
}

impl Signaler {
	pub fn signal(&self) {
		self.signals.fetch_add(1, Ordering::Release);
		if let Err(e) = self.waker.wake() {
			warn!(error = %e, "wake failed");
		}
	}
}

/// Production backend over `mio::Poll` with raw non-blocking descriptors.
///
/// Registration is edge-triggered; `subscribe` replaces any prior interest.
/// The waker token never collides with connection tokens, which the reactor
/// assigns from 0 upward.
pub struct MioBackend {
	poll: Poll,
	events: Events,
	waker: Arc<Waker>,
	signals: Arc<AtomicUsize>,
	stop: Arc<AtomicBool>,
}

impl MioBackend {
	pub fn new(max_events: usize) -> io::Result<Self> {
		let poll = Poll::new()?;
		let waker = Arc::new(Waker::new(poll.registry(), WAKE)?);

		Ok(Self {
			poll,
			events: Events::with_capacity(max_events),
			waker,
			signals: Arc::new(AtomicUsize::new(0)),
			stop: Arc::new(AtomicBool::new(false)),
		})
	}

	pub fn signaler(&self) -> Signaler {
		Signaler {
			waker: Arc::clone(&self.waker),
			signals: Arc::clone(&self.signals),
		}
	}
}

impl Backend for MioBackend {
	const NAME: &'static str = "mio";

	fn socket(&self) -> io::Result<RawFd> {
		let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
		socket.set_nonblocking(true)?;
		socket.set_nodelay(true)?;
		Ok(socket.into_raw_fd())
	}

	fn connect(&self, fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
		let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
		SockRef::from(&borrowed).connect(&(*addr).into())
	}

	fn take_error(&self, fd: RawFd) -> io::Result<Option<io::Error>> {
		let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
		SockRef::from(&borrowed).take_error()
	}

	fn read(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
		let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
		if n < 0 {
			return Err(io::Error::last_os_error());
		}
		Ok(n as usize)
	}

	fn write(&self, fd: RawFd, buf: &[u8]) -> io::Result<usize> {
		let n = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
		if n < 0 {
			return Err(io::Error::last_os_error());
		}
		Ok(n as usize)
	}

	fn close(&self, fd: RawFd) {
		unsafe {
			libc::close(fd);
		}
	}

	fn subscribe(&self, token: Token, fd: RawFd, want_read: bool, want_write: bool) {
		let interest = match (want_read, want_write) {
			(true, true) => Interest::READABLE | Interest::WRITABLE,
			(true, false) => Interest::READABLE,
			(false, true) => Interest::WRITABLE,
			(false, false) => return,
		};

		let registry = self.poll.registry();
		let mut source = SourceFd(&fd);

		match registry.reregister(&mut source, mio::Token(token.0), interest) {
			Ok(()) => {}
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				if let Err(e) = registry.register(&mut source, mio::Token(token.0), interest) {
					error!(fd, error = %e, "register failed");
				}
			}
			Err(e) => error!(fd, error = %e, "reregister failed"),
		}
	}

	fn clear(&self, fd: RawFd) {
		let _ = self.poll.registry().deregister(&mut SourceFd(&fd));
	}

	fn poll(&mut self, events: &mut Vec<Event>) -> io::Result<()> {
		events.clear();

		match self.poll.poll(&mut self.events, Some(POLL_TIMEOUT)) {
			Ok(()) => {}
			Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
			Err(e) => return Err(e),
		}

		// one signal event per signal() call, ahead of socket readiness
		let pending = self.signals.swap(0, Ordering::Acquire);
		for _ in 0..pending {
			events.push(Event {
				signal: true,
				..Event::default()
			});
		}

		for ev in self.events.iter() {
			if ev.token() == WAKE {
				continue;
			}

			events.push(Event {
				token: Token(ev.token().0),
				readable: ev.is_readable(),
				writable: ev.is_writable(),
				error: ev.is_error(),
				closed: ev.is_read_closed(),
				signal: false,
			});
		}

		Ok(())
	}

	fn signal(&self) {
		self.signals.fetch_add(1, Ordering::Release);
		if let Err(e) = self.waker.wake() {
			warn!(error = %e, "wake failed");
		}
	}

	fn stop(&self) {
		self.stop.store(true, Ordering::Release);
	}

	fn stopped(&self) -> bool {
		self.stop.load(Ordering::Acquire)
	}
}
