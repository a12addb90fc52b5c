// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::{
	io::{self, ErrorKind, Read, Write},
	os::fd::RawFd,
	sync::Arc,
};

use once_cell::sync::Lazy;
use rustls::{pki_types::ServerName, ClientConfig, ClientConnection, RootCertStore};
use tracing::error;

use reifydb_reactor::{
	backend::Backend,
	io::{Input, Output},
	transport::{Endpoint, Status, Transport},
};

/// Process-wide client configuration: webpki roots, peer verification, no
/// client auth. Built once on first use.
static CLIENT_CONFIG: Lazy<Arc<ClientConfig>> = Lazy::new(|| {
	let mut roots = RootCertStore::empty();
	roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

	Arc::new(ClientConfig::builder().with_root_certificates(roots).with_no_client_auth())
});

#[derive(Clone)]
pub struct TlsConfig {
	/// Name presented via SNI and checked against the peer certificate.
	pub server_name: String,
}

/// TLS transport over the rustls client state machine.
pub struct Tls;

pub struct TlsEndpoint {
	fd: RawFd,
	tls: ClientConnection,
	sent_close_notify: bool,
}

impl<B: Backend> Transport<B> for Tls {
	type Config = TlsConfig;
	type Endpoint = TlsEndpoint;

	fn open(fd: RawFd, config: &TlsConfig) -> Option<TlsEndpoint> {
		let name = match ServerName::try_from(config.server_name.clone()) {
			Ok(name) => name,
			Err(e) => {
				error!(server_name = %config.server_name, error = %e, "invalid server name");
				return None;
			}
		};

		let tls = match ClientConnection::new(Arc::clone(&CLIENT_CONFIG), name) {
			Ok(tls) => tls,
			Err(e) => {
				error!(fd, error = %e, "cannot create tls session");
				return None;
			}
		};

		Some(TlsEndpoint {
			fd,
			tls,
			sent_close_notify: false,
		})
	}
}

/// `io::Read`/`io::Write` adapter handing the backend's descriptor IO to
/// rustls.
struct FdIo<'a, B: Backend> {
	net: &'a B,
	fd: RawFd,
}

impl<B: Backend> Read for FdIo<'_, B> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		self.net.read(self.fd, buf)
	}
}

impl<B: Backend> Write for FdIo<'_, B> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.net.write(self.fd, buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

impl TlsEndpoint {
	fn sock<'a, B: Backend>(&self, net: &'a B) -> FdIo<'a, B> {
		FdIo {
			net,
			fd: self.fd,
		}
	}

	/// Flushes buffered ciphertext. `Ok` means nothing is left to send.
	fn flush_tls<B: Backend>(&mut self, net: &B) -> Status {
		while self.tls.wants_write() {
			let mut sock = self.sock(net);
			match self.tls.write_tls(&mut sock) {
				Ok(_) => continue,
				Err(e) if e.kind() == ErrorKind::WouldBlock => return Status::WantWrite,
				Err(e) if e.kind() == ErrorKind::Interrupted => continue,
				Err(e) => {
					error!(fd = self.fd, error = %e, "tls write failed");
					return Status::Error;
				}
			}
		}

		Status::Ok
	}
}

impl<B: Backend> Endpoint<B> for TlsEndpoint {
	const HAS_HANDSHAKE: bool = true;
	const HAS_SHUTDOWN: bool = true;

	fn handshake_step(&mut self, net: &B) -> Status {
		loop {
			if !self.tls.is_handshaking() {
				return Status::Ok;
			}

			if self.tls.wants_write() {
				match self.flush_tls(net) {
					Status::Ok => continue,
					status => return status,
				}
			}

			if !self.tls.wants_read() {
				return Status::Error;
			}

			let mut sock = self.sock(net);
			match self.tls.read_tls(&mut sock) {
				// peer rejected the handshake
				Ok(0) => return Status::Close,
				Ok(_) => {
					if let Err(e) = self.tls.process_new_packets() {
						error!(fd = self.fd, error = %e, "tls handshake failed");
						// best effort: push out the pending alert
						let _ = self.flush_tls(net);
						return Status::Error;
					}
				}
				Err(e) if e.kind() == ErrorKind::WouldBlock => return Status::WantRead,
				Err(e) if e.kind() == ErrorKind::Interrupted => continue,
				Err(e) => {
					error!(fd = self.fd, error = %e, "tls read failed");
					return Status::Error;
				}
			}
		}
	}

	fn read(&mut self, net: &B, mut rx: Output<'_>) -> Status {
		// pull in ciphertext once, then hand out buffered plaintext
		let mut sock = self.sock(net);
		match self.tls.read_tls(&mut sock) {
			Ok(0) => return Status::Close,
			Ok(_) => {
				if let Err(e) = self.tls.process_new_packets() {
					error!(fd = self.fd, error = %e, "tls error processing packets");
					return Status::Error;
				}
			}
			Err(e) if e.kind() == ErrorKind::WouldBlock => {}
			Err(e) if e.kind() == ErrorKind::Interrupted => {}
			Err(e) => {
				error!(fd = self.fd, error = %e, "tls read failed");
				return Status::Error;
			}
		}

		match self.tls.reader().read(rx.wbuf()) {
			// clean end of stream: peer sent close_notify
			Ok(0) => Status::Close,
			Ok(n) => {
				rx.wrote(n);
				Status::Ok
			}
			Err(e) if e.kind() == ErrorKind::WouldBlock => Status::WantRead,
			Err(e) => {
				error!(fd = self.fd, error = %e, "tls plaintext read failed");
				Status::Error
			}
		}
	}

	fn write(&mut self, net: &B, mut tx: Input<'_>) -> Status {
		let taken = match self.tls.writer().write(tx.rbuf()) {
			Ok(n) => {
				tx.read(n);
				n
			}
			Err(e) => {
				error!(fd = self.fd, error = %e, "tls plaintext write failed");
				return Status::Error;
			}
		};

		match self.flush_tls(net) {
			Status::Ok | Status::WantWrite if taken > 0 => Status::Ok,
			Status::Ok => Status::WantWrite,
			status => status,
		}
	}

	fn shutdown_step(&mut self, net: &B) -> Status {
		if !self.sent_close_notify {
			self.tls.send_close_notify();
			self.sent_close_notify = true;
		}

		match self.flush_tls(net) {
			Status::Ok => {}
			status => return status,
		}

		// our close_notify is out; wait for the peer's
		loop {
			match self.tls.process_new_packets() {
				Ok(state) if state.peer_has_closed() => return Status::Ok,
				Ok(_) => {}
				Err(e) => {
					error!(fd = self.fd, error = %e, "tls shutdown failed");
					return Status::Error;
				}
			}

			let mut sock = self.sock(net);
			match self.tls.read_tls(&mut sock) {
				// EOF without close_notify: the peer is gone, done
				Ok(0) => return Status::Ok,
				Ok(_) => continue,
				Err(e) if e.kind() == ErrorKind::WouldBlock => return Status::WantRead,
				Err(e) if e.kind() == ErrorKind::Interrupted => continue,
				Err(_) => return Status::Error,
			}
		}
	}
}
