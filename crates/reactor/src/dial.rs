// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::{
	io,
	net::{SocketAddr, ToSocketAddrs},
	os::fd::RawFd,
};

use tracing::trace;

use crate::backend::Backend;

/// Outcome of a successful dial attempt.
pub struct Dial {
	pub fd: RawFd,
	/// The connect is still in flight; completion arrives as the first
	/// writable edge.
	pub pending: bool,
}

/// Resolves `host:port` (IPv4, stream, TCP) and attempts a non-blocking
/// connect on each candidate until one succeeds or reports `EINPROGRESS`.
pub fn dial<B: Backend>(net: &B, host: &str, port: u16) -> io::Result<Dial> {
	let addrs: Vec<SocketAddr> = (host, port)
		.to_socket_addrs()
		.map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "name resolution failed"))?
		.filter(SocketAddr::is_ipv4)
		.collect();

	if addrs.is_empty() {
		return Err(io::Error::new(io::ErrorKind::InvalidInput, "no usable address"));
	}

	let mut last = io::Error::from(io::ErrorKind::ConnectionRefused);

	for addr in addrs {
		let fd = match net.socket() {
			Ok(fd) => fd,
			Err(e) => {
				last = e;
				continue;
			}
		};

		match net.connect(fd, &addr) {
			Ok(()) => {
				trace!(fd, %addr, "connected synchronously");
				return Ok(Dial {
					fd,
					pending: false,
				});
			}
			Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {
				trace!(fd, %addr, "connect in progress");
				return Ok(Dial {
					fd,
					pending: true,
				});
			}
			Err(e) => {
				last = e;
				net.close(fd);
			}
		}
	}

	Err(last)
}
