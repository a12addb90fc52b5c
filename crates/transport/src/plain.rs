// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::{io::ErrorKind, os::fd::RawFd};

use reifydb_reactor::{
	backend::Backend,
	io::{Input, Output},
	transport::{Endpoint, Status, Transport},
};

/// Cleartext transport: endpoint IO maps directly onto the backend's
/// descriptor read/write. No handshake, no shutdown exchange.
pub struct Plain;

pub struct PlainEndpoint {
	fd: RawFd,
}

impl<B: Backend> Transport<B> for Plain {
	type Config = ();
	type Endpoint = PlainEndpoint;

	fn open(fd: RawFd, _config: &()) -> Option<PlainEndpoint> {
		Some(PlainEndpoint {
			fd,
		})
	}
}

impl<B: Backend> Endpoint<B> for PlainEndpoint {
	fn read(&mut self, net: &B, mut rx: Output<'_>) -> Status {
		loop {
			return match net.read(self.fd, rx.wbuf()) {
				Ok(0) => Status::Close,
				Ok(n) => {
					rx.wrote(n);
					Status::Ok
				}
				Err(e) if e.kind() == ErrorKind::WouldBlock => Status::WantRead,
				Err(e) if e.kind() == ErrorKind::Interrupted => continue,
				Err(_) => Status::Error,
			};
		}
	}

	fn write(&mut self, net: &B, mut tx: Input<'_>) -> Status {
		loop {
			return match net.write(self.fd, tx.rbuf()) {
				Ok(n) => {
					tx.read(n);
					Status::Ok
				}
				Err(e) if e.kind() == ErrorKind::WouldBlock => Status::WantWrite,
				Err(e) if e.kind() == ErrorKind::Interrupted => continue,
				Err(_) => Status::Error,
			};
		}
	}
}
