// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use crate::buffer::Buffer;

pub const RX_CAP: usize = 1 << 20;
pub const TX_CAP: usize = 1 << 20;

/// Consumer view of a buffer: peek readable bytes, advance the read position.
pub struct Input<'a>(pub &'a mut Buffer);

impl Input<'_> {
	pub fn rbuf(&self) -> &[u8] {
		self.0.rbuf()
	}

	pub fn read(&mut self, len: usize) {
		self.0.read(len)
	}
}

/// Producer view of a buffer: expose writable space, advance the write
/// position.
pub struct Output<'a>(pub &'a mut Buffer);

impl Output<'_> {
	pub fn wbuf(&mut self) -> &mut [u8] {
		self.0.wbuf()
	}

	pub fn wrote(&mut self, len: usize) {
		self.0.wrote(len)
	}
}

/// The buffer pair handed to protocol code: consume from RX, produce into TX.
///
/// `rx` and `tx` are separate fields so a payload borrowed from `rx` can be
/// held across writes into `tx`.
pub struct Io<'a> {
	pub rx: Input<'a>,
	pub tx: Output<'a>,
}
