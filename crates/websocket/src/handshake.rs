// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::fmt::Write as _;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::{Digest, Sha1};
use tracing::{error, trace};

use reifydb_reactor::{io::Input, protocol::Status};

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Extra header sent with the upgrade request.
#[derive(Debug, Clone)]
pub struct Header {
	pub name: String,
	pub value: String,
}

pub struct Handshake {
	pub request: String,
	/// The `Sec-WebSocket-Accept` value the server must echo (28 chars).
	pub accept: String,
}

/// `base64(SHA1(key ∥ GUID))`.
pub fn accept_key(key: &str) -> String {
	let mut sha = Sha1::new();
	sha.update(key.as_bytes());
	sha.update(GUID.as_bytes());

	STANDARD.encode(sha.finalize())
}

/// Builds the upgrade request around a fresh 16-byte nonce and precomputes
/// the accept value to verify the response against.
pub fn make_handshake(host: &str, path: &str, extra: &[Header]) -> Handshake {
	let nonce: [u8; 16] = rand::random();
	let key = STANDARD.encode(nonce);

	let mut request = String::with_capacity(512);

	let _ = write!(
		request,
		"GET {path} HTTP/1.1\r\n\
		 Host: {host}\r\n\
		 Upgrade: websocket\r\n\
		 Connection: Upgrade\r\n\
		 Sec-WebSocket-Key: {key}\r\n\
		 Sec-WebSocket-Version: 13\r\n"
	);

	for header in extra {
		if !header.name.is_empty() {
			let _ = write!(request, "{}: {}\r\n", header.name, header.value);
		}
	}
	request.push_str("\r\n");

	Handshake {
		request,
		accept: accept_key(&key),
	}
}

/// Offset one past the header terminator (`\r\n\r\n`), if present.
pub fn find_header_end(input: &[u8]) -> Option<usize> {
	input.windows(4).position(|window| window == b"\r\n\r\n").map(|pos| pos + 4)
}

fn header_value<'a>(head: &'a [u8], name: &str) -> Option<&'a [u8]> {
	for line in head.split(|&b| b == b'\n') {
		let line = line.strip_suffix(b"\r").unwrap_or(line);

		let Some(colon) = line.iter().position(|&b| b == b':') else {
			continue;
		};

		if line[..colon].eq_ignore_ascii_case(name.as_bytes()) {
			let mut value = &line[colon + 1..];
			while value.first() == Some(&b' ') {
				value = &value[1..];
			}
			while value.last() == Some(&b' ') {
				value = &value[..value.len() - 1];
			}
			return Some(value);
		}
	}

	None
}

/// Validates the upgrade response sitting at the front of RX.
///
/// Incomplete headers return `Ok` without consuming so the caller waits for
/// more bytes. Complete headers are consumed exactly, leaving any trailing
/// frame bytes in place, and then validated: status `101` after the first
/// SP, and a `Sec-WebSocket-Accept` value equal to `accept`.
pub fn read_handshake(accept: &str, rx: &mut Input<'_>) -> Status {
	let input = rx.rbuf();

	let Some(end) = find_header_end(input) else {
		trace!(len = input.len(), "incomplete upgrade response");
		return Status::Ok;
	};

	let head = input[..end].to_vec();
	rx.read(end);

	let Some(sp) = head.iter().position(|&b| b == b' ') else {
		error!("invalid upgrade response: status line");
		return Status::Error;
	};

	if head.len() <= sp + 3 || &head[sp + 1..sp + 4] != b"101" {
		error!(
			status = %String::from_utf8_lossy(&head[sp + 1..head.len().min(sp + 4)]),
			"upgrade rejected"
		);
		return Status::Error;
	}

	let Some(got) = header_value(&head, "sec-websocket-accept") else {
		error!("missing Sec-WebSocket-Accept header");
		return Status::Error;
	};

	if got != accept.as_bytes() {
		error!(
			expected = accept,
			got = %String::from_utf8_lossy(got),
			"Sec-WebSocket-Accept mismatch"
		);
		return Status::Error;
	}

	Status::Ok
}
