// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use tracing::{debug, error, trace, warn};

use reifydb_reactor::{
	io::{Io, Output},
	protocol::{Session, Status},
};

use crate::{
	frame::{parse_frame, write_close, write_control_frame, CloseCode, OpCode},
	handshake::{make_handshake, read_handshake, Header},
};

/// Cap on one reassembled message.
pub const MSG_CAP: usize = 1 << 20;

/// Application hook invoked with complete messages. Handlers get the TX sink
/// for replies; capability consts gate dispatch so undeclared handlers cost
/// nothing.
pub trait Codec {
	type Config: Clone;

	const HAS_TEXT: bool = false;
	const HAS_BINARY: bool = false;

	fn create(config: &Self::Config) -> Self;

	fn on_text(&mut self, _tx: &mut Output<'_>, _payload: &[u8]) -> Status {
		Status::Ok
	}

	fn on_binary(&mut self, _tx: &mut Output<'_>, _payload: &[u8]) -> Status {
		Status::Ok
	}

	/// Close code sent by graceful shutdown.
	fn close_code(&mut self) -> CloseCode {
		CloseCode::Normal
	}
}

#[derive(Clone)]
pub struct WsConfig<C> {
	pub path: String,
	pub extra: Vec<Header>,
	pub codec: C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WsState {
	Idle,
	HandshakeSent,
	Listening,
}

/// Client-side RFC 6455 session: HTTP upgrade, frame parsing, fragment
/// reassembly, control frames, masked egress.
pub struct WebSocket<C: Codec> {
	host: String,
	path: String,
	extra: Vec<Header>,

	accept: String,
	state: WsState,

	/// Opcode of the fragmented message under reassembly.
	opcode: OpCode,
	msg_buf: Vec<u8>,

	codec: C,
}

impl<C: Codec> Session for WebSocket<C> {
	type Config = WsConfig<C::Config>;

	const HAS_ON_CONNECT: bool = true;
	const HAS_SHUTDOWN: bool = true;
	const HAS_HEARTBEAT: bool = true;

	fn create(host: &str, _port: u16, config: &Self::Config) -> Self {
		Self {
			host: host.to_owned(),
			path: config.path.clone(),
			extra: config.extra.clone(),
			accept: String::new(),
			state: WsState::Idle,
			opcode: OpCode::Cont,
			msg_buf: Vec::new(),
			codec: C::create(&config.codec),
		}
	}

	fn on_connect(&mut self, io: &mut Io<'_>) -> Status {
		let handshake = make_handshake(&self.host, &self.path, &self.extra);

		let request = handshake.request.as_bytes();
		let out = io.tx.wbuf();

		if out.len() < request.len() {
			return Status::Error;
		}

		out[..request.len()].copy_from_slice(request);
		io.tx.wrote(request.len());

		self.accept = handshake.accept;
		self.state = WsState::HandshakeSent;

		Status::Ok
	}

	fn on_data(&mut self, io: &mut Io<'_>) -> Status {
		match self.state {
			WsState::HandshakeSent => {
				let before = io.rx.rbuf().len();

				let status = read_handshake(&self.accept, &mut io.rx);

				// consumed the HTTP frame and all good: start
				// listening
				if io.rx.rbuf().len() != before && status == Status::Ok {
					self.state = WsState::Listening;
				}

				status
			}
			WsState::Listening => self.dispatch_frame(io),
			WsState::Idle => Status::Error,
		}
	}

	fn on_shutdown(&mut self, io: &mut Io<'_>) -> Status {
		let code = self.codec.close_code();

		let sent = write_close(io.tx.wbuf(), code as u16);
		io.tx.wrote(sent);

		if sent > 0 {
			Status::Close
		} else {
			Status::Error
		}
	}

	fn heartbeat(&mut self, tx: &mut Output<'_>) {
		let sent = write_control_frame(tx.wbuf(), OpCode::Ping, &[]);
		tx.wrote(sent);
	}
}

impl<C: Codec> WebSocket<C> {
	/// Parses and handles one frame per attempt; the reactor's consume loop
	/// calls again while bytes keep disappearing from RX.
	fn dispatch_frame(&mut self, io: &mut Io<'_>) -> Status {
		let header = match parse_frame(io.rx.rbuf()) {
			Ok(Some(header)) => header,
			Ok(None) => {
				trace!(len = io.rx.rbuf().len(), "need more");
				return Status::Ok;
			}
			Err(e) => {
				error!(error = %e, "frame rejected");
				return Status::Error;
			}
		};

		// An unfragmented message is a single frame with FIN set and a
		// non-continuation opcode. A fragmented message starts with
		// FIN clear and a data opcode, continues with FIN clear and
		// opcode 0, and ends with FIN set and opcode 0.
		if !header.fin || header.op == OpCode::Cont {
			{
				let payload = &io.rx.rbuf()[header.payload_off..header.payload_off + header.payload_len];

				if MSG_CAP < self.msg_buf.len() + payload.len() {
					error!(len = self.msg_buf.len() + payload.len(), "message buffer overflow");
					return Status::Error;
				}

				self.msg_buf.extend_from_slice(payload);
			}
			io.rx.read(header.consumed);

			if header.fin {
				let status = dispatch(&mut self.codec, &mut io.tx, self.opcode, &self.msg_buf);

				self.msg_buf.clear();

				if status != Status::Ok {
					return status;
				}
			} else if header.op != OpCode::Cont {
				self.opcode = header.op;
			}

			Status::Ok
		} else {
			let status = {
				let payload = &io.rx.rbuf()[header.payload_off..header.payload_off + header.payload_len];

				dispatch(&mut self.codec, &mut io.tx, header.op, payload)
			};

			io.rx.read(header.consumed);

			status
		}
	}
}

fn dispatch<C: Codec>(codec: &mut C, tx: &mut Output<'_>, op: OpCode, payload: &[u8]) -> Status {
	match op {
		OpCode::Cont => {
			warn!("bare continuation: nothing to dispatch");
			Status::Ok
		}
		OpCode::Text => {
			trace!(len = payload.len(), "text");
			if C::HAS_TEXT {
				codec.on_text(tx, payload)
			} else {
				Status::Ok
			}
		}
		OpCode::Binary => {
			trace!(len = payload.len(), "binary");
			if C::HAS_BINARY {
				codec.on_binary(tx, payload)
			} else {
				Status::Ok
			}
		}
		OpCode::Close => {
			debug!(len = payload.len(), "close");

			let code = if payload.len() >= 2 {
				u16::from_be_bytes([payload[0], payload[1]])
			} else {
				CloseCode::Normal as u16
			};

			let sent = write_close(tx.wbuf(), code);
			tx.wrote(sent);

			Status::Close
		}
		OpCode::Ping => {
			if payload.len() >= 126 {
				// TODO: fragment oversized ping echoes instead of
				// dropping the connection
				error!(len = payload.len(), "ping payload too large");
				return Status::Close;
			}

			trace!(len = payload.len(), "ping");

			let sent = write_control_frame(tx.wbuf(), OpCode::Pong, payload);
			if sent == 0 {
				return Status::Close;
			}
			tx.wrote(sent);

			Status::Ok
		}
		OpCode::Pong => Status::Ok,
		OpCode::Unknown(op) => {
			error!(op, "unsupported opcode");
			Status::Error
		}
	}
}
