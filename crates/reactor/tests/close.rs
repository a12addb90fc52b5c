// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::{cell::RefCell, rc::Rc};

use reifydb_reactor::{
	io::{Io, Output},
	protocol::{Session, Status},
};
use reifydb_testing::{
	gen_script, happypath, run_single, ScriptedTransport,
	FdAction::{GrantRead as R, GrantWrite as W},
};
use reifydb_transport::Plain;

fn reply(tx: &mut Output<'_>, op: u8, payload: &[u8]) -> Status {
	let out = tx.wbuf();

	if out.len() < 2 + payload.len() {
		return Status::Error;
	}

	out[0] = op;
	out[1] = payload.len() as u8;
	out[2..2 + payload.len()].copy_from_slice(payload);

	tx.wrote(2 + payload.len());

	Status::Ok
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
	Close,
	MultiClose,
}

/// Toy protocol `[opcode: 1][len: 1][payload: len]`.
///
/// opcode 0x01 = TEXT (echo), 0x08 = CLOSE (echo, close), 0x42 =
/// MULTI-CLOSE (echo, close, keep handling frames during shutdown).
struct CloseSession {
	mode: Mode,
}

impl Session for CloseSession {
	type Config = ();

	const HAS_SHUTDOWN: bool = true;

	fn create(_host: &str, _port: u16, _config: &()) -> Self {
		CloseSession {
			mode: Mode::Close,
		}
	}

	/// Consumes one frame per call.
	fn on_data(&mut self, io: &mut Io<'_>) -> Status {
		let input = io.rx.rbuf();

		if input.len() < 2 {
			return Status::Ok; // need more
		}

		let op = input[0];
		let len = input[1] as usize;

		if input.len() < 2 + len {
			return Status::Ok; // need more
		}

		let status = {
			let payload = &io.rx.rbuf()[2..2 + len];

			match op {
				0x01 => reply(&mut io.tx, op, payload),
				0x08 => {
					self.mode = Mode::Close;
					match reply(&mut io.tx, op, payload) {
						Status::Ok => Status::Close,
						status => status,
					}
				}
				0x42 => {
					self.mode = Mode::MultiClose;
					match reply(&mut io.tx, op, payload) {
						Status::Ok => Status::Close,
						status => status,
					}
				}
				_ => Status::Error,
			}
		};

		io.rx.read(2 + len);

		status
	}

	fn on_shutdown(&mut self, io: &mut Io<'_>) -> Status {
		if self.mode == Mode::Close {
			return Status::Close;
		}

		let input = io.rx.rbuf();

		if input.len() < 2 {
			return Status::Ok; // need more
		}

		let op = input[0];
		let len = input[1] as usize;

		if input.len() < 2 + len {
			return Status::Ok; // need more
		}

		let status = {
			let payload = &io.rx.rbuf()[2..2 + len];

			match op {
				// keep echoing but remain in graceful shutdown
				0x01 | 0x42 => reply(&mut io.tx, op, payload),
				// final CLOSE terminates shutdown
				0x08 => match reply(&mut io.tx, op, payload) {
					Status::Ok => Status::Close,
					status => status,
				},
				_ => Status::Error,
			}
		};

		io.rx.read(2 + len);

		status
	}
}

/// Runs the fragmented input through both the plain and the scripted
/// transport, sync and async connect, asserting identical echo output.
fn fragmented(inputs: &[&[u8]], expected: &[u8]) {
	for connect_async in [false, true] {
		let input: Vec<u8> = inputs.concat();

		let out = run_single::<Plain, CloseSession>(connect_async, &input, gen_script(inputs), (), ());
		assert_eq!(out.output, expected, "plain transport output mismatch");

		let script = Rc::new(RefCell::new(happypath(inputs, &[], &[], &[])));
		run_single::<ScriptedTransport, CloseSession>(
			connect_async,
			&input,
			gen_script(inputs),
			Rc::clone(&script),
			(),
		);
		assert_eq!(script.borrow().output, expected, "scripted transport output mismatch");
	}
}

#[test]
fn closes_eagerly() {
	// [CLOSE "a"] at once
	fragmented(&[b"\x08\x01a"], b"\x08\x01a");
	// [TEXT "hi"] [CLOSE "aa"] at once
	fragmented(&[b"\x01\x02hi\x08\x02aa"], b"\x01\x02hi\x08\x02aa");
	// [TEXT "hi"] [CLOSE "aaa"] a fragment per frame
	fragmented(&[b"\x01\x02hi", b"\x08\x03aaa"], b"\x01\x02hi\x08\x03aaa");
	// [TEXT "hi"] [CLOSE "aaa"] across 3 fragments
	fragmented(&[b"\x01\x02hi", b"\x08\x03a", b"aa"], b"\x01\x02hi\x08\x03aaa");
	// [TEXT "a"] [TEXT "bc"] [CLOSE "xyz"] at once
	fragmented(&[b"\x01\x01a\x01\x02bc\x08\x03xyz"], b"\x01\x01a\x01\x02bc\x08\x03xyz");
	// same but interleaved across 4 fragments
	fragmented(&[b"\x01\x01a", b"\x01\x02b", b"c\x08\x03x", b"yz"], b"\x01\x01a\x01\x02bc\x08\x03xyz");
}

#[test]
fn close_with_zero_length_payload() {
	fragmented(&[b"\x08\x00"], b"\x08\x00");
}

#[test]
fn invalid_opcode_errors() {
	let out = run_single::<Plain, CloseSession>(false, b"\xFF\x01x", [R(3)], (), ());

	assert!(out.all_done, "connection should be done");
	assert!(out.restarts.is_empty(), "connection must not be restarted");
	assert!(out.output.is_empty());
}

#[test]
fn graceful_close_halts_and_records_restart() {
	let frame: &[u8] = b"\x08\x01a";

	for connect_async in [false, true] {
		let out = run_single::<Plain, CloseSession>(connect_async, frame, [R(3), W(3)], (), ());

		assert_eq!(out.output, frame);
		assert_eq!(out.restarts, [0]);
		assert!(out.all_done);
	}
}

#[test]
fn text_then_close_in_one_read() {
	let input: &[u8] = b"\x01\x02hi\x08\x03aaa";

	let out = run_single::<Plain, CloseSession>(false, input, [R(input.len()), W(4 + 5)], (), ());

	assert_eq!(out.output, input);
	assert_eq!(out.restarts, [0]);
	assert!(out.all_done);
}

#[test]
fn multi_close_initiates_graceful_shutdown() {
	// [MULTI-CLOSE "a"] at once
	fragmented(&[b"\x42\x01a"], b"\x42\x01a");
	// [TEXT "hi"] [MULTI-CLOSE "aa"] at once
	fragmented(&[b"\x01\x02hi\x42\x02aa"], b"\x01\x02hi\x42\x02aa");
	// [TEXT "hi"] [MULTI-CLOSE "aaa"] a fragment per frame
	fragmented(&[b"\x01\x02hi", b"\x42\x03aaa"], b"\x01\x02hi\x42\x03aaa");
	// [TEXT "hi"] [MULTI-CLOSE "aaa"] across 3 fragments
	fragmented(&[b"\x01\x02hi", b"\x42\x03a", b"aa"], b"\x01\x02hi\x42\x03aaa");
	// [TEXT "a"] [TEXT "bc"] [MULTI-CLOSE "xyz"] at once
	fragmented(&[b"\x01\x01a\x01\x02bc\x42\x03xyz"], b"\x01\x01a\x01\x02bc\x42\x03xyz");
	// same but interleaved across 4 fragments
	fragmented(&[b"\x01\x01a", b"\x01\x02b", b"c\x42\x03x", b"yz"], b"\x01\x01a\x01\x02bc\x42\x03xyz");
}

#[test]
fn multi_close_with_zero_length_payload() {
	fragmented(&[b"\x42\x00"], b"\x42\x00");
}

#[test]
fn multi_frame_shutdown_in_one_read() {
	// MULTI-CLOSE switches on_data -> close; TEXT and the final CLOSE are
	// handled by on_shutdown
	let input: &[u8] = b"\x42\x01m\x01\x02bc\x08\x01z";

	fragmented(&[input], input);
}

#[test]
fn multi_frame_shutdown_across_close_protocol() {
	// fragmented so TEXT/MULTI-CLOSE drive Protocol -> CloseProtocol and
	// the rest is consumed in CloseProtocol
	fragmented(
		&[b"\x01\x02hi", b"\x42\x01x", b"\x01\x02yz", b"\x08\x01q"],
		b"\x01\x02hi\x42\x01x\x01\x02yz\x08\x01q",
	);
}

#[test]
fn extra_frames_after_final_close_are_drained() {
	// the trailing TEXT is read and discarded in DrainProtocol
	let input: &[u8] = b"\x42\x01m\x01\x02bc\x08\x01z\x01\x07ignored";
	let expected: &[u8] = b"\x42\x01m\x01\x02bc\x08\x01z";

	fragmented(&[input], expected);
}

#[test]
fn multi_close_then_close_restarts_eagerly() {
	let input: &[u8] = b"\x42\x01a\x08\x01b";

	for connect_async in [false, true] {
		let out = run_single::<Plain, CloseSession>(connect_async, input, gen_script(&[input]), (), ());

		assert_eq!(out.output, input);
		assert_eq!(out.restarts, [0]);
		assert!(out.all_done);
	}
}

#[test]
fn text_then_multi_close_then_close_restarts_once() {
	let input: &[u8] = b"\x01\x02hi\x42\x02xy\x08\x01z";

	// one read for all three frames, one write for all three echoes
	let out = run_single::<Plain, CloseSession>(false, input, [R(input.len()), W(2 + 2 + 2 + 2 + 2 + 1)], (), ());

	assert_eq!(out.output, input);
	assert_eq!(out.restarts, [0]);
	assert!(out.all_done);
}

#[test]
fn invalid_opcode_during_shutdown_errors() {
	// MULTI-CLOSE enters CloseProtocol; the invalid opcode is seen by
	// on_shutdown and must error without a restart
	let input: &[u8] = b"\x42\x01m\xFF\x01x";

	let out = run_single::<Plain, CloseSession>(false, input, [R(input.len()), W(6)], (), ());

	assert!(out.all_done);
	assert!(out.restarts.is_empty());
}

#[test]
fn bare_multi_close_then_close_in_one_read() {
	let input: &[u8] = b"\x42\x01a\x08\x01b";

	let out = run_single::<Plain, CloseSession>(false, input, [R(input.len()), W(input.len())], (), ());

	assert!(out.all_done);
	assert_eq!(out.restarts, [0]);
	assert_eq!(out.output, input);
}
