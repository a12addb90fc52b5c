// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use reifydb_websocket::frame::{
	parse_frame, write_close, write_control_frame, write_data_frame, FrameError, OpCode,
};

fn unmask(frame: &[u8], key_off: usize, payload_len: usize) -> Vec<u8> {
	let key = &frame[key_off..key_off + 4];
	frame[key_off + 4..key_off + 4 + payload_len]
		.iter()
		.enumerate()
		.map(|(ix, &byte)| byte ^ key[ix % 4])
		.collect()
}

#[test]
fn needs_at_least_two_bytes() {
	assert!(matches!(parse_frame(b""), Ok(None)));
	assert!(matches!(parse_frame(b"\x81"), Ok(None)));
}

#[test]
fn parses_inline_length_frame() {
	// FIN text "hi"
	let header = parse_frame(b"\x81\x02hi").unwrap().expect("complete frame");

	assert_eq!(header.op, OpCode::Text);
	assert!(header.fin);
	assert_eq!(header.payload_off, 2);
	assert_eq!(header.payload_len, 2);
	assert_eq!(header.consumed, 4);
}

#[test]
fn parses_fragment_header() {
	// FIN clear, binary, empty payload
	let header = parse_frame(b"\x02\x00").unwrap().expect("complete frame");

	assert_eq!(header.op, OpCode::Binary);
	assert!(!header.fin);
	assert_eq!(header.payload_len, 0);
	assert_eq!(header.consumed, 2);
}

#[test]
fn parses_extended_16bit_length() {
	let mut frame = vec![0x82, 126];
	frame.extend_from_slice(&300u16.to_be_bytes());
	frame.extend(std::iter::repeat(0xAB).take(300));

	let header = parse_frame(&frame).unwrap().expect("complete frame");

	assert_eq!(header.op, OpCode::Binary);
	assert_eq!(header.payload_off, 4);
	assert_eq!(header.payload_len, 300);
	assert_eq!(header.consumed, 304);
}

#[test]
fn parses_extended_64bit_length() {
	let mut frame = vec![0x82, 127];
	frame.extend_from_slice(&70_000u64.to_be_bytes());
	frame.extend(std::iter::repeat(0xCD).take(70_000));

	let header = parse_frame(&frame).unwrap().expect("complete frame");

	assert_eq!(header.payload_off, 10);
	assert_eq!(header.payload_len, 70_000);
}

#[test]
fn incomplete_extended_length_needs_more() {
	assert!(matches!(parse_frame(&[0x82, 126, 0x01]), Ok(None)));
	assert!(matches!(parse_frame(&[0x82, 127, 0, 0, 0]), Ok(None)));
}

#[test]
fn incomplete_payload_needs_more() {
	assert!(matches!(parse_frame(b"\x81\x05hel"), Ok(None)));
}

#[test]
fn rejects_reserved_bits() {
	assert_eq!(parse_frame(b"\xC1\x00"), Err(FrameError::BadReserved));
	assert_eq!(parse_frame(b"\xA1\x00"), Err(FrameError::BadReserved));
	assert_eq!(parse_frame(b"\x91\x00"), Err(FrameError::BadReserved));
}

#[test]
fn rejects_masked_server_frames() {
	assert_eq!(parse_frame(b"\x81\x82abcd"), Err(FrameError::MaskedServer));
}

#[test]
fn control_frame_is_masked_and_round_trips() {
	let mut out = [0u8; 64];
	let written = write_control_frame(&mut out, OpCode::Ping, b"tick");

	assert_eq!(written, 6 + 4);
	assert_eq!(out[0], 0x89);
	// mask bit plus inline length
	assert_eq!(out[1], 0x80 | 4);
	assert_eq!(unmask(&out[..written], 2, 4), b"tick");
}

#[test]
fn control_frame_rejects_oversized_payload() {
	let mut out = [0u8; 256];
	assert_eq!(write_control_frame(&mut out, OpCode::Pong, &[0u8; 126]), 0);
}

#[test]
fn control_frame_requires_room() {
	let mut out = [0u8; 5];
	assert_eq!(write_control_frame(&mut out, OpCode::Pong, b""), 0);
}

#[test]
fn close_frame_carries_code_masked() {
	let mut out = [0u8; 8];
	let written = write_close(&mut out, 1002);

	assert_eq!(written, 8);
	assert_eq!(out[0], 0x88);
	assert_eq!(out[1], 0x80 | 2);
	assert_eq!(unmask(&out, 2, 2), 1002u16.to_be_bytes());
}

#[test]
fn data_frame_inline_length() {
	let mut out = [0u8; 64];
	let written = write_data_frame(&mut out, OpCode::Text, b"hello");

	assert_eq!(written, 2 + 4 + 5);
	assert_eq!(out[0], 0x81);
	assert_eq!(out[1], 0x80 | 5);
	assert_eq!(unmask(&out[..written], 2, 5), b"hello");
}

#[test]
fn data_frame_extended_length() {
	let payload = vec![0x42u8; 500];
	let mut out = vec![0u8; 600];

	let written = write_data_frame(&mut out, OpCode::Binary, &payload);

	assert_eq!(written, 4 + 4 + 500);
	assert_eq!(out[0], 0x82);
	assert_eq!(out[1], 0x80 | 126);
	assert_eq!(u16::from_be_bytes([out[2], out[3]]), 500);
	assert_eq!(unmask(&out[..written], 4, 500), payload);
}
