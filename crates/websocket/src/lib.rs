// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

//! RFC 6455 WebSocket client session over the reactor's protocol contract.
//!
//! The session drives `Idle → HandshakeSent → Listening`: the upgrade
//! request goes out on connect, the `101` response is verified against
//! `base64(SHA1(key ∥ GUID))`, and frames are then parsed, reassembled and
//! dispatched to a [`Codec`]. All egress frames carry a fresh random mask.

pub mod frame;
pub mod handshake;
pub mod session;

pub use frame::{parse_frame, CloseCode, FrameError, FrameHeader, OpCode};
pub use handshake::Header;
pub use session::{Codec, WebSocket, WsConfig, MSG_CAP};
