// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::sync::mpsc::{SyncSender, TrySendError};

use serde::Deserialize;
use tracing::{trace, warn};

use reifydb_reactor::{io::Output, protocol::Status};
use reifydb_websocket::Codec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
	Bid,
	Ask,
}

/// Per-level market depth diff handed to the worker thread.
#[derive(Debug, Clone)]
pub struct DepthEvent {
	pub symbol: String,
	pub side: Side,
	/// Remote event time.
	pub event_time_ms: i64,
	/// Local receive time.
	pub recv_time_ns: i64,
	pub update_id: i64,

	pub price: String,
	pub qty: String,
}

#[derive(Deserialize)]
struct DepthUpdate {
	#[serde(rename = "e")]
	event: String,
	#[serde(rename = "s", default)]
	symbol: String,
	#[serde(rename = "E")]
	event_time_ms: i64,
	#[serde(rename = "u")]
	update_id: i64,
	#[serde(rename = "b")]
	bids: Vec<(String, String)>,
	#[serde(rename = "a")]
	asks: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct DepthConfig {
	/// Producer end of the bounded queue to the worker thread. The reactor
	/// thread is the only producer.
	pub queue: SyncSender<DepthEvent>,
}

/// Parses depth-diff stream events and enqueues them per level for the
/// worker thread.
pub struct DepthCodec {
	queue: SyncSender<DepthEvent>,
}

impl Codec for DepthCodec {
	type Config = DepthConfig;

	const HAS_TEXT: bool = true;

	fn create(config: &DepthConfig) -> Self {
		DepthCodec {
			queue: config.queue.clone(),
		}
	}

	fn on_text(&mut self, _tx: &mut Output<'_>, payload: &[u8]) -> Status {
		let diff: DepthUpdate = match serde_json::from_slice(payload) {
			Ok(diff) => diff,
			Err(e) => {
				warn!(error = %e, len = payload.len(), "dropping unparsable stream event");
				return Status::Ok;
			}
		};

		if diff.event != "depthUpdate" {
			trace!(event = %diff.event, "dropping stream event");
			return Status::Ok;
		}

		self.push_diff(diff)
	}
}

impl DepthCodec {
	fn push_diff(&mut self, diff: DepthUpdate) -> Status {
		let recv_time_ns = 0;

		for (side, levels) in [(Side::Ask, &diff.asks), (Side::Bid, &diff.bids)] {
			for (price, qty) in levels {
				let event = DepthEvent {
					symbol: diff.symbol.clone(),
					side,
					event_time_ms: diff.event_time_ms,
					recv_time_ns,
					update_id: diff.update_id,
					price: price.clone(),
					qty: qty.clone(),
				};

				match self.queue.try_send(event) {
					Ok(()) => {}
					Err(TrySendError::Full(_)) => {
						warn!("depth queue full, dropping event");
						return Status::Ok;
					}
					Err(TrySendError::Disconnected(_)) => {
						warn!("worker gone, dropping event");
						return Status::Ok;
					}
				}
			}
		}

		Status::Ok
	}
}
