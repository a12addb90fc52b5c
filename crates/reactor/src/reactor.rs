// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

use std::io;

use tracing::{error, info};

use crate::{
	backend::{Backend, Token},
	connection::Conn,
};

/// Heartbeat every 64 polls (~6.4 s at the 100 ms poll timeout).
const HEARTBEAT_MASK: u64 = 63;

/// Statically known set of connections driven by one backend on one thread.
///
/// The loop polls for edge events, routes each to the owning connection by
/// token, restarts gracefully closed connections, and fans a wake signal out
/// as `stop()` on every connection exactly once. The loop terminates once
/// stopping and all connections are done.
pub struct Reactor<B: Backend> {
	net: B,
	connections: Vec<Box<dyn Conn<B>>>,
	stopping: bool,
	ticks: u64,
}

impl<B: Backend> Reactor<B> {
	/// The connection set is fixed here; there is no dynamic add/remove.
	pub fn new(net: B, connections: Vec<Box<dyn Conn<B>>>) -> Self {
		Self {
			net,
			connections,
			stopping: false,
			ticks: 0,
		}
	}

	pub fn net(&self) -> &B {
		&self.net
	}

	pub fn run(&mut self) -> io::Result<()> {
		info!(backend = B::NAME, connections = self.connections.len(), "entering poll loop");

		for (ix, conn) in self.connections.iter_mut().enumerate() {
			conn.attach(&self.net, Token(ix));
		}

		let mut events = Vec::with_capacity(self.connections.len() + 1);

		while !self.net.stopped() {
			if let Err(e) = self.net.poll(&mut events) {
				error!(error = %e, "poll failed");
				self.net.stop();
				break;
			}

			for ev in &events {
				if ev.signal {
					if !self.stopping {
						self.stopping = true;
						info!("stopping all connections");
						for conn in self.connections.iter_mut() {
							conn.stop(&self.net);
						}
					}
				} else if let Some(conn) = self.connections.get_mut(ev.token.0) {
					if !conn.done() {
						conn.handle_event(&self.net, ev);

						if !self.stopping && conn.closed() {
							conn.restart(&self.net);
						}
					}
				}

				if self.stopping && self.all_done() {
					self.net.stop();
				}
			}

			self.ticks += 1;
			if self.ticks & HEARTBEAT_MASK == 0 {
				for conn in self.connections.iter_mut() {
					conn.heartbeat(&self.net);
				}
			}
		}

		Ok(())
	}

	fn all_done(&self) -> bool {
		self.connections.iter().all(|conn| conn.done())
	}
}
