// Copyright (c) reifydb.com 2025
// This file is licensed under the MIT

//! Demo market-data client: one WebSocket depth stream driven by the
//! reactor on this thread, depth events consumed by a pinned worker thread.

mod codec;

use std::{env, sync::mpsc, thread};

use signal_hook::{
	consts::{SIGINT, SIGTERM},
	iterator::Signals,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use reifydb_reactor::{Conn, Connection, ConnectionConfig, MioBackend, Reactor};
use reifydb_transport::{Plain, Tls, TlsConfig};
use reifydb_websocket::{WebSocket, WsConfig};

use crate::codec::{DepthCodec, DepthConfig, DepthEvent, Side};

struct Endpoint {
	secure: bool,
	host: String,
	port: u16,
	path: String,
}

/// Parses `ws://host:port/path` or `wss://host:port/path`.
fn parse_endpoint(url: &str) -> Option<Endpoint> {
	let (secure, rest) = if let Some(rest) = url.strip_prefix("wss://") {
		(true, rest)
	} else if let Some(rest) = url.strip_prefix("ws://") {
		(false, rest)
	} else {
		return None;
	};

	let (authority, path) = match rest.find('/') {
		Some(slash) => (&rest[..slash], &rest[slash..]),
		None => (rest, "/"),
	};

	let (host, port) = match authority.rsplit_once(':') {
		Some((host, port)) => (host, port.parse().ok()?),
		None => (
			authority,
			if secure {
				443
			} else {
				80
			},
		),
	};

	if host.is_empty() {
		return None;
	}

	Some(Endpoint {
		secure,
		host: host.to_owned(),
		port,
		path: path.to_owned(),
	})
}

fn pin_current_thread(var: &str) {
	let Ok(cpu) = env::var(var) else {
		return;
	};

	let Ok(cpu) = cpu.parse::<usize>() else {
		error!(var, cpu = %cpu, "invalid cpu id");
		return;
	};

	let pinned = core_affinity::get_core_ids()
		.and_then(|cores| cores.into_iter().find(|core| core.id == cpu))
		.map(core_affinity::set_for_current)
		.unwrap_or(false);

	if !pinned {
		error!(cpu, "failed to pin thread");
	}
}

/// Consumes depth events until the producers hang up.
fn run_worker(queue: mpsc::Receiver<DepthEvent>) {
	pin_current_thread("FEED_WORKER_CPU");

	while let Ok(event) = queue.recv() {
		println!(
			"{}: {} {} {} @ {}",
			event.event_time_ms,
			event.symbol,
			match event.side {
				Side::Ask => "A",
				Side::Bid => "B",
			},
			event.qty,
			event.price,
		);
	}
}

fn main() {
	tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();

	let url = env::args().nth(1).unwrap_or_else(|| "wss://stream.binance.com:9443/ws/btcusdt@depth".to_owned());

	let endpoint = parse_endpoint(&url).expect("endpoint must be ws://host[:port]/path or wss://host[:port]/path");

	let (depth_tx, depth_rx) = mpsc::sync_channel::<DepthEvent>(1 << 10);

	let worker = thread::spawn(move || run_worker(depth_rx));

	let net = MioBackend::new(2).expect("backend");

	// SIGINT/SIGTERM wake the reactor, which then stops every connection
	let signaler = net.signaler();
	let mut signals = Signals::new([SIGINT, SIGTERM]).expect("signal handler");
	thread::spawn(move || {
		for signal in signals.forever() {
			info!(signal, "shutdown requested");
			signaler.signal();
		}
	});

	let ws_config = WsConfig {
		path: endpoint.path.clone(),
		extra: Vec::new(),
		codec: DepthConfig {
			queue: depth_tx,
		},
	};

	let conn: Box<dyn Conn<MioBackend>> = if endpoint.secure {
		Box::new(Connection::<MioBackend, Tls, WebSocket<DepthCodec>>::from_config(ConnectionConfig {
			host: endpoint.host.clone(),
			port: endpoint.port,
			transport: TlsConfig {
				server_name: endpoint.host.clone(),
			},
			protocol: ws_config,
		}))
	} else {
		Box::new(Connection::<MioBackend, Plain, WebSocket<DepthCodec>>::from_config(ConnectionConfig {
			host: endpoint.host.clone(),
			port: endpoint.port,
			transport: (),
			protocol: ws_config,
		}))
	};

	pin_current_thread("FEED_NET_CPU");

	let mut reactor = Reactor::new(net, vec![conn]);
	if let Err(e) = reactor.run() {
		error!(error = %e, "reactor failed");
	}

	info!("net halted");

	// reactor gone -> producers gone -> the worker drains and exits
	drop(reactor);
	let _ = worker.join();
}
