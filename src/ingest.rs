use crate::engine::Engine;
use crate::types::{QuoteEvent, RawTimestamp, Symbol, TradeEvent};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Wire shape for the single multiplexed trade/quote feed. Real exchange
/// adapters differ in framing; this is the shape the ingest worker expects
/// after any exchange-specific normalization upstream.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireMessage {
	Trade { symbol: String, price: f64, size: f64, ts: i64 },
	Quote { symbol: String, bid: f64, ask: f64, bid_size: Option<f64>, ask_size: Option<f64>, ts: i64 },
}

/// Single-threaded WebSocket ingest worker (§5): reads the stream in
/// delivery order and invokes `Engine::on_trade`/`on_quote` directly, so
/// ordering for a given symbol is preserved as the engine requires.
pub struct IngestWorker {
	url: String,
	reconnect_base_delay_secs: u64,
	reconnect_max_delay_secs: u64,
}

impl IngestWorker {
	#[must_use]
	pub fn new(url: String, reconnect_base_delay_secs: u64, reconnect_max_delay_secs: u64) -> Self {
		Self { url, reconnect_base_delay_secs, reconnect_max_delay_secs }
	}

	/// Runs until the process is shut down, reconnecting with exponential
	/// backoff on stream errors (grounded in the same retry shape used for
	/// the rest of the ingest layer). `gate` is published by the A5
	/// session-monitor worker; messages arriving while the gate reads
	/// `false` (outside trading hours) are drained from the socket but not
	/// folded into the engine.
	pub async fn run(&self, engine: Arc<Engine>, gate: watch::Receiver<bool>) -> Result<()> {
		let mut reconnect_delay = self.reconnect_base_delay_secs;

		loop {
			match self.run_once(&engine, &gate).await {
				Ok(()) => {
					info!("ingest stream ended normally");
					break;
				},
				Err(e) => {
					error!("ingest stream error: {e}. Reconnecting in {reconnect_delay}s...");
					sleep(Duration::from_secs(reconnect_delay)).await;
					reconnect_delay = (reconnect_delay * 2).min(self.reconnect_max_delay_secs);
				},
			}
		}

		Ok(())
	}

	async fn run_once(&self, engine: &Arc<Engine>, gate: &watch::Receiver<bool>) -> Result<()> {
		let (ws_stream, _) = connect_async(&self.url).await.context("Failed to connect to ingest stream")?;
		info!("connected to ingest stream");

		let (_write, mut read) = ws_stream.split();

		while let Some(msg) = read.next().await {
			let msg = msg.context("error reading message from ingest stream")?;

			match msg {
				Message::Text(text) => {
					if !*gate.borrow() {
						continue;
					}
					if let Err(e) = handle_message(&text, engine).await {
						warn!("failed to handle ingest message: {e}");
					}
				},
				Message::Close(_) => {
					info!("received close from ingest stream");
					break;
				},
				Message::Ping(_) | Message::Pong(_) => {
					debug!("ping/pong on ingest stream");
				},
				_ => {},
			}
		}

		Ok(())
	}
}

async fn handle_message(text: &str, engine: &Arc<Engine>) -> Result<()> {
	let message: WireMessage = serde_json::from_str(text).context("failed to parse ingest message")?;

	match message {
		WireMessage::Trade { symbol, price, size, ts } => {
			engine.on_trade(TradeEvent { symbol: Symbol::new(&symbol), price, size, ts: RawTimestamp::Millis(ts) }).await;
		},
		WireMessage::Quote { symbol, bid, ask, bid_size, ask_size, ts } => {
			engine
				.on_quote(QuoteEvent { symbol: Symbol::new(&symbol), bid, ask, bid_size, ask_size, ts: RawTimestamp::Millis(ts) })
				.await;
		},
	}

	Ok(())
}
