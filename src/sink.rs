use crate::config::TelegramConfig;
use crate::types::Alert;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use teloxide::{
	prelude::*,
	types::{MessageId, ParseMode, ThreadId},
};
use tokio::sync::{Mutex, Notify};
use tracing::{error, info};

/// Write-only alert output (§6): the engine never blocks on this, and a
/// failure here never propagates back into detection.
#[async_trait]
pub trait NotificationSink: Send + Sync {
	/// Returns whether the alert was delivered; failures are logged by the
	/// sink itself, never by the caller.
	async fn send(&self, alert: &Alert) -> bool;
}

/// Selected when `DISABLE_NOTIFICATIONS` is set or `sink.disable_notifications = true`.
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
	async fn send(&self, alert: &Alert) -> bool {
		info!(symbol = %alert.symbol, stage = %alert.stage, "notifications disabled, dropping alert");
		true
	}
}

/// HTTPS POST to a Telegram bot, the shipped sink per §6.
pub struct TelegramSink {
	bot: Bot,
	config: TelegramConfig,
}

impl TelegramSink {
	#[must_use]
	pub fn new(config: TelegramConfig) -> Self {
		let bot = Bot::new(&config.bot_token);
		Self { bot, config }
	}

	fn format_message(alert: &Alert) -> String {
		let mut lines = vec![
			format!("<b>{}</b> — {}", alert.symbol, alert.stage),
			format!("Price: {:.4}  Change: {:+.2}%", alert.price, alert.pct_change),
			format!("RelVol: {:.2}x  Volume: {:.0}  Trades: {}", alert.rel_vol, alert.volume, alert.trade_count),
			format!("VWAP: {:.4}  Quality: {:.1}", alert.vwap, alert.quality_score),
		];
		if let Some(path) = alert.path {
			lines.push(format!("Confirmed via {path} path"));
		}
		if let Some(expansion) = alert.expansion_pct {
			lines.push(format!("Expansion since setup: {expansion:+.2}%"));
		}
		lines.join("\n")
	}
}

#[async_trait]
impl NotificationSink for TelegramSink {
	async fn send(&self, alert: &Alert) -> bool {
		let message = Self::format_message(alert);

		let chat_id = match self.config.chat_id.parse::<i64>() {
			Ok(id) => id,
			Err(e) => {
				error!(error = %e, "invalid telegram chat_id, dropping alert");
				return false;
			},
		};

		let mut request = self.bot.send_message(ChatId(chat_id), message).parse_mode(ParseMode::Html);

		if let Some(topic_id) = self.config.topic_id.as_ref().filter(|t| !t.is_empty()) {
			if let Ok(thread_id) = topic_id.parse::<i32>() {
				request = request.message_thread_id(ThreadId(MessageId(thread_id)));
			}
		}

		match request.await {
			Ok(_) => {
				info!(symbol = %alert.symbol, stage = %alert.stage, "alert posted to telegram");
				true
			},
			Err(e) => {
				error!(symbol = %alert.symbol, error = %e, "failed to post alert to telegram");
				false
			},
		}
	}
}

#[must_use]
pub fn build_sink(config: &crate::config::SinkConfig) -> Box<dyn NotificationSink> {
	if config.disable_notifications {
		Box::new(NullSink)
	} else {
		Box::new(TelegramSink::new(config.telegram.clone()))
	}
}

/// Bounded in-process alert queue with an oldest-drop policy (§5 Suspension
/// points): `send` never blocks on the network, it only appends to the
/// queue (dropping the oldest entry once full) and wakes the drain task.
/// Ordering within a symbol is preserved because the queue is a single FIFO
/// and `AlertDrain` delivers strictly in push order.
pub struct QueuedSink {
	queue: Arc<Mutex<VecDeque<Alert>>>,
	notify: Arc<Notify>,
	capacity: usize,
}

impl QueuedSink {
	/// Builds the queue and its paired drain handle. The caller must spawn
	/// `AlertDrain::run` exactly once with the real sink to actually deliver.
	#[must_use]
	pub fn new(capacity: usize) -> (Self, AlertDrain) {
		let queue = Arc::new(Mutex::new(VecDeque::with_capacity(capacity)));
		let notify = Arc::new(Notify::new());
		let sink = Self { queue: Arc::clone(&queue), notify: Arc::clone(&notify), capacity };
		let drain = AlertDrain { queue, notify };
		(sink, drain)
	}
}

#[async_trait]
impl NotificationSink for QueuedSink {
	async fn send(&self, alert: &Alert) -> bool {
		let mut queue = self.queue.lock().await;
		if queue.len() >= self.capacity {
			queue.pop_front();
		}
		queue.push_back(alert.clone());
		drop(queue);
		self.notify.notify_one();
		true
	}
}

/// Drains `QueuedSink`'s queue into the real sink on a dedicated task, so a
/// slow or blocking sink never stalls the ingest worker.
pub struct AlertDrain {
	queue: Arc<Mutex<VecDeque<Alert>>>,
	notify: Arc<Notify>,
}

impl AlertDrain {
	pub async fn run(self, inner: Box<dyn NotificationSink>) {
		loop {
			self.notify.notified().await;
			loop {
				let next = {
					let mut queue = self.queue.lock().await;
					queue.pop_front()
				};
				match next {
					Some(alert) => {
						inner.send(&alert).await;
					},
					None => break,
				}
			}
		}
	}
}

#[cfg(test)]
mod queue_tests {
	use super::*;
	use crate::types::{ConfirmPath, Session, Stage, Symbol};
	use chrono::Utc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn alert(symbol: &str) -> Alert {
		Alert {
			symbol: Symbol::new(symbol),
			stage: Stage::Watch,
			ts: Utc::now(),
			session: Session::Regular,
			price: 10.0,
			pct_change: 1.0,
			rel_vol: 1.0,
			volume: 100.0,
			trade_count: 5,
			vwap: 10.0,
			spread_ratio: None,
			quality_score: 50.0,
			setup_price: None,
			expansion_pct: None,
			cumulative_volume_since_flag: None,
			path: None::<ConfirmPath>,
		}
	}

	struct CountingSink(Arc<AtomicUsize>);

	#[async_trait]
	impl NotificationSink for CountingSink {
		async fn send(&self, _alert: &Alert) -> bool {
			self.0.fetch_add(1, Ordering::SeqCst);
			true
		}
	}

	#[tokio::test]
	async fn send_never_blocks_and_drain_delivers_in_order() {
		let (queued, drain) = QueuedSink::new(8);
		let count = Arc::new(AtomicUsize::new(0));
		let drain_task = tokio::spawn(drain.run(Box::new(CountingSink(Arc::clone(&count)))));

		queued.send(&alert("AAPL")).await;
		queued.send(&alert("AAPL")).await;

		tokio::time::sleep(std::time::Duration::from_millis(50)).await;
		assert_eq!(count.load(Ordering::SeqCst), 2);
		drain_task.abort();
	}

	#[tokio::test]
	async fn drops_oldest_once_capacity_is_exceeded() {
		let (queued, _drain) = QueuedSink::new(2);
		queued.send(&alert("A")).await;
		queued.send(&alert("B")).await;
		queued.send(&alert("C")).await;

		let queue = queued.queue.lock().await;
		assert_eq!(queue.len(), 2);
		assert_eq!(queue.front().expect("front").symbol, Symbol::new("B"));
		assert_eq!(queue.back().expect("back").symbol, Symbol::new("C"));
	}
}
