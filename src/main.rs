use std::sync::Arc;

use anyhow::{Context, Result};
use surgewatch::clock::build_clock;
use surgewatch::config::Config;
use surgewatch::engine::Engine;
use surgewatch::historical_stats;
use surgewatch::ingest::IngestWorker;
use surgewatch::replay::ReplayDriver;
use surgewatch::session_monitor::SessionMonitor;
use surgewatch::sink::{build_sink, QueuedSink};
use surgewatch::snapshot;
use surgewatch::watchlist;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
	init_tracing();

	if let Err(e) = run().await {
		error!("fatal error: {e:#}");
		std::process::exit(1);
	}

	Ok(())
}

/// `STAGE2_DEBUG` (§6) raises the detector/engine targets to `debug` without
/// touching the rest of the log surface, unless `RUST_LOG` is already set.
fn init_tracing() {
	let default_filter =
		if std::env::var("STAGE2_DEBUG").is_ok() { "info,surgewatch::detector=debug,surgewatch::engine=debug" } else { "info" };

	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
		)
		.init();
}

async fn run() -> Result<()> {
	let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
	let config = Config::load(&config_path).with_context(|| format!("failed to load configuration from {config_path}"))?;

	let watchlist = watchlist::load(&config.watchlist.path).context("failed to load watchlist")?;
	if watchlist.is_empty() {
		anyhow::bail!("watchlist at {} contains no symbols", config.watchlist.path);
	}
	info!(count = watchlist.len(), "watchlist loaded");

	let historical = match config.historical_stats.path.as_deref() {
		Some(path) => match historical_stats::load(path) {
			Ok(stats) => {
				info!(count = stats.len(), "historical stats loaded");
				stats
			},
			Err(e) => {
				warn!(error = %e, "failed to load historical stats, proceeding with base thresholds and liquidity 0.5");
				Default::default()
			},
		},
		None => Default::default(),
	};

	let sink = build_sink(&config.sink);
	let (queued_sink, drain) = QueuedSink::new(config.sink.alert_queue_capacity);

	let engine = Arc::new(Engine::new(
		config.clone(),
		build_clock(config.clock.force_fixed_offset),
		Box::new(queued_sink),
		watchlist,
		historical,
	));

	tokio::spawn(drain.run(sink));

	if let Ok(replay_path) = std::env::var("REPLAY_FILE") {
		info!(path = %replay_path, "running in replay mode");
		ReplayDriver::run(Arc::clone(&engine), &replay_path).await?;
		return Ok(());
	}

	run_live(engine, &config).await
}

async fn run_live(engine: Arc<Engine>, config: &Config) -> Result<()> {
	let snapshot_path = config.snapshot.path.clone().filter(|_| config.snapshot.enabled);
	if let Some(path) = &snapshot_path {
		if snapshot::load(path).is_some() {
			info!(path = %path, "found a prior session snapshot (seeded for reference; the live engine starts state fresh)");
		}
	}

	let (gate_tx, gate_rx) = watch::channel(true);
	let monitor = SessionMonitor::new(
		build_clock(config.clock.force_fixed_offset),
		config.session_monitor.poll_interval_secs,
		snapshot_path.clone(),
	);
	let monitor_engine = Arc::clone(&engine);
	tokio::spawn(async move { monitor.run(monitor_engine, gate_tx).await });

	let ingest = IngestWorker::new(
		config.ingest.url.clone(),
		config.ingest.reconnect_base_delay_secs,
		config.ingest.reconnect_max_delay_secs,
	);

	tokio::select! {
		result = ingest.run(Arc::clone(&engine), gate_rx) => {
			if let Err(e) = result {
				error!(error = %e, "ingest worker exited");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			info!("shutdown signal received, finishing in-flight work");
		}
	}

	if let Some(path) = &snapshot_path {
		let data = engine.snapshot().await;
		if let Err(e) = snapshot::save(path, &data) {
			error!(error = %e, path = %path, "failed to write snapshot on shutdown");
		}
	}

	Ok(())
}
