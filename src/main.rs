// ===============================
// src/main.rs
// ===============================
/*
 # status feed & sinyal
 curl -s localhost:9898/metrics | egrep '^(feed_connected|feed_backoffs_total|signal_)'

 # likuidasi yang masuk per symbol
 curl -s localhost:9898/metrics | grep '^liq_events_total_by_symbol'
*/
/*
=============================================================================
Project : liq_signal: liquidation stream monitor & rolling-window signal
Module  : main.rs
Version : 0.1.0
License : MIT (see LICENSE)

Summary : Streams Binance futures liquidations, keeps a bounded rolling window
          of buy/sell pressure per watched symbol, derives a BUY/SELL/HOLD
          signal with confidence, keeps a bounded table of large liquidations,
          exposes Prometheus metrics, and optionally records JSONL events.
=============================================================================
*/
use std::sync::Arc;

use tokio::{
    select,
    sync::{mpsc, watch},
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use liq_signal::{config, feed, metrics, recorder, LiquidationEngine};

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Load config ----
    let settings = match config::load() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(metrics::serve_metrics(settings.metrics_port));

    info!(
        watchlist = ?settings.watchlist,
        window_sec = settings.window_sec,
        window_capacity = settings.window_capacity,
        min_table_usd = settings.min_table_usd,
        ws_url = %settings.feed.ws_url,
        model = %settings.model_id(),
        "startup config"
    );
    for s in &settings.watchlist {
        metrics::CONFIG_SYMBOL.with_label_values(&[s]).set(1);
    }
    metrics::CONFIG_WINDOW_SEC.set(settings.window_sec as i64);

    // ---- Recorder (optional) ----
    let rec_tx = settings.record_file.clone().map(|path| {
        let (tx, rx) = mpsc::channel(8192);
        tokio::spawn(recorder::run(rx, path));
        tx
    });

    // ---- Engine + feed ----
    let engine = Arc::new(LiquidationEngine::new(settings.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut feed_handle = tokio::spawn(feed::run(engine.clone(), settings.feed.clone(), rec_tx, shutdown_rx));

    // ---- Heartbeat ----
    let mut beat = interval(Duration::from_secs(10));
    beat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut feed_done = false;
    loop {
        select! {
            _ = beat.tick() => {
                let s = engine.stats().snapshot();
                let signals: Vec<String> = engine
                    .analysis()
                    .signals
                    .iter()
                    .map(|(sym, sig)| format!("{sym}={}:{}", sig.recommendation.as_str(), sig.confidence))
                    .collect();
                info!(
                    state = ?s.state,
                    frames = s.frames,
                    accepted = s.accepted,
                    dropped = s.dropped,
                    qualifying = s.qualifying,
                    backoffs = s.backoffs,
                    signals = ?signals,
                    "heartbeat"
                );
            }
            res = &mut feed_handle => {
                // loop feed tidak seharusnya selesai sendiri
                error!(?res, "feed task exited");
                feed_done = true;
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                let _ = shutdown_tx.send(true);
                break;
            }
        }
    }
    if !feed_done {
        if let Err(e) = feed_handle.await {
            error!(?e, "feed task failed during shutdown");
        }
    }
    info!("bye");
}
