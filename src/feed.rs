// ===============================
// src/feed.rs
// ===============================
//
// Ingestion loop untuk stream likuidasi (`!forceOrder@arr`):
//
//   CONNECTING -> CONNECTED -> (error / close / ping timeout) -> BACKOFF -> CONNECTING ...
//
// - Backoff tetap (default 3s), tanpa batas retry. Loop hanya berhenti lewat shutdown.
// - CONNECTED kirim Ping tiap `ping_interval`; kalau Pong tidak datang dalam
//   `ping_timeout`, koneksi dianggap mati.
// - Decode error per event tidak pernah menghentikan loop (lihat engine::ingest_frame).
//
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, sleep_until, timeout, Duration, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::FeedConfig;
use crate::domain::LiquidationRecord;
use crate::engine::{FeedState, LiquidationEngine};
use crate::metrics::{FEED_BACKOFFS, FEED_CONNECTED, FEED_CONNECT_ATTEMPTS, RECORDER_DROPPED};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for the goodbye Close frame on shutdown.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("bad ws url {url}: {source}")]
    BadUrl { url: String, source: url::ParseError },
    #[error("connect failed: {0}")]
    Connect(#[source] WsError),
    #[error("read failed: {0}")]
    Read(#[source] WsError),
    #[error("send failed: {0}")]
    Send(#[source] WsError),
    #[error("no pong within {0:?}")]
    PingTimeout(Duration),
    #[error("stream closed by peer")]
    Closed,
}

enum SessionEnd {
    Shutdown,
    Failed(FeedError),
}

pub async fn connect(ws_url: &str) -> Result<WsStream, FeedError> {
    Url::parse(ws_url).map_err(|source| FeedError::BadUrl { url: ws_url.to_string(), source })?;
    let (ws, _resp) = connect_async(ws_url).await.map_err(FeedError::Connect)?;
    Ok(ws)
}

/// Runs the ingestion loop against `cfg.ws_url` until `shutdown` turns true.
pub async fn run(
    engine: Arc<LiquidationEngine>,
    cfg: FeedConfig,
    rec_tx: Option<mpsc::Sender<LiquidationRecord>>,
    shutdown: watch::Receiver<bool>,
) {
    let url = cfg.ws_url.clone();
    run_with(engine, cfg, rec_tx, shutdown, move || {
        let url = url.clone();
        async move { connect(&url).await }
    })
    .await
}

/// Same loop with a pluggable connector.
pub async fn run_with<S, F, Fut>(
    engine: Arc<LiquidationEngine>,
    cfg: FeedConfig,
    rec_tx: Option<mpsc::Sender<LiquidationRecord>>,
    mut shutdown: watch::Receiver<bool>,
    mut connect: F,
) where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, FeedError>>,
{
    let stats = engine.stats();

    loop {
        if *shutdown.borrow() {
            break;
        }

        // ---- CONNECTING ----
        stats.set_state(FeedState::Connecting);
        stats.connect_attempts.fetch_add(1, Ordering::Relaxed);
        FEED_CONNECT_ATTEMPTS.inc();
        info!(ws_url = %cfg.ws_url, "connecting liquidation stream");

        let attempt = tokio::select! {
            r = connect() => r,
            _ = wait_shutdown(&mut shutdown) => break,
        };

        // ---- CONNECTED ----
        match attempt {
            Ok(ws) => {
                stats.set_state(FeedState::Connected);
                FEED_CONNECTED.set(1);
                info!("liquidation stream connected");

                let end = session(&engine, &cfg, ws, rec_tx.as_ref(), &mut shutdown).await;
                FEED_CONNECTED.set(0);
                match end {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Failed(e) => warn!(error = %e, "liquidation stream lost, will reconnect"),
                }
            }
            Err(e) => error!(error = %e, "connect failed"),
        }

        // ---- BACKOFF ----
        if *shutdown.borrow() {
            break;
        }
        stats.set_state(FeedState::Backoff);
        stats.backoffs.fetch_add(1, Ordering::Relaxed);
        FEED_BACKOFFS.inc();
        tokio::select! {
            _ = sleep(cfg.reconnect_delay) => {}
            _ = wait_shutdown(&mut shutdown) => break,
        }
    }

    stats.set_state(FeedState::Stopped);
    FEED_CONNECTED.set(0);
    info!("liquidation stream stopped");
}

async fn session<S>(
    engine: &LiquidationEngine,
    cfg: &FeedConfig,
    ws: S,
    rec_tx: Option<&mpsc::Sender<LiquidationRecord>>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let (mut sink, mut stream) = ws.split();

    let mut ping = interval(cfg.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ping.reset(); // first ping after one full interval
    let mut pong_deadline: Option<Instant> = None;

    loop {
        let deadline = pong_deadline;
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(txt))) => on_text(engine, &txt, rec_tx),
                Some(Ok(Message::Binary(bytes))) => on_text(engine, &String::from_utf8_lossy(&bytes), rec_tx),
                Some(Ok(Message::Pong(_))) => pong_deadline = None,
                // Ping dijawab otomatis oleh tungstenite
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "liquidation stream closed by server");
                    return SessionEnd::Failed(FeedError::Closed);
                }
                Some(Err(e)) => return SessionEnd::Failed(FeedError::Read(e)),
                None => return SessionEnd::Failed(FeedError::Closed),
            },
            _ = ping.tick() => {
                if pong_deadline.is_none() {
                    pong_deadline = Some(Instant::now() + cfg.ping_timeout);
                }
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    return SessionEnd::Failed(FeedError::Send(e));
                }
            }
            _ = pong_timeout(deadline) => {
                return SessionEnd::Failed(FeedError::PingTimeout(cfg.ping_timeout));
            }
            _ = wait_shutdown(shutdown) => {
                match timeout(CLOSE_TIMEOUT, sink.send(Message::Close(None))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(error = %e, "close frame not sent"),
                    Err(_) => warn!(timeout = ?CLOSE_TIMEOUT, "close frame stalled, dropping connection"),
                }
                return SessionEnd::Shutdown;
            }
        }
    }
}

fn on_text(engine: &LiquidationEngine, txt: &str, rec_tx: Option<&mpsc::Sender<LiquidationRecord>>) {
    let report = engine.ingest_frame(txt, Utc::now());
    if let Some(tx) = rec_tx {
        forward_records(tx, report.records);
    }
}

/// Hands records to the recorder without blocking ingestion. Returns how many were dropped.
fn forward_records(tx: &mpsc::Sender<LiquidationRecord>, records: Vec<LiquidationRecord>) -> usize {
    let mut dropped = 0;
    for rec in records {
        match tx.try_send(rec) {
            Ok(()) => {}
            Err(TrySendError::Full(rec)) => {
                debug!(symbol = %rec.symbol, "recorder channel full, record dropped");
                dropped += 1;
            }
            Err(TrySendError::Closed(rec)) => {
                debug!(symbol = %rec.symbol, "recorder gone, record dropped");
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        RECORDER_DROPPED.inc_by(dropped as u64);
    }
    dropped
}

async fn pong_timeout(deadline: Option<Instant>) {
    match deadline {
        Some(d) => sleep_until(d).await,
        None => std::future::pending().await,
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn wait_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
