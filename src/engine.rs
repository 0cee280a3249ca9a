// ===============================
// src/engine.rs
// ===============================
//
// Shared state aggregator. Dibuat sekali di main, di-share via Arc ke:
// - feed (satu-satunya writer)
// - pembaca (query layer, heartbeat, test)
//
// Each container has its own short-held lock. No lock is held across an await.
//
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};

use crate::binance::{decode_event, split_frame, Decoded};
use crate::classifier;
use crate::config::{Settings, SymbolsView};
use crate::domain::{LiquidationEvent, LiquidationRecord, Signal, TradeRecord};
use crate::history::{BoundedRing, SignalBoard};
use crate::metrics::{
    EVENTS_BY_SYMBOL, EVENTS_DROPPED, EVENTS_FILTERED, FEED_FRAMES, FEED_LAST_EVENT_TS, QUALIFYING_BY_SYMBOL,
    SIGNAL_CONFIDENCE, SIGNAL_DIRECTION, WINDOW_LEN,
};
use crate::strategy::window_signal;
use crate::window::WindowStore;

/// Ingestion loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedState { Connecting, Connected, Backoff, Stopped }

impl FeedState {
    fn from_u8(v: u8) -> FeedState {
        match v {
            0 => FeedState::Connecting,
            1 => FeedState::Connected,
            2 => FeedState::Backoff,
            _ => FeedState::Stopped,
        }
    }
    fn as_u8(self) -> u8 {
        match self {
            FeedState::Connecting => 0,
            FeedState::Connected => 1,
            FeedState::Backoff => 2,
            FeedState::Stopped => 3,
        }
    }
}

/// Counters readable from any task.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub frames: AtomicU64,
    pub accepted: AtomicU64,
    pub filtered: AtomicU64,
    pub dropped: AtomicU64,
    pub qualifying: AtomicU64,
    pub connect_attempts: AtomicU64,
    pub backoffs: AtomicU64,
    state: AtomicU8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames: u64,
    pub accepted: u64,
    pub filtered: u64,
    pub dropped: u64,
    pub qualifying: u64,
    pub connect_attempts: u64,
    pub backoffs: u64,
    pub state: FeedState,
}

impl IngestStats {
    pub fn state(&self) -> FeedState { FeedState::from_u8(self.state.load(Ordering::Relaxed)) }

    pub fn set_state(&self, s: FeedState) { self.state.store(s.as_u8(), Ordering::Relaxed) }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            qualifying: self.qualifying.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            backoffs: self.backoffs.load(Ordering::Relaxed),
            state: self.state(),
        }
    }
}

/// Per-frame tally returned by [`LiquidationEngine::ingest_frame`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub accepted: usize,
    pub filtered: usize,
    pub dropped: usize,
    pub records: Vec<LiquidationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub model: String,
    pub window_sec: u64,
    pub signals: Vec<(String, Signal)>,
}

pub struct LiquidationEngine {
    settings: Settings,
    windows: WindowStore,
    signals: SignalBoard,
    history: BoundedRing<LiquidationRecord>,
    trades: BoundedRing<TradeRecord>,
    stats: IngestStats,
}

impl LiquidationEngine {
    pub fn new(settings: Settings) -> Self {
        let windows = WindowStore::new(settings.watchlist.iter().cloned(), settings.window_sec, settings.window_capacity);
        let signals = SignalBoard::new(&settings.watchlist);
        let history = BoundedRing::new(settings.history_capacity);
        let trades = BoundedRing::new(settings.trade_log_capacity);
        Self { settings, windows, signals, history, trades, stats: IngestStats::default() }
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn stats(&self) -> &IngestStats { &self.stats }

    // ---------------- write path (ingestion task only) ----------------

    /// Decode and absorb a whole text frame. One bad element never affects its siblings.
    pub fn ingest_frame(&self, text: &str, now: DateTime<Utc>) -> FrameReport {
        let mut report = FrameReport::default();
        let recv_ms = now.timestamp_millis();
        self.stats.frames.fetch_add(1, Ordering::Relaxed);
        FEED_FRAMES.inc();

        let items = match split_frame(text) {
            Ok(items) => items,
            Err(e) => {
                self.count_drop(e.reason());
                debug!(error = %e, "frame dropped");
                report.dropped = 1;
                return report;
            }
        };

        for raw in &items {
            match decode_event(raw, |s| self.settings.is_watched(s), recv_ms) {
                Ok(Decoded::Event(ev)) => {
                    let symbol = ev.symbol.clone();
                    match catch_unwind(AssertUnwindSafe(|| self.absorb(&ev, now))) {
                        Ok(record) => {
                            report.accepted += 1;
                            if let Some(rec) = record {
                                report.records.push(rec);
                            }
                        }
                        Err(_) => {
                            error!(%symbol, "panic while processing liquidation, event dropped");
                            self.count_drop("panic");
                            report.dropped += 1;
                        }
                    }
                }
                Ok(Decoded::Ignored(_)) => {
                    self.stats.filtered.fetch_add(1, Ordering::Relaxed);
                    EVENTS_FILTERED.inc();
                    report.filtered += 1;
                }
                Err(e) => {
                    debug!(error = %e, "event dropped");
                    self.count_drop(e.reason());
                    report.dropped += 1;
                }
            }
        }
        report
    }

    /// Window append, classification, history insert, signal refresh for one watched event.
    /// Returns the history record when the event qualified for the table.
    pub fn absorb(&self, ev: &LiquidationEvent, now: DateTime<Utc>) -> Option<LiquidationRecord> {
        #[cfg(test)]
        fault::trip(&ev.symbol);

        let usd = ev.notional_usd();
        self.windows.append(&ev.symbol, ev.timestamp_secs(), ev.side, usd);

        let cls = classifier::classify(ev, &self.settings);
        let record = cls.qualifies.then(|| LiquidationRecord {
            timestamp: format_ts(ev.event_time_ms),
            symbol: ev.symbol.clone(),
            side: ev.side,
            price: ev.price,
            quantity: ev.quantity,
            notional_usd: usd,
            ai_recommendation: cls.alert.recommendation,
            confidence: cls.alert.confidence,
        });
        if let Some(rec) = &record {
            self.history.push(rec.clone());
            self.stats.qualifying.fetch_add(1, Ordering::Relaxed);
            QUALIFYING_BY_SYMBOL.with_label_values(&[&ev.symbol]).inc();
        }

        self.refresh_signal(&ev.symbol, now);

        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        EVENTS_BY_SYMBOL.with_label_values(&[&ev.symbol]).inc();
        FEED_LAST_EVENT_TS.set(now.timestamp());

        record
    }

    /// Purge the symbol's window, recompute and store its signal.
    fn refresh_signal(&self, symbol: &str, now: DateTime<Utc>) -> Signal {
        let (sig, len) = self.compute_signal(symbol, now);
        self.signals.set(symbol, sig);

        SIGNAL_CONFIDENCE.with_label_values(&[symbol]).set(sig.confidence as i64);
        SIGNAL_DIRECTION.with_label_values(&[symbol]).set(sig.recommendation.direction());
        WINDOW_LEN.with_label_values(&[symbol]).set(len as i64);
        sig
    }

    fn compute_signal(&self, symbol: &str, now: DateTime<Utc>) -> (Signal, usize) {
        let entries = self.windows.snapshot_fresh(symbol, epoch_secs(now));
        (window_signal(&entries, self.settings.threshold_usd(symbol)), entries.len())
    }

    fn count_drop(&self, reason: &str) {
        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        EVENTS_DROPPED.with_label_values(&[reason]).inc();
    }

    // ---------------- read path ----------------

    pub fn signal(&self, symbol: &str) -> Option<Signal> { self.signals.get(symbol) }

    /// Last stored signals (stale-but-present during an outage).
    pub fn analysis(&self) -> Analysis {
        Analysis {
            model: self.settings.model_id(),
            window_sec: self.settings.window_sec,
            signals: self.signals.all(),
        }
    }

    /// Recomputes every watched symbol from its purged window. The stored
    /// signals are left alone; only the ingestion path writes them.
    pub fn fresh_analysis(&self, now: DateTime<Utc>) -> Analysis {
        let signals = self
            .settings
            .watchlist
            .iter()
            .map(|s| (s.clone(), self.compute_signal(s, now).0))
            .collect();
        Analysis { model: self.settings.model_id(), window_sec: self.settings.window_sec, signals }
    }

    /// Newest-first qualifying liquidations for watched symbols.
    pub fn liquidations(&self, limit: usize) -> Vec<LiquidationRecord> {
        self.history.recent_filtered(limit, |r| self.settings.is_watched(&r.symbol))
    }

    pub fn window_snapshot(&self, symbol: &str, now: DateTime<Utc>) -> Vec<crate::domain::WindowEntry> {
        self.windows.snapshot_fresh(symbol, epoch_secs(now))
    }

    pub fn symbols(&self) -> SymbolsView { self.settings.symbols_view() }

    // trade log belongs to the order side; the engine only stores it
    pub fn record_trade(&self, rec: TradeRecord) { self.trades.push(rec) }

    pub fn trades(&self, limit: usize) -> Vec<TradeRecord> { self.trades.recent(limit) }
}

#[cfg(test)]
mod fault {
    use std::cell::RefCell;

    thread_local! {
        static PANIC_SYMBOL: RefCell<Option<String>> = const { RefCell::new(None) };
    }

    pub fn arm(symbol: Option<&str>) {
        PANIC_SYMBOL.with(|p| *p.borrow_mut() = symbol.map(str::to_string));
    }

    pub fn trip(symbol: &str) {
        if PANIC_SYMBOL.with(|p| p.borrow().as_deref() == Some(symbol)) {
            panic!("fault armed for {symbol}");
        }
    }
}

pub fn epoch_secs(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / 1000.0
}

fn format_ts(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}
