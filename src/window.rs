// ===============================
// src/window.rs
// ===============================
//
// Rolling window per watched symbol:
// - append       : push ke tail, evict dari head kalau lewat capacity
// - snapshot_fresh: purge entry yang lebih tua dari `now - window_sec`, lalu copy sisanya
//
// Purge is lazy (only on use), there is no background sweep. Every operation
// takes the symbol's lock for its whole duration, so readers never see a
// half-purged window.
//
use std::collections::VecDeque;

use ahash::AHashMap as HashMap;
use parking_lot::Mutex;

use crate::domain::{Side, WindowEntry};

pub struct WindowStore {
    window_sec: f64,
    capacity: usize,
    windows: HashMap<String, Mutex<VecDeque<WindowEntry>>>,
}

impl WindowStore {
    pub fn new<I, S>(symbols: I, window_sec: u64, capacity: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let capacity = capacity.max(1);
        let windows = symbols
            .into_iter()
            .map(|s| (s.into(), Mutex::new(VecDeque::with_capacity(capacity.min(1024)))))
            .collect();
        Self { window_sec: window_sec as f64, capacity, windows }
    }

    fn slot(&self, symbol: &str) -> &Mutex<VecDeque<WindowEntry>> {
        // symbol di luar watchlist = bug setup, bukan kondisi runtime
        self.windows
            .get(symbol)
            .unwrap_or_else(|| panic!("window requested for unregistered symbol {symbol}"))
    }

    pub fn append(&self, symbol: &str, ts_secs: f64, side: Side, notional_usd: f64) {
        let mut w = self.slot(symbol).lock();
        w.push_back(WindowEntry { ts_secs, side, notional_usd });
        while w.len() > self.capacity {
            w.pop_front();
        }
    }

    /// Drops expired entries, then returns a copy of what is left (arrival order).
    pub fn snapshot_fresh(&self, symbol: &str, now_secs: f64) -> Vec<WindowEntry> {
        let mut w = self.slot(symbol).lock();
        let cutoff = now_secs - self.window_sec;
        while w.front().is_some_and(|e| e.ts_secs < cutoff) {
            w.pop_front();
        }
        // Upstream event time jitters, so a stale entry can sit behind a fresh head.
        if w.iter().any(|e| e.ts_secs < cutoff) {
            w.retain(|e| e.ts_secs >= cutoff);
        }
        w.iter().copied().collect()
    }

    /// Current length without purging.
    pub fn len(&self, symbol: &str) -> usize {
        self.slot(symbol).lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(cap: usize) -> WindowStore {
        WindowStore::new(["XRPUSDT", "DOGEUSDT"], 180, cap)
    }

    #[test]
    fn snapshot_only_returns_entries_inside_window() {
        let ws = store(3000);
        let now = 10_000.0;
        ws.append("XRPUSDT", now - 500.0, Side::Buy, 1.0);
        ws.append("XRPUSDT", now - 181.0, Side::Sell, 2.0);
        ws.append("XRPUSDT", now - 180.0, Side::Buy, 3.0);
        ws.append("XRPUSDT", now - 1.0, Side::Sell, 4.0);

        let snap = ws.snapshot_fresh("XRPUSDT", now);
        assert_eq!(snap.len(), 2);
        assert!(snap.iter().all(|e| now - e.ts_secs <= 180.0));
        assert_eq!(snap[0].notional_usd, 3.0);
        // purge actually removed them, not just filtered the copy
        assert_eq!(ws.len("XRPUSDT"), 2);
    }

    #[test]
    fn out_of_order_stale_entry_is_removed() {
        let ws = store(3000);
        let now = 1_000.0;
        ws.append("XRPUSDT", now - 5.0, Side::Buy, 1.0);
        ws.append("XRPUSDT", now - 400.0, Side::Sell, 2.0);
        ws.append("XRPUSDT", now - 2.0, Side::Sell, 3.0);

        let snap = ws.snapshot_fresh("XRPUSDT", now);
        assert_eq!(snap.iter().map(|e| e.notional_usd).collect::<Vec<_>>(), vec![1.0, 3.0]);
    }

    #[test]
    fn capacity_is_never_exceeded_and_evicts_oldest() {
        let ws = store(5);
        for i in 0..50 {
            ws.append("DOGEUSDT", 100.0 + i as f64, Side::Buy, i as f64);
            assert!(ws.len("DOGEUSDT") <= 5);
        }
        let snap = ws.snapshot_fresh("DOGEUSDT", 150.0);
        assert_eq!(snap.iter().map(|e| e.notional_usd).collect::<Vec<_>>(), vec![45.0, 46.0, 47.0, 48.0, 49.0]);
    }

    #[test]
    fn snapshot_is_idempotent_for_same_now() {
        let ws = store(3000);
        for i in 0..20 {
            ws.append("XRPUSDT", i as f64 * 20.0, Side::Sell, 10.0);
        }
        let a = ws.snapshot_fresh("XRPUSDT", 400.0);
        let b = ws.snapshot_fresh("XRPUSDT", 400.0);
        assert_eq!(a, b);
    }

    #[test]
    fn windows_are_independent_per_symbol() {
        let ws = store(3000);
        ws.append("XRPUSDT", 10.0, Side::Buy, 1.0);
        assert!(ws.snapshot_fresh("DOGEUSDT", 10.0).is_empty());
        assert_eq!(ws.snapshot_fresh("XRPUSDT", 10.0).len(), 1);
    }

    #[test]
    #[should_panic(expected = "unregistered symbol")]
    fn unregistered_symbol_fails_fast() {
        store(10).append("BTCUSDT", 1.0, Side::Buy, 1.0);
    }
}
