// ===============================
// src/history.rs
// ===============================
use std::collections::VecDeque;

use ahash::AHashMap as HashMap;
use parking_lot::RwLock;

use crate::domain::Signal;

/// Fixed-capacity, newest-first ring. Insert at the front, oldest falls off the back.
pub struct BoundedRing<T> {
    cap: usize,
    items: RwLock<VecDeque<T>>,
}

impl<T: Clone> BoundedRing<T> {
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self { cap, items: RwLock::new(VecDeque::with_capacity(cap)) }
    }

    pub fn push(&self, item: T) {
        let mut items = self.items.write();
        items.push_front(item);
        items.truncate(self.cap);
    }

    /// Up to `limit` items, newest first.
    pub fn recent(&self, limit: usize) -> Vec<T> {
        self.items.read().iter().take(limit).cloned().collect()
    }

    /// Newest-first items that pass `keep`, up to `limit`.
    pub fn recent_filtered<F>(&self, limit: usize, mut keep: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        self.items.read().iter().filter(|x| keep(*x)).take(limit).cloned().collect()
    }
}

/// One current signal per watched symbol, overwritten in place.
pub struct SignalBoard {
    order: Vec<String>,
    signals: RwLock<HashMap<String, Signal>>,
}

impl SignalBoard {
    pub fn new(symbols: &[String]) -> Self {
        let signals = symbols.iter().map(|s| (s.clone(), Signal::HOLD)).collect();
        Self { order: symbols.to_vec(), signals: RwLock::new(signals) }
    }

    /// Ignores symbols that were not registered at start.
    pub fn set(&self, symbol: &str, sig: Signal) {
        if let Some(slot) = self.signals.write().get_mut(symbol) {
            *slot = sig;
        }
    }

    pub fn get(&self, symbol: &str) -> Option<Signal> {
        self.signals.read().get(symbol).copied()
    }

    /// All signals in watch-list order, read under one lock.
    pub fn all(&self) -> Vec<(String, Signal)> {
        let signals = self.signals.read();
        self.order
            .iter()
            .map(|s| (s.clone(), signals.get(s).copied().unwrap_or_default()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Recommendation;

    #[test]
    fn ring_keeps_newest_capacity_items_newest_first() {
        let ring = BoundedRing::new(3);
        for i in 1..=4 {
            ring.push(i);
        }
        assert_eq!(ring.recent(10), vec![4, 3, 2]);
        assert_eq!(ring.recent(2), vec![4, 3]);
    }

    #[test]
    fn capacity_plus_one_drops_only_the_oldest() {
        let ring = BoundedRing::new(500);
        for i in 0..501 {
            ring.push(i);
        }
        let all = ring.recent(usize::MAX);
        assert_eq!(all.len(), 500);
        assert!(!all.contains(&0));
        assert_eq!(all.first(), Some(&500));
        assert_eq!(all.last(), Some(&1));
    }

    #[test]
    fn filtered_view_applies_limit_after_filter() {
        let ring = BoundedRing::new(10);
        for i in 0..10 {
            ring.push(i);
        }
        assert_eq!(ring.recent_filtered(3, |x| x % 2 == 0), vec![8, 6, 4]);
    }

    #[test]
    fn signal_board_overwrites_in_place() {
        let board = SignalBoard::new(&["XRPUSDT".to_string(), "DOGEUSDT".to_string()]);
        let sell = Signal { recommendation: Recommendation::Sell, confidence: 95 };
        board.set("DOGEUSDT", sell);
        board.set("DOGEUSDT", Signal::HOLD);
        board.set("BTCUSDT", sell);

        assert_eq!(board.get("DOGEUSDT"), Some(Signal::HOLD));
        assert_eq!(board.get("BTCUSDT"), None);
        let all = board.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "XRPUSDT");
    }
}
