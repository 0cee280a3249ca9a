// ===============================
// src/strategy.rs
// ===============================
//
// Rolling-window liquidation bias ("liq-window-v1").
//
//    Ide: bandingkan notional likuidasi BUY vs SELL di window
//         bias = (buy - sell) / total, -1..+1
//         |bias| < 0.08          -> HOLD
//         bias > 0 / bias < 0    -> BUY / SELL
//         confidence = clamp(50 + 45*|bias|, 10, 95)
//         +5 (max 99) kalau salah satu dari 5 entry terakhir >= threshold USD symbol
//
// The constants are part of the output contract for downstream consumers,
// keep them exact.
//
use crate::domain::{Recommendation, Side, Signal, WindowEntry};

pub const HOLD_BAND: f64 = 0.08;
pub const BASE_CONFIDENCE: f64 = 50.0;
pub const BIAS_WEIGHT: f64 = 45.0;
pub const MIN_CONFIDENCE: u8 = 10;
pub const MAX_CONFIDENCE: u8 = 95;
pub const BOOST_LOOKBACK: usize = 5;
pub const BOOST: u8 = 5;
pub const BOOST_CAP: u8 = 99;

/// Buy/sell notional totals over a window snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pressure { pub buy_usd: f64, pub sell_usd: f64 }

impl Pressure {
    pub fn of(entries: &[WindowEntry]) -> Pressure {
        entries.iter().fold(Pressure::default(), |mut p, e| {
            match e.side {
                Side::Buy => p.buy_usd += e.notional_usd,
                Side::Sell => p.sell_usd += e.notional_usd,
            }
            p
        })
    }

    pub fn total(&self) -> f64 { self.buy_usd + self.sell_usd }

    /// None when there is no pressure at all.
    pub fn bias(&self) -> Option<f64> {
        let total = self.total();
        if total > 0.0 { Some((self.buy_usd - self.sell_usd) / total) } else { None }
    }
}

/// Signal from an already purged window. `threshold_usd` is the symbol's alert threshold.
pub fn window_signal(entries: &[WindowEntry], threshold_usd: f64) -> Signal {
    let Some(bias) = Pressure::of(entries).bias() else {
        return Signal::HOLD;
    };

    let recommendation = if bias.abs() < HOLD_BAND {
        Recommendation::Hold
    } else if bias > 0.0 {
        Recommendation::Buy
    } else {
        Recommendation::Sell
    };

    // truncate like the v1 model, then clamp
    let raw = (BASE_CONFIDENCE + BIAS_WEIGHT * bias.abs()) as i64;
    let mut confidence = raw.clamp(MIN_CONFIDENCE as i64, MAX_CONFIDENCE as i64) as u8;

    let tail = &entries[entries.len().saturating_sub(BOOST_LOOKBACK)..];
    if tail.iter().any(|e| e.notional_usd >= threshold_usd) {
        confidence = confidence.saturating_add(BOOST).min(BOOST_CAP);
    }

    Signal { recommendation, confidence }
}
