// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize};

/// Side of the liquidated position as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side { Buy, Sell }

impl Side {
    pub fn parse(s: &str) -> Option<Side> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation { Buy, Sell, Hold }

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self { Recommendation::Buy => "BUY", Recommendation::Sell => "SELL", Recommendation::Hold => "HOLD" }
    }
    /// -1 / 0 / +1, dipakai untuk gauge metrics
    pub fn direction(&self) -> i64 {
        match self { Recommendation::Buy => 1, Recommendation::Sell => -1, Recommendation::Hold => 0 }
    }
}

/// Directional signal: recommendation + confidence in 0..=99.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal { pub recommendation: Recommendation, pub confidence: u8 }

impl Signal {
    pub const HOLD: Signal = Signal { recommendation: Recommendation::Hold, confidence: 0 };
}

impl Default for Signal {
    fn default() -> Self { Signal::HOLD }
}

/// Normalized liquidation event (already uppercased, numeric fields defaulted to 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub event_time_ms: i64,
}

impl LiquidationEvent {
    pub fn notional_usd(&self) -> f64 { notional(self.price, self.quantity) }
    pub fn timestamp_secs(&self) -> f64 { self.event_time_ms as f64 / 1000.0 }
}

/// price * qty, 0 when either side is not a finite number.
pub fn notional(price: f64, qty: f64) -> f64 {
    let v = price * qty;
    if v.is_finite() { v } else { 0.0 }
}

/// One observation inside a rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowEntry { pub ts_secs: f64, pub side: Side, pub notional_usd: f64 }

/// Row of the "recent large liquidations" table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationRecord {
    pub timestamp: String,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    pub notional_usd: f64,
    pub ai_recommendation: Recommendation,
    pub confidence: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode { Testnet, Sim }

/// Trade attempt written by the order-execution side (not by ingestion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ts_ms: i64,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub mode: TradeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parse_is_case_insensitive() {
        assert_eq!(Side::parse("sell"), Some(Side::Sell));
        assert_eq!(Side::parse(" BUY "), Some(Side::Buy));
        assert_eq!(Side::parse("LONG"), None);
    }

    #[test]
    fn notional_of_event() {
        let ev = LiquidationEvent {
            symbol: "XRPUSDT".into(),
            side: Side::Sell,
            price: 0.5,
            quantity: 20_000.0,
            event_time_ms: 1_700_000_000_500,
        };
        assert_eq!(ev.notional_usd(), 10_000.0);
        assert_eq!(ev.timestamp_secs(), 1_700_000_000.5);
        assert_eq!(notional(f64::INFINITY, 2.0), 0.0);
    }

    #[test]
    fn signal_serializes_uppercase() {
        let s = Signal { recommendation: Recommendation::Buy, confidence: 68 };
        let txt = serde_json::to_string(&s).unwrap();
        assert_eq!(txt, r#"{"recommendation":"BUY","confidence":68}"#);
    }
}
