// ===============================
// src/classifier.rs
// ===============================
//
// Per-event decisions, no window context:
// 1) alert   : notional >= threshold USD symbol -> arah ikut side likuidasi
// 2) qualify : masuk tabel "recent large liquidations" kalau qty >= threshold qty
//              DAN notional >= min_table_usd
//
use crate::config::Settings;
use crate::domain::{LiquidationEvent, Recommendation, Side, Signal};

const ALERT_BASE: f64 = 80.0;
const ALERT_WEIGHT: f64 = 15.0;
const ALERT_MIN: i64 = 70;
const ALERT_MAX: i64 = 95;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub alert: Signal,
    pub qualifies: bool,
}

/// Event-level alert. Direction mirrors the liquidated side.
pub fn event_alert(side: Side, notional_usd: f64, threshold_usd: f64) -> Signal {
    if notional_usd < threshold_usd {
        return Signal::HOLD;
    }
    let recommendation = match side {
        Side::Sell => Recommendation::Sell,
        Side::Buy => Recommendation::Buy,
    };
    let over = ((notional_usd - threshold_usd) / threshold_usd.max(1.0)).max(0.0);
    let confidence = ((ALERT_BASE + over * ALERT_WEIGHT) as i64).clamp(ALERT_MIN, ALERT_MAX) as u8;
    Signal { recommendation, confidence }
}

pub fn qualifies_for_history(quantity: f64, notional_usd: f64, threshold_qty: f64, min_table_usd: f64) -> bool {
    quantity >= threshold_qty && notional_usd >= min_table_usd
}

pub fn classify(ev: &LiquidationEvent, settings: &Settings) -> Classification {
    let usd = ev.notional_usd();
    Classification {
        alert: event_alert(ev.side, usd, settings.threshold_usd(&ev.symbol)),
        qualifies: qualifies_for_history(ev.quantity, usd, settings.threshold_qty(&ev.symbol), settings.min_table_usd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(symbol: &str, side: Side, price: f64, quantity: f64) -> LiquidationEvent {
        LiquidationEvent { symbol: symbol.into(), side, price, quantity, event_time_ms: 0 }
    }

    #[test]
    fn exactly_at_threshold_alerts() {
        let sig = event_alert(Side::Buy, 7500.0, 7500.0);
        assert_eq!(sig, Signal { recommendation: Recommendation::Buy, confidence: 80 });
        assert_eq!(event_alert(Side::Buy, 7499.99, 7500.0), Signal::HOLD);
    }

    #[test]
    fn alert_confidence_grows_then_caps() {
        // over = 0.2 -> 83
        assert_eq!(event_alert(Side::Sell, 1200.0, 1000.0).confidence, 83);
        // over = 9 -> capped
        assert_eq!(event_alert(Side::Sell, 75_000.0, 7500.0).confidence, 95);
    }

    #[test]
    fn zero_threshold_does_not_divide_by_zero() {
        let sig = event_alert(Side::Sell, 0.5, 0.0);
        assert_eq!(sig.recommendation, Recommendation::Sell);
        assert_eq!(sig.confidence, 87);
    }

    #[test]
    fn xrp_sell_example() {
        let settings = Settings::with_watchlist(["XRPUSDT"]);
        let c = classify(&ev("XRPUSDT", Side::Sell, 0.5, 20_000.0), &settings);
        assert!(c.qualifies);
        assert_eq!(c.alert.recommendation, Recommendation::Sell);
        assert!((70..=95).contains(&c.alert.confidence));
    }

    #[test]
    fn history_needs_both_quantity_and_min_usd() {
        let mut settings = Settings::with_watchlist(["XRPUSDT"]);
        assert!(!classify(&ev("XRPUSDT", Side::Buy, 2.0, 2999.0), &settings).qualifies);
        assert!(classify(&ev("XRPUSDT", Side::Buy, 2.0, 3000.0), &settings).qualifies);

        settings.min_table_usd = 10_000.0;
        assert!(!classify(&ev("XRPUSDT", Side::Buy, 2.0, 3000.0), &settings).qualifies);
        assert!(classify(&ev("XRPUSDT", Side::Buy, 2.0, 5000.0), &settings).qualifies);
    }

    #[test]
    fn quantity_and_alert_are_independent() {
        let settings = Settings::with_watchlist(["PEPEUSDT"]);
        // 1e6 PEPE @ 0.01 = 10k USD: alert but too few units for the table
        let c = classify(&ev("PEPEUSDT", Side::Buy, 0.01, 1_000_000.0), &settings);
        assert_eq!(c.alert.recommendation, Recommendation::Buy);
        assert!(!c.qualifies);
    }
}
