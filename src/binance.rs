// ===============================
// src/binance.rs
// ===============================
//
// Decoder untuk stream `!forceOrder@arr` (Binance USDⓈ-M futures).
//
// Contoh payload (satu envelope, atau array of envelope):
// {"e":"forceOrder","E":1568014460893,"o":{"s":"BTCUSDT","S":"SELL","o":"LIMIT","f":"IOC",
//  "q":"0.014","p":"9910","ap":"9910","X":"FILLED","l":"0.014","z":"0.014","T":1568014460893}}
//
// Numbers may come as strings or JSON numbers. Missing / unparsable numbers count as 0.
//
use serde_json::Value;
use thiserror::Error;

use crate::domain::{LiquidationEvent, Side};

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("frame is not valid json: {0}")]
    Json(String),
    #[error("event is not an object")]
    NotObject,
    #[error("event has no order object")]
    MissingOrder,
    #[error("event has no symbol")]
    MissingSymbol,
    #[error("bad side {0:?}")]
    BadSide(String),
}

impl DecodeError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeError::Json(_) => "json",
            DecodeError::NotObject => "not_object",
            DecodeError::MissingOrder => "missing_order",
            DecodeError::MissingSymbol => "missing_symbol",
            DecodeError::BadSide(_) => "bad_side",
        }
    }
}

/// Outcome for one element of a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(LiquidationEvent),
    /// Symbol not on the watch-list, nothing else was parsed.
    Ignored(String),
}

/// Parse a text frame into its raw elements. A single object counts as a one-element frame.
pub fn split_frame(text: &str) -> Result<Vec<Value>, DecodeError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(v) => Ok(vec![v]),
        Err(e) => Err(DecodeError::Json(e.to_string())),
    }
}

/// Decode one envelope. `watched` is checked before price/qty/time are touched.
pub fn decode_event<F>(raw: &Value, watched: F, recv_ms: i64) -> Result<Decoded, DecodeError>
where
    F: Fn(&str) -> bool,
{
    let env = raw.as_object().ok_or(DecodeError::NotObject)?;
    let o = env.get("o").and_then(Value::as_object).ok_or(DecodeError::MissingOrder)?;

    let symbol = o
        .get("s")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_ascii_uppercase())
        .filter(|s| !s.is_empty())
        .ok_or(DecodeError::MissingSymbol)?;
    if !watched(&symbol) {
        return Ok(Decoded::Ignored(symbol));
    }

    let side_raw = o.get("S").and_then(Value::as_str).unwrap_or_default();
    let side = Side::parse(side_raw).ok_or_else(|| DecodeError::BadSide(side_raw.to_string()))?;

    let price = first_number(o.get("p"), o.get("ap"));
    let quantity = first_number(o.get("q"), o.get("l"));

    let ts = int_field(o.get("T"));
    let event_time_ms = if ts > 0 {
        ts
    } else {
        let e = int_field(env.get("E"));
        if e > 0 { e } else { recv_ms }
    };

    Ok(Decoded::Event(LiquidationEvent { symbol, side, price, quantity, event_time_ms }))
}

fn is_present(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

/// Primary field if present, else the fallback; unparsable or negative -> 0.
fn first_number(primary: Option<&Value>, fallback: Option<&Value>) -> f64 {
    let v = if is_present(primary) { primary } else { fallback };
    let n = match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() && n > 0.0 { n } else { 0.0 }
}

fn int_field(v: Option<&Value>) -> i64 {
    match v {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn xrp(s: &str) -> bool { s == "XRPUSDT" }

    #[test]
    fn decodes_binance_force_order() {
        let raw = json!({"e":"forceOrder","E":1568014460893u64,"o":{"s":"xrpusdt","S":"SELL",
            "q":"20000","p":"0.5","ap":"0.49","l":"100","T":1568014460000u64}});
        let got = decode_event(&raw, xrp, 1).unwrap();
        assert_eq!(
            got,
            Decoded::Event(LiquidationEvent {
                symbol: "XRPUSDT".into(),
                side: Side::Sell,
                price: 0.5,
                quantity: 20_000.0,
                event_time_ms: 1568014460000,
            })
        );
    }

    #[test]
    fn falls_back_to_average_price_and_last_qty() {
        let raw = json!({"E": 42, "o":{"s":"XRPUSDT","S":"BUY","p":"","ap":1.25,"l":"8"}});
        let Decoded::Event(ev) = decode_event(&raw, xrp, 7).unwrap() else { panic!("expected event") };
        assert_eq!(ev.price, 1.25);
        assert_eq!(ev.quantity, 8.0);
        assert_eq!(ev.event_time_ms, 42);
    }

    #[test]
    fn malformed_numbers_become_zero_and_time_falls_back_to_receive() {
        let raw = json!({"o":{"s":"XRPUSDT","S":"BUY","p":"abc","q":null,"T":"soon"}});
        let Decoded::Event(ev) = decode_event(&raw, xrp, 999).unwrap() else { panic!("expected event") };
        assert_eq!(ev.price, 0.0);
        assert_eq!(ev.quantity, 0.0);
        assert_eq!(ev.notional_usd(), 0.0);
        assert_eq!(ev.event_time_ms, 999);
    }

    #[test]
    fn unwatched_symbol_is_ignored_before_side_check() {
        let raw = json!({"o":{"s":"BTCUSDT","S":"???"}});
        assert_eq!(decode_event(&raw, xrp, 0), Ok(Decoded::Ignored("BTCUSDT".into())));
    }

    #[test]
    fn structural_errors() {
        assert_eq!(decode_event(&json!(5), xrp, 0), Err(DecodeError::NotObject));
        assert_eq!(decode_event(&json!({"e":"x"}), xrp, 0), Err(DecodeError::MissingOrder));
        assert_eq!(decode_event(&json!({"o":{"S":"BUY"}}), xrp, 0), Err(DecodeError::MissingSymbol));
        assert_eq!(
            decode_event(&json!({"o":{"s":"XRPUSDT","S":"LONG"}}), xrp, 0),
            Err(DecodeError::BadSide("LONG".into()))
        );
    }

    #[test]
    fn split_frame_accepts_object_or_array() {
        assert_eq!(split_frame(r#"{"o":{}}"#).unwrap().len(), 1);
        assert_eq!(split_frame(r#"[{"o":{}},{"o":{}},3]"#).unwrap().len(), 3);
        assert_eq!(split_frame("not json").unwrap_err().reason(), "json");
    }
}
