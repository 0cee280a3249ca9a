// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : liq_signal: liquidation stream monitor & rolling-window signal
Module  : config.rs
Version : 0.1.0
License : MIT (see LICENSE)

Summary : Streams Binance futures liquidations, keeps a bounded rolling window
          of buy/sell pressure per watched symbol, derives a BUY/SELL/HOLD
          signal with confidence, keeps a bounded table of large liquidations,
          exposes Prometheus metrics, and optionally records JSONL events.
=============================================================================
*/
use std::collections::BTreeMap;
use std::time::Duration;

use ahash::AHashMap as HashMap;
use clap::Parser;
use dotenvy::dotenv;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Fallback alert threshold (USD) for a symbol missing from THRESHOLDS_USD.
pub const DEFAULT_THRESHOLD_USD: f64 = 5000.0;
/// Fallback quantity threshold for a symbol missing from QTY_THRESHOLDS.
pub const DEFAULT_THRESHOLD_QTY: f64 = 0.0;

const DEFAULT_THRESHOLDS_USD: [(&str, f64); 3] =
    [("XRPUSDT", 7500.0), ("DOGEUSDT", 6000.0), ("PEPEUSDT", 3000.0)];

// XRP >= 3000; DOGE & PEPE disesuaikan dengan ukuran unit masing-masing
const DEFAULT_QTY_THRESHOLDS: [(&str, f64); 3] =
    [("XRPUSDT", 3000.0), ("DOGEUSDT", 50_000.0), ("PEPEUSDT", 100_000_000.0)];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("watchlist is empty")]
    EmptyWatchlist,
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("bad feed url {url}: {source}")]
    FeedUrl { url: String, source: url::ParseError },
}

/// Raw CLI / env input. Every flag can also come from the environment (.env included).
#[derive(Parser, Debug, Clone)]
#[command(name = "liq_signal", version, about = "Liquidation stream monitor with rolling-window signal")]
pub struct Args {
    /// Comma separated symbols, e.g. XRPUSDT,DOGEUSDT
    #[arg(long, env = "WATCHLIST", default_value = "XRPUSDT,DOGEUSDT,PEPEUSDT")]
    pub watchlist: String,

    /// JSON object of per-symbol USD alert thresholds, merged over the defaults
    #[arg(long, env = "THRESHOLDS_USD")]
    pub thresholds_usd: Option<String>,

    /// JSON object of per-symbol quantity thresholds for the history table
    #[arg(long, env = "QTY_THRESHOLDS")]
    pub qty_thresholds: Option<String>,

    /// Minimum notional for the history table (0 = disabled)
    #[arg(long, env = "MIN_TABLE_USD", default_value_t = 0.0)]
    pub min_table_usd: f64,

    #[arg(long, env = "WINDOW_SEC", default_value_t = 180)]
    pub window_sec: u64,

    #[arg(long, env = "WINDOW_CAPACITY", default_value_t = 3000)]
    pub window_capacity: usize,

    #[arg(long, env = "HISTORY_CAPACITY", default_value_t = 500)]
    pub history_capacity: usize,

    #[arg(long, env = "TRADE_LOG_CAPACITY", default_value_t = 200)]
    pub trade_log_capacity: usize,

    #[arg(long, env = "FEED_WS_URL", default_value = "wss://fstream.binance.com/ws/!forceOrder@arr")]
    pub feed_ws_url: String,

    #[arg(long, env = "PING_INTERVAL_SEC", default_value_t = 20)]
    pub ping_interval_sec: u64,

    #[arg(long, env = "PING_TIMEOUT_SEC", default_value_t = 10)]
    pub ping_timeout_sec: u64,

    #[arg(long, env = "RECONNECT_DELAY_SEC", default_value_t = 3)]
    pub reconnect_delay_sec: u64,

    #[arg(long, env = "METRICS_PORT", default_value_t = 9898)]
    pub metrics_port: u16,

    /// Append qualifying liquidations as JSON lines to this file
    #[arg(long, env = "RECORD_FILE")]
    pub record_file: Option<String>,
}

/// Connection knobs for the ingestion loop.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub ws_url: String,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://fstream.binance.com/ws/!forceOrder@arr".to_string(),
            ping_interval: Duration::from_secs(20),
            ping_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

/// Immutable process-wide settings, built once at boot.
#[derive(Clone, Debug)]
pub struct Settings {
    pub watchlist: Vec<String>,
    pub thresholds_usd: HashMap<String, f64>,
    pub qty_thresholds: HashMap<String, f64>,
    pub min_table_usd: f64,
    pub window_sec: u64,
    pub window_capacity: usize,
    pub history_capacity: usize,
    pub trade_log_capacity: usize,
    pub feed: FeedConfig,
    pub metrics_port: u16,
    pub record_file: Option<String>,
}

/// Introspection view of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolsView {
    pub watchlist: Vec<String>,
    pub thresholds_usd: BTreeMap<String, f64>,
    pub qty_thresholds: BTreeMap<String, f64>,
    pub min_table_usd: f64,
    pub window_sec: u64,
}

impl Settings {
    /// Settings with the built-in defaults for the given watch-list.
    pub fn with_watchlist<I, S>(symbols: I) -> Settings
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Settings {
            watchlist: symbols.into_iter().map(|s| s.as_ref().trim().to_ascii_uppercase()).collect(),
            thresholds_usd: defaults(&DEFAULT_THRESHOLDS_USD),
            qty_thresholds: defaults(&DEFAULT_QTY_THRESHOLDS),
            min_table_usd: 0.0,
            window_sec: 180,
            window_capacity: 3000,
            history_capacity: 500,
            trade_log_capacity: 200,
            feed: FeedConfig::default(),
            metrics_port: 9898,
            record_file: None,
        }
    }

    pub fn from_args(args: Args) -> Result<Settings, ConfigError> {
        let watchlist = parse_watchlist(&args.watchlist);
        if watchlist.is_empty() {
            return Err(ConfigError::EmptyWatchlist);
        }
        if args.window_sec == 0 {
            return Err(ConfigError::Zero("WINDOW_SEC"));
        }
        if args.window_capacity == 0 {
            return Err(ConfigError::Zero("WINDOW_CAPACITY"));
        }
        if args.history_capacity == 0 {
            return Err(ConfigError::Zero("HISTORY_CAPACITY"));
        }
        if args.trade_log_capacity == 0 {
            return Err(ConfigError::Zero("TRADE_LOG_CAPACITY"));
        }
        if args.reconnect_delay_sec == 0 {
            return Err(ConfigError::Zero("RECONNECT_DELAY_SEC"));
        }
        if let Err(source) = Url::parse(&args.feed_ws_url) {
            return Err(ConfigError::FeedUrl { url: args.feed_ws_url, source });
        }

        Ok(Settings {
            watchlist,
            thresholds_usd: merge_thresholds("THRESHOLDS_USD", &DEFAULT_THRESHOLDS_USD, args.thresholds_usd.as_deref()),
            qty_thresholds: merge_thresholds("QTY_THRESHOLDS", &DEFAULT_QTY_THRESHOLDS, args.qty_thresholds.as_deref()),
            min_table_usd: args.min_table_usd,
            window_sec: args.window_sec,
            window_capacity: args.window_capacity,
            history_capacity: args.history_capacity,
            trade_log_capacity: args.trade_log_capacity,
            feed: FeedConfig {
                ws_url: args.feed_ws_url,
                ping_interval: Duration::from_secs(args.ping_interval_sec.max(1)),
                ping_timeout: Duration::from_secs(args.ping_timeout_sec.max(1)),
                reconnect_delay: Duration::from_secs(args.reconnect_delay_sec),
            },
            metrics_port: args.metrics_port,
            record_file: args.record_file.filter(|p| !p.trim().is_empty()),
        })
    }

    pub fn is_watched(&self, symbol: &str) -> bool {
        self.watchlist.iter().any(|s| s == symbol)
    }

    pub fn threshold_usd(&self, symbol: &str) -> f64 {
        self.thresholds_usd.get(symbol).copied().unwrap_or(DEFAULT_THRESHOLD_USD)
    }

    pub fn threshold_qty(&self, symbol: &str) -> f64 {
        self.qty_thresholds.get(symbol).copied().unwrap_or(DEFAULT_THRESHOLD_QTY)
    }

    pub fn model_id(&self) -> String {
        format!("liq-window-v1({}s)", self.window_sec)
    }

    pub fn symbols_view(&self) -> SymbolsView {
        SymbolsView {
            watchlist: self.watchlist.clone(),
            thresholds_usd: self.thresholds_usd.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            qty_thresholds: self.qty_thresholds.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            min_table_usd: self.min_table_usd,
            window_sec: self.window_sec,
        }
    }
}

pub fn load() -> Result<Settings, ConfigError> {
    // Pastikan .env dibaca sebelum clap membaca env
    let _ = dotenv();
    Settings::from_args(Args::parse())
}

fn parse_watchlist(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for sym in raw.split(',').map(|x| x.trim()).filter(|x| !x.is_empty()) {
        let sym = sym.to_ascii_uppercase();
        if !out.contains(&sym) {
            out.push(sym);
        }
    }
    out
}

fn defaults(table: &[(&str, f64)]) -> HashMap<String, f64> {
    table.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

/// Overrides from a JSON object win over the defaults; bad JSON keeps the defaults.
fn merge_thresholds(key: &str, table: &[(&str, f64)], raw: Option<&str>) -> HashMap<String, f64> {
    let mut out = defaults(table);
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return out;
    };
    match serde_json::from_str::<BTreeMap<String, f64>>(raw) {
        Ok(overrides) => {
            for (sym, v) in overrides {
                out.insert(sym.trim().to_ascii_uppercase(), v);
            }
        }
        Err(e) => warn!(%key, error = %e, "invalid threshold json, using defaults"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["liq_signal"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn watchlist_is_trimmed_uppercased_and_deduped() {
        assert_eq!(
            parse_watchlist(" xrpusdt, DOGEUSDT ,,xrpusdt,pepeusdt"),
            vec!["XRPUSDT", "DOGEUSDT", "PEPEUSDT"]
        );
    }

    #[test]
    fn threshold_overrides_merge_over_defaults() {
        let merged = merge_thresholds("THRESHOLDS_USD", &DEFAULT_THRESHOLDS_USD, Some(r#"{"xrpusdt": 7000, "BTCUSDT": 100000}"#));
        assert_eq!(merged["XRPUSDT"], 7000.0);
        assert_eq!(merged["DOGEUSDT"], 6000.0);
        assert_eq!(merged["BTCUSDT"], 100_000.0);
    }

    #[test]
    fn bad_threshold_json_keeps_defaults() {
        let merged = merge_thresholds("QTY_THRESHOLDS", &DEFAULT_QTY_THRESHOLDS, Some("{not json"));
        assert_eq!(merged, defaults(&DEFAULT_QTY_THRESHOLDS));
    }

    #[test]
    fn unconfigured_symbol_uses_fallbacks() {
        let s = Settings::with_watchlist(["XRPUSDT", "SOLUSDT"]);
        assert_eq!(s.threshold_usd("XRPUSDT"), 7500.0);
        assert_eq!(s.threshold_usd("SOLUSDT"), DEFAULT_THRESHOLD_USD);
        assert_eq!(s.threshold_qty("SOLUSDT"), DEFAULT_THRESHOLD_QTY);
        assert!(s.is_watched("SOLUSDT"));
        assert!(!s.is_watched("BTCUSDT"));
    }

    #[test]
    fn from_args_defaults() {
        let s = Settings::from_args(args(&["--watchlist", "xrpusdt"])).unwrap();
        assert_eq!(s.watchlist, vec!["XRPUSDT"]);
        assert_eq!(s.window_sec, 180);
        assert_eq!(s.window_capacity, 3000);
        assert_eq!(s.history_capacity, 500);
        assert_eq!(s.feed.reconnect_delay, Duration::from_secs(3));
        assert_eq!(s.feed.ping_interval, Duration::from_secs(20));
        assert_eq!(s.model_id(), "liq-window-v1(180s)");
    }

    #[test]
    fn from_args_rejects_bad_input() {
        assert!(matches!(
            Settings::from_args(args(&["--watchlist", " , "])),
            Err(ConfigError::EmptyWatchlist)
        ));
        assert!(matches!(
            Settings::from_args(args(&["--watchlist", "XRPUSDT", "--window-sec", "0"])),
            Err(ConfigError::Zero("WINDOW_SEC"))
        ));
        assert!(matches!(
            Settings::from_args(args(&["--watchlist", "XRPUSDT", "--reconnect-delay-sec", "0"])),
            Err(ConfigError::Zero("RECONNECT_DELAY_SEC"))
        ));
        assert!(matches!(
            Settings::from_args(args(&["--watchlist", "XRPUSDT", "--feed-ws-url", "not a url"])),
            Err(ConfigError::FeedUrl { .. })
        ));
    }

    #[test]
    fn symbols_view_is_sorted() {
        let view = Settings::with_watchlist(["XRPUSDT"]).symbols_view();
        let keys: Vec<_> = view.thresholds_usd.keys().cloned().collect();
        assert_eq!(keys, vec!["DOGEUSDT", "PEPEUSDT", "XRPUSDT"]);
        assert_eq!(view.window_sec, 180);
    }
}
