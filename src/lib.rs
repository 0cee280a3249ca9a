// ===============================
// src/lib.rs
// ===============================
pub mod binance;      // decoder for the forceOrder stream
pub mod classifier;
pub mod config;
pub mod domain;
pub mod engine;       // shared state (windows, signals, history)
pub mod feed;         // ingestion loop (connect / ping / backoff)
pub mod history;
pub mod metrics;
pub mod recorder;
pub mod strategy;     // liq-window-v1 signal
pub mod window;

pub use config::Settings;
pub use engine::{Analysis, FeedState, FrameReport, LiquidationEngine};
