// ===============================
// src/metrics.rs
// ===============================
use std::convert::Infallible;
use std::net::SocketAddr;

use hyper::service::{make_service_fn, service_fn};
use hyper::{header, Body, Method, Request, Response, Server, StatusCode};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Feed health --------
pub static FEED_CONNECTED: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("feed_connected", "1 if the liquidation stream is connected").unwrap());

pub static FEED_CONNECT_ATTEMPTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("feed_connect_attempts_total", "connection attempts to the liquidation stream").unwrap()
});

pub static FEED_BACKOFFS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("feed_backoffs_total", "backoff delays before reconnecting").unwrap());

pub static FEED_FRAMES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("feed_frames_total", "text frames received").unwrap());

pub static FEED_LAST_EVENT_TS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("feed_last_event_ts", "Unix seconds of the last accepted liquidation").unwrap()
});

// -------- Events --------
pub static EVENTS_BY_SYMBOL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("liq_events_total_by_symbol", "accepted liquidations per watched symbol"),
        &["symbol"],
    )
    .unwrap()
});

pub static EVENTS_FILTERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("liq_events_filtered_total", "liquidations for symbols outside the watchlist").unwrap()
});

pub static EVENTS_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("liq_events_dropped_total", "malformed or failed events (label: reason)"),
        &["reason"],
    )
    .unwrap()
});

pub static QUALIFYING_BY_SYMBOL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("liq_qualifying_total_by_symbol", "liquidations added to the history table"),
        &["symbol"],
    )
    .unwrap()
});

pub static RECORDER_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("recorder_dropped_total", "records not handed to the recorder (channel full or closed)").unwrap()
});

// -------- Signals --------
pub static SIGNAL_CONFIDENCE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("signal_confidence", "current window confidence"), &["symbol"]).unwrap()
});

pub static SIGNAL_DIRECTION: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("signal_direction", "current recommendation: 1 buy, -1 sell, 0 hold"),
        &["symbol"],
    )
    .unwrap()
});

pub static WINDOW_LEN: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("window_len", "entries in the rolling window"), &["symbol"]).unwrap()
});

// ---- Config visibility ----
pub static CONFIG_SYMBOL: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(Opts::new("config_symbol", "watched symbols (label: symbol)"), &["symbol"]).unwrap()
});

pub static CONFIG_WINDOW_SEC: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("config_window_sec", "rolling window length in seconds").unwrap());

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(FEED_CONNECTED.clone())),
        REGISTRY.register(Box::new(FEED_CONNECT_ATTEMPTS.clone())),
        REGISTRY.register(Box::new(FEED_BACKOFFS.clone())),
        REGISTRY.register(Box::new(FEED_FRAMES.clone())),
        REGISTRY.register(Box::new(FEED_LAST_EVENT_TS.clone())),
        REGISTRY.register(Box::new(EVENTS_BY_SYMBOL.clone())),
        REGISTRY.register(Box::new(EVENTS_FILTERED.clone())),
        REGISTRY.register(Box::new(EVENTS_DROPPED.clone())),
        REGISTRY.register(Box::new(QUALIFYING_BY_SYMBOL.clone())),
        REGISTRY.register(Box::new(RECORDER_DROPPED.clone())),
        REGISTRY.register(Box::new(SIGNAL_CONFIDENCE.clone())),
        REGISTRY.register(Box::new(SIGNAL_DIRECTION.clone())),
        REGISTRY.register(Box::new(WINDOW_LEN.clone())),
        REGISTRY.register(Box::new(CONFIG_SYMBOL.clone())),
        REGISTRY.register(Box::new(CONFIG_WINDOW_SEC.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

async fn handle(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let rsp = match (req.method(), req.uri().path()) {
        (&Method::GET, "/") | (&Method::GET, "/metrics") => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")
            .body(Body::from(encode_metrics())),
        _ => Response::builder().status(StatusCode::NOT_FOUND).body(Body::from("not found\n")),
    };
    Ok(rsp.unwrap_or_else(|_| Response::new(Body::empty())))
}

/// Serves GET / and /metrics until the process exits.
pub async fn serve_metrics(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server = match Server::try_bind(&addr) {
        Ok(b) => b,
        Err(e) => {
            error!(?e, %addr, "metrics bind failed");
            return;
        }
    };
    info!(%addr, "metrics listening on http://{addr}/ (and /metrics)");

    let make_svc = make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(handle)) });
    if let Err(e) = server.serve(make_svc).await {
        error!(?e, "metrics server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metrics_route_serves_prometheus_text() {
        init();
        CONFIG_WINDOW_SEC.set(180);
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let rsp = handle(req).await.unwrap();
        assert_eq!(rsp.status(), StatusCode::OK);
        let body = hyper::body::to_bytes(rsp.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("config_window_sec 180"));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        assert_eq!(handle(req).await.unwrap().status(), StatusCode::NOT_FOUND);
    }
}
