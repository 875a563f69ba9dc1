// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Sync runs --------
pub static SYNC_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sync_runs_total", "sync runs (label: result = ok|error)"),
        &["result"],
    )
    .unwrap()
});

pub static LAST_SUCCESS_TS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("sync_last_success_ts", "Unix seconds of the last successful run").unwrap()
});

// -------- Notion writes --------
pub static TRADE_UPSERTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "trade_upserts_total",
            "trade page upserts (label: action = created|updated|error)",
        ),
        &["action"],
    )
    .unwrap()
});

pub static BALANCE_SNAPSHOTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("balance_snapshots_total", "balance pages written (label: result)"),
        &["result"],
    )
    .unwrap()
});

// -------- Binance REST --------
pub static EXCHANGE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "binance_requests_total",
            "signed REST calls (labels: endpoint, result)",
        ),
        &["endpoint", "result"],
    )
    .unwrap()
});

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(SYNC_RUNS.clone())),
        REGISTRY.register(Box::new(LAST_SUCCESS_TS.clone())),
        REGISTRY.register(Box::new(TRADE_UPSERTS.clone())),
        REGISTRY.register(Box::new(BALANCE_SNAPSHOTS.clone())),
        REGISTRY.register(Box::new(EXCHANGE_REQUESTS.clone())),
    ] {
        // sudah terdaftar (init dipanggil dua kali) tidak masalah
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
