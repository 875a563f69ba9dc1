// ===============================
// src/main.rs
// ===============================
/*
 cd /home/kukuhtw/rust/binance_notion_sync

 # sekali jalan
 cargo run --release -- sync

 # tiap 5 menit
 cargo run --release -- sync --interval-secs 300

 # trigger HTTP
 cargo run --release -- serve --port 3000
 curl -s -X POST localhost:3000/api/sync
 curl -s localhost:3000/api/binance-sync
 curl -s localhost:3000/metrics | grep '^trade_upserts_total'
*/
/*
=============================================================================
Project : binance_notion_sync — Binance futures -> Notion journal mirror
Module  : main.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Pulls USDT-M futures balance and realized-PnL income from Binance,
          upserts one Notion page per income event (keyed SYMBOL-TIME),
          appends balance snapshots, exposes an HTTP trigger, Prometheus
          metrics, and records JSONL sync events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
mod binance;   // signer + path Binance
mod config;
mod domain;
mod error;
mod exchange;  // Binance USDT-M REST client
#[cfg(test)]
mod http_stub; // server lokal untuk test client REST
mod metrics;
mod notion;    // Notion REST client
mod recorder;
mod schema;    // event -> properti Notion
mod server;
mod sync;
mod throttle;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ConfigError};
use crate::domain::Event;
use crate::exchange::BinanceClient;
use crate::notion::NotionClient;
use crate::server::{AppState, Setup};
use crate::sync::{SyncEngine, Targets};
use crate::throttle::RateLimiter;

#[derive(Parser, Debug)]
#[command(name = "binance_notion_sync", version, about = "Mirror Binance futures PnL & balance into Notion")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Jalankan HTTP trigger (+ /metrics)
    Serve {
        /// override HTTP_PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Jalankan sync langsung; dengan --interval-secs diulang terus
    Sync {
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

fn build_engine(cfg: &Config, rec_tx: Option<mpsc::Sender<Event>>) -> Result<SyncEngine, error::SyncError> {
    let timeout = Duration::from_secs(cfg.http_timeout_secs);
    let exchange = BinanceClient::new(cfg.binance.clone(), timeout)?;
    let store = NotionClient::new(&cfg.notion, timeout)?;
    let limiter = RateLimiter::new(cfg.sync.rate_per_sec, cfg.sync.rate_burst);

    let engine = SyncEngine::new(Arc::new(exchange), Arc::new(store), Targets::from_config(cfg), limiter);
    Ok(match rec_tx {
        Some(tx) => engine.with_recorder(tx),
        None => engine,
    })
}

fn start_recorder(cfg: &Config) -> (Option<mpsc::Sender<Event>>, Option<JoinHandle<()>>) {
    match cfg.record_file.clone() {
        Some(path) => {
            let (tx, rx) = mpsc::channel::<Event>(1024);
            (Some(tx), Some(tokio::spawn(recorder::run(rx, path))))
        }
        None => (None, None),
    }
}

async fn run_sync(cfg: Config, interval_secs: Option<u64>) -> ExitCode {
    let (rec_tx, rec_handle) = start_recorder(&cfg);
    let engine = match build_engine(&cfg, rec_tx) {
        Ok(e) => e,
        Err(e) => {
            error!(error = %e, "client setup failed");
            return ExitCode::FAILURE;
        }
    };

    let code = match interval_secs {
        None => match engine.run().await {
            Ok(_) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        },
        Some(secs) => {
            let mut tick = interval(Duration::from_secs(secs.max(1)));
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(every_secs = secs, "periodic sync");
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        // gagal satu run tidak menghentikan loop
                        let _ = engine.run().await;
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutdown signal received");
                        break ExitCode::SUCCESS;
                    }
                }
            }
        }
    };

    // tutup channel recorder lalu tunggu flush
    drop(engine);
    if let Some(h) = rec_handle {
        let _ = h.await;
    }
    code
}

async fn run_server(cfg: Result<Config, ConfigError>, port: Option<u16>) -> ExitCode {
    let (setup, http_port, rec_handle) = match cfg {
        Ok(cfg) => {
            let (rec_tx, rec_handle) = start_recorder(&cfg);
            match build_engine(&cfg, rec_tx) {
                Ok(e) => (Setup::Ready(Arc::new(e)), cfg.http_port, rec_handle),
                Err(e) => {
                    error!(error = %e, "client setup failed");
                    return ExitCode::FAILURE;
                }
            }
        }
        // tetap melayani; /api/* menjawab 400 + daftar `missing`
        Err(ConfigError::Missing(m)) => {
            error!(missing = ?m.names(), "configuration incomplete, serving diagnostics only");
            (Setup::Missing(m), config::http_port(), None)
        }
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(http_port)));
    let state = Arc::new(AppState { setup });
    let res = server::serve(addr, state).await;

    if let Some(h) = rec_handle {
        // engine (pemegang sender) ikut di-drop bersama state
        let _ = h.await;
    }
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "http server failed");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // ---- Metrics ----
    metrics::init();

    // ---- Config (sekali, saat startup) ----
    let cfg = config::load();
    if let Ok(c) = &cfg {
        info!(
            fapi = %c.binance.base_url,
            notion = %c.notion.base_url,
            asset = %c.sync.balance_asset,
            income_limit = c.sync.income_limit,
            rate_per_sec = c.sync.rate_per_sec,
            rate_burst = c.sync.rate_burst,
            record_file = ?c.record_file,
            "startup config"
        );
    }

    match cli.cmd {
        Cmd::Serve { port } => run_server(cfg, port).await,
        Cmd::Sync { interval_secs } => match cfg {
            Ok(cfg) => run_sync(cfg, interval_secs).await,
            Err(e) => {
                error!(error = %e, "cannot start sync");
                ExitCode::FAILURE
            }
        },
    }
}
