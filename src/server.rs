// ===============================
// src/server.rs
// ===============================
//
// HTTP trigger (hyper 0.14):
//   GET|POST /api/sync          -> jalankan satu run
//   GET|POST /api/binance-sync  -> cek konfigurasi (400 + `missing` jika kurang)
//   GET      /metrics           -> Prometheus text
//   GET      /healthz           -> ok
//   OPTIONS  *                  -> 200 (preflight CORS)
//
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::MissingKeys;
use crate::metrics::encode_metrics;
use crate::sync::SyncEngine;

/// Engine siap, atau daftar secret yang belum diisi.
pub enum Setup {
    Ready(Arc<SyncEngine>),
    Missing(MissingKeys),
}

pub struct AppState {
    pub setup: Setup,
}

fn with_cors(mut rsp: Response<Body>) -> Response<Body> {
    let h = rsp.headers_mut();
    h.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    h.insert("Access-Control-Allow-Methods", HeaderValue::from_static("GET, POST, OPTIONS"));
    h.insert("Access-Control-Allow-Headers", HeaderValue::from_static("Content-Type"));
    rsp
}

fn respond(status: StatusCode, content_type: &'static str, body: Body) -> Response<Body> {
    let mut rsp = Response::new(body);
    *rsp.status_mut() = status;
    rsp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    with_cors(rsp)
}

fn json_response(status: StatusCode, v: Value) -> Response<Body> {
    respond(status, "application/json", Body::from(v.to_string()))
}

fn missing_response(missing: &MissingKeys) -> Response<Body> {
    warn!(missing = ?missing.names(), "request rejected: configuration incomplete");
    json_response(
        StatusCode::BAD_REQUEST,
        json!({
            "success": false,
            "error": "required environment variables are not set",
            "missing": missing,
        }),
    )
}

async fn handle_sync(state: &AppState) -> Response<Body> {
    let engine = match &state.setup {
        Setup::Ready(e) => e,
        Setup::Missing(m) => return missing_response(m),
    };
    match engine.run().await {
        Ok(report) => json_response(
            StatusCode::OK,
            json!({ "message": "sync complete", "report": report }),
        ),
        Err(e) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": e.to_string() }),
        ),
    }
}

fn handle_config_check(state: &AppState) -> Response<Body> {
    match &state.setup {
        Setup::Missing(m) => missing_response(m),
        Setup::Ready(_) => json_response(
            StatusCode::OK,
            json!({
                "success": true,
                "message": "binance sync API is configured",
                "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                "config": {
                    "binanceApiConfigured": true,
                    "notionConfigured": true,
                    "databaseConfigured": true,
                },
            }),
        ),
    }
}

pub async fn handle(state: Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().trim_end_matches('/').to_string();

    let rsp = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => respond(StatusCode::OK, "text/plain", Body::empty()),
        (&Method::GET | &Method::POST, "/api/sync") => {
            info!(%method, "sync triggered over http");
            handle_sync(&state).await
        }
        (&Method::GET | &Method::POST, "/api/binance-sync") => handle_config_check(&state),
        (&Method::GET, "/metrics") => respond(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            Body::from(encode_metrics()),
        ),
        (&Method::GET, "/healthz") => respond(StatusCode::OK, "text/plain", Body::from("ok")),
        (_, "/api/sync" | "/api/binance-sync" | "/metrics" | "/healthz") => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "error": "method not allowed" }),
        ),
        _ => json_response(StatusCode::NOT_FOUND, json!({ "error": "not found" })),
    };
    Ok(rsp)
}

pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> Result<(), hyper::Error> {
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(state.clone(), req))) }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    info!(%addr, "http listening (/api/sync, /api/binance-sync, /metrics)");
    server
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
