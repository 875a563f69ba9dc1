// ===============================
// src/http_stub.rs
// ===============================
//
// Server hyper lokal untuk test client REST: jawab setiap request dengan
// status + body tetap, dan simpan request yang masuk.
//
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use hyper::body::to_bytes;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, HeaderMap, Request, Response, Server};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct Captured {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub struct Stub {
    pub base_url: String,
    seen: Arc<Mutex<Vec<Captured>>>,
}

impl Stub {
    pub fn requests(&self) -> Vec<Captured> {
        self.seen.lock().unwrap().clone()
    }
}

/// Bind ke 127.0.0.1:0; harus dipanggil dari dalam runtime tokio.
pub fn spawn(status: u16, body: impl Into<String>) -> Stub {
    let seen: Arc<Mutex<Vec<Captured>>> = Arc::new(Mutex::new(Vec::new()));
    let reply = Arc::new(body.into());

    let seen_svc = seen.clone();
    let make_svc = make_service_fn(move |_conn| {
        let seen = seen_svc.clone();
        let reply = reply.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let seen = seen.clone();
                let reply = reply.clone();
                async move {
                    let (parts, body) = req.into_parts();
                    let bytes = to_bytes(body).await.unwrap_or_default();
                    seen.lock().unwrap().push(Captured {
                        method: parts.method.to_string(),
                        path: parts.uri.path().to_string(),
                        query: parts.uri.query().map(str::to_string),
                        headers: parts.headers,
                        body: bytes.to_vec(),
                    });
                    let rsp = Response::builder()
                        .status(status)
                        .header("content-type", "application/json")
                        .body(Body::from(reply.as_str().to_owned()))
                        .unwrap();
                    Ok::<_, Infallible>(rsp)
                }
            }))
        }
    });

    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let base_url = format!("http://{}", server.local_addr());
    tokio::spawn(server);
    Stub { base_url, seen }
}
