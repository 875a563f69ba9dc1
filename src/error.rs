// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("unexpected response: {0}")]
    Unexpected(String),
}
