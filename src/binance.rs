// ===============================
// src/binance.rs
// ===============================
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";
pub const BALANCE_PATH: &str = "/fapi/v2/balance";
pub const INCOME_PATH: &str = "/fapi/v1/income";

pub fn sign_query(secret: &str, query: &str) -> String {
    // HMAC menerima key dengan panjang berapa pun
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC key");
    mac.update(query.as_bytes());
    let sig = mac.finalize().into_bytes();
    hex::encode(sig)
}

/// Susun query `timestamp=..&<params..>[&recvWindow=..]` persis sesuai urutan,
/// lalu tambahkan `signature` paling akhir (tidak ikut ditandatangani).
pub fn signed_query(
    secret: &str,
    ts_ms: i64,
    params: &[(&str, String)],
    recv_window: Option<u64>,
) -> String {
    let mut pairs: Vec<(&str, String)> = Vec::with_capacity(params.len() + 2);
    pairs.push(("timestamp", ts_ms.to_string()));
    pairs.extend(params.iter().cloned());
    if let Some(w) = recv_window {
        pairs.push(("recvWindow", w.to_string()));
    }

    let query = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let sig = sign_query(secret, &query);
    format!("{query}&signature={sig}")
}
