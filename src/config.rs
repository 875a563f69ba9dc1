// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : binance_notion_sync — Binance futures -> Notion journal mirror
Module  : config.rs
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
use std::env;

use dotenvy::dotenv;
use serde::Serialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_FAPI_URL: &str = "https://fapi.binance.com";
pub const DEFAULT_NOTION_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// Batas atas `limit` pada endpoint /fapi/v1/income
pub const MAX_INCOME_LIMIT: u32 = 1000;

/// Rate Notion terkecil yang diterima (1 request / 100 s)
pub const MIN_RATE_PER_SEC: f64 = 0.01;

pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Lima secret wajib. Nilai `true` = key tidak ada / kosong.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingKeys {
    pub binance_api_key: bool,
    pub binance_api_secret: bool,
    pub notion_token: bool,
    pub notion_trades_db_id: bool,
    pub notion_balance_db_id: bool,
}

impl MissingKeys {
    pub fn any(&self) -> bool {
        self.binance_api_key
            || self.binance_api_secret
            || self.notion_token
            || self.notion_trades_db_id
            || self.notion_balance_db_id
    }

    /// Nama ENV yang hilang, untuk log
    pub fn names(&self) -> Vec<&'static str> {
        [
            (self.binance_api_key, "BINANCE_API_KEY"),
            (self.binance_api_secret, "BINANCE_API_SECRET"),
            (self.notion_token, "NOTION_TOKEN"),
            (self.notion_trades_db_id, "NOTION_TRADES_DB_ID"),
            (self.notion_balance_db_id, "NOTION_BALANCE_DB_ID"),
        ]
        .into_iter()
        .filter(|(missing, _)| *missing)
        .map(|(_, name)| name)
        .collect()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment: {}", .0.names().join(", "))]
    Missing(MissingKeys),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct BinanceCfg {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    pub recv_window: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct NotionCfg {
    pub token: String,
    pub trades_db_id: String,
    pub balance_db_id: String,
    pub base_url: String,
    pub version: String,
}

#[derive(Clone, Debug)]
pub struct SyncCfg {
    pub balance_asset: String,
    pub income_limit: u32,
    pub rate_per_sec: f64,
    pub rate_burst: u32,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub binance: BinanceCfg,
    pub notion: NotionCfg,
    pub sync: SyncCfg,

    pub http_timeout_secs: u64,
    pub http_port: u16,
    pub record_file: Option<String>,
}

/// Baca `.env` lalu environment proses.
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenv();
    from_lookup(|k| env::var(k).ok())
}

/// Bangun `Config` dari sumber key/value apa pun (ENV, map di test).
/// Nilai kosong / whitespace diperlakukan sama dengan tidak ada.
pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    // ===== Secrets (wajib) =====
    let api_key = get("BINANCE_API_KEY");
    let api_secret = get("BINANCE_API_SECRET");
    let token = get("NOTION_TOKEN");
    let trades_db_id = get("NOTION_TRADES_DB_ID");
    let balance_db_id = get("NOTION_BALANCE_DB_ID");

    let missing = MissingKeys {
        binance_api_key: api_key.is_none(),
        binance_api_secret: api_secret.is_none(),
        notion_token: token.is_none(),
        notion_trades_db_id: trades_db_id.is_none(),
        notion_balance_db_id: balance_db_id.is_none(),
    };
    let (Some(api_key), Some(api_secret), Some(token), Some(trades_db_id), Some(balance_db_id)) =
        (api_key, api_secret, token, trades_db_id, balance_db_id)
    else {
        return Err(ConfigError::Missing(missing));
    };

    // ===== Endpoints =====
    let fapi_url = base_url("BINANCE_FAPI_URL", get("BINANCE_FAPI_URL"), DEFAULT_FAPI_URL)?;
    let notion_url = base_url("NOTION_API_URL", get("NOTION_API_URL"), DEFAULT_NOTION_URL)?;
    let notion_version = get("NOTION_VERSION").unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string());

    // ===== Sync tuning =====
    let recv_window = parse_opt::<u64>("BINANCE_RECV_WINDOW", get("BINANCE_RECV_WINDOW"))?;
    let balance_asset = get("BALANCE_ASSET")
        .map(|s| s.to_ascii_uppercase())
        .unwrap_or_else(|| "USDT".to_string());

    let income_limit = parse_opt::<u32>("INCOME_LIMIT", get("INCOME_LIMIT"))?.unwrap_or(50);
    if income_limit == 0 || income_limit > MAX_INCOME_LIMIT {
        return Err(ConfigError::Invalid {
            key: "INCOME_LIMIT",
            reason: format!("must be within 1..={MAX_INCOME_LIMIT}"),
        });
    }

    let rate_per_sec = parse_opt::<f64>("NOTION_RATE_PER_SEC", get("NOTION_RATE_PER_SEC"))?.unwrap_or(3.0);
    if !(rate_per_sec.is_finite() && rate_per_sec >= MIN_RATE_PER_SEC) {
        return Err(ConfigError::Invalid {
            key: "NOTION_RATE_PER_SEC",
            reason: format!("must be a number >= {MIN_RATE_PER_SEC}"),
        });
    }
    let rate_burst = parse_opt::<u32>("NOTION_RATE_BURST", get("NOTION_RATE_BURST"))?
        .unwrap_or(3)
        .max(1);

    // ===== Process =====
    let http_timeout_secs = parse_opt::<u64>("HTTP_TIMEOUT_SECS", get("HTTP_TIMEOUT_SECS"))?.unwrap_or(30);
    let http_port = http_port_from(&lookup)?;
    let record_file = get("RECORD_FILE");

    Ok(Config {
        binance: BinanceCfg {
            api_key,
            api_secret,
            base_url: fapi_url,
            recv_window,
        },
        notion: NotionCfg {
            token,
            trades_db_id,
            balance_db_id,
            base_url: notion_url,
            version: notion_version,
        },
        sync: SyncCfg {
            balance_asset,
            income_limit,
            rate_per_sec,
            rate_burst,
        },
        http_timeout_secs,
        http_port,
        record_file,
    })
}

/// `HTTP_PORT` (default 3000). Dipakai juga saat secret belum lengkap.
pub fn http_port_from<F>(lookup: F) -> Result<u16, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup("HTTP_PORT").map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    Ok(parse_opt::<u16>("HTTP_PORT", raw)?.unwrap_or(DEFAULT_HTTP_PORT))
}

/// Port dari environment proses; nilai rusak jatuh ke default.
pub fn http_port() -> u16 {
    http_port_from(|k| env::var(k).ok()).unwrap_or(DEFAULT_HTTP_PORT)
}

fn parse_opt<T>(key: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|s| {
        s.parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })
    })
    .transpose()
}

fn base_url(key: &'static str, raw: Option<String>, default: &str) -> Result<String, ConfigError> {
    let s = raw.unwrap_or_else(|| default.to_string());
    Url::parse(&s).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })?;
    Ok(s.trim_end_matches('/').to_string())
}
