// ===============================
// src/schema.rs
// ===============================
//
// Pemetaan event -> properti page Notion. Nama properti adalah nama kolom
// database jurnal (Korea) dan harus sama persis dengan di workspace Notion.
//
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::domain::{to_display, IncomeEvent, Outcome, Position};

// ---- Database trades ----
pub const TICKER: &str = "티커";
pub const CLOSED_AT: &str = "체결 시간";
pub const POSITION: &str = "포지션";
pub const QUANTITY: &str = "수량";
pub const ENTRY_PRICE: &str = "진입가";
pub const EXIT_PRICE: &str = "청산가";
pub const REALIZED_PNL: &str = "실현손익";
pub const RETURN_PCT: &str = "수익률%";
pub const OUTCOME: &str = "결과";
pub const EXCHANGE: &str = "거래소";
pub const STRATEGY: &str = "전략";
pub const FEE: &str = "수수료";
pub const LEVERAGE: &str = "레버리지";
pub const LIVE_TRADE: &str = "실거래";
pub const NOTE: &str = "메모";
pub const FEE_RATE_PCT: &str = "수수료율%";

pub const TRADE_NOTE: &str = "API 자동 수집";
pub const FEE_RATE: f64 = 0.1;

// ---- Database balance ----
pub const ASSET_NAME: &str = "자산명";
pub const CURRENCY: &str = "통화";
pub const CURRENT_BALANCE: &str = "현재 잔고";
pub const AS_OF: &str = "기준일";
pub const BALANCE_NOTE: &str = "자동 스냅샷";

fn title(s: &str) -> Value {
    json!({ "title": [{ "text": { "content": s } }] })
}

fn rich_text(s: &str) -> Value {
    json!({ "rich_text": [{ "text": { "content": s } }] })
}

fn select(s: &str) -> Value {
    json!({ "select": { "name": s } })
}

fn number(n: Option<f64>) -> Value {
    json!({ "number": n })
}

fn date(iso: &str) -> Value {
    json!({ "date": { "start": iso } })
}

/// Penanda key di kolom memo: `[SYMBOL-TIME]`
pub fn key_marker(key: &str) -> String {
    format!("[{key}]")
}

/// Properti page trade. Dengan `key`, memo diberi penanda `[key]`; penanda
/// juga ditulis ulang saat update supaya page tetap ditemukan run berikutnya.
pub fn trade_properties(ev: &IncomeEvent, key: Option<&str>) -> Value {
    let symbol = if ev.symbol.is_empty() { "UNKNOWN" } else { ev.symbol.as_str() };
    let closed_at = to_display(ev.time).to_rfc3339_opts(SecondsFormat::Millis, true);
    let note = match key {
        Some(k) => format!("{TRADE_NOTE} {}", key_marker(k)),
        None => TRADE_NOTE.to_string(),
    };

    json!({
        TICKER: title(symbol),
        CLOSED_AT: date(&closed_at),
        POSITION: select(Position::from_realized(ev.realized).label()),
        QUANTITY: number(Some(ev.qty.unwrap_or(0.0))),
        ENTRY_PRICE: number(None),
        EXIT_PRICE: number(None),
        REALIZED_PNL: number(Some(ev.realized)),
        RETURN_PCT: number(None),
        OUTCOME: select(Outcome::from_realized(ev.realized).label()),
        EXCHANGE: { "multi_select": [{ "name": "Binance" }] },
        STRATEGY: select("Other"),
        FEE: number(None),
        LEVERAGE: number(None),
        LIVE_TRADE: { "checkbox": true },
        NOTE: rich_text(&note),
        FEE_RATE_PCT: number(Some(FEE_RATE)),
    })
}

pub fn balance_properties(asset: &str, amount: f64, at: DateTime<Utc>) -> Value {
    json!({
        ASSET_NAME: title(&format!("Binance {asset}")),
        CURRENCY: select(asset),
        CURRENT_BALANCE: number(Some(amount)),
        AS_OF: date(&at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        NOTE: rich_text(BALANCE_NOTE),
    })
}
