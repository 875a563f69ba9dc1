// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Geser tampilan jurnal (KST, UTC+9)
pub const DISPLAY_SHIFT_MS: i64 = 9 * 3600 * 1000;

/// Satu baris /fapi/v1/income (incomeType=REALIZED_PNL).
/// Binance mengirim angka desimal sebagai string. `time` / `income` yang
/// kosong jatuh ke waktu sekarang / 0 agar satu baris rusak tidak menggagalkan batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncomeEvent {
    #[serde(default)]
    pub symbol: String,
    #[serde(default = "now_ms", deserialize_with = "de_time_ms")]
    pub time: i64,
    #[serde(rename = "income", default, deserialize_with = "de_f64_or_zero")]
    pub realized: f64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub qty: Option<f64>,
}

impl IncomeEvent {
    pub fn key(&self) -> String {
        unique_key(&self.symbol, self.time)
    }
}

/// Satu baris /fapi/v2/balance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetBalance {
    pub asset: String,
    #[serde(deserialize_with = "de_f64")]
    pub balance: f64,
}

/// Saldo aset terpilih; 0 jika aset tidak ada di respons.
pub fn select_balance(balances: &[AssetBalance], asset: &str) -> f64 {
    balances
        .iter()
        .find(|b| b.asset.eq_ignore_ascii_case(asset))
        .map(|b| b.balance)
        .unwrap_or(0.0)
}

/// Idempotency key: `SYMBOL-TIME`
pub fn unique_key(symbol: &str, time_ms: i64) -> String {
    format!("{symbol}-{time_ms}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position { Long, Short }

impl Position {
    pub fn from_realized(realized: f64) -> Self {
        if realized >= 0.0 { Position::Long } else { Position::Short }
    }
    pub fn label(&self) -> &'static str {
        match self { Position::Long => "Long", Position::Short => "Short" }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome { Win, Loss, Breakeven }

impl Outcome {
    pub fn from_realized(realized: f64) -> Self {
        if realized > 0.0 {
            Outcome::Win
        } else if realized < 0.0 {
            Outcome::Loss
        } else {
            Outcome::Breakeven
        }
    }
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Win => "Win",
            Outcome::Loss => "Loss",
            Outcome::Breakeven => "BE",
        }
    }
}

/// Epoch ms (UTC) digeser +9 jam, ditulis sebagai `...Z` seperti page jurnal
/// yang sudah ada. Di luar rentang chrono jatuh ke epoch.
pub fn to_display(time_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(time_ms.saturating_add(DISPLAY_SHIFT_MS))
        .single()
        .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Apa yang dilakukan upsert terhadap satu event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction { Created, Updated }

impl UpsertAction {
    pub fn label(&self) -> &'static str {
        match self { UpsertAction::Created => "created", UpsertAction::Updated => "updated" }
    }
}

/// Ringkasan satu run sinkronisasi
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub balance: f64,
    pub balance_recorded: bool,
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Event untuk recorder JSONL
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Balance { ts_ms: i64, asset: String, amount: f64, page_id: Option<String> },
    Trade { ts_ms: i64, key: String, action: UpsertAction, page_id: String },
    TradeFailed { ts_ms: i64, key: String, error: String },
    Run { ts_ms: i64, report: SyncReport },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Num(f64),
    Str(String),
}

fn num_or_str_to_f64<E: serde::de::Error>(v: NumOrStr) -> Result<f64, E> {
    match v {
        NumOrStr::Num(n) => Ok(n),
        NumOrStr::Str(s) => s.trim().parse::<f64>().map_err(E::custom),
    }
}

fn de_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    num_or_str_to_f64(NumOrStr::deserialize(d)?)
}

fn de_f64_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(de_opt_f64(d)?.unwrap_or(0.0))
}

fn de_time_ms<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(Option::<i64>::deserialize(d)?.unwrap_or_else(now_ms))
}

fn de_opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    match Option::<NumOrStr>::deserialize(d)? {
        None => Ok(None),
        Some(NumOrStr::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => num_or_str_to_f64(v).map(Some),
    }
}
