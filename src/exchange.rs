// ===============================
// src/exchange.rs
// ===============================
//
// Binance USDⓈ-M futures REST (read-only):
// - GET /fapi/v2/balance                       -> saldo per aset
// - GET /fapi/v1/income?incomeType=REALIZED_PNL -> realized PnL terbaru
//
// Semua request SIGNED (HMAC-SHA256) dan tanpa retry: gagal = run gagal.
//
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use crate::binance::{signed_query, API_KEY_HEADER, BALANCE_PATH, INCOME_PATH};
use crate::config::BinanceCfg;
use crate::domain::{now_ms, AssetBalance, IncomeEvent};
use crate::error::SyncError;
use crate::metrics::EXCHANGE_REQUESTS;

#[async_trait]
pub trait ExchangeApi: Send + Sync {
    async fn fetch_balances(&self) -> Result<Vec<AssetBalance>, SyncError>;
    /// Paling banyak `limit` event, urutan sesuai upstream.
    async fn fetch_income(&self, limit: u32) -> Result<Vec<IncomeEvent>, SyncError>;
}

pub struct BinanceClient {
    http: reqwest::Client,
    cfg: BinanceCfg,
}

impl BinanceClient {
    pub fn new(cfg: BinanceCfg, timeout: Duration) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, cfg })
    }

    pub fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let query = signed_query(&self.cfg.api_secret, now_ms(), params, self.cfg.recv_window);
        format!("{}{}?{}", self.cfg.base_url, path, query)
    }

    async fn signed_get<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, SyncError> {
        let url = self.url(path, params);
        debug!(%path, "binance signed GET");

        let rsp = match self.http.get(url).header(API_KEY_HEADER, &self.cfg.api_key).send().await {
            Ok(r) => r,
            Err(e) => {
                EXCHANGE_REQUESTS.with_label_values(&[endpoint, "transport_error"]).inc();
                error!(?e, %path, "binance request failed");
                return Err(e.into());
            }
        };

        let status = rsp.status();
        let body = rsp.text().await?;
        if !status.is_success() {
            EXCHANGE_REQUESTS.with_label_values(&[endpoint, "http_error"]).inc();
            error!(code = %status, %body, %path, "binance rejected request");
            return Err(SyncError::Status {
                service: "binance",
                status: status.as_u16(),
                body,
            });
        }

        EXCHANGE_REQUESTS.with_label_values(&[endpoint, "ok"]).inc();
        serde_json::from_str(&body).map_err(|source| SyncError::Decode { what: endpoint, source })
    }
}

#[async_trait]
impl ExchangeApi for BinanceClient {
    async fn fetch_balances(&self) -> Result<Vec<AssetBalance>, SyncError> {
        self.signed_get("balance", BALANCE_PATH, &[]).await
    }

    async fn fetch_income(&self, limit: u32) -> Result<Vec<IncomeEvent>, SyncError> {
        let params = [
            ("incomeType", "REALIZED_PNL".to_string()),
            ("limit", limit.to_string()),
        ];
        let mut events: Vec<IncomeEvent> = self.signed_get("income", INCOME_PATH, &params).await?;
        events.truncate(limit as usize);
        Ok(events)
    }
}
