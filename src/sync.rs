// ===============================
// src/sync.rs
// ===============================
//
// Alur satu run (berurutan, satu jalur):
//   fetch balance -> snapshot balance (selalu page baru)
//   fetch income  -> untuk tiap event: query memo `[SYMBOL-TIME]` -> update | create
//
// - Error Binance = fatal (run gagal).
// - Error Notion per event = dicatat + dihitung, run lanjut.
// - Semua request Notion lewat token bucket.
// - Run dalam satu proses diserialkan lewat mutex state, sehingga
//   query-then-write tidak balapan dengan run lain di proses yang sama.
//
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::domain::{now_ms, select_balance, Event, IncomeEvent, SyncReport, UpsertAction};
use crate::error::SyncError;
use crate::exchange::ExchangeApi;
use crate::metrics::{BALANCE_SNAPSHOTS, LAST_SUCCESS_TS, SYNC_RUNS, TRADE_UPSERTS};
use crate::notion::PageStore;
use crate::schema;
use crate::throttle::RateLimiter;

#[derive(Clone, Debug)]
pub struct Targets {
    pub trades_db_id: String,
    pub balance_db_id: String,
    pub balance_asset: String,
    pub income_limit: u32,
}

impl Targets {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            trades_db_id: cfg.notion.trades_db_id.clone(),
            balance_db_id: cfg.notion.balance_db_id.clone(),
            balance_asset: cfg.sync.balance_asset.clone(),
            income_limit: cfg.sync.income_limit,
        }
    }
}

/// State yang dipegang selama satu run
struct RunState {
    limiter: RateLimiter,
    // key -> page id yang dibuat di run ini (query Notion eventually consistent)
    created: HashMap<String, String>,
}

pub struct SyncEngine {
    exchange: Arc<dyn ExchangeApi>,
    store: Arc<dyn PageStore>,
    targets: Targets,
    state: Mutex<RunState>,
    rec_tx: Option<mpsc::Sender<Event>>,
}

impl SyncEngine {
    pub fn new(
        exchange: Arc<dyn ExchangeApi>,
        store: Arc<dyn PageStore>,
        targets: Targets,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            exchange,
            store,
            targets,
            state: Mutex::new(RunState { limiter, created: HashMap::new() }),
            rec_tx: None,
        }
    }

    pub fn with_recorder(mut self, tx: mpsc::Sender<Event>) -> Self {
        self.rec_tx = Some(tx);
        self
    }

    fn record(&self, ev: Event) {
        if let Some(tx) = &self.rec_tx {
            let _ = tx.try_send(ev);
        }
    }

    /// Satu run penuh. `Err` hanya untuk kegagalan Binance.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let mut st = self.state.lock().await;
        st.created.clear();

        info!(asset = %self.targets.balance_asset, limit = self.targets.income_limit, "sync start");
        match self.run_locked(&mut st).await {
            Ok(report) => {
                SYNC_RUNS.with_label_values(&["ok"]).inc();
                LAST_SUCCESS_TS.set(Utc::now().timestamp());
                info!(
                    balance = report.balance,
                    fetched = report.fetched,
                    created = report.created,
                    updated = report.updated,
                    failed = report.failed,
                    "sync done"
                );
                self.record(Event::Run { ts_ms: now_ms(), report: report.clone() });
                Ok(report)
            }
            Err(e) => {
                SYNC_RUNS.with_label_values(&["error"]).inc();
                error!(error = %e, "sync failed");
                Err(e)
            }
        }
    }

    async fn run_locked(&self, st: &mut RunState) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        let balances = self.exchange.fetch_balances().await?;
        report.balance = select_balance(&balances, &self.targets.balance_asset);
        report.balance_recorded = self.balance_locked(st, report.balance).await.is_some();

        let events = self.exchange.fetch_income(self.targets.income_limit).await?;
        report.fetched = events.len();

        for ev in &events {
            match self.upsert_locked(st, ev).await {
                Ok(UpsertAction::Created) => report.created += 1,
                Ok(UpsertAction::Updated) => report.updated += 1,
                Err(_) => report.failed += 1,
            }
        }
        Ok(report)
    }

    /// Upsert satu event di luar run (tetap antre di belakang run yang berjalan).
    pub async fn upsert_trade(&self, ev: &IncomeEvent) -> Result<UpsertAction, SyncError> {
        let mut st = self.state.lock().await;
        self.upsert_locked(&mut st, ev).await
    }

    /// Snapshot balance: selalu page baru, tanpa dedupe. Error hanya dicatat.
    pub async fn update_balance(&self, amount: f64) -> Option<String> {
        let mut st = self.state.lock().await;
        self.balance_locked(&mut st, amount).await
    }

    async fn upsert_locked(&self, st: &mut RunState, ev: &IncomeEvent) -> Result<UpsertAction, SyncError> {
        let key = ev.key();
        match self.write_trade(st, ev, &key).await {
            Ok((action, page_id)) => {
                TRADE_UPSERTS.with_label_values(&[action.label()]).inc();
                info!(%key, %page_id, action = action.label(), "trade upserted");
                self.record(Event::Trade { ts_ms: now_ms(), key, action, page_id });
                Ok(action)
            }
            Err(e) => {
                TRADE_UPSERTS.with_label_values(&["error"]).inc();
                error!(%key, error = %e, "trade upsert failed");
                self.record(Event::TradeFailed { ts_ms: now_ms(), key, error: e.to_string() });
                Err(e)
            }
        }
    }

    async fn write_trade(
        &self,
        st: &mut RunState,
        ev: &IncomeEvent,
        key: &str,
    ) -> Result<(UpsertAction, String), SyncError> {
        let existing = match st.created.get(key) {
            Some(id) => Some(id.clone()),
            None => {
                st.limiter.acquire().await;
                let hits = self
                    .store
                    .query_contains(&self.targets.trades_db_id, schema::NOTE, &schema::key_marker(key))
                    .await?;
                if hits.len() > 1 {
                    warn!(%key, matches = hits.len(), "duplicate pages for key, updating first");
                }
                hits.into_iter().next()
            }
        };

        let props = schema::trade_properties(ev, Some(key));
        st.limiter.acquire().await;
        match existing {
            Some(page_id) => {
                self.store.update_page(&page_id, props).await?;
                Ok((UpsertAction::Updated, page_id))
            }
            None => {
                let page_id = self.store.create_page(&self.targets.trades_db_id, props).await?;
                st.created.insert(key.to_string(), page_id.clone());
                Ok((UpsertAction::Created, page_id))
            }
        }
    }

    async fn balance_locked(&self, st: &mut RunState, amount: f64) -> Option<String> {
        let asset = &self.targets.balance_asset;
        let props = schema::balance_properties(asset, amount, Utc::now());

        st.limiter.acquire().await;
        let page_id = match self.store.create_page(&self.targets.balance_db_id, props).await {
            Ok(id) => {
                BALANCE_SNAPSHOTS.with_label_values(&["ok"]).inc();
                info!(%asset, amount, page_id = %id, "balance snapshot written");
                Some(id)
            }
            Err(e) => {
                BALANCE_SNAPSHOTS.with_label_values(&["error"]).inc();
                error!(%asset, amount, error = %e, "balance snapshot failed");
                None
            }
        };
        self.record(Event::Balance {
            ts_ms: now_ms(),
            asset: asset.clone(),
            amount,
            page_id: page_id.clone(),
        });
        page_id
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::domain::AssetBalance;

    #[derive(Default)]
    pub struct FakeExchange {
        pub balances: StdMutex<Vec<AssetBalance>>,
        pub income: StdMutex<Vec<IncomeEvent>>,
        pub fail_balance: StdMutex<bool>,
        pub fail_income: StdMutex<bool>,
    }

    impl FakeExchange {
        pub fn with(balance_usdt: f64, income: Vec<IncomeEvent>) -> Self {
            let fx = Self::default();
            *fx.balances.lock().unwrap() = vec![AssetBalance {
                asset: "USDT".into(),
                balance: balance_usdt,
            }];
            *fx.income.lock().unwrap() = income;
            fx
        }
    }

    fn upstream_err() -> SyncError {
        SyncError::Status { service: "binance", status: 401, body: "{\"code\":-2015}".into() }
    }

    #[async_trait]
    impl ExchangeApi for FakeExchange {
        async fn fetch_balances(&self) -> Result<Vec<AssetBalance>, SyncError> {
            if *self.fail_balance.lock().unwrap() {
                return Err(upstream_err());
            }
            Ok(self.balances.lock().unwrap().clone())
        }
        async fn fetch_income(&self, limit: u32) -> Result<Vec<IncomeEvent>, SyncError> {
            if *self.fail_income.lock().unwrap() {
                return Err(upstream_err());
            }
            let mut v = self.income.lock().unwrap().clone();
            v.truncate(limit as usize);
            Ok(v)
        }
    }

    #[derive(Debug, Clone)]
    pub struct Page {
        pub id: String,
        pub database_id: String,
        pub props: Value,
    }

    /// Notion in-memory. Tiap call yield dulu supaya interleaving antar task terlihat.
    #[derive(Default)]
    pub struct FakeStore {
        pub pages: StdMutex<Vec<Page>>,
        pub creates: StdMutex<usize>,
        pub updates: StdMutex<Vec<String>>,
        /// create gagal jika memo mengandung substring ini
        pub fail_create_containing: StdMutex<Option<String>>,
    }

    impl FakeStore {
        pub fn pages_in(&self, db: &str) -> Vec<Page> {
            self.pages.lock().unwrap().iter().filter(|p| p.database_id == db).cloned().collect()
        }
    }

    pub fn text_of(props: &Value, property: &str) -> String {
        props[property]["rich_text"][0]["text"]["content"].as_str().unwrap_or_default().to_string()
    }

    #[async_trait]
    impl PageStore for FakeStore {
        async fn query_contains(
            &self,
            database_id: &str,
            property: &str,
            needle: &str,
        ) -> Result<Vec<String>, SyncError> {
            tokio::task::yield_now().await;
            Ok(self
                .pages
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.database_id == database_id && text_of(&p.props, property).contains(needle))
                .map(|p| p.id.clone())
                .collect())
        }

        async fn create_page(&self, database_id: &str, properties: Value) -> Result<String, SyncError> {
            tokio::task::yield_now().await;
            if let Some(bad) = self.fail_create_containing.lock().unwrap().as_deref() {
                if text_of(&properties, schema::NOTE).contains(bad) {
                    return Err(SyncError::Status { service: "notion", status: 400, body: "validation_error".into() });
                }
            }
            let mut pages = self.pages.lock().unwrap();
            let id = format!("page-{}", pages.len() + 1);
            pages.push(Page { id: id.clone(), database_id: database_id.into(), props: properties });
            *self.creates.lock().unwrap() += 1;
            Ok(id)
        }

        async fn update_page(&self, page_id: &str, properties: Value) -> Result<(), SyncError> {
            tokio::task::yield_now().await;
            let mut pages = self.pages.lock().unwrap();
            let page = pages
                .iter_mut()
                .find(|p| p.id == page_id)
                .ok_or_else(|| SyncError::Status { service: "notion", status: 404, body: "object_not_found".into() })?;
            page.props = properties;
            self.updates.lock().unwrap().push(page_id.to_string());
            Ok(())
        }
    }

    pub fn targets() -> Targets {
        Targets {
            trades_db_id: "trades-db".into(),
            balance_db_id: "balance-db".into(),
            balance_asset: "USDT".into(),
            income_limit: 50,
        }
    }

    pub fn engine(fx: Arc<FakeExchange>, store: Arc<FakeStore>) -> SyncEngine {
        SyncEngine::new(fx, store, targets(), RateLimiter::new(1000.0, 1000))
    }

    pub fn income(symbol: &str, time: i64, realized: f64) -> IncomeEvent {
        IncomeEvent { symbol: symbol.into(), time, realized, qty: None }
    }
}
