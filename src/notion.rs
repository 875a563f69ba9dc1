// ===============================
// src/notion.rs
// ===============================
//
// Notion REST (database query / page create / page update).
// Token Bearer + header Notion-Version tetap dari config.
//
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::NotionCfg;
use crate::error::SyncError;

#[async_trait]
pub trait PageStore: Send + Sync {
    /// ID page di `database_id` yang properti rich_text `property`-nya memuat `needle`,
    /// dalam urutan hasil Notion.
    async fn query_contains(
        &self,
        database_id: &str,
        property: &str,
        needle: &str,
    ) -> Result<Vec<String>, SyncError>;

    /// Buat page baru, kembalikan ID-nya.
    async fn create_page(&self, database_id: &str, properties: Value) -> Result<String, SyncError>;

    async fn update_page(&self, page_id: &str, properties: Value) -> Result<(), SyncError>;
}

#[derive(Debug, Deserialize)]
struct PageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    results: Vec<PageRef>,
}

pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
}

impl NotionClient {
    pub fn new(cfg: &NotionCfg, timeout: Duration) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", cfg.token))
            .map_err(|e| SyncError::Unexpected(format!("notion token header: {e}")))?;
        let version = HeaderValue::from_str(&cfg.version)
            .map_err(|e| SyncError::Unexpected(format!("notion version header: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("Notion-Version", version);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, base_url: cfg.base_url.clone() })
    }

    async fn send(&self, req: reqwest::RequestBuilder, what: &'static str) -> Result<String, SyncError> {
        let rsp = req.send().await?;
        let status = rsp.status();
        let body = rsp.text().await?;
        if !status.is_success() {
            return Err(SyncError::Status {
                service: "notion",
                status: status.as_u16(),
                body,
            });
        }
        debug!(what, "notion ok");
        Ok(body)
    }
}

#[async_trait]
impl PageStore for NotionClient {
    async fn query_contains(
        &self,
        database_id: &str,
        property: &str,
        needle: &str,
    ) -> Result<Vec<String>, SyncError> {
        let url = format!("{}/databases/{}/query", self.base_url, database_id);
        let body = json!({
            "filter": { "property": property, "rich_text": { "contains": needle } }
        });
        let raw = self.send(self.http.post(url).json(&body), "query").await?;
        let res: QueryResult =
            serde_json::from_str(&raw).map_err(|source| SyncError::Decode { what: "notion query", source })?;
        Ok(res.results.into_iter().map(|p| p.id).collect())
    }

    async fn create_page(&self, database_id: &str, properties: Value) -> Result<String, SyncError> {
        let url = format!("{}/pages", self.base_url);
        let body = json!({
            "parent": { "database_id": database_id },
            "properties": properties,
        });
        let raw = self.send(self.http.post(url).json(&body), "create").await?;
        let page: PageRef =
            serde_json::from_str(&raw).map_err(|source| SyncError::Decode { what: "notion page", source })?;
        Ok(page.id)
    }

    async fn update_page(&self, page_id: &str, properties: Value) -> Result<(), SyncError> {
        let url = format!("{}/pages/{}", self.base_url, page_id);
        let body = json!({ "properties": properties });
        self.send(self.http.patch(url).json(&body), "update").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_stub;

    fn client(base_url: &str) -> NotionClient {
        let cfg = NotionCfg {
            token: "secret_t".into(),
            trades_db_id: "trades".into(),
            balance_db_id: "balance".into(),
            base_url: base_url.to_string(),
            version: "2022-06-28".into(),
        };
        NotionClient::new(&cfg, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn query_sends_rich_text_filter_with_headers() {
        let stub = http_stub::spawn(200, r#"{"object":"list","results":[{"id":"p1"},{"id":"p2"}]}"#);
        let ids = client(&stub.base_url)
            .query_contains("db1", "Notes", "[BTCUSDT-1000]")
            .await
            .unwrap();
        assert_eq!(ids, vec!["p1", "p2"]);

        let reqs = stub.requests();
        assert_eq!(reqs.len(), 1);
        let r = &reqs[0];
        assert_eq!(r.method, "POST");
        assert_eq!(r.path, "/databases/db1/query");
        assert_eq!(r.header("authorization"), Some("Bearer secret_t"));
        assert_eq!(r.header("notion-version"), Some("2022-06-28"));
        assert_eq!(r.header("content-type"), Some("application/json"));
        assert_eq!(
            r.json(),
            json!({ "filter": { "property": "Notes", "rich_text": { "contains": "[BTCUSDT-1000]" } } })
        );
    }

    #[tokio::test]
    async fn query_without_results_is_empty() {
        let stub = http_stub::spawn(200, r#"{"object":"list"}"#);
        let ids = client(&stub.base_url).query_contains("db1", "Notes", "x").await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn create_posts_parent_and_properties() {
        let stub = http_stub::spawn(200, r#"{"object":"page","id":"new-page"}"#);
        let props = json!({ "Symbol": { "title": [{ "text": { "content": "BTCUSDT" } }] } });
        let id = client(&stub.base_url).create_page("trades", props.clone()).await.unwrap();
        assert_eq!(id, "new-page");

        let r = &stub.requests()[0];
        assert_eq!(r.method, "POST");
        assert_eq!(r.path, "/pages");
        assert_eq!(r.json(), json!({ "parent": { "database_id": "trades" }, "properties": props }));
    }

    #[tokio::test]
    async fn update_patches_page_properties_only() {
        let stub = http_stub::spawn(200, r#"{"object":"page","id":"p9"}"#);
        let props = json!({ "PnL": { "number": 1.5 } });
        client(&stub.base_url).update_page("p9", props.clone()).await.unwrap();

        let r = &stub.requests()[0];
        assert_eq!(r.method, "PATCH");
        assert_eq!(r.path, "/pages/p9");
        assert_eq!(r.header("authorization"), Some("Bearer secret_t"));
        assert_eq!(r.json(), json!({ "properties": props }));
    }

    #[tokio::test]
    async fn rejected_request_keeps_status_and_body() {
        let stub = http_stub::spawn(400, r#"{"object":"error","code":"validation_error"}"#);
        let err = client(&stub.base_url).create_page("trades", json!({})).await.unwrap_err();
        match err {
            SyncError::Status { service, status, body } => {
                assert_eq!(service, "notion");
                assert_eq!(status, 400);
                assert!(body.contains("validation_error"));
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_without_id_is_decode_error() {
        let stub = http_stub::spawn(200, r#"{"object":"page"}"#);
        let err = client(&stub.base_url).create_page("trades", json!({})).await.unwrap_err();
        assert!(matches!(err, SyncError::Decode { what: "notion page", .. }));
    }
}
