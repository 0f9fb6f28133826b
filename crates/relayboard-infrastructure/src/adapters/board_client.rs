//! HTTP client for the external collaboration board (spec §4.3, §5, §6).
//!
//! Rate-limited calls are retried with exponential back-off plus jitter:
//! base 1 s, delay = `base * 2^attempt + U(0, 1)` s, up to `max_retries`
//! attempts, and only for rate-limit responses (spec §5).

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::Value as Json;
use std::time::Duration;

use relayboard_domain::ports::{BoardApiError, BoardClient, BoardItem, BoardItemPage, BoardSearchResult};

/// `reqwest`-backed [`BoardClient`] with rate-limit retry/back-off.
pub struct ReqwestBoardClient {
    client: Client,
    base_url: String,
    api_token: String,
    max_retries: u32,
}

impl ReqwestBoardClient {
    /// Construct a client targeting `base_url`, authenticating with
    /// `api_token`, retrying rate-limited calls up to `max_retries` times.
    #[must_use]
    pub fn new(base_url: String, api_token: String, max_retries: u32) -> Self {
        Self { client: Client::new(), base_url, api_token, max_retries }
    }

    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> std::result::Result<reqwest::Response, BoardApiError> {
        let mut attempt = 0u32;
        loop {
            let response = build()
                .bearer_auth(&self.api_token)
                .send()
                .await
                .map_err(|e| BoardApiError::Api(e.to_string()))?;

            match response.status() {
                StatusCode::TOO_MANY_REQUESTS if attempt < self.max_retries => {
                    let base_delay = Duration::from_secs(1) * 2u32.pow(attempt);
                    let jitter = Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..1.0));
                    tokio::time::sleep(base_delay + jitter).await;
                    attempt += 1;
                    continue;
                }
                StatusCode::TOO_MANY_REQUESTS => return Err(BoardApiError::RateLimit),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(BoardApiError::AuthError),
                StatusCode::NOT_FOUND => {
                    let url = response.url().to_string();
                    return Err(BoardApiError::NotFound(url));
                }
                status if status.is_success() => return Ok(response),
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(BoardApiError::Api(format!("{status}: {body}")));
                }
            }
        }
    }
}

#[async_trait]
impl BoardClient for ReqwestBoardClient {
    async fn create_item(
        &self,
        board: &str,
        name: &str,
        column_values: Option<&Json>,
        group: Option<&str>,
    ) -> std::result::Result<BoardItem, BoardApiError> {
        let url = format!("{}/boards/{board}/items", self.base_url);
        let body = serde_json::json!({
            "name": name,
            "column_values": column_values,
            "group": group,
        });
        let response = self.send_with_retry(|| self.client.post(&url).json(&body)).await?;
        response.json::<BoardItem>().await.map_err(|e| BoardApiError::Api(e.to_string()))
    }

    async fn update_item(
        &self,
        board: &str,
        item: &str,
        column_values: &Json,
    ) -> std::result::Result<(), BoardApiError> {
        let url = format!("{}/boards/{board}/items/{item}", self.base_url);
        let body = serde_json::json!({ "column_values": column_values });
        self.send_with_retry(|| self.client.patch(&url).json(&body)).await?;
        Ok(())
    }

    async fn delete_item(&self, item: &str) -> std::result::Result<(), BoardApiError> {
        let url = format!("{}/items/{item}", self.base_url);
        self.send_with_retry(|| self.client.delete(&url)).await?;
        Ok(())
    }

    async fn get_board_items(
        &self,
        board: &str,
        cursor: Option<&str>,
    ) -> std::result::Result<BoardItemPage, BoardApiError> {
        let url = format!("{}/boards/{board}/items", self.base_url);
        let response = self
            .send_with_retry(|| {
                let mut req = self.client.get(&url);
                if let Some(cursor) = cursor {
                    req = req.query(&[("cursor", cursor)]);
                }
                req
            })
            .await?;
        let page: RawPage = response.json().await.map_err(|e| BoardApiError::Api(e.to_string()))?;
        Ok(BoardItemPage { items: page.items, next_cursor: page.next_cursor })
    }

    async fn search_contacts(
        &self,
        board: &str,
        query: &str,
        columns: Option<&[String]>,
        limit: Option<u32>,
    ) -> std::result::Result<BoardSearchResult, BoardApiError> {
        let url = format!("{}/boards/{board}/search", self.base_url);
        let response = self
            .send_with_retry(|| {
                let mut req = self.client.get(&url).query(&[("q", query)]);
                if let Some(limit) = limit {
                    req = req.query(&[("limit", limit)]);
                }
                if let Some(columns) = columns {
                    req = req.query(&[("columns", columns.join(","))]);
                }
                req
            })
            .await?;
        let result: RawSearchResult = response.json().await.map_err(|e| BoardApiError::Api(e.to_string()))?;
        Ok(BoardSearchResult { items: result.items, cursor: result.cursor, has_more: result.has_more })
    }
}

#[derive(serde::Deserialize)]
struct RawPage {
    items: Vec<Json>,
    next_cursor: Option<String>,
}

#[derive(serde::Deserialize)]
struct RawSearchResult {
    items: Vec<Json>,
    cursor: Option<String>,
    has_more: bool,
}
