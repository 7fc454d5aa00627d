use crate::chatctx::config::BridgeConfig;
use crate::error::ChatCtxError;
use crate::transcript::feed::{FeedRecord, parse_feed_json};
use reqwest::blocking::Client;
use std::time::Duration;

/// Client for the messaging bridge's per-chat message feed.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    base_url: String,
    limit: usize,
    timeout_secs: u64,
}

impl BridgeClient {
    pub fn new(cfg: &BridgeConfig) -> Self {
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            limit: cfg.limit,
            timeout_secs: cfg.timeout_secs,
        }
    }

    pub fn messages_url(&self) -> String {
        format!("{}/api/messages", self.base_url)
    }

    /// `GET /api/messages?chatId=<id>`.
    pub fn fetch(&self, chat_id: &str) -> Result<Vec<FeedRecord>, ChatCtxError> {
        let unavailable = ChatCtxError::BridgeUnavailable;
        let client = Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|err| unavailable(format!("client setup failed: {err}")))?;

        let url = self.messages_url();
        let limit = self.limit.to_string();
        let response = client
            .get(&url)
            .query(&[("chatId", chat_id), ("limit", limit.as_str())])
            .send()
            .map_err(|err| unavailable(format!("{url}: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("{url} returned status {status}")));
        }
        let body = response
            .text()
            .map_err(|err| unavailable(format!("{url}: failed to read body: {err}")))?;
        let records = parse_feed_json(&body)
            .map_err(|err| unavailable(format!("{url}: unexpected payload: {err}")))?;
        tracing::info!(chat_id, records = records.len(), "fetched bridge feed");
        Ok(records)
    }
}
