//! Players-service RPC: profile validation before enqueue. Fail-closed, so
//! an unreachable service denies entry to the queue.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::token_store::UserId;

#[async_trait]
pub trait PlayersClient: Send + Sync {
    async fn validate_profile(&self, user_id: UserId) -> bool;
}

#[derive(Deserialize)]
struct ValidationResponse {
    #[serde(default)]
    valid: bool,
}

pub struct HttpPlayersClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPlayersClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlayersClient for HttpPlayersClient {
    async fn validate_profile(&self, user_id: UserId) -> bool {
        let url = format!("{}/internal/players/validation", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "user_id": user_id }))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => resp
                .json::<ValidationResponse>()
                .await
                .map(|v| v.valid)
                .unwrap_or(false),
            Ok(resp) => {
                warn!("Profile validation answered {}", resp.status());
                false
            }
            Err(e) => {
                warn!("Players service unreachable: {}", e);
                false
            }
        }
    }
}
