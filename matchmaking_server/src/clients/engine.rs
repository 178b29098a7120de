//! Game-engine RPC. A create-match call either yields a match id or counts
//! as a failure; the coordinator treats timeouts, transport errors and
//! non-2xx answers identically (Safely-Requeue both players).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::token_store::UserId;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct EngineRpcError(pub String);

#[async_trait]
pub trait EngineClient: Send + Sync {
    async fn create_match(&self, player1_id: UserId, player2_id: UserId)
        -> Result<i64, EngineRpcError>;
}

#[derive(Deserialize)]
struct CreateMatchResponse {
    id: Option<i64>,
    match_id: Option<i64>,
}

impl CreateMatchResponse {
    fn resolved_id(&self) -> Option<i64> {
        self.id.or(self.match_id)
    }
}

pub struct HttpEngineClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpEngineClient {
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
impl EngineClient for HttpEngineClient {
    async fn create_match(
        &self,
        player1_id: UserId,
        player2_id: UserId,
    ) -> Result<i64, EngineRpcError> {
        let url = format!("{}/internal/matches/create", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "player1_id": player1_id, "player2_id": player2_id }))
            .send()
            .await
            .map_err(|e| {
                error!("Game engine unavailable: {}", e);
                EngineRpcError("Game engine unavailable".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Game engine answered {} to create-match", status);
            return Err(EngineRpcError(format!(
                "Failed to create match ({})",
                status.as_u16()
            )));
        }

        let body: CreateMatchResponse = response
            .json()
            .await
            .map_err(|e| EngineRpcError(format!("Malformed engine response: {}", e)))?;
        body.resolved_id()
            .ok_or_else(|| EngineRpcError("Engine response carried no match id".to_string()))
    }
}
