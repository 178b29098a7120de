//! Outbound RPC clients. Both are traits so tests can stub the catalogue and
//! the friendship check without a network.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::models::{normalize_card_id, CardId, CardStats, Deck, PlayerId};

/// Catalogue answer for a deck: either the full stats for every requested
/// card, or a rejection of the deck as a whole.
#[derive(Debug)]
pub enum DeckValidation {
    Valid(Deck),
    Rejected,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UpstreamError(pub String);

#[async_trait]
pub trait CatalogueClient: Send + Sync {
    async fn validate_deck(&self, card_ids: &[CardId]) -> Result<DeckValidation, UpstreamError>;
}

#[async_trait]
pub trait FriendshipClient: Send + Sync {
    /// Fail-closed: any transport or protocol failure reads as "not friends".
    async fn are_friends(&self, player1_id: PlayerId, player2_id: PlayerId) -> bool;
}

#[derive(Deserialize)]
struct CatalogueCard {
    id: serde_json::Value,
    #[serde(flatten)]
    stats: CardStats,
}

#[derive(Deserialize)]
struct CatalogueResponse {
    #[serde(default)]
    data: Vec<CatalogueCard>,
}

pub struct HttpCatalogueClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCatalogueClient {
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
impl CatalogueClient for HttpCatalogueClient {
    async fn validate_deck(&self, card_ids: &[CardId]) -> Result<DeckValidation, UpstreamError> {
        let url = format!("{}/internal/cards/validation", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "data": card_ids }))
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach catalogue service: {}", e);
                UpstreamError("Unable to reach catalogue service".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError(format!(
                "Catalogue validation failed ({})",
                status.as_u16()
            )));
        }

        let body: CatalogueResponse = response.json().await.map_err(|e| {
            error!("Malformed catalogue response: {}", e);
            UpstreamError("Unable to reach catalogue service".to_string())
        })?;

        if body.data.is_empty() {
            return Ok(DeckValidation::Rejected);
        }

        let mut deck: BTreeMap<CardId, CardStats> = BTreeMap::new();
        for card in body.data {
            match normalize_card_id(&card.id) {
                Some(id) => {
                    deck.insert(id, card.stats);
                }
                None => {
                    warn!("Catalogue returned unusable card id {:?}", card.id);
                    return Ok(DeckValidation::Rejected);
                }
            }
        }

        // The catalogue must vouch for every submitted card.
        if card_ids.iter().any(|id| !deck.contains_key(id)) {
            return Ok(DeckValidation::Rejected);
        }

        Ok(DeckValidation::Valid(deck))
    }
}

#[derive(Deserialize)]
struct ValidationResponse {
    #[serde(default)]
    valid: bool,
}

pub struct HttpFriendshipClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpFriendshipClient {
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
impl FriendshipClient for HttpFriendshipClient {
    async fn are_friends(&self, player1_id: PlayerId, player2_id: PlayerId) -> bool {
        let url = format!("{}/internal/players/friendship/validation", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "player1_id": player1_id, "player2_id": player2_id }))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => resp
                .json::<ValidationResponse>()
                .await
                .map(|v| v.valid)
                .unwrap_or(false),
            Ok(resp) => {
                warn!("Friendship validation answered {}", resp.status());
                false
            }
            Err(e) => {
                warn!("Friendship service unreachable: {}", e);
                false
            }
        }
    }
}
