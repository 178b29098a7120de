//! Shared harness for the game-engine integration tests: in-memory store,
//! stubbed catalogue/friendship services, seeded category sequence.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use game_engine::clients::{CatalogueClient, DeckValidation, FriendshipClient, UpstreamError};
use game_engine::models::{CardId, CardStats, Deck, PlayerId};
use game_engine::service::{MatchRules, MatchService};
use game_engine::store::{MatchStore, MemoryMatchStore};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// How the stub catalogue answers deck validation.
#[derive(Clone, Copy)]
pub enum CatalogueMode {
    /// Every category of card `k` scores `k`; higher ids always win.
    ScoreByCardId,
    /// Every card scores the same; every round is a draw.
    AllEqual,
    Reject,
    Down,
}

pub struct StubCatalogue {
    pub mode: CatalogueMode,
}

#[async_trait]
impl CatalogueClient for StubCatalogue {
    async fn validate_deck(&self, card_ids: &[CardId]) -> Result<DeckValidation, UpstreamError> {
        match self.mode {
            CatalogueMode::Down => Err(UpstreamError(
                "Unable to reach catalogue service".to_string(),
            )),
            CatalogueMode::Reject => Ok(DeckValidation::Rejected),
            CatalogueMode::ScoreByCardId => {
                Ok(DeckValidation::Valid(deck_where(card_ids, |id| id as f64)))
            }
            CatalogueMode::AllEqual => {
                Ok(DeckValidation::Valid(deck_where(card_ids, |_| 1.0)))
            }
        }
    }
}

fn deck_where(card_ids: &[CardId], score: impl Fn(CardId) -> f64) -> Deck {
    card_ids
        .iter()
        .map(|&id| {
            let s = score(id);
            (
                id,
                CardStats {
                    economy: s,
                    food: s,
                    environment: s,
                    special: s,
                    total: s,
                },
            )
        })
        .collect()
}

pub struct StubFriendship {
    pub friends: bool,
    pub called: AtomicBool,
}

impl StubFriendship {
    pub fn new(friends: bool) -> Arc<Self> {
        Arc::new(Self {
            friends,
            called: AtomicBool::new(false),
        })
    }

    pub fn was_called(&self) -> bool {
        self.called.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FriendshipClient for StubFriendship {
    async fn are_friends(&self, _player1_id: PlayerId, _player2_id: PlayerId) -> bool {
        self.called.store(true, Ordering::SeqCst);
        self.friends
    }
}

pub struct Harness {
    pub store: MemoryMatchStore,
    pub friendship: Arc<StubFriendship>,
    pub service: MatchService,
}

pub fn harness(mode: CatalogueMode, friends: bool, rules: MatchRules) -> Harness {
    let store = MemoryMatchStore::new();
    let friendship = StubFriendship::new(friends);
    let service = MatchService::with_rng(
        Arc::new(store.clone()) as Arc<dyn MatchStore>,
        Arc::new(StubCatalogue { mode }),
        friendship.clone(),
        rules,
        StdRng::seed_from_u64(42),
    );
    Harness {
        store,
        friendship,
        service,
    }
}

pub fn default_harness() -> Harness {
    harness(CatalogueMode::ScoreByCardId, true, MatchRules::default())
}

/// Rules for one-card, one-round matches; keeps aggregate tests short.
pub fn quick_rules() -> MatchRules {
    MatchRules {
        deck_size: 1,
        max_rounds: 1,
        ..MatchRules::default()
    }
}

pub fn ids(raw: &[i64]) -> Vec<serde_json::Value> {
    raw.iter().map(|id| serde_json::json!(id)).collect()
}
