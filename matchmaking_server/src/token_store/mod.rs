//! Token Store: the queue sorted set, the per-user active pointers, and the
//! per-token status payloads. Every mutating operation is atomic against all
//! three, whichever backend is in use.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod redis;
pub mod scripts;

pub use self::memory::MemoryTokenStore;
pub use self::redis::RedisTokenStore;

pub type UserId = i64;

pub const WAITING_TTL_SECONDS: u64 = 3600;
pub const MATCHED_TTL_SECONDS: u64 = 600;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("stored state corrupt: {0}")]
    Corrupt(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The payload behind `matchmaking:token:<token>`. Also the wire form of
/// enqueue and status responses. Transitions only Waiting -> Matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum TokenStatus {
    Waiting {
        queue_token: String,
        queued_at: i64,
    },
    Matched {
        queue_token: String,
        match_id: i64,
        opponent_id: UserId,
    },
}

impl TokenStatus {
    pub fn queue_token(&self) -> &str {
        match self {
            TokenStatus::Waiting { queue_token, .. } => queue_token,
            TokenStatus::Matched { queue_token, .. } => queue_token,
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, TokenStatus::Waiting { .. })
    }
}

/// One `(user, token)` pair popped from the queue, with the score it was
/// enqueued at. The score is what Safely-Requeue restores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoppedEntry {
    pub user_id: UserId,
    pub token: String,
    pub score: i64,
}

#[derive(Debug)]
pub enum EnqueueOutcome {
    /// The user already holds a live WAITING token; hand it back.
    AlreadyWaiting { token: String, queued_at: i64 },
    Full,
    /// A fresh token was issued. `popped` holds the pair candidates drained
    /// in the same atomic step: two entries mean a pair formed, fewer mean
    /// the pop raced a dequeue and the leftovers must be safely requeued.
    Queued {
        token: String,
        queued_at: i64,
        popped: Vec<PoppedEntry>,
    },
}

#[derive(Debug)]
pub enum DequeueOutcome {
    Removed,
    /// Already MATCHED; the payload stays readable until its TTL lapses.
    TooLate(TokenStatus),
    InvalidToken,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn enqueue(&self, user_id: UserId, max_queue_size: u64) -> StoreResult<EnqueueOutcome>;

    async fn status(&self, token: &str) -> StoreResult<Option<TokenStatus>>;

    async fn dequeue(&self, user_id: UserId, token: &str) -> StoreResult<DequeueOutcome>;

    /// Re-insert a popped entry at its original score, unless the user has
    /// dequeued or re-enqueued meanwhile. Returns whether it was restored.
    async fn safely_requeue(&self, entry: &PoppedEntry) -> StoreResult<bool>;

    /// Rewrite the token to MATCHED and release the user's active pointer.
    async fn publish_matched(
        &self,
        user_id: UserId,
        token: &str,
        match_id: i64,
        opponent_id: UserId,
    ) -> StoreResult<()>;
}

pub(crate) fn parse_member(member: &str) -> StoreResult<(UserId, String)> {
    let (uid, token) = member
        .split_once(':')
        .ok_or_else(|| StoreError::Corrupt(format!("malformed queue member {:?}", member)))?;
    let user_id = uid
        .parse::<i64>()
        .map_err(|_| StoreError::Corrupt(format!("malformed queue member {:?}", member)))?;
    Ok((user_id, token.to_string()))
}
