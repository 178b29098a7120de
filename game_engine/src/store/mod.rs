//! Match persistence. The service layer only sees these traits; the concrete
//! backend (Postgres in production, in-memory in tests) is picked at startup.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Match, MatchStatus, PlayerId, Round};

pub mod memory;
pub mod postgres;

pub use memory::MemoryMatchStore;
pub use postgres::PgMatchStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored state corrupt: {0}")]
    Corrupt(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One row of the win aggregate behind the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRow {
    pub player_id: PlayerId,
    pub wins: i64,
    pub total_matches: i64,
}

/// A match loaded under its exclusive lock, plus staged mutations. Dropping
/// the transaction without `commit` abandons every staged change.
#[async_trait]
pub trait MatchTxn: Send {
    fn match_ref(&self) -> &Match;
    fn match_mut(&mut self) -> &mut Match;

    /// All rounds of the match, ordered by round number, as staged.
    fn rounds(&self) -> &[Round];
    fn round_mut(&mut self, round_number: i32) -> Option<&mut Round>;

    /// Stage a newly created round. Its id is assigned at commit.
    fn push_round(&mut self, round: Round);

    /// Persist the staged match and rounds atomically. Returns the final
    /// state with storage-assigned round ids filled in.
    async fn commit(self: Box<Self>) -> StoreResult<(Match, Vec<Round>)>;
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn insert_match(&self, player1_id: PlayerId, player2_id: PlayerId)
        -> StoreResult<Match>;

    async fn fetch_match(&self, match_id: i64) -> StoreResult<Option<Match>>;

    async fn fetch_rounds(&self, match_id: i64) -> StoreResult<Vec<Round>>;

    /// Load a match with its rounds under an exclusive per-match lock. The
    /// lock is held until the returned transaction commits or drops.
    async fn lock_match(&self, match_id: i64) -> StoreResult<Option<Box<dyn MatchTxn>>>;

    /// Matches the player took part in, newest first, with their rounds.
    async fn matches_for_player(
        &self,
        player_id: PlayerId,
        status: Option<MatchStatus>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<(Match, Vec<Round>)>>;

    async fn count_for_player(
        &self,
        player_id: PlayerId,
        status: Option<MatchStatus>,
    ) -> StoreResult<i64>;

    async fn count_wins_for_player(&self, player_id: PlayerId) -> StoreResult<i64>;

    /// Win totals for every participant of a finished match, ordered by
    /// (wins desc, player_id asc).
    async fn leaderboard(&self, limit: i64, offset: i64) -> StoreResult<Vec<LeaderboardRow>>;
}
