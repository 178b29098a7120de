//! In-memory match store. Per-match `tokio::sync::Mutex` guards stand in for
//! the row-level lock of the Postgres backend; observable semantics are the
//! same, which is what the integration tests rely on.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::{Match, MatchStatus, PlayerId, Round};
use crate::store::{LeaderboardRow, MatchStore, MatchTxn, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    matches: HashMap<i64, Match>,
    rounds: HashMap<i64, Vec<Round>>,
    next_match_id: i64,
    next_round_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryMatchStore {
    inner: Arc<Mutex<Inner>>,
    row_locks: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn row_lock(&self, match_id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.row_locks.lock();
        locks
            .entry(match_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn sorted_rounds(rounds: &[Round]) -> Vec<Round> {
        let mut rounds = rounds.to_vec();
        rounds.sort_by_key(|r| r.round_number);
        rounds
    }
}

struct MemoryTxn {
    store: MemoryMatchStore,
    _guard: OwnedMutexGuard<()>,
    match_state: Match,
    rounds: Vec<Round>,
}

#[async_trait]
impl MatchTxn for MemoryTxn {
    fn match_ref(&self) -> &Match {
        &self.match_state
    }

    fn match_mut(&mut self) -> &mut Match {
        &mut self.match_state
    }

    fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    fn round_mut(&mut self, round_number: i32) -> Option<&mut Round> {
        self.rounds
            .iter_mut()
            .find(|r| r.round_number == round_number)
    }

    fn push_round(&mut self, round: Round) {
        self.rounds.push(round);
        self.rounds.sort_by_key(|r| r.round_number);
    }

    async fn commit(self: Box<Self>) -> StoreResult<(Match, Vec<Round>)> {
        let MemoryTxn {
            store,
            _guard,
            match_state,
            mut rounds,
        } = *self;

        let mut inner = store.inner.lock();
        if !inner.matches.contains_key(&match_state.id) {
            return Err(StoreError::Corrupt(format!(
                "match {} vanished during transaction",
                match_state.id
            )));
        }
        for round in &mut rounds {
            if round.id.is_none() {
                inner.next_round_id += 1;
                round.id = Some(inner.next_round_id);
            }
        }
        inner.matches.insert(match_state.id, match_state.clone());
        inner.rounds.insert(match_state.id, rounds.clone());
        drop(inner);

        Ok((match_state, rounds))
    }
}

#[async_trait]
impl MatchStore for MemoryMatchStore {
    async fn insert_match(
        &self,
        player1_id: PlayerId,
        player2_id: PlayerId,
    ) -> StoreResult<Match> {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        inner.next_match_id += 1;
        let mtch = Match {
            id: inner.next_match_id,
            player1_id,
            player2_id,
            status: MatchStatus::Setup,
            player1_score: 0,
            player2_score: 0,
            winner_id: None,
            player1_deck: None,
            player2_deck: None,
            created_at: now,
            updated_at: now,
        };
        inner.matches.insert(mtch.id, mtch.clone());
        inner.rounds.insert(mtch.id, Vec::new());
        Ok(mtch)
    }

    async fn fetch_match(&self, match_id: i64) -> StoreResult<Option<Match>> {
        Ok(self.inner.lock().matches.get(&match_id).cloned())
    }

    async fn fetch_rounds(&self, match_id: i64) -> StoreResult<Vec<Round>> {
        Ok(self
            .inner
            .lock()
            .rounds
            .get(&match_id)
            .map(|r| Self::sorted_rounds(r))
            .unwrap_or_default())
    }

    async fn lock_match(&self, match_id: i64) -> StoreResult<Option<Box<dyn MatchTxn>>> {
        let lock = self.row_lock(match_id);
        let guard = lock.lock_owned().await;

        let (match_state, rounds) = {
            let inner = self.inner.lock();
            match inner.matches.get(&match_id) {
                Some(m) => (
                    m.clone(),
                    inner
                        .rounds
                        .get(&match_id)
                        .map(|r| Self::sorted_rounds(r))
                        .unwrap_or_default(),
                ),
                None => return Ok(None),
            }
        };

        Ok(Some(Box::new(MemoryTxn {
            store: self.clone(),
            _guard: guard,
            match_state,
            rounds,
        })))
    }

    async fn matches_for_player(
        &self,
        player_id: PlayerId,
        status: Option<MatchStatus>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<(Match, Vec<Round>)>> {
        let inner = self.inner.lock();
        let mut matches: Vec<&Match> = inner
            .matches
            .values()
            .filter(|m| m.player1_id == player_id || m.player2_id == player_id)
            .filter(|m| status.map_or(true, |s| m.status == s))
            .collect();
        // Newest first; id breaks creation-time ties deterministically.
        matches.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(matches
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|m| {
                let rounds = inner
                    .rounds
                    .get(&m.id)
                    .map(|r| Self::sorted_rounds(r))
                    .unwrap_or_default();
                (m.clone(), rounds)
            })
            .collect())
    }

    async fn count_for_player(
        &self,
        player_id: PlayerId,
        status: Option<MatchStatus>,
    ) -> StoreResult<i64> {
        let inner = self.inner.lock();
        Ok(inner
            .matches
            .values()
            .filter(|m| m.player1_id == player_id || m.player2_id == player_id)
            .filter(|m| status.map_or(true, |s| m.status == s))
            .count() as i64)
    }

    async fn count_wins_for_player(&self, player_id: PlayerId) -> StoreResult<i64> {
        let inner = self.inner.lock();
        Ok(inner
            .matches
            .values()
            .filter(|m| m.status == MatchStatus::Finished && m.winner_id == Some(player_id))
            .count() as i64)
    }

    async fn leaderboard(&self, limit: i64, offset: i64) -> StoreResult<Vec<LeaderboardRow>> {
        let inner = self.inner.lock();
        let mut totals: HashMap<PlayerId, LeaderboardRow> = HashMap::new();
        for m in inner
            .matches
            .values()
            .filter(|m| m.status == MatchStatus::Finished)
        {
            for player_id in [m.player1_id, m.player2_id] {
                let row = totals.entry(player_id).or_insert(LeaderboardRow {
                    player_id,
                    wins: 0,
                    total_matches: 0,
                });
                row.total_matches += 1;
                if m.winner_id == Some(player_id) {
                    row.wins += 1;
                }
            }
        }
        let mut rows: Vec<LeaderboardRow> = totals.into_values().collect();
        rows.sort_by(|a, b| b.wins.cmp(&a.wins).then_with(|| a.player_id.cmp(&b.player_id)));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}
