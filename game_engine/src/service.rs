//! Service layer: coordinates the stores, the outbound RPCs and the pure
//! game rules. Every mutating path runs inside a match transaction; nothing
//! is persisted when validation or an upstream call fails.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

use crate::clients::{CatalogueClient, DeckValidation, FriendshipClient};
use crate::engine::{self, MoveStatus, RoundStatus};
use crate::errors::{GameError, GameResult, ValidationCode};
use crate::models::{
    normalize_card_id, Category, Match, MatchSnapshot, MatchStatus, PlayerId, Round,
    RoundSnapshot, Seat,
};
use crate::store::{MatchStore, MatchTxn};

pub const HISTORY_LIMIT_CAP: i64 = 100;
pub const LEADERBOARD_LIMIT_CAP: i64 = 500;

/// Deployment-tunable game parameters.
#[derive(Debug, Clone)]
pub struct MatchRules {
    pub deck_size: usize,
    pub max_rounds: usize,
    /// Pool the per-round category is drawn from.
    pub categories: Vec<Category>,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            deck_size: 5,
            max_rounds: 5,
            categories: Category::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WaitingForOpponent {
    pub status: MoveStatus,
    pub round: RoundSnapshot,
}

#[derive(Debug, Serialize)]
pub struct RoundProcessed {
    pub status: MoveStatus,
    pub round_winner_id: Option<PlayerId>,
    pub is_draw: bool,
    pub completed_round: RoundSnapshot,
    pub scores: BTreeMap<PlayerId, i32>,
    pub next_round: Option<i32>,
    pub next_category: Option<Category>,
    pub game_status: MatchStatus,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MoveOutcome {
    Waiting(WaitingForOpponent),
    Processed(Box<RoundProcessed>),
}

#[derive(Debug, Serialize)]
pub struct CurrentRoundPayload {
    pub match_id: i64,
    pub current_round_number: Option<i32>,
    pub current_category: Option<Category>,
    pub round_status: RoundStatus,
    pub round: Option<RoundSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct HistoryMatch {
    #[serde(flatten)]
    pub snapshot: MatchSnapshot,
    pub player_won: Option<bool>,
    pub player_was_player1: bool,
    pub opponent_id: PlayerId,
    pub player_score: i32,
    pub opponent_score: i32,
}

#[derive(Debug, Serialize)]
pub struct HistorySummary {
    pub total_matches: i64,
    pub total_wins: i64,
    pub total_losses: i64,
    pub win_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct HistoryPayload {
    pub player_id: PlayerId,
    pub matches: Vec<HistoryMatch>,
    pub summary: HistorySummary,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub player_id: PlayerId,
    pub wins: i64,
    pub losses: i64,
    pub total_matches: i64,
    pub win_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardPayload {
    pub leaderboard: Vec<LeaderboardEntry>,
    pub limit: i64,
    pub offset: i64,
    pub count: usize,
}

pub struct MatchService {
    store: Arc<dyn MatchStore>,
    catalogue: Arc<dyn CatalogueClient>,
    friendship: Arc<dyn FriendshipClient>,
    rules: MatchRules,
    rng: Mutex<StdRng>,
}

fn round_percentage(numerator: i64, denominator: i64) -> f64 {
    if denominator <= 0 {
        return 0.0;
    }
    let rate = numerator as f64 / denominator as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

impl MatchService {
    pub fn new(
        store: Arc<dyn MatchStore>,
        catalogue: Arc<dyn CatalogueClient>,
        friendship: Arc<dyn FriendshipClient>,
        rules: MatchRules,
    ) -> Self {
        Self::with_rng(store, catalogue, friendship, rules, StdRng::from_entropy())
    }

    /// Seeded variant so tests can pin the category sequence.
    pub fn with_rng(
        store: Arc<dyn MatchStore>,
        catalogue: Arc<dyn CatalogueClient>,
        friendship: Arc<dyn FriendshipClient>,
        rules: MatchRules,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            catalogue,
            friendship,
            rules,
            rng: Mutex::new(rng),
        }
    }

    pub fn rules(&self) -> &MatchRules {
        &self.rules
    }

    fn pick_category(&self) -> Category {
        let mut rng = self.rng.lock();
        self.rules
            .categories
            .choose(&mut *rng)
            .copied()
            .unwrap_or(Category::Total)
    }

    pub async fn create_match(
        &self,
        player1_id: PlayerId,
        player2_id: PlayerId,
    ) -> GameResult<MatchSnapshot> {
        engine::validate_match_creation(player1_id, player2_id)?;
        let mtch = self
            .store
            .insert_match(player1_id, player2_id)
            .await
            .map_err(anyhow::Error::from)?;
        info!(
            "Match {} created between players {} and {}",
            mtch.id, player1_id, player2_id
        );
        Ok(mtch.snapshot())
    }

    pub async fn submit_deck(
        &self,
        match_id: i64,
        caller_id: PlayerId,
        raw_card_ids: &[serde_json::Value],
    ) -> GameResult<MatchSnapshot> {
        // Validate against a plain read first so the catalogue round-trip
        // happens without holding the match lock.
        let preview = self
            .store
            .fetch_match(match_id)
            .await
            .map_err(anyhow::Error::from)?
            .ok_or_else(|| GameError::NotFound("Match not found".to_string()))?;
        let card_ids = normalize_ids(raw_card_ids)?;
        engine::validate_deck_submission(&card_ids, caller_id, &preview, self.rules.deck_size)?;

        let deck = match self
            .catalogue
            .validate_deck(&card_ids)
            .await
            .map_err(|e| GameError::Upstream(e.0))?
        {
            DeckValidation::Valid(deck) => deck,
            DeckValidation::Rejected => {
                return Err(GameError::validation_msg(
                    "Deck rejected by catalogue service (invalid cards)",
                ))
            }
        };

        let mut txn = self
            .store
            .lock_match(match_id)
            .await
            .map_err(anyhow::Error::from)?
            .ok_or_else(|| GameError::NotFound("Match not found".to_string()))?;

        // The state may have moved while the catalogue was on the wire.
        engine::validate_deck_submission(
            &card_ids,
            caller_id,
            txn.match_ref(),
            self.rules.deck_size,
        )?;

        let seat = txn.match_ref().seat_of(caller_id).ok_or_else(|| {
            GameError::validation(
                ValidationCode::NotParticipant,
                "Player is not part of this match",
            )
        })?;

        let now = Utc::now();
        {
            let m = txn.match_mut();
            match seat {
                Seat::Player1 => m.player1_deck = Some(deck),
                Seat::Player2 => m.player2_deck = Some(deck),
            }
            m.updated_at = now;
        }
        info!("Player {} submitted deck for match {}", caller_id, match_id);

        if txn.match_ref().both_decks_present() {
            let category = self.pick_category();
            txn.match_mut().status = MatchStatus::InProgress;
            txn.push_round(Round::new(match_id, 1, category, now));
            info!(
                "Match {} started, round 1 category {}",
                match_id, category
            );
        }

        let (mtch, _rounds) = txn.commit().await.map_err(anyhow::Error::from)?;
        Ok(mtch.snapshot())
    }

    pub async fn submit_move(
        &self,
        match_id: i64,
        caller_id: PlayerId,
        raw_card_id: &serde_json::Value,
        round_number: i32,
    ) -> GameResult<MoveOutcome> {
        let card_id = normalize_card_id(raw_card_id).ok_or_else(|| {
            GameError::validation(
                ValidationCode::InvalidTypes,
                "player_id (int) and card_id (int) are required",
            )
        })?;

        let mut txn = self
            .store
            .lock_match(match_id)
            .await
            .map_err(anyhow::Error::from)?
            .ok_or_else(|| GameError::NotFound("Match not found".to_string()))?;

        let completed: Vec<Round> = txn
            .rounds()
            .iter()
            .filter(|r| r.is_complete())
            .cloned()
            .collect();
        let current = txn.rounds().iter().find(|r| !r.is_complete()).cloned();

        let current = match current {
            Some(round) => round,
            None => {
                // No open round: let the rule table speak when the match
                // isn't running, otherwise the state is inconsistent.
                engine::validate_move_submission(
                    caller_id,
                    card_id,
                    txn.match_ref(),
                    None,
                    &completed,
                )?;
                return Err(GameError::validation_msg("No active round for this match"));
            }
        };

        if current.round_number != round_number {
            return Err(GameError::validation_msg(format!(
                "Expected round {}, got {}",
                current.round_number, round_number
            )));
        }

        engine::validate_move_submission(
            caller_id,
            card_id,
            txn.match_ref(),
            Some(&current),
            &completed,
        )?;

        let seat = match txn.match_ref().seat_of(caller_id) {
            Some(seat) => seat,
            None => {
                return Err(GameError::validation(
                    ValidationCode::NotParticipant,
                    "Player is not part of this match",
                ))
            }
        };

        let now = Utc::now();
        {
            let round = txn
                .round_mut(round_number)
                .ok_or_else(|| GameError::Internal(anyhow::anyhow!("current round vanished")))?;
            match seat {
                Seat::Player1 => round.player1_card_id = Some(card_id),
                Seat::Player2 => round.player2_card_id = Some(card_id),
            }
            round.updated_at = now;
        }
        txn.match_mut().updated_at = now;
        info!(
            "Move submitted: player {} played {} in round {} of match {}",
            caller_id, card_id, round_number, match_id
        );

        let round_complete = txn
            .round_mut(round_number)
            .map(|r| r.is_complete())
            .unwrap_or(false);

        if !round_complete {
            let (_mtch, rounds) = txn.commit().await.map_err(anyhow::Error::from)?;
            let round = rounds
                .iter()
                .find(|r| r.round_number == round_number)
                .ok_or_else(|| GameError::Internal(anyhow::anyhow!("committed round missing")))?;
            return Ok(MoveOutcome::Waiting(WaitingForOpponent {
                status: MoveStatus::WaitingForOpponent,
                round: round.snapshot(),
            }));
        }

        self.resolve_round(txn, match_id, round_number).await
    }

    /// Both cards are in: score the round, settle the winner, and either
    /// advance to the next round or finalize the match.
    async fn resolve_round(
        &self,
        mut txn: Box<dyn MatchTxn>,
        match_id: i64,
        round_number: i32,
    ) -> GameResult<MoveOutcome> {
        let current = txn
            .round_mut(round_number)
            .map(|r| r.clone())
            .ok_or_else(|| GameError::Internal(anyhow::anyhow!("current round vanished")))?;

        let (score_p1, score_p2) = engine::round_scores(txn.match_ref(), &current)?;
        let (round_winner_id, is_draw) = engine::round_winner(
            score_p1,
            score_p2,
            txn.match_ref().player1_id,
            txn.match_ref().player2_id,
        );
        info!(
            "Round {} of match {} resolved on {}: {} vs {} -> winner {:?}",
            round_number, match_id, current.category, score_p1, score_p2, round_winner_id
        );

        let now = Utc::now();
        if let Some(round) = txn.round_mut(round_number) {
            round.winner_id = round_winner_id;
            round.updated_at = now;
        }
        engine::apply_round_winner(txn.match_mut(), round_winner_id);

        let finished = engine::should_end_match(txn.rounds(), self.rules.max_rounds);
        if finished {
            engine::finalize_match(txn.match_mut());
            txn.match_mut().updated_at = now;
            info!(
                "Match {} finished. Winner: {:?}",
                match_id,
                txn.match_ref().winner_id
            );
        } else {
            let category = self.pick_category();
            let number = engine::next_round_number(txn.rounds());
            txn.push_round(Round::new(match_id, number, category, now));
            info!(
                "Match {} advancing to round {} with category {}",
                match_id, number, category
            );
        }

        let (mtch, rounds) = txn.commit().await.map_err(anyhow::Error::from)?;

        let completed_round = rounds
            .iter()
            .find(|r| r.round_number == round_number)
            .ok_or_else(|| GameError::Internal(anyhow::anyhow!("committed round missing")))?;
        let next = rounds.iter().find(|r| !r.is_complete());

        let mut scores = BTreeMap::new();
        scores.insert(mtch.player1_id, mtch.player1_score);
        scores.insert(mtch.player2_id, mtch.player2_score);

        Ok(MoveOutcome::Processed(Box::new(RoundProcessed {
            status: MoveStatus::RoundProcessed,
            round_winner_id,
            is_draw,
            completed_round: completed_round.snapshot(),
            scores,
            next_round: next.map(|r| r.round_number),
            next_category: next.map(|r| r.category),
            game_status: mtch.status,
        })))
    }

    async fn participant_match(
        &self,
        match_id: i64,
        requester_id: PlayerId,
    ) -> GameResult<Match> {
        let mtch = self
            .store
            .fetch_match(match_id)
            .await
            .map_err(anyhow::Error::from)?
            .ok_or_else(|| GameError::NotFound("Match not found".to_string()))?;
        if !mtch.is_participant(requester_id) {
            return Err(GameError::Permission(
                "Requester is not part of this match".to_string(),
            ));
        }
        Ok(mtch)
    }

    pub async fn get_match(
        &self,
        match_id: i64,
        requester_id: PlayerId,
        include_rounds: bool,
    ) -> GameResult<MatchSnapshot> {
        let mtch = self.participant_match(match_id, requester_id).await?;
        if include_rounds {
            let rounds = self
                .store
                .fetch_rounds(match_id)
                .await
                .map_err(anyhow::Error::from)?;
            Ok(mtch.snapshot_with_rounds(&rounds))
        } else {
            Ok(mtch.snapshot())
        }
    }

    pub async fn current_round_status(
        &self,
        match_id: i64,
        requester_id: PlayerId,
    ) -> GameResult<CurrentRoundPayload> {
        let mtch = self.participant_match(match_id, requester_id).await?;
        let rounds = self
            .store
            .fetch_rounds(match_id)
            .await
            .map_err(anyhow::Error::from)?;
        let current = rounds.iter().find(|r| !r.is_complete());

        Ok(CurrentRoundPayload {
            match_id: mtch.id,
            current_round_number: current.map(|r| r.round_number),
            current_category: current.map(|r| r.category),
            round_status: engine::round_status(current),
            round: current.map(Round::snapshot),
        })
    }

    pub async fn player_history(
        &self,
        player_id: PlayerId,
        requester_id: PlayerId,
        status: Option<MatchStatus>,
        limit: i64,
        offset: i64,
    ) -> GameResult<HistoryPayload> {
        if requester_id != player_id && !self.friendship.are_friends(requester_id, player_id).await
        {
            // Fail-closed: an unreachable friendship service denies too.
            return Err(GameError::Permission(
                "Not authorized to view this player's history".to_string(),
            ));
        }

        let limit = limit.clamp(1, HISTORY_LIMIT_CAP);
        let offset = offset.max(0);

        let matches = self
            .store
            .matches_for_player(player_id, status, limit, offset)
            .await
            .map_err(anyhow::Error::from)?;

        let history: Vec<HistoryMatch> = matches
            .iter()
            .map(|(m, rounds)| {
                let was_player1 = m.player1_id == player_id;
                HistoryMatch {
                    snapshot: m.snapshot_with_rounds(rounds),
                    player_won: m.winner_id.map(|w| w == player_id),
                    player_was_player1: was_player1,
                    opponent_id: if was_player1 { m.player2_id } else { m.player1_id },
                    player_score: if was_player1 { m.player1_score } else { m.player2_score },
                    opponent_score: if was_player1 { m.player2_score } else { m.player1_score },
                }
            })
            .collect();

        let total_matches = self
            .store
            .count_for_player(player_id, Some(MatchStatus::Finished))
            .await
            .map_err(anyhow::Error::from)?;
        let total_wins = self
            .store
            .count_wins_for_player(player_id)
            .await
            .map_err(anyhow::Error::from)?;
        let total_losses = total_matches - total_wins;

        Ok(HistoryPayload {
            player_id,
            pagination: Pagination {
                limit,
                offset,
                count: history.len(),
            },
            summary: HistorySummary {
                total_matches,
                total_wins,
                total_losses,
                win_rate: round_percentage(total_wins, total_matches),
            },
            matches: history,
        })
    }

    pub async fn leaderboard(&self, limit: i64, offset: i64) -> GameResult<LeaderboardPayload> {
        let limit = limit.clamp(1, LEADERBOARD_LIMIT_CAP);
        let offset = offset.max(0);

        let rows = self
            .store
            .leaderboard(limit, offset)
            .await
            .map_err(anyhow::Error::from)?;

        let leaderboard: Vec<LeaderboardEntry> = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| LeaderboardEntry {
                rank: offset + i as i64 + 1,
                player_id: row.player_id,
                wins: row.wins,
                losses: row.total_matches - row.wins,
                total_matches: row.total_matches,
                win_rate: round_percentage(row.wins, row.total_matches),
            })
            .collect();

        Ok(LeaderboardPayload {
            count: leaderboard.len(),
            leaderboard,
            limit,
            offset,
        })
    }
}

fn normalize_ids(raw: &[serde_json::Value]) -> GameResult<Vec<i64>> {
    raw.iter()
        .map(|v| {
            normalize_card_id(v).ok_or_else(|| {
                GameError::validation(
                    ValidationCode::InvalidTypes,
                    "Deck entries must be non-negative integer card ids",
                )
            })
        })
        .collect()
}
