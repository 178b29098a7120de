//! Postgres-backed match store. The row-level lock demanded by the move
//! protocol is a plain `SELECT … FOR UPDATE` held for the lifetime of the
//! transaction object.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};

use crate::models::{Deck, Match, MatchStatus, PlayerId, Round};
use crate::store::{LeaderboardRow, MatchStore, MatchTxn, StoreError, StoreResult};

#[derive(Clone)]
pub struct PgMatchStore {
    pool: PgPool,
}

impl PgMatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_deck(value: Option<serde_json::Value>) -> StoreResult<Option<Deck>> {
    value
        .map(|v| serde_json::from_value(v).map_err(StoreError::from))
        .transpose()
}

fn encode_deck(deck: &Option<Deck>) -> StoreResult<Option<serde_json::Value>> {
    deck.as_ref()
        .map(|d| serde_json::to_value(d).map_err(StoreError::from))
        .transpose()
}

fn match_from_row(row: &PgRow) -> StoreResult<Match> {
    let status_raw: String = row.try_get("status")?;
    let status = MatchStatus::from_str(&status_raw)
        .map_err(|_| StoreError::Corrupt(format!("unknown match status {:?}", status_raw)))?;
    Ok(Match {
        id: row.try_get("id")?,
        player1_id: row.try_get("player1_id")?,
        player2_id: row.try_get("player2_id")?,
        status,
        player1_score: row.try_get("player1_score")?,
        player2_score: row.try_get("player2_score")?,
        winner_id: row.try_get("winner_id")?,
        player1_deck: decode_deck(row.try_get("player1_deck")?)?,
        player2_deck: decode_deck(row.try_get("player2_deck")?)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn round_from_row(row: &PgRow) -> StoreResult<Round> {
    let category_raw: String = row.try_get("category")?;
    let category = category_raw
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown round category {:?}", category_raw)))?;
    Ok(Round {
        id: Some(row.try_get("id")?),
        match_id: row.try_get("match_id")?,
        round_number: row.try_get("round_number")?,
        category,
        player1_card_id: row.try_get("player1_card_id")?,
        player2_card_id: row.try_get("player2_card_id")?,
        winner_id: row.try_get("winner_id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

struct PgTxn {
    tx: Transaction<'static, Postgres>,
    match_state: Match,
    rounds: Vec<Round>,
}

#[async_trait]
impl MatchTxn for PgTxn {
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
        let PgTxn {
            mut tx,
            match_state,
            mut rounds,
        } = *self;

        let m = &match_state;
        sqlx::query(
            "UPDATE matches
             SET status = $1, player1_score = $2, player2_score = $3, winner_id = $4,
                 player1_deck = $5, player2_deck = $6, updated_at = $7
             WHERE id = $8",
        )
        .bind(m.status.as_str())
        .bind(m.player1_score)
        .bind(m.player2_score)
        .bind(m.winner_id)
        .bind(encode_deck(&m.player1_deck)?)
        .bind(encode_deck(&m.player2_deck)?)
        .bind(m.updated_at)
        .bind(m.id)
        .execute(&mut *tx)
        .await?;

        for round in &mut rounds {
            match round.id {
                None => {
                    let row = sqlx::query(
                        "INSERT INTO rounds
                             (match_id, round_number, category, player1_card_id,
                              player2_card_id, winner_id, created_at, updated_at)
                         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                         RETURNING id",
                    )
                    .bind(round.match_id)
                    .bind(round.round_number)
                    .bind(round.category.as_str())
                    .bind(round.player1_card_id)
                    .bind(round.player2_card_id)
                    .bind(round.winner_id)
                    .bind(round.created_at)
                    .bind(round.updated_at)
                    .fetch_one(&mut *tx)
                    .await?;
                    round.id = Some(row.try_get("id")?);
                }
                Some(id) => {
                    sqlx::query(
                        "UPDATE rounds
                         SET player1_card_id = $1, player2_card_id = $2, winner_id = $3,
                             updated_at = $4
                         WHERE id = $5",
                    )
                    .bind(round.player1_card_id)
                    .bind(round.player2_card_id)
                    .bind(round.winner_id)
                    .bind(round.updated_at)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;
        Ok((match_state, rounds))
    }
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn insert_match(
        &self,
        player1_id: PlayerId,
        player2_id: PlayerId,
    ) -> StoreResult<Match> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO matches
                 (player1_id, player2_id, status, player1_score, player2_score,
                  created_at, updated_at)
             VALUES ($1, $2, $3, 0, 0, $4, $4)
             RETURNING *",
        )
        .bind(player1_id)
        .bind(player2_id)
        .bind(MatchStatus::Setup.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        match_from_row(&row)
    }

    async fn fetch_match(&self, match_id: i64) -> StoreResult<Option<Match>> {
        let row = sqlx::query("SELECT * FROM matches WHERE id = $1")
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(match_from_row).transpose()
    }

    async fn fetch_rounds(&self, match_id: i64) -> StoreResult<Vec<Round>> {
        let rows = sqlx::query("SELECT * FROM rounds WHERE match_id = $1 ORDER BY round_number")
            .bind(match_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(round_from_row).collect()
    }

    async fn lock_match(&self, match_id: i64) -> StoreResult<Option<Box<dyn MatchTxn>>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM matches WHERE id = $1 FOR UPDATE")
            .bind(match_id)
            .fetch_optional(&mut *tx)
            .await?;
        let match_state = match row.as_ref().map(match_from_row).transpose()? {
            Some(m) => m,
            None => return Ok(None),
        };

        let round_rows =
            sqlx::query("SELECT * FROM rounds WHERE match_id = $1 ORDER BY round_number")
                .bind(match_id)
                .fetch_all(&mut *tx)
                .await?;
        let rounds = round_rows
            .iter()
            .map(round_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Some(Box::new(PgTxn {
            tx,
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
        let rows = sqlx::query(
            "SELECT * FROM matches
             WHERE (player1_id = $1 OR player2_id = $1)
               AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC, id DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(player_id)
        .bind(status.map(|s| s.as_str().to_string()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let matches = rows
            .iter()
            .map(match_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        if matches.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = matches.iter().map(|m| m.id).collect();
        let round_rows =
            sqlx::query("SELECT * FROM rounds WHERE match_id = ANY($1) ORDER BY round_number")
                .bind(&ids)
                .fetch_all(&self.pool)
                .await?;

        let mut by_match: HashMap<i64, Vec<Round>> = HashMap::new();
        for row in &round_rows {
            let round = round_from_row(row)?;
            by_match.entry(round.match_id).or_default().push(round);
        }

        Ok(matches
            .into_iter()
            .map(|m| {
                let rounds = by_match.remove(&m.id).unwrap_or_default();
                (m, rounds)
            })
            .collect())
    }

    async fn count_for_player(
        &self,
        player_id: PlayerId,
        status: Option<MatchStatus>,
    ) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM matches
             WHERE (player1_id = $1 OR player2_id = $1)
               AND ($2::text IS NULL OR status = $2)",
        )
        .bind(player_id)
        .bind(status.map(|s| s.as_str().to_string()))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("n")?)
    }

    async fn count_wins_for_player(&self, player_id: PlayerId) -> StoreResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM matches
             WHERE winner_id = $1 AND status = $2",
        )
        .bind(player_id)
        .bind(MatchStatus::Finished.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("n")?)
    }

    async fn leaderboard(&self, limit: i64, offset: i64) -> StoreResult<Vec<LeaderboardRow>> {
        let rows = sqlx::query(
            "WITH participants AS (
                 SELECT player1_id AS player_id, winner_id FROM matches WHERE status = $1
                 UNION ALL
                 SELECT player2_id AS player_id, winner_id FROM matches WHERE status = $1
             )
             SELECT player_id,
                    COUNT(*) AS total_matches,
                    COUNT(*) FILTER (WHERE winner_id = player_id) AS wins
             FROM participants
             GROUP BY player_id
             ORDER BY wins DESC, player_id ASC
             LIMIT $2 OFFSET $3",
        )
        .bind(MatchStatus::Finished.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(LeaderboardRow {
                    player_id: row.try_get("player_id")?,
                    wins: row.try_get("wins")?,
                    total_matches: row.try_get("total_matches")?,
                })
            })
            .collect()
    }
}
