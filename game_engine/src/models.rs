use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Card ids are canonically non-negative integers. Clients may send them as
/// JSON numbers or numeric strings; `normalize_card_id` is the single place
/// both spellings collapse.
pub type CardId = i64;

pub type PlayerId = i64;

/// Stats map for one card, snapshotted into the match at deck submission so
/// round resolution never needs a catalogue lookup.
pub type Deck = BTreeMap<CardId, CardStats>;

/// The categories cards are compared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Economy,
    Food,
    Environment,
    Special,
    Total,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Economy,
        Category::Food,
        Category::Environment,
        Category::Special,
        Category::Total,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Economy => "economy",
            Category::Food => "food",
            Category::Environment => "environment",
            Category::Special => "special",
            Category::Total => "total",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "economy" => Ok(Category::Economy),
            "food" => Ok(Category::Food),
            "environment" => Ok(Category::Environment),
            "special" => Ok(Category::Special),
            "total" => Ok(Category::Total),
            _ => Err(()),
        }
    }
}

/// Per-category numeric scores for a card, as returned by the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardStats {
    pub economy: f64,
    pub food: f64,
    pub environment: f64,
    pub special: f64,
    pub total: f64,
}

impl CardStats {
    pub fn score(&self, category: Category) -> f64 {
        match category {
            Category::Economy => self.economy,
            Category::Food => self.food,
            Category::Environment => self.environment,
            Category::Special => self.special,
            Category::Total => self.total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    #[serde(rename = "SETUP")]
    Setup,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "FINISHED")]
    Finished,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Setup => "SETUP",
            MatchStatus::InProgress => "IN_PROGRESS",
            MatchStatus::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SETUP" => Ok(MatchStatus::Setup),
            "IN_PROGRESS" => Ok(MatchStatus::InProgress),
            "FINISHED" => Ok(MatchStatus::Finished),
            _ => Err(()),
        }
    }
}

/// Which seat a player occupies in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    Player1,
    Player2,
}

/// The high-level state of one card duel: players, scores, decks and status.
#[derive(Debug, Clone)]
pub struct Match {
    pub id: i64,
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    pub status: MatchStatus,
    pub player1_score: i32,
    pub player2_score: i32,
    pub winner_id: Option<PlayerId>,
    pub player1_deck: Option<Deck>,
    pub player2_deck: Option<Deck>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn is_participant(&self, player_id: PlayerId) -> bool {
        player_id == self.player1_id || player_id == self.player2_id
    }

    pub fn seat_of(&self, player_id: PlayerId) -> Option<Seat> {
        if player_id == self.player1_id {
            Some(Seat::Player1)
        } else if player_id == self.player2_id {
            Some(Seat::Player2)
        } else {
            None
        }
    }

    pub fn opponent_of(&self, player_id: PlayerId) -> Option<PlayerId> {
        match self.seat_of(player_id)? {
            Seat::Player1 => Some(self.player2_id),
            Seat::Player2 => Some(self.player1_id),
        }
    }

    pub fn deck_of(&self, player_id: PlayerId) -> Option<&Deck> {
        match self.seat_of(player_id)? {
            Seat::Player1 => self.player1_deck.as_ref(),
            Seat::Player2 => self.player2_deck.as_ref(),
        }
    }

    pub fn both_decks_present(&self) -> bool {
        self.player1_deck.is_some() && self.player2_deck.is_some()
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            id: self.id,
            player1_id: self.player1_id,
            player2_id: self.player2_id,
            status: self.status,
            player1_score: self.player1_score,
            player2_score: self.player2_score,
            winner_id: self.winner_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            rounds: None,
        }
    }

    pub fn snapshot_with_rounds(&self, rounds: &[Round]) -> MatchSnapshot {
        let mut snapshot = self.snapshot();
        snapshot.rounds = Some(rounds.iter().map(Round::snapshot).collect());
        snapshot
    }
}

/// One turn of a match. `id` is `None` until the storage layer has assigned
/// one at commit time.
#[derive(Debug, Clone)]
pub struct Round {
    pub id: Option<i64>,
    pub match_id: i64,
    pub round_number: i32,
    pub category: Category,
    pub player1_card_id: Option<CardId>,
    pub player2_card_id: Option<CardId>,
    pub winner_id: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Round {
    pub fn new(match_id: i64, round_number: i32, category: Category, now: DateTime<Utc>) -> Self {
        Round {
            id: None,
            match_id,
            round_number,
            category,
            player1_card_id: None,
            player2_card_id: None,
            winner_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.player1_card_id.is_some() && self.player2_card_id.is_some()
    }

    pub fn card_of(&self, seat: Seat) -> Option<CardId> {
        match seat {
            Seat::Player1 => self.player1_card_id,
            Seat::Player2 => self.player2_card_id,
        }
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            id: self.id,
            match_id: self.match_id,
            round_number: self.round_number,
            category: self.category,
            player1_card_id: self.player1_card_id,
            player2_card_id: self.player2_card_id,
            winner_id: self.winner_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Wire form of a match. Deck stats are never exposed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub id: i64,
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    pub status: MatchStatus,
    pub player1_score: i32,
    pub player2_score: i32,
    pub winner_id: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rounds: Option<Vec<RoundSnapshot>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub id: Option<i64>,
    pub match_id: i64,
    pub round_number: i32,
    pub category: Category,
    pub player1_card_id: Option<CardId>,
    pub player2_card_id: Option<CardId>,
    pub winner_id: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Collapse a JSON card id (number or numeric string) into the canonical
/// integer form. Returns `None` for anything else, including negatives.
pub fn normalize_card_id(value: &serde_json::Value) -> Option<CardId> {
    let id = match value {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (id >= 0).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn card_id_normalization_accepts_both_spellings() {
        assert_eq!(normalize_card_id(&json!(101)), Some(101));
        assert_eq!(normalize_card_id(&json!("101")), Some(101));
        assert_eq!(normalize_card_id(&json!(" 7 ")), Some(7));
    }

    #[test]
    fn card_id_normalization_rejects_garbage() {
        assert_eq!(normalize_card_id(&json!(-1)), None);
        assert_eq!(normalize_card_id(&json!("-3")), None);
        assert_eq!(normalize_card_id(&json!(1.5)), None);
        assert_eq!(normalize_card_id(&json!("abc")), None);
        assert_eq!(normalize_card_id(&json!(null)), None);
    }

    #[test]
    fn deck_round_trips_through_json_with_integer_keys() {
        let mut deck = Deck::new();
        deck.insert(
            3,
            CardStats {
                economy: 1.0,
                food: 2.0,
                environment: 3.0,
                special: 4.0,
                total: 10.0,
            },
        );
        let value = serde_json::to_value(&deck).unwrap();
        let back: Deck = serde_json::from_value(value).unwrap();
        assert_eq!(back, deck);
    }

    #[test]
    fn category_lookup_matches_stats_fields() {
        let stats = CardStats {
            economy: 1.0,
            food: 2.0,
            environment: 3.0,
            special: 4.0,
            total: 10.0,
        };
        assert_eq!(stats.score(Category::Economy), 1.0);
        assert_eq!(stats.score(Category::Total), 10.0);
    }
}
