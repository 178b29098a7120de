//! Pure game rules. Nothing in this module touches storage or the network;
//! the service layer feeds it locked match state and applies what it returns.

use serde::Serialize;

use crate::errors::{GameError, GameResult, ValidationCode};
use crate::models::{CardId, Match, MatchStatus, PlayerId, Round};

/// Progress of the round currently being played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    WaitingForBothPlayers,
    WaitingForOnePlayer,
    RoundComplete,
}

/// Outcome of a move submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoveStatus {
    WaitingForOpponent,
    RoundProcessed,
}

pub fn validate_match_creation(player1_id: PlayerId, player2_id: PlayerId) -> GameResult<()> {
    if player1_id < 0 || player2_id < 0 {
        return Err(GameError::validation(
            ValidationCode::InvalidTypes,
            "player1_id and player2_id must be non-negative integers",
        ));
    }
    if player1_id == player2_id {
        return Err(GameError::validation(
            ValidationCode::SamePlayer,
            "Player IDs must be different",
        ));
    }
    Ok(())
}

pub fn validate_deck_submission(
    deck_card_ids: &[CardId],
    player_id: PlayerId,
    mtch: &Match,
    deck_size: usize,
) -> GameResult<()> {
    if deck_card_ids.is_empty() {
        return Err(GameError::validation(
            ValidationCode::EmptyDeck,
            "Deck cannot be empty",
        ));
    }

    if mtch.status != MatchStatus::Setup {
        return Err(GameError::validation(
            ValidationCode::WrongStatus,
            "Decks can only be chosen during SETUP",
        ));
    }

    if !mtch.is_participant(player_id) {
        return Err(GameError::validation(
            ValidationCode::NotParticipant,
            "Player is not part of this match",
        ));
    }

    // Decks are immutable once stored.
    if mtch.deck_of(player_id).is_some() {
        return Err(GameError::validation_msg("Deck already submitted"));
    }

    if deck_card_ids.len() != deck_size {
        return Err(GameError::validation(
            ValidationCode::WrongDeckSize,
            format!("Deck must contain {} cards", deck_size),
        ));
    }

    let mut seen = deck_card_ids.to_vec();
    seen.sort_unstable();
    seen.dedup();
    if seen.len() != deck_card_ids.len() {
        return Err(GameError::validation(
            ValidationCode::DuplicateCards,
            "Deck cannot contain duplicate cards",
        ));
    }

    Ok(())
}

pub fn validate_move_submission(
    player_id: PlayerId,
    card_id: CardId,
    mtch: &Match,
    current_round: Option<&Round>,
    completed_rounds: &[Round],
) -> GameResult<()> {
    if player_id < 0 || card_id < 0 {
        return Err(GameError::validation(
            ValidationCode::InvalidTypes,
            "player_id (int) and card_id (int) are required",
        ));
    }

    if mtch.status != MatchStatus::InProgress {
        return Err(GameError::validation(
            ValidationCode::WrongStatus,
            "Match is not in progress",
        ));
    }

    let seat = mtch.seat_of(player_id).ok_or_else(|| {
        GameError::validation(
            ValidationCode::NotParticipant,
            "Player is not part of this match",
        )
    })?;

    let deck = mtch.deck_of(player_id).ok_or_else(|| {
        GameError::validation(ValidationCode::NoDeck, "Player deck not found or not set")
    })?;

    if !deck.contains_key(&card_id) {
        return Err(GameError::validation(
            ValidationCode::CardNotInDeck,
            format!("Card {} is not in the player's deck", card_id),
        ));
    }

    if let Some(round) = current_round {
        if round.card_of(seat).is_some() {
            return Err(GameError::validation(
                ValidationCode::AlreadyMovedThisRound,
                "Player has already submitted a move for this round",
            ));
        }
    }

    for round in completed_rounds {
        if round.player1_card_id == Some(card_id) || round.player2_card_id == Some(card_id) {
            return Err(GameError::validation(
                ValidationCode::CardAlreadyPlayed,
                format!("Card {} has already been played", card_id),
            ));
        }
    }

    Ok(())
}

pub fn round_status(current_round: Option<&Round>) -> RoundStatus {
    match current_round {
        None => RoundStatus::WaitingForBothPlayers,
        Some(round) => {
            if round.player1_card_id.is_none() && round.player2_card_id.is_none() {
                RoundStatus::WaitingForBothPlayers
            } else if !round.is_complete() {
                RoundStatus::WaitingForOnePlayer
            } else {
                RoundStatus::RoundComplete
            }
        }
    }
}

/// Look up both played cards in the snapshotted decks and score them against
/// the round's category. A missing entry means the stored state is corrupt.
pub fn round_scores(mtch: &Match, round: &Round) -> GameResult<(f64, f64)> {
    let p1_card = round.player1_card_id.ok_or_else(|| {
        GameError::Internal(anyhow::anyhow!("round scored before both moves present"))
    })?;
    let p2_card = round.player2_card_id.ok_or_else(|| {
        GameError::Internal(anyhow::anyhow!("round scored before both moves present"))
    })?;

    let p1_stats = mtch
        .deck_of(mtch.player1_id)
        .and_then(|deck| deck.get(&p1_card))
        .ok_or_else(|| {
            GameError::Internal(anyhow::anyhow!("missing card stats during round scoring"))
        })?;
    let p2_stats = mtch
        .deck_of(mtch.player2_id)
        .and_then(|deck| deck.get(&p2_card))
        .ok_or_else(|| {
            GameError::Internal(anyhow::anyhow!("missing card stats during round scoring"))
        })?;

    Ok((
        p1_stats.score(round.category),
        p2_stats.score(round.category),
    ))
}

/// Strict greater wins; equality is a draw.
pub fn round_winner(
    score_p1: f64,
    score_p2: f64,
    player1_id: PlayerId,
    player2_id: PlayerId,
) -> (Option<PlayerId>, bool) {
    if score_p1 > score_p2 {
        (Some(player1_id), false)
    } else if score_p2 > score_p1 {
        (Some(player2_id), false)
    } else {
        (None, true)
    }
}

/// +1 to the round winner's score; draws leave both untouched.
pub fn apply_round_winner(mtch: &mut Match, round_winner_id: Option<PlayerId>) {
    match round_winner_id {
        Some(id) if id == mtch.player1_id => mtch.player1_score += 1,
        Some(id) if id == mtch.player2_id => mtch.player2_score += 1,
        _ => {}
    }
}

pub fn completed_round_count(rounds: &[Round]) -> usize {
    rounds.iter().filter(|r| r.is_complete()).count()
}

pub fn should_end_match(rounds: &[Round], max_rounds: usize) -> bool {
    completed_round_count(rounds) >= max_rounds
}

pub fn next_round_number(rounds: &[Round]) -> i32 {
    completed_round_count(rounds) as i32 + 1
}

pub fn match_winner(mtch: &Match) -> Option<PlayerId> {
    if mtch.player1_score > mtch.player2_score {
        Some(mtch.player1_id)
    } else if mtch.player2_score > mtch.player1_score {
        Some(mtch.player2_id)
    } else {
        None
    }
}

pub fn finalize_match(mtch: &mut Match) {
    mtch.status = MatchStatus::Finished;
    mtch.winner_id = match_winner(mtch);
}
