//! Query surface: snapshots and permissions, friendship-gated history,
//! leaderboard aggregation.

mod support;

use game_engine::errors::GameError;
use game_engine::models::MatchStatus;
use game_engine::service::MatchService;
use serde_json::json;
use support::{default_harness, harness, ids, quick_rules, CatalogueMode};

/// Drive a one-card, one-round match to FINISHED under `quick_rules`.
/// Higher card id wins, so `card2 > card1` hands the win to player 2.
async fn play_quick_match(
    service: &MatchService,
    player1: i64,
    card1: i64,
    player2: i64,
    card2: i64,
) -> i64 {
    let m = service.create_match(player1, player2).await.unwrap();
    service
        .submit_deck(m.id, player1, &ids(&[card1]))
        .await
        .unwrap();
    service
        .submit_deck(m.id, player2, &ids(&[card2]))
        .await
        .unwrap();
    service
        .submit_move(m.id, player1, &json!(card1), 1)
        .await
        .unwrap();
    service
        .submit_move(m.id, player2, &json!(card2), 1)
        .await
        .unwrap();
    m.id
}

#[tokio::test]
async fn match_queries_are_participant_only() {
    let h = default_harness();
    let m = h.service.create_match(1, 2).await.unwrap();

    let err = h.service.get_match(m.id, 99, false).await.unwrap_err();
    assert!(matches!(err, GameError::Permission(_)));
    let err = h.service.current_round_status(m.id, 99).await.unwrap_err();
    assert!(matches!(err, GameError::Permission(_)));
    let err = h.service.get_match(424242, 1, false).await.unwrap_err();
    assert!(matches!(err, GameError::NotFound(_)));

    // Participants see the snapshot, rounds only when asked.
    let bare = h.service.get_match(m.id, 2, false).await.unwrap();
    assert!(bare.rounds.is_none());
    let with_rounds = h.service.get_match(m.id, 2, true).await.unwrap();
    assert_eq!(with_rounds.rounds.unwrap().len(), 0);
}

#[tokio::test]
async fn own_history_skips_the_friendship_check() {
    let h = harness(CatalogueMode::ScoreByCardId, false, quick_rules());
    play_quick_match(&h.service, 1, 10, 2, 20).await;

    let payload = h.service.player_history(1, 1, None, 20, 0).await.unwrap();
    assert!(!h.friendship.was_called());
    assert_eq!(payload.player_id, 1);
    assert_eq!(payload.matches.len(), 1);
}

#[tokio::test]
async fn non_friend_history_is_denied_fail_closed() {
    // The stub answers false, which also models an unreachable friendship
    // service: both deny.
    let h = harness(CatalogueMode::ScoreByCardId, false, quick_rules());
    play_quick_match(&h.service, 7, 10, 8, 20).await;

    let err = h.service.player_history(8, 7, None, 20, 0).await.unwrap_err();
    assert!(matches!(err, GameError::Permission(_)));
    assert!(h.friendship.was_called());

    // Nothing was mutated by the denied query.
    let snapshot = h.service.get_match(1, 7, false).await.unwrap();
    assert_eq!(snapshot.status, MatchStatus::Finished);
}

#[tokio::test]
async fn friend_history_carries_annotations_and_summary() {
    let h = harness(CatalogueMode::ScoreByCardId, true, quick_rules());
    // Player 1 loses to 2, then beats 3.
    play_quick_match(&h.service, 1, 10, 2, 20).await;
    play_quick_match(&h.service, 3, 10, 1, 20).await;

    let payload = h.service.player_history(1, 9, None, 20, 0).await.unwrap();
    assert!(h.friendship.was_called());
    assert_eq!(payload.matches.len(), 2);
    assert_eq!(payload.summary.total_matches, 2);
    assert_eq!(payload.summary.total_wins, 1);
    assert_eq!(payload.summary.total_losses, 1);
    assert_eq!(payload.summary.win_rate, 50.0);
    assert_eq!(payload.pagination.count, 2);

    // Newest first: the win against 3 comes first.
    let latest = &payload.matches[0];
    assert_eq!(latest.opponent_id, 3);
    assert_eq!(latest.player_won, Some(true));
    assert!(!latest.player_was_player1);
    assert_eq!(latest.player_score, 1);
    assert_eq!(latest.opponent_score, 0);
    assert!(latest.snapshot.rounds.is_some());

    let earlier = &payload.matches[1];
    assert_eq!(earlier.opponent_id, 2);
    assert_eq!(earlier.player_won, Some(false));
    assert!(earlier.player_was_player1);
}

#[tokio::test]
async fn history_filters_by_status_and_paginates() {
    let h = harness(CatalogueMode::ScoreByCardId, true, quick_rules());
    play_quick_match(&h.service, 1, 10, 2, 20).await;
    // A second match that never leaves SETUP.
    h.service.create_match(1, 4).await.unwrap();

    let finished = h
        .service
        .player_history(1, 1, Some(MatchStatus::Finished), 20, 0)
        .await
        .unwrap();
    assert_eq!(finished.matches.len(), 1);
    assert_eq!(finished.matches[0].snapshot.status, MatchStatus::Finished);

    let setup = h
        .service
        .player_history(1, 1, Some(MatchStatus::Setup), 20, 0)
        .await
        .unwrap();
    assert_eq!(setup.matches.len(), 1);
    assert_eq!(setup.matches[0].opponent_id, 4);

    let paged = h.service.player_history(1, 1, None, 1, 1).await.unwrap();
    assert_eq!(paged.matches.len(), 1);
    assert_eq!(paged.pagination.limit, 1);
    assert_eq!(paged.pagination.offset, 1);
}

#[tokio::test]
async fn leaderboard_ranks_all_finished_participants() {
    let h = harness(CatalogueMode::ScoreByCardId, true, quick_rules());
    // 3 beats 1 and 2; 2 beats 1; 1 never wins but still appears.
    play_quick_match(&h.service, 1, 10, 3, 30).await;
    play_quick_match(&h.service, 2, 10, 3, 30).await;
    play_quick_match(&h.service, 1, 10, 2, 20).await;

    let payload = h.service.leaderboard(100, 0).await.unwrap();
    assert_eq!(payload.count, 3);

    let top = &payload.leaderboard[0];
    assert_eq!((top.rank, top.player_id, top.wins), (1, 3, 2));
    assert_eq!(top.total_matches, 2);
    assert_eq!(top.win_rate, 100.0);

    let mid = &payload.leaderboard[1];
    assert_eq!((mid.rank, mid.player_id, mid.wins), (2, 2, 1));
    assert_eq!(mid.losses, 1);
    assert_eq!(mid.win_rate, 50.0);

    let last = &payload.leaderboard[2];
    assert_eq!((last.rank, last.player_id, last.wins), (3, 1, 0));
    assert_eq!(last.total_matches, 2);
    assert_eq!(last.win_rate, 0.0);
}

#[tokio::test]
async fn leaderboard_breaks_win_ties_by_player_id() {
    let h = harness(CatalogueMode::ScoreByCardId, true, quick_rules());
    // 5 and 4 take one win each.
    play_quick_match(&h.service, 1, 10, 5, 30).await;
    play_quick_match(&h.service, 2, 10, 4, 30).await;

    let payload = h.service.leaderboard(100, 0).await.unwrap();
    let order: Vec<(i64, i64)> = payload
        .leaderboard
        .iter()
        .map(|e| (e.player_id, e.wins))
        .collect();
    assert_eq!(order, vec![(4, 1), (5, 1), (1, 0), (2, 0)]);
}

#[tokio::test]
async fn leaderboard_paginates_with_stable_ranks() {
    let h = harness(CatalogueMode::ScoreByCardId, true, quick_rules());
    play_quick_match(&h.service, 1, 10, 3, 30).await;
    play_quick_match(&h.service, 2, 10, 3, 30).await;

    let page = h.service.leaderboard(2, 1).await.unwrap();
    assert_eq!(page.leaderboard.len(), 2);
    assert_eq!(page.leaderboard[0].rank, 2);
    assert_eq!(page.leaderboard[1].rank, 3);
}

#[tokio::test]
async fn unfinished_matches_stay_off_the_leaderboard() {
    let h = harness(CatalogueMode::ScoreByCardId, true, quick_rules());
    h.service.create_match(1, 2).await.unwrap();

    let payload = h.service.leaderboard(100, 0).await.unwrap();
    assert!(payload.leaderboard.is_empty());
}
