//! HTTP contract of the game-engine endpoints: status codes, error bodies
//! with validation codes, bearer-token authentication.

mod support;

use std::sync::Arc;

use actix_web::{test, web, App};
use game_engine::auth::AuthConfig;
use game_engine::env::{
    DatabaseSettings, GameSettings, LoggingSettings, RpcSettings, ServerSettings, Settings,
};
use game_engine::routes;
use game_engine::AppState;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use support::{harness, CatalogueMode};

const SECRET: &str = "test-secret";

fn test_settings() -> Settings {
    Settings {
        logging: LoggingSettings {
            directory: "logs".into(),
            filename: "test.log".into(),
        },
        server: ServerSettings {
            bind_address: "127.0.0.1".into(),
            port: 0,
            log_level: "info".into(),
        },
        game: GameSettings {
            deck_size: 5,
            max_rounds: 5,
            categories: vec!["economy".into(), "total".into()],
        },
        database: DatabaseSettings {
            url: "postgres://localhost/test".into(),
            max_connections: 1,
        },
        catalogue: RpcSettings {
            url: "http://localhost:5003".into(),
            request_timeout_seconds: 3,
        },
        players: RpcSettings {
            url: "http://localhost:5004".into(),
            request_timeout_seconds: 3,
        },
    }
}

fn state(mode: CatalogueMode, friends: bool) -> AppState {
    let h = harness(mode, friends, Default::default());
    AppState {
        settings: test_settings(),
        service: Arc::new(h.service),
        auth: AuthConfig::new(SECRET),
    }
}

fn bearer(player_id: i64) -> String {
    let claims = json!({ "sub": player_id, "exp": 4_102_444_800usize });
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(routes::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn health_answers_ok() {
    let app = app!(state(CatalogueMode::ScoreByCardId, true));
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
}

#[actix_web::test]
async fn internal_create_match() {
    let app = app!(state(CatalogueMode::ScoreByCardId, true));

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/internal/matches/create")
            .set_json(json!({ "player1_id": 1, "player2_id": 2 }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "SETUP");
    assert_eq!(body["player1_id"], 1);
    assert_eq!(body["player2_id"], 2);
    assert!(body["id"].is_i64());

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/internal/matches/create")
            .set_json(json!({ "player1_id": 3, "player2_id": 3 }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "SAME_PLAYER");
}

#[actix_web::test]
async fn deck_and_moves_over_http() {
    let app = app!(state(CatalogueMode::ScoreByCardId, true));

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/internal/matches/create")
            .set_json(json!({ "player1_id": 1, "player2_id": 2 }))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let match_id = body["id"].as_i64().unwrap();

    // Unauthenticated deck submission.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/matches/{}/deck", match_id))
            .set_json(json!({ "data": [1, 2, 3, 4, 5] }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 401);

    // Duplicates carry their code.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/matches/{}/deck", match_id))
            .insert_header(("Authorization", bearer(1)))
            .set_json(json!({ "data": [1, 1, 2, 3, 4] }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "DUPLICATE_CARDS");

    for (player, deck) in [(1, json!([1, 2, 3, 4, 5])), (2, json!([6, 7, 8, 9, 10]))] {
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri(&format!("/matches/{}/deck", match_id))
                .insert_header(("Authorization", bearer(player)))
                .set_json(json!({ "data": deck }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 200);
    }

    // First move waits for the opponent.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/matches/{}/moves/1", match_id))
            .insert_header(("Authorization", bearer(1)))
            .set_json(json!({ "card_id": 1 }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "WAITING_FOR_OPPONENT");
    assert_eq!(body["round"]["round_number"], 1);

    // Replay is rejected with its code.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/matches/{}/moves/1", match_id))
            .insert_header(("Authorization", bearer(1)))
            .set_json(json!({ "card_id": 1 }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "ALREADY_MOVED_THIS_ROUND");

    // The round-status endpoint sees the half-played round.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/matches/{}/round", match_id))
            .insert_header(("Authorization", bearer(2)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["round_status"], "WAITING_FOR_ONE_PLAYER");
    assert_eq!(body["current_round_number"], 1);

    // Second move resolves the round; the string card id is normalized.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri(&format!("/matches/{}/moves/1", match_id))
            .insert_header(("Authorization", bearer(2)))
            .set_json(json!({ "card_id": "6" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ROUND_PROCESSED");
    assert_eq!(body["round_winner_id"], 2);
    assert_eq!(body["is_draw"], false);
    assert_eq!(body["next_round"], 2);
    assert_eq!(body["game_status"], "IN_PROGRESS");
    assert_eq!(body["scores"]["1"], 0);
    assert_eq!(body["scores"]["2"], 1);
}

#[actix_web::test]
async fn match_queries_enforce_permissions() {
    let app = app!(state(CatalogueMode::ScoreByCardId, false));

    test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/internal/matches/create")
            .set_json(json!({ "player1_id": 7, "player2_id": 8 }))
            .to_request(),
    )
    .await;

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/matches/1")
            .insert_header(("Authorization", bearer(99)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 403);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/matches/1")
            .insert_header(("Authorization", bearer(7)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/matches/424242")
            .insert_header(("Authorization", bearer(7)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 404);

    // Non-friend history is denied fail-closed.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/matches/history/8")
            .insert_header(("Authorization", bearer(7)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 403);

    // Unknown status filter is a 400.
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/matches/history/7?status=BOGUS")
            .insert_header(("Authorization", bearer(7)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn leaderboard_is_public() {
    let app = app!(state(CatalogueMode::ScoreByCardId, true));
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/leaderboard").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["count"], 0);
    assert!(body["leaderboard"].as_array().unwrap().is_empty());
}
