//! HTTP contract of the matchmaking endpoints: status codes, JSON bodies,
//! bearer-token authentication.

use std::sync::Arc;

use actix_web::{test, web, App};
use async_trait::async_trait;
use jsonwebtoken::{encode, EncodingKey, Header};
use matchmaking_server::auth::AuthConfig;
use matchmaking_server::clients::{EngineClient, EngineRpcError, PlayersClient};
use matchmaking_server::coordinator::Coordinator;
use matchmaking_server::env::{
    LoggingSettings, MatchmakingSettings, RedisSettings, RetrySettings, RpcSettings,
    ServerSettings, Settings,
};
use matchmaking_server::routes;
use matchmaking_server::token_store::{MemoryTokenStore, UserId};
use matchmaking_server::AppState;
use serde_json::{json, Value};

const SECRET: &str = "test-secret";

struct OkEngine;

#[async_trait]
impl EngineClient for OkEngine {
    async fn create_match(&self, _p1: UserId, _p2: UserId) -> Result<i64, EngineRpcError> {
        Ok(99)
    }
}

struct OkPlayers {
    valid: bool,
}

#[async_trait]
impl PlayersClient for OkPlayers {
    async fn validate_profile(&self, _user_id: UserId) -> bool {
        self.valid
    }
}

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
        matchmaking: MatchmakingSettings { max_queue_size: 0 },
        redis: RedisSettings {
            url: "redis://127.0.0.1:6379".into(),
        },
        game_engine: RpcSettings {
            url: "http://localhost:5002".into(),
            request_timeout_seconds: 3,
        },
        players: RpcSettings {
            url: "http://localhost:5004".into(),
            request_timeout_seconds: 3,
        },
        retry: RetrySettings {
            message_max_elapsed_time_ms: 100,
            message_initial_interval_ms: 10,
            message_max_interval_ms: 50,
        },
    }
}

fn state_with(valid_profiles: bool, max_queue_size: u64) -> AppState {
    let mut settings = test_settings();
    settings.matchmaking.max_queue_size = max_queue_size;
    AppState {
        settings,
        coordinator: Arc::new(Coordinator::new(
            Arc::new(MemoryTokenStore::new()),
            Arc::new(OkEngine),
            Arc::new(OkPlayers {
                valid: valid_profiles,
            }),
            max_queue_size,
        )),
        auth: AuthConfig::new(SECRET),
    }
}

fn bearer(user_id: i64) -> String {
    let claims = json!({ "sub": user_id.to_string(), "exp": 4_102_444_800usize });
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
    let app = app!(state_with(true, 0));
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn enqueue_requires_authentication() {
    let app = app!(state_with(true, 0));
    let resp =
        test::call_service(&app, test::TestRequest::post().uri("/enqueue").to_request()).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
async fn enqueue_pair_and_poll() {
    let app = app!(state_with(true, 0));

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/enqueue")
            .insert_header(("Authorization", bearer(1)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 202);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "Waiting");
    let t1 = body["queue_token"].as_str().unwrap().to_string();
    assert!(body["queued_at"].is_i64());

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/enqueue")
            .insert_header(("Authorization", bearer(2)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "Matched");
    assert_eq!(body["match_id"], 99);
    assert_eq!(body["opponent_id"], 1);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/status?token={}", t1))
            .insert_header(("Authorization", bearer(1)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "Matched");
    assert_eq!(body["opponent_id"], 2);
}

#[actix_web::test]
async fn status_errors() {
    let app = app!(state_with(true, 0));

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/status")
            .insert_header(("Authorization", bearer(1)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/status?token=deadbeef")
            .insert_header(("Authorization", bearer(1)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 404);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "Error");
    assert_eq!(body["msg"], "Invalid token");
}

#[actix_web::test]
async fn dequeue_paths() {
    let app = app!(state_with(true, 0));

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/enqueue")
            .insert_header(("Authorization", bearer(50)))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let t50 = body["queue_token"].as_str().unwrap().to_string();

    // Token is required.
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/dequeue")
            .insert_header(("Authorization", bearer(50)))
            .set_json(json!({ "token": null }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);

    // Second user matches; user 50's dequeue is then too late.
    test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/enqueue")
            .insert_header(("Authorization", bearer(51)))
            .to_request(),
    )
    .await;

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/dequeue")
            .insert_header(("Authorization", bearer(50)))
            .set_json(json!({ "token": t50 }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 409);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "TooLate");
    assert_eq!(body["match_id"], 99);
    assert_eq!(body["opponent_id"], 51);
    assert_eq!(body["queue_token"], t50);
}

#[actix_web::test]
async fn waiting_dequeue_removes() {
    let app = app!(state_with(true, 0));

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/enqueue")
            .insert_header(("Authorization", bearer(5)))
            .to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let token = body["queue_token"].as_str().unwrap().to_string();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/dequeue")
            .insert_header(("Authorization", bearer(5)))
            .set_json(json!({ "token": token }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "Removed");
}

#[actix_web::test]
async fn queue_cap_and_profile_gate() {
    let app = app!(state_with(true, 1));
    test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/enqueue")
            .insert_header(("Authorization", bearer(1)))
            .to_request(),
    )
    .await;
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/enqueue")
            .insert_header(("Authorization", bearer(2)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 409);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["msg"], "Queue is full");

    let app = app!(state_with(false, 0));
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/enqueue")
            .insert_header(("Authorization", bearer(1)))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 403);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["msg"], "Profile required");
}
