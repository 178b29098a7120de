//! HTTP surface of the game engine. Handlers parse and authenticate, call
//! the service, and let `GameError` do the status-code translation.

use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthenticatedPlayer;
use crate::errors::{GameError, GameResult};
use crate::models::{MatchStatus, PlayerId};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateMatchRequest {
    pub player1_id: i64,
    pub player2_id: i64,
}

#[derive(Deserialize)]
pub struct DeckRequest {
    pub data: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
pub struct MoveRequest {
    pub card_id: serde_json::Value,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Internal endpoint for the matchmaking coordinator; not client-facing.
#[post("/internal/matches/create")]
pub async fn create_match(
    state: web::Data<AppState>,
    body: web::Json<CreateMatchRequest>,
) -> GameResult<HttpResponse> {
    let snapshot = state
        .service
        .create_match(body.player1_id, body.player2_id)
        .await?;
    Ok(HttpResponse::Created().json(snapshot))
}

#[post("/matches/{match_id}/deck")]
pub async fn submit_deck(
    state: web::Data<AppState>,
    caller: AuthenticatedPlayer,
    path: web::Path<i64>,
    body: web::Json<DeckRequest>,
) -> GameResult<HttpResponse> {
    let match_id = path.into_inner();
    let snapshot = state
        .service
        .submit_deck(match_id, caller.0, &body.data)
        .await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[post("/matches/{match_id}/moves/{round_number}")]
pub async fn submit_move(
    state: web::Data<AppState>,
    caller: AuthenticatedPlayer,
    path: web::Path<(i64, i32)>,
    body: web::Json<MoveRequest>,
) -> GameResult<HttpResponse> {
    let (match_id, round_number) = path.into_inner();
    let outcome = state
        .service
        .submit_move(match_id, caller.0, &body.card_id, round_number)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Registered before the `{match_id}` routes so `history` never parses as a
/// match id.
#[get("/matches/history/{player_id}")]
pub async fn player_history(
    state: web::Data<AppState>,
    caller: AuthenticatedPlayer,
    path: web::Path<PlayerId>,
    query: web::Query<HistoryQuery>,
) -> GameResult<HttpResponse> {
    let player_id = path.into_inner();
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<MatchStatus>().map_err(|_| {
            GameError::validation_msg(format!("Unknown match status {:?}", raw))
        })?),
    };

    let payload = state
        .service
        .player_history(
            player_id,
            caller.0,
            status,
            query.limit.unwrap_or(20),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(HttpResponse::Ok().json(payload))
}

#[get("/matches/{match_id}")]
pub async fn get_match(
    state: web::Data<AppState>,
    caller: AuthenticatedPlayer,
    path: web::Path<i64>,
) -> GameResult<HttpResponse> {
    let snapshot = state
        .service
        .get_match(path.into_inner(), caller.0, false)
        .await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[get("/matches/{match_id}/round")]
pub async fn current_round(
    state: web::Data<AppState>,
    caller: AuthenticatedPlayer,
    path: web::Path<i64>,
) -> GameResult<HttpResponse> {
    let payload = state
        .service
        .current_round_status(path.into_inner(), caller.0)
        .await?;
    Ok(HttpResponse::Ok().json(payload))
}

#[get("/matches/{match_id}/history")]
pub async fn match_history(
    state: web::Data<AppState>,
    caller: AuthenticatedPlayer,
    path: web::Path<i64>,
) -> GameResult<HttpResponse> {
    let snapshot = state
        .service
        .get_match(path.into_inner(), caller.0, true)
        .await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

#[get("/leaderboard")]
pub async fn leaderboard(
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> GameResult<HttpResponse> {
    let payload = state
        .service
        .leaderboard(query.limit.unwrap_or(100), query.offset.unwrap_or(0))
        .await?;
    Ok(HttpResponse::Ok().json(payload))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(create_match)
        .service(player_history)
        .service(submit_deck)
        .service(submit_move)
        .service(current_round)
        .service(match_history)
        .service(get_match)
        .service(leaderboard);
}
