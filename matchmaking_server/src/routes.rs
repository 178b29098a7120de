//! HTTP surface of the matchmaking coordinator.

use actix_web::{get, post, web, HttpResponse};
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::errors::{MatchmakingError, MatchmakingResult};
use crate::protocol::{DequeueReply, DequeueRequest, EnqueueReply, StatusQuery};
use crate::AppState;

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

#[post("/enqueue")]
pub async fn enqueue(
    state: web::Data<AppState>,
    caller: AuthenticatedUser,
) -> MatchmakingResult<HttpResponse> {
    match state.coordinator.enqueue(caller.0).await? {
        EnqueueReply::Waiting(payload) => Ok(HttpResponse::Accepted().json(payload)),
        EnqueueReply::Matched(payload) => Ok(HttpResponse::Ok().json(payload)),
    }
}

#[get("/status")]
pub async fn status(
    state: web::Data<AppState>,
    _caller: AuthenticatedUser,
    query: web::Query<StatusQuery>,
) -> MatchmakingResult<HttpResponse> {
    let token = query
        .token
        .as_deref()
        .ok_or(MatchmakingError::TokenRequired)?;
    let payload = state.coordinator.status(token).await?;
    Ok(HttpResponse::Ok().json(payload))
}

#[post("/dequeue")]
pub async fn dequeue(
    state: web::Data<AppState>,
    caller: AuthenticatedUser,
    body: web::Json<DequeueRequest>,
) -> MatchmakingResult<HttpResponse> {
    let token = body
        .token
        .as_deref()
        .ok_or(MatchmakingError::TokenRequired)?;
    let reply = state.coordinator.dequeue(caller.0, token).await?;
    match &reply {
        DequeueReply::Removed => Ok(HttpResponse::Ok().json(&reply)),
        DequeueReply::TooLate { .. } => Ok(HttpResponse::Conflict().json(&reply)),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(enqueue)
        .service(status)
        .service(dequeue);
}
