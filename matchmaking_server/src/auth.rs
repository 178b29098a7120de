//! Bearer-token authentication, shared shape with the game engine: HS256
//! JWTs from the external auth service, numeric `sub` claim as the user id.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::StatusCode, FromRequest, HttpRequest, HttpResponse,
                ResponseError};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::token_store::UserId;
use crate::AppState;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct Unauthorized(pub &'static str);

impl ResponseError for Unauthorized {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::Unauthorized().json(json!({ "status": "Error", "msg": self.0 }))
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthConfig {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn caller_id(&self, token: &str) -> Result<UserId, Unauthorized> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| Unauthorized("Invalid or expired token"))?;
        data.claims.user_id()
    }
}

#[derive(Deserialize)]
struct Claims {
    sub: serde_json::Value,
    #[allow(dead_code)]
    exp: usize,
}

impl Claims {
    fn user_id(&self) -> Result<UserId, Unauthorized> {
        let id = match &self.sub {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        };
        match id {
            Some(id) if id >= 0 => Ok(id),
            _ => Err(Unauthorized("Invalid subject claim")),
        }
    }
}

pub struct AuthenticatedUser(pub UserId);

impl FromRequest for AuthenticatedUser {
    type Error = Unauthorized;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_caller(req).map(AuthenticatedUser))
    }
}

fn extract_caller(req: &HttpRequest) -> Result<UserId, Unauthorized> {
    let state = req
        .app_data::<actix_web::web::Data<AppState>>()
        .ok_or(Unauthorized("Missing authentication context"))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(Unauthorized("Missing bearer token"))?;

    state.auth.caller_id(token)
}
