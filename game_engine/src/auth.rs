//! Bearer-token authentication. Tokens are HS256 JWTs minted by the external
//! auth service; the numeric `sub` claim is the caller id.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::StatusCode, FromRequest, HttpRequest, HttpResponse,
                ResponseError};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::models::PlayerId;
use crate::AppState;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct Unauthorized(pub &'static str);

impl ResponseError for Unauthorized {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::Unauthorized().json(json!({ "msg": self.0 }))
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

    pub fn caller_id(&self, token: &str) -> Result<PlayerId, Unauthorized> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| Unauthorized("Invalid or expired token"))?;
        data.claims.player_id()
    }
}

/// `sub` arrives as a string from some token minters and as a number from
/// others; accept both.
#[derive(Deserialize)]
struct Claims {
    sub: serde_json::Value,
    #[allow(dead_code)]
    exp: usize,
}

impl Claims {
    fn player_id(&self) -> Result<PlayerId, Unauthorized> {
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

/// Extractor for handlers that require an authenticated caller.
pub struct AuthenticatedPlayer(pub PlayerId);

impl FromRequest for AuthenticatedPlayer {
    type Error = Unauthorized;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_caller(req).map(AuthenticatedPlayer))
    }
}

fn extract_caller(req: &HttpRequest) -> Result<PlayerId, Unauthorized> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn token_for(sub: serde_json::Value, secret: &str) -> String {
        let claims = json!({ "sub": sub, "exp": 4_102_444_800usize });
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_string_and_numeric_subjects() {
        let auth = AuthConfig::new("secret");
        let t = token_for(json!("42"), "secret");
        assert_eq!(auth.caller_id(&t).unwrap(), 42);
        let t = token_for(json!(7), "secret");
        assert_eq!(auth.caller_id(&t).unwrap(), 7);
    }

    #[test]
    fn rejects_bad_signature_and_bad_subject() {
        let auth = AuthConfig::new("secret");
        let t = token_for(json!("42"), "other-secret");
        assert!(auth.caller_id(&t).is_err());
        let t = token_for(json!(-3), "secret");
        assert!(auth.caller_id(&t).is_err());
        let t = token_for(json!("abc"), "secret");
        assert!(auth.caller_id(&t).is_err());
    }
}
