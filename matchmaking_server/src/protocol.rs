//! Client-facing payloads. Enqueue and status answers reuse the stored
//! `TokenStatus` verbatim, so what a client polls is exactly what was
//! written in the same atomic step that changed the queue.

use serde::{Deserialize, Serialize};

use crate::token_store::TokenStatus;

#[derive(Debug, Deserialize)]
pub struct DequeueRequest {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub token: Option<String>,
}

/// Answer to an enqueue call. `Waiting` maps to 202, `Matched` to 200.
#[derive(Debug)]
pub enum EnqueueReply {
    Waiting(TokenStatus),
    Matched(TokenStatus),
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
pub enum DequeueReply {
    Removed,
    TooLate {
        msg: String,
        match_id: i64,
        opponent_id: i64,
        queue_token: String,
    },
}
