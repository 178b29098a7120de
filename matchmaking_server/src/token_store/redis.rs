//! Redis-backed token store. Every mutating protocol is one server-side Lua
//! script, so the queue set, the active pointers and the token payloads can
//! never be observed mid-mutation. Transient transport errors retry with the
//! shared exponential backoff.

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use redis::{aio::ConnectionManager, AsyncCommands, RedisResult, Script};
use tokio::time::sleep;
use tracing::warn;
use uuid::Uuid;

use crate::token_store::{
    parse_member, scripts, DequeueOutcome, EnqueueOutcome, PoppedEntry, StoreError, StoreResult,
    TokenStatus, TokenStore, UserId, MATCHED_TTL_SECONDS, WAITING_TTL_SECONDS,
};

pub const QUEUE_KEY: &str = "matchmaking:queue";
pub const ACTIVE_POINTERS_KEY: &str = "matchmaking:active_pointers";
pub const TOKEN_KEY_PREFIX: &str = "matchmaking:token:";

#[derive(Clone)]
pub struct RedisTokenStore {
    redis: ConnectionManager,
    /// Template cloned into fresh per-operation retry state.
    retry: ExponentialBackoff,
}

impl RedisTokenStore {
    pub fn new(redis: ConnectionManager, retry: ExponentialBackoff) -> Self {
        Self { redis, retry }
    }

    fn fresh_token() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

async fn invoke_enqueue_script(
    redis: &mut ConnectionManager,
    user_id: UserId,
    token: &str,
    now: i64,
    max_queue_size: u64,
    payload: &str,
) -> RedisResult<Vec<String>> {
    Script::new(scripts::enqueue_user_script())
        .key(QUEUE_KEY)
        .key(ACTIVE_POINTERS_KEY)
        .arg(user_id)
        .arg(token)
        .arg(now)
        .arg(WAITING_TTL_SECONDS)
        .arg(max_queue_size)
        .arg(TOKEN_KEY_PREFIX)
        .arg(payload)
        .invoke_async(redis)
        .await
}

async fn invoke_dequeue_script(
    redis: &mut ConnectionManager,
    user_id: UserId,
    token: &str,
) -> RedisResult<Vec<String>> {
    Script::new(scripts::dequeue_user_script())
        .key(QUEUE_KEY)
        .key(ACTIVE_POINTERS_KEY)
        .arg(user_id)
        .arg(token)
        .arg(TOKEN_KEY_PREFIX)
        .invoke_async(redis)
        .await
}

async fn invoke_safe_requeue_script(
    redis: &mut ConnectionManager,
    entry: &PoppedEntry,
    payload: &str,
) -> RedisResult<i64> {
    Script::new(scripts::safe_requeue_script())
        .key(QUEUE_KEY)
        .key(ACTIVE_POINTERS_KEY)
        .arg(entry.user_id)
        .arg(&entry.token)
        .arg(entry.score)
        .arg(WAITING_TTL_SECONDS)
        .arg(TOKEN_KEY_PREFIX)
        .arg(payload)
        .invoke_async(redis)
        .await
}

async fn invoke_publish_matched_script(
    redis: &mut ConnectionManager,
    user_id: UserId,
    token: &str,
    payload: &str,
) -> RedisResult<i64> {
    Script::new(scripts::publish_matched_script())
        .key(ACTIVE_POINTERS_KEY)
        .arg(user_id)
        .arg(token)
        .arg(MATCHED_TTL_SECONDS)
        .arg(TOKEN_KEY_PREFIX)
        .arg(payload)
        .invoke_async(redis)
        .await
}

fn parse_score(raw: &str) -> StoreResult<i64> {
    raw.parse::<f64>()
        .map(|score| score as i64)
        .map_err(|_| StoreError::Corrupt(format!("unparseable queue score {:?}", raw)))
}

fn parse_popped(raw: &[String]) -> StoreResult<Vec<PoppedEntry>> {
    if raw.len() % 2 != 0 {
        return Err(StoreError::Corrupt(
            "expected member/score pairs from pair pop".to_string(),
        ));
    }
    raw.chunks_exact(2)
        .map(|chunk| {
            let (user_id, token) = parse_member(&chunk[0])?;
            Ok(PoppedEntry {
                user_id,
                token,
                score: parse_score(&chunk[1])?,
            })
        })
        .collect()
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn enqueue(&self, user_id: UserId, max_queue_size: u64) -> StoreResult<EnqueueOutcome> {
        let token = Self::fresh_token();
        let now = Utc::now().timestamp();
        let payload = serde_json::to_string(&TokenStatus::Waiting {
            queue_token: token.clone(),
            queued_at: now,
        })?;

        let mut backoff_state = self.retry.clone();
        let result = loop {
            let mut redis = self.redis.clone();
            match invoke_enqueue_script(&mut redis, user_id, &token, now, max_queue_size, &payload)
                .await
            {
                Ok(res) => break res,
                Err(err) => {
                    if let Some(delay) = backoff_state.next_backoff() {
                        warn!(
                            "Temporary enqueue failure for user {}: {} (retrying in {:?})",
                            user_id, err, delay
                        );
                        sleep(delay).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        };

        match result.first().map(String::as_str) {
            Some("waiting") if result.len() >= 3 => Ok(EnqueueOutcome::AlreadyWaiting {
                token: result[1].clone(),
                queued_at: parse_score(&result[2])?,
            }),
            Some("full") => Ok(EnqueueOutcome::Full),
            Some("queued") if result.len() >= 2 => Ok(EnqueueOutcome::Queued {
                token: result[1].clone(),
                queued_at: now,
                popped: Vec::new(),
            }),
            Some("popped") if result.len() >= 2 => Ok(EnqueueOutcome::Queued {
                token: result[1].clone(),
                queued_at: now,
                popped: parse_popped(&result[2..])?,
            }),
            _ => Err(StoreError::Corrupt(format!(
                "unexpected enqueue script reply {:?}",
                result
            ))),
        }
    }

    async fn status(&self, token: &str) -> StoreResult<Option<TokenStatus>> {
        let mut redis = self.redis.clone();
        let raw: Option<String> = redis.get(format!("{}{}", TOKEN_KEY_PREFIX, token)).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    async fn dequeue(&self, user_id: UserId, token: &str) -> StoreResult<DequeueOutcome> {
        let mut backoff_state = self.retry.clone();
        let result = loop {
            let mut redis = self.redis.clone();
            match invoke_dequeue_script(&mut redis, user_id, token).await {
                Ok(res) => break res,
                Err(err) => {
                    if let Some(delay) = backoff_state.next_backoff() {
                        warn!(
                            "Temporary dequeue failure for user {}: {} (retrying in {:?})",
                            user_id, err, delay
                        );
                        sleep(delay).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        };

        match result.first().map(String::as_str) {
            Some("invalid") => Ok(DequeueOutcome::InvalidToken),
            Some("too_late") if result.len() >= 2 => {
                let status: TokenStatus = serde_json::from_str(&result[1])?;
                Ok(DequeueOutcome::TooLate(status))
            }
            Some("removed") => Ok(DequeueOutcome::Removed),
            _ => Err(StoreError::Corrupt(format!(
                "unexpected dequeue script reply {:?}",
                result
            ))),
        }
    }

    async fn safely_requeue(&self, entry: &PoppedEntry) -> StoreResult<bool> {
        let payload = serde_json::to_string(&TokenStatus::Waiting {
            queue_token: entry.token.clone(),
            queued_at: entry.score,
        })?;

        let mut redis = self.redis.clone();
        let restored = invoke_safe_requeue_script(&mut redis, entry, &payload).await?;
        Ok(restored == 1)
    }

    async fn publish_matched(
        &self,
        user_id: UserId,
        token: &str,
        match_id: i64,
        opponent_id: UserId,
    ) -> StoreResult<()> {
        let payload = serde_json::to_string(&TokenStatus::Matched {
            queue_token: token.to_string(),
            match_id,
            opponent_id,
        })?;

        let mut redis = self.redis.clone();
        invoke_publish_matched_script(&mut redis, user_id, token, &payload).await?;
        Ok(())
    }
}
