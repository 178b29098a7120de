//! In-memory token store with the same observable semantics as the Redis
//! scripts, including TTL expiry. One mutex around the whole state makes
//! every operation atomic, which is exactly what the Lua scripts guarantee.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::token_store::{
    DequeueOutcome, EnqueueOutcome, PoppedEntry, StoreResult, TokenStatus, TokenStore, UserId,
    MATCHED_TTL_SECONDS, WAITING_TTL_SECONDS,
};

struct TokenEntry {
    status: TokenStatus,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    /// Sorted-set stand-in: `(member, score)` kept ordered by (score, member).
    queue: Vec<(String, i64)>,
    active: HashMap<UserId, String>,
    tokens: HashMap<String, TokenEntry>,
}

impl Inner {
    fn live_status(&mut self, token: &str) -> Option<TokenStatus> {
        match self.tokens.get(token) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.status.clone()),
            Some(_) => {
                self.tokens.remove(token);
                None
            }
            None => None,
        }
    }

    fn zadd(&mut self, member: String, score: i64) {
        self.queue.retain(|(m, _)| *m != member);
        let pos = self
            .queue
            .partition_point(|(m, s)| (*s, m.as_str()) < (score, member.as_str()));
        self.queue.insert(pos, (member, score));
    }

    fn zrem(&mut self, member: &str) {
        self.queue.retain(|(m, _)| m != member);
    }

    fn set_token(&mut self, token: String, status: TokenStatus, ttl: Duration) {
        self.tokens.insert(
            token,
            TokenEntry {
                status,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: the queue as `(member, score)` pairs in pop order.
    pub fn queue_members(&self) -> Vec<(String, i64)> {
        self.inner.lock().queue.clone()
    }

    pub fn active_pointer(&self, user_id: UserId) -> Option<String> {
        self.inner.lock().active.get(&user_id).cloned()
    }

    /// Test hook: simulate a token reaching its TTL.
    pub fn force_expire(&self, token: &str) {
        self.inner.lock().tokens.remove(token);
    }

    fn member_of(user_id: UserId, token: &str) -> String {
        format!("{}:{}", user_id, token)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn enqueue(&self, user_id: UserId, max_queue_size: u64) -> StoreResult<EnqueueOutcome> {
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.active.get(&user_id).cloned() {
            match inner.live_status(&existing) {
                Some(TokenStatus::Waiting { queued_at, .. }) => {
                    return Ok(EnqueueOutcome::AlreadyWaiting {
                        token: existing,
                        queued_at,
                    });
                }
                Some(_) => {}
                None => {
                    // Pointer to an expired token; drop the stale member.
                    let member = Self::member_of(user_id, &existing);
                    inner.zrem(&member);
                }
            }
        }

        let size = inner.queue.len() as u64;
        if max_queue_size > 0 && size >= max_queue_size {
            return Ok(EnqueueOutcome::Full);
        }

        let token = Uuid::new_v4().simple().to_string();
        let now = Utc::now().timestamp();
        inner.active.insert(user_id, token.clone());
        inner.zadd(Self::member_of(user_id, &token), now);
        inner.set_token(
            token.clone(),
            TokenStatus::Waiting {
                queue_token: token.clone(),
                queued_at: now,
            },
            Duration::from_secs(WAITING_TTL_SECONDS),
        );

        let mut popped = Vec::new();
        if size + 1 >= 2 {
            for _ in 0..2 {
                if inner.queue.is_empty() {
                    break;
                }
                let (member, score) = inner.queue.remove(0);
                let (uid, tok) = super::parse_member(&member)?;
                popped.push(PoppedEntry {
                    user_id: uid,
                    token: tok,
                    score,
                });
            }
        }

        Ok(EnqueueOutcome::Queued {
            token,
            queued_at: now,
            popped,
        })
    }

    async fn status(&self, token: &str) -> StoreResult<Option<TokenStatus>> {
        Ok(self.inner.lock().live_status(token))
    }

    async fn dequeue(&self, user_id: UserId, token: &str) -> StoreResult<DequeueOutcome> {
        let mut inner = self.inner.lock();

        let status = match inner.live_status(token) {
            None => return Ok(DequeueOutcome::InvalidToken),
            Some(status) => status,
        };

        if let TokenStatus::Matched { .. } = status {
            return Ok(DequeueOutcome::TooLate(status));
        }

        let member = Self::member_of(user_id, token);
        inner.zrem(&member);
        inner.tokens.remove(token);
        if inner.active.get(&user_id).map(String::as_str) == Some(token) {
            inner.active.remove(&user_id);
        }
        Ok(DequeueOutcome::Removed)
    }

    async fn safely_requeue(&self, entry: &PoppedEntry) -> StoreResult<bool> {
        let mut inner = self.inner.lock();

        if inner.active.get(&entry.user_id).map(String::as_str) != Some(entry.token.as_str()) {
            return Ok(false);
        }

        inner.zadd(Self::member_of(entry.user_id, &entry.token), entry.score);
        inner.set_token(
            entry.token.clone(),
            TokenStatus::Waiting {
                queue_token: entry.token.clone(),
                queued_at: entry.score,
            },
            Duration::from_secs(WAITING_TTL_SECONDS),
        );
        Ok(true)
    }

    async fn publish_matched(
        &self,
        user_id: UserId,
        token: &str,
        match_id: i64,
        opponent_id: UserId,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();

        inner.set_token(
            token.to_string(),
            TokenStatus::Matched {
                queue_token: token.to_string(),
                match_id,
                opponent_id,
            },
            Duration::from_secs(MATCHED_TTL_SECONDS),
        );
        if inner.active.get(&user_id).map(String::as_str) == Some(token) {
            inner.active.remove(&user_id);
        }
        Ok(())
    }
}
