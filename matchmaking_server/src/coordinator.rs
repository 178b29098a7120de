//! Matchmaking orchestration: the enqueue / pair-match / safely-requeue /
//! dequeue protocols on top of the token store and the engine RPC.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::clients::{EngineClient, PlayersClient};
use crate::errors::{MatchmakingError, MatchmakingResult};
use crate::protocol::{DequeueReply, EnqueueReply};
use crate::token_store::{
    DequeueOutcome, EnqueueOutcome, PoppedEntry, StoreError, TokenStatus, TokenStore, UserId,
};

pub struct Coordinator {
    store: Arc<dyn TokenStore>,
    engine: Arc<dyn EngineClient>,
    players: Arc<dyn PlayersClient>,
    /// 0 disables the cap.
    max_queue_size: u64,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn TokenStore>,
        engine: Arc<dyn EngineClient>,
        players: Arc<dyn PlayersClient>,
        max_queue_size: u64,
    ) -> Self {
        Self {
            store,
            engine,
            players,
            max_queue_size,
        }
    }

    pub async fn enqueue(&self, user_id: UserId) -> MatchmakingResult<EnqueueReply> {
        if !self.players.validate_profile(user_id).await {
            return Err(MatchmakingError::ProfileRequired);
        }

        match self.store.enqueue(user_id, self.max_queue_size).await? {
            EnqueueOutcome::Full => {
                warn!("User {} rejected: queue is full", user_id);
                Err(MatchmakingError::QueueFull)
            }
            EnqueueOutcome::AlreadyWaiting { token, queued_at } => {
                info!("User {} re-enqueued idempotently", user_id);
                Ok(EnqueueReply::Waiting(TokenStatus::Waiting {
                    queue_token: token,
                    queued_at,
                }))
            }
            EnqueueOutcome::Queued {
                token,
                queued_at,
                popped,
            } => {
                if popped.len() == 2 {
                    return self.pair_match(user_id, &token, queued_at, popped).await;
                }

                // A partial pop means another actor drained the queue under
                // us; put the leftovers back where they were.
                for entry in &popped {
                    self.requeue_best_effort(entry).await;
                }

                info!("User {} enqueued and waiting", user_id);
                Ok(EnqueueReply::Waiting(TokenStatus::Waiting {
                    queue_token: token,
                    queued_at,
                }))
            }
        }
    }

    /// Two users came off the queue in the caller's enqueue step. Create the
    /// match; on failure both go back at their original scores.
    async fn pair_match(
        &self,
        caller_id: UserId,
        caller_token: &str,
        caller_queued_at: i64,
        popped: Vec<PoppedEntry>,
    ) -> MatchmakingResult<EnqueueReply> {
        let first = &popped[0];
        let second = &popped[1];

        match self.engine.create_match(first.user_id, second.user_id).await {
            Ok(match_id) => {
                info!(
                    "Match {} created for users {} and {}",
                    match_id, first.user_id, second.user_id
                );
                for (entry, opponent_id) in
                    [(first, second.user_id), (second, first.user_id)]
                {
                    self.store
                        .publish_matched(entry.user_id, &entry.token, match_id, opponent_id)
                        .await?;
                }

                // The popped pair is usually the caller plus the earliest
                // waiter, but the caller may not be in it; then the pair
                // learn of the match on their next poll.
                let caller_entry = popped
                    .iter()
                    .find(|e| e.user_id == caller_id && e.token == caller_token);
                match caller_entry {
                    Some(entry) => {
                        let opponent_id = if entry.user_id == first.user_id {
                            second.user_id
                        } else {
                            first.user_id
                        };
                        Ok(EnqueueReply::Matched(TokenStatus::Matched {
                            queue_token: entry.token.clone(),
                            match_id,
                            opponent_id,
                        }))
                    }
                    None => Ok(EnqueueReply::Waiting(TokenStatus::Waiting {
                        queue_token: caller_token.to_string(),
                        queued_at: caller_queued_at,
                    })),
                }
            }
            Err(err) => {
                error!(
                    "Create-match failed for users {} and {}: {}",
                    first.user_id, second.user_id, err
                );
                for entry in &popped {
                    self.requeue_best_effort(entry).await;
                }
                Ok(EnqueueReply::Waiting(TokenStatus::Waiting {
                    queue_token: caller_token.to_string(),
                    queued_at: caller_queued_at,
                }))
            }
        }
    }

    /// Safely-Requeue. A `false` outcome is normal (the user dequeued or
    /// re-enqueued while popped); a store failure only costs this entry its
    /// queue position, so it is logged rather than propagated.
    async fn requeue_best_effort(&self, entry: &PoppedEntry) {
        match self.store.safely_requeue(entry).await {
            Ok(true) => info!(
                "User {} requeued at original position {}",
                entry.user_id, entry.score
            ),
            Ok(false) => info!(
                "User {} not requeued: token {} no longer active",
                entry.user_id, entry.token
            ),
            Err(e) => error!("Failed to requeue user {}: {}", entry.user_id, e),
        }
    }

    pub async fn status(&self, token: &str) -> MatchmakingResult<TokenStatus> {
        self.store
            .status(token)
            .await?
            .ok_or(MatchmakingError::InvalidToken)
    }

    pub async fn dequeue(&self, user_id: UserId, token: &str) -> MatchmakingResult<DequeueReply> {
        match self.store.dequeue(user_id, token).await? {
            DequeueOutcome::Removed => {
                info!("User {} left the queue", user_id);
                Ok(DequeueReply::Removed)
            }
            DequeueOutcome::TooLate(TokenStatus::Matched {
                queue_token,
                match_id,
                opponent_id,
            }) => Ok(DequeueReply::TooLate {
                msg: "Match already found".to_string(),
                match_id,
                opponent_id,
                queue_token,
            }),
            DequeueOutcome::TooLate(other) => Err(MatchmakingError::Store(StoreError::Corrupt(
                format!("too-late dequeue carried non-matched status {:?}", other),
            ))),
            DequeueOutcome::InvalidToken => Err(MatchmakingError::InvalidToken),
        }
    }
}
