#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::configuration::Config;
use crate::configuration::ConfigKey;

/// Exponential backoff: `base * 2^attempt`, capped at `max_delay`, for at most
/// `max_attempts` retries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Backoff {
        return Backoff {
            base_delay: Duration::from_millis(600),
            max_delay: Duration::from_millis(5000),
            max_attempts: 3,
        };
    }
}

impl Backoff {
    pub fn from_config() -> Result<Backoff> {
        return Ok(Backoff {
            base_delay: Duration::from_millis(Config::get_u64(ConfigKey::RetryBaseDelay)?),
            max_delay: Duration::from_millis(Config::get_u64(ConfigKey::RetryMaxDelay)?),
            max_attempts: u32::try_from(Config::get_u64(ConfigKey::RetryMaxAttempts)?)?,
        });
    }

    /// Delay before retrying after failed `attempt`, or `None` once the
    /// attempts are used up.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);

        return Some(delay.min(self.max_delay));
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum RetryTarget {
    ConversationList,
    Conversation,
}

#[derive(Clone)]
struct PendingRetry {
    id: u64,
    attempt: u32,
    cancel: CancellationToken,
}

/// Holds at most one armed retry timer per target.
pub struct RetryScheduler {
    backoff: Backoff,
    next_id: AtomicU64,
    pending: Arc<DashMap<RetryTarget, PendingRetry>>,
    idle: Arc<watch::Sender<bool>>,
}

/// Publishes whether anything is left in `pending`. The check runs under the
/// channel's lock so concurrent updates can't leave a stale value behind.
fn publish_idle(idle: &watch::Sender<bool>, pending: &DashMap<RetryTarget, PendingRetry>) {
    idle.send_if_modified(|current| {
        let next = pending.is_empty();
        let changed = *current != next;
        *current = next;
        return changed;
    });
}

impl RetryScheduler {
    pub fn new(backoff: Backoff) -> RetryScheduler {
        let (idle, _) = watch::channel(true);
        return RetryScheduler {
            backoff,
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
            idle: Arc::new(idle),
        };
    }

    /// Arms a timer that calls `operation(attempt + 1)` after the backoff
    /// delay for `attempt`, replacing whatever was pending for `target`.
    /// Does nothing once the attempts are used up. Returns whether a timer
    /// was armed.
    pub fn schedule<F>(&self, target: RetryTarget, attempt: u32, operation: F) -> bool
    where
        F: FnOnce(u32) -> BoxFuture<'static, ()> + Send + 'static,
    {
        let delay = match self.backoff.delay(attempt) {
            Some(delay) => delay,
            None => {
                tracing::warn!(retry = %target, attempt, "Giving up after repeated failures");
                return false;
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let replaced = self.pending.insert(
            target,
            PendingRetry {
                id,
                attempt,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = replaced {
            previous.cancel.cancel();
        }
        publish_idle(&self.idle, &self.pending);

        tracing::debug!(
            retry = %target,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduled retry"
        );

        let pending = Arc::clone(&self.pending);
        let idle = Arc::clone(&self.idle);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return;
                }
                _ = time::sleep(delay) => {}
            }

            operation(attempt + 1).await;
            pending.remove_if(&target, |_, armed| return armed.id == id);
            publish_idle(&idle, &pending);
        });

        return true;
    }

    /// Attempt number of the retry armed or running for `target`, if any.
    pub fn pending_attempt(&self, target: RetryTarget) -> Option<u32> {
        return self.pending.get(&target).map(|pending| return pending.attempt);
    }

    /// Resolves once no retry is armed or running for any target.
    pub async fn idle(&self) {
        let mut rx = self.idle.subscribe();
        // The sender lives as long as `self`, so this never errors.
        let _ = rx.wait_for(|idle| return *idle).await;
    }

    pub fn cancel(&self, target: RetryTarget) {
        if let Some((_, pending)) = self.pending.remove(&target) {
            pending.cancel.cancel();
            publish_idle(&self.idle, &self.pending);
        }
    }

    pub fn cancel_all(&self) {
        self.cancel(RetryTarget::ConversationList);
        self.cancel(RetryTarget::Conversation);
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
