// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Background retries for failed deletes.

use std::{cmp::min, sync::Arc, time::Duration};

use rwcache_store::Store;
use serde::Deserialize;
use tokio::{sync::Semaphore, task::JoinHandle};

use crate::config::duration_secs;

/// How failed deletes are retried in the background.
///
/// Attempt `n` (starting at zero) waits `base_delay * multiplier^n`, capped at `max_delay`,
/// before it runs. Every attempt gets its own `attempt_timeout`, independent of the caller
/// that triggered the retry. At most `workers` attempts run at the same time across all
/// nodes sharing the executor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Number of attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first attempt, in seconds when deserialized.
    #[serde(deserialize_with = "duration_secs")]
    pub base_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Upper bound for a single delay, in seconds when deserialized.
    #[serde(deserialize_with = "duration_secs")]
    pub max_delay: Duration,
    /// Deadline for a single attempt, in seconds when deserialized.
    #[serde(deserialize_with = "duration_secs")]
    pub attempt_timeout: Duration,
    /// Maximum number of attempts in progress at once.
    pub workers: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            multiplier: 5.0,
            max_delay: Duration::from_secs(3600),
            attempt_timeout: Duration::from_secs(3),
            workers: 5,
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before each attempt.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let base = self.base_delay.as_secs_f64();
        let multiplier = self.multiplier.max(1.0);
        let max_delay = self.max_delay;

        (0..self.max_attempts).map(move |attempt| {
            let factor = multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
            min(secs_to_duration_saturating(base * factor), max_delay)
        })
    }
}

fn secs_to_duration_saturating(secs: f64) -> Duration {
    if secs <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// How a background delete ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// An attempt succeeded.
    Succeeded {
        /// Attempts made, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed.
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },
}

/// Runs delete retries as detached tasks.
#[derive(Debug)]
pub(crate) struct DeleteRetrier {
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl DeleteRetrier {
    pub fn new(policy: RetryPolicy) -> Self {
        let permits = Arc::new(Semaphore::new(policy.workers.max(1)));
        Self { policy, permits }
    }

    /// Retries deleting `keys` from `store` until an attempt succeeds or the policy is
    /// exhausted.
    ///
    /// Must be called within a tokio runtime.
    pub fn schedule<S: Store>(&self, node: String, store: Arc<S>, keys: Vec<String>) -> JoinHandle<RetryOutcome> {
        let policy = self.policy.clone();
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let mut attempts = 0;
            for delay in policy.delays() {
                tokio::time::sleep(delay).await;
                attempts += 1;

                let Ok(_permit) = permits.acquire().await else {
                    break;
                };

                match tokio::time::timeout(policy.attempt_timeout, store.delete(&keys)).await {
                    Ok(Ok(_)) => {
                        tracing::info!(cache.node = %node, cache.keys = ?keys, attempts, "retried delete succeeded");
                        return RetryOutcome::Succeeded { attempts };
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(cache.node = %node, cache.keys = ?keys, attempts, error = %e, "retried delete failed");
                    }
                    Err(_) => {
                        tracing::warn!(cache.node = %node, cache.keys = ?keys, attempts, "retried delete timed out");
                    }
                }
            }

            tracing::error!(cache.node = %node, cache.keys = ?keys, attempts, "giving up on delete");
            RetryOutcome::Exhausted { attempts }
        })
    }
}
