// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-key request coalescing.

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::Error;

type Outcome = Result<Bytes, Error>;
type SharedOutcome = Shared<BoxFuture<'static, Outcome>>;
type Calls = Arc<Mutex<HashMap<String, Call>>>;

struct Call {
    id: u64,
    outcome: SharedOutcome,
}

/// Coalesces concurrent computations for the same key into one.
///
/// The first caller for a key (the leader) starts the computation; callers that arrive while
/// it is running (followers) wait for the same outcome. Once the computation finishes, the
/// next caller for the key starts a new one.
///
/// The computation runs as a detached tokio task. Dropping the leader's future, or any
/// follower's, never cancels it, so the remaining waiters always get a result.
#[derive(Default)]
pub struct Flight {
    calls: Calls,
    next_id: AtomicU64,
}

impl Debug for Flight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flight").field("in_flight", &self.in_flight()).finish()
    }
}

/// Removes a finished call from the table, unless a newer call for the key replaced it.
struct CallGuard {
    calls: Calls,
    key: String,
    id: u64,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let mut calls = self.calls.lock();
        if calls.get(&self.key).is_some_and(|call| call.id == self.id) {
            calls.remove(&self.key);
        }
    }
}

impl Flight {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys with a computation in progress.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    /// Runs `work` for `key` unless a computation for `key` is already in progress, in which
    /// case its outcome is awaited instead.
    ///
    /// Returns the outcome and whether this caller started the computation (`fresh`). If
    /// the computation panics, every waiter receives [`Error::Aborted`].
    ///
    /// Must be called within a tokio runtime.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> (Outcome, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let leader = {
            let mut calls = self.calls.lock();
            match calls.get(key) {
                Some(call) => Err(call.outcome.clone()),
                None => {
                    let (sender, receiver) = tokio::sync::oneshot::channel();
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let outcome = async move { receiver.await.unwrap_or(Err(Error::Aborted)) }.boxed().shared();
                    calls.insert(key.to_owned(), Call {
                        id,
                        outcome: outcome.clone(),
                    });
                    Ok((outcome, sender, id))
                }
            }
        };
        let (outcome, sender, id) = match leader {
            Ok(leader) => leader,
            Err(outcome) => return (outcome.await, false),
        };

        // Spawned outside the lock: a rejected task drops the guard right away.
        let guard = CallGuard {
            calls: Arc::clone(&self.calls),
            key: key.to_owned(),
            id,
        };
        let work = work();
        drop(tokio::spawn(async move {
            let _guard = guard;
            drop(sender.send(work.await));
        }));

        (outcome.await, true)
    }
}
