// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-node request statistics.

use std::{
    sync::{
        Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::task::JoinHandle;

use crate::Node;
#[cfg(any(feature = "metrics", test))]
use crate::telemetry::{CacheActivity, NodeTelemetry};

/// Request counters of one cache node.
///
/// Counters only grow. Use [`CacheStat::snapshot`] to read them and
/// [`StatSnapshot::since`] to compute activity over a window.
#[derive(Debug)]
pub struct CacheStat {
    name: String,
    total: AtomicU64,
    hit: AtomicU64,
    miss: AtomicU64,
    db_fails: AtomicU64,
    #[cfg(any(feature = "metrics", test))]
    telemetry: Option<NodeTelemetry>,
}

impl CacheStat {
    /// Creates zeroed counters for the node called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total: AtomicU64::new(0),
            hit: AtomicU64::new(0),
            miss: AtomicU64::new(0),
            db_fails: AtomicU64::new(0),
            #[cfg(any(feature = "metrics", test))]
            telemetry: None,
        }
    }

    #[cfg(any(feature = "metrics", test))]
    pub(crate) fn with_telemetry(mut self, telemetry: NodeTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Returns the name of the node these counters belong to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatSnapshot {
        StatSnapshot {
            total: self.total.load(Ordering::Relaxed),
            hit: self.hit.load(Ordering::Relaxed),
            miss: self.miss.load(Ordering::Relaxed),
            db_fails: self.db_fails.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn increment_total(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        #[cfg(any(feature = "metrics", test))]
        self.record(CacheActivity::Request);
    }

    pub(crate) fn increment_hit(&self) {
        self.hit.fetch_add(1, Ordering::Relaxed);
        #[cfg(any(feature = "metrics", test))]
        self.record(CacheActivity::Hit);
    }

    pub(crate) fn increment_miss(&self) {
        self.miss.fetch_add(1, Ordering::Relaxed);
        #[cfg(any(feature = "metrics", test))]
        self.record(CacheActivity::Miss);
    }

    pub(crate) fn increment_db_fails(&self) {
        self.db_fails.fetch_add(1, Ordering::Relaxed);
        #[cfg(any(feature = "metrics", test))]
        self.record(CacheActivity::DbFail);
    }

    #[cfg(any(feature = "metrics", test))]
    fn record(&self, activity: CacheActivity) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record(activity);
        }
    }
}

/// A point-in-time copy of a node's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatSnapshot {
    /// Requests served.
    pub total: u64,
    /// Requests answered from the cache, including negative-cache placeholders.
    pub hit: u64,
    /// Requests that found nothing usable in the cache.
    pub miss: u64,
    /// Failed queries against the system of record.
    pub db_fails: u64,
}

impl StatSnapshot {
    /// Returns the share of requests that were hits, or `0.0` without requests.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "ratio only, precision loss is irrelevant")]
    pub fn hit_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.hit as f64 / self.total as f64
    }

    /// Returns the activity between `earlier` and `self`.
    #[must_use]
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            total: self.total.saturating_sub(earlier.total),
            hit: self.hit.saturating_sub(earlier.hit),
            miss: self.miss.saturating_sub(earlier.miss),
            db_fails: self.db_fails.saturating_sub(earlier.db_fails),
        }
    }
}

/// Aborts the periodic stat report when dropped.
#[derive(Debug)]
pub(crate) struct Reporter(JoinHandle<()>);

impl Drop for Reporter {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Logs the activity of every node once per `interval`.
///
/// Stops on its own once all nodes are gone. Must be called within a tokio runtime.
pub(crate) fn spawn_reporter<N: Node>(nodes: Vec<Weak<N>>, interval: Duration) -> Reporter {
    Reporter(tokio::spawn(async move {
        let mut last = vec![StatSnapshot::default(); nodes.len()];
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let mut alive = false;
            for (node, last) in nodes.iter().zip(last.iter_mut()) {
                let Some(node) = node.upgrade() else { continue };
                alive = true;

                let now = node.stat().snapshot();
                let window = now.since(last);
                *last = now;
                report(node.stat().name(), &window);
            }

            if !alive {
                break;
            }
        }
    }))
}

fn report(name: &str, window: &StatSnapshot) {
    if window.total == 0 {
        return;
    }

    let hit_ratio = format!("{:.1}%", window.hit_ratio() * 100.0);
    tracing::info!(
        cache.node = name,
        requests = window.total,
        hit_ratio = %hit_ratio,
        hit = window.hit,
        miss = window.miss,
        db_fails = window.db_fails,
        "cache stats"
    );
}
