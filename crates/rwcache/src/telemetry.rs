// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! OpenTelemetry counters for cache node activity.

use opentelemetry::{
    InstrumentationScope, KeyValue,
    metrics::{Counter, Meter, MeterProvider},
};

const METER_NAME: &str = "rwcache";
const VERSION: &str = "v0.1.0";
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";
const CACHE_EVENT_COUNT_NAME: &str = "cache.event.count";

pub(crate) const CACHE_NAME: &str = "cache.name";
pub(crate) const CACHE_ACTIVITY_NAME: &str = "cache.activity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    Request,
    Hit,
    Miss,
    DbFail,
}

impl CacheActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "cache.request",
            Self::Hit => "cache.hit",
            Self::Miss => "cache.miss",
            Self::DbFail => "cache.db_fail",
        }
    }
}

pub(crate) fn create_meter(meter_provider: &dyn MeterProvider) -> Meter {
    meter_provider.meter_with_scope(
        InstrumentationScope::builder(METER_NAME)
            .with_version(VERSION)
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
}

/// Event counter bound to one cache node.
#[derive(Debug, Clone)]
pub(crate) struct NodeTelemetry {
    name: String,
    counter: Counter<u64>,
}

impl NodeTelemetry {
    pub fn new(name: &str, meter: &Meter) -> Self {
        Self {
            name: name.to_owned(),
            counter: meter
                .u64_counter(CACHE_EVENT_COUNT_NAME)
                .with_description("Cache events")
                .with_unit("{event}")
                .build(),
        }
    }

    pub fn record(&self, activity: CacheActivity) {
        self.counter.add(
            1,
            &[
                KeyValue::new(CACHE_NAME, self.name.clone()),
                KeyValue::new(CACHE_ACTIVITY_NAME, activity.as_str()),
            ],
        );
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MetricTester;

    #[test]
    fn activity_names() {
        assert_eq!(CacheActivity::Request.as_str(), "cache.request");
        assert_eq!(CacheActivity::Hit.as_str(), "cache.hit");
        assert_eq!(CacheActivity::Miss.as_str(), "cache.miss");
        assert_eq!(CacheActivity::DbFail.as_str(), "cache.db_fail");
    }

    #[test]
    fn record_emits_name_and_activity() {
        let tester = MetricTester::new();
        let telemetry = NodeTelemetry::new("node-a", &create_meter(tester.meter_provider()));

        telemetry.record(CacheActivity::Hit);
        telemetry.record(CacheActivity::Hit);
        telemetry.record(CacheActivity::Miss);

        let hits = tester.counter_value(&[
            KeyValue::new(CACHE_NAME, "node-a"),
            KeyValue::new(CACHE_ACTIVITY_NAME, CacheActivity::Hit.as_str()),
        ]);
        assert_eq!(hits, 2);

        let misses = tester.counter_value(&[KeyValue::new(CACHE_ACTIVITY_NAME, CacheActivity::Miss.as_str())]);
        assert_eq!(misses, 1);
    }
}
