// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component-scoped event counters.
//!
//! Counts are kept locally for `GatewayStats` and mirrored to the `metrics`
//! facade so an installed recorder (Prometheus or otherwise) sees them too.

use std::collections::BTreeMap;

use dashmap::DashMap;

pub const AUTH_FAILED: &str = "auth_failed";
pub const RATE_LIMITED: &str = "rate_limited";
pub const PARSE_ERROR: &str = "parse_error";
pub const TRANSACTION: &str = "transaction";
pub const EVENT_RECEIVED: &str = "event_received";
pub const EVENT_DROPPED_GHOST: &str = "event_dropped_ghost";
pub const EVENT_OVERFLOW: &str = "event_overflow";
pub const OVERFLOW_REJECTED: &str = "overflow_rejected";

const METRIC_NAME: &str = "bastion_gateway_events_total";

#[derive(Debug)]
pub struct ComponentTracker {
    component: &'static str,
    counters: DashMap<&'static str, u64>,
}

impl ComponentTracker {
    pub fn new(component: &'static str) -> Self {
        metrics::describe_counter!(METRIC_NAME, "Gateway events by kind");
        Self {
            component,
            counters: DashMap::new(),
        }
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    /// Count one occurrence of `kind`.
    pub fn record(&self, kind: &'static str) {
        self.record_n(kind, 1);
    }

    pub fn record_n(&self, kind: &'static str, n: u64) {
        if n == 0 {
            return;
        }
        *self.counters.entry(kind).or_insert(0) += n;
        metrics::counter!(METRIC_NAME, "component" => self.component, "kind" => kind).increment(n);
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.counters.get(kind).map(|c| *c).unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|entry| (entry.key().to_string(), *entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_per_kind() {
        let tracker = ComponentTracker::new("appservice");
        tracker.record(AUTH_FAILED);
        tracker.record(AUTH_FAILED);
        tracker.record_n(EVENT_RECEIVED, 3);
        tracker.record_n(EVENT_OVERFLOW, 0);

        assert_eq!(tracker.count(AUTH_FAILED), 2);
        assert_eq!(tracker.count(EVENT_RECEIVED), 3);
        assert_eq!(tracker.count(EVENT_OVERFLOW), 0);
        assert_eq!(tracker.snapshot().len(), 2);
    }
}
