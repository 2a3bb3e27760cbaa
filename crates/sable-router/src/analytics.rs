//! Per-route counters and the unmatched-message ring.

use std::collections::{HashMap, VecDeque};

use sable_core::{text, time};
use serde::Serialize;

const UNMATCHED_CAP: usize = 50;
const UNMATCHED_MESSAGE_MAX: usize = 100;
const RECENT_UNMATCHED: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct ExecStats {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnmatchedMessage {
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Default)]
pub struct RouteAnalytics {
    hits: HashMap<String, u64>,
    executions: HashMap<String, ExecStats>,
    unmatched: VecDeque<UnmatchedMessage>,
}

/// Per-route rollup exposed by [`RouteAnalytics::summary`].
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub name: String,
    pub hits: u64,
    pub executions: u64,
    pub failures: u64,
    /// Percentage with one decimal.
    pub success_rate: f64,
    pub avg_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub routes: Vec<RouteSummary>,
    pub recent_unmatched: Vec<UnmatchedMessage>,
}

impl RouteAnalytics {
    pub fn record_hit(&mut self, name: &str) {
        *self.hits.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn record_execution(&mut self, name: &str, ok: bool, duration_ms: u64) {
        let stats = self.executions.entry(name.to_string()).or_default();
        stats.total += 1;
        if ok {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
        stats.total_duration_ms += duration_ms;
    }

    pub fn record_miss(&mut self, message: &str) {
        if self.unmatched.len() == UNMATCHED_CAP {
            self.unmatched.pop_front();
        }
        self.unmatched.push_back(UnmatchedMessage {
            message: text::truncate_chars(message, UNMATCHED_MESSAGE_MAX),
            timestamp: time::now_iso(),
        });
    }

    #[must_use]
    pub fn hits(&self, name: &str) -> u64 {
        self.hits.get(name).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn executions(&self, name: &str) -> Option<&ExecStats> {
        self.executions.get(name)
    }

    /// Full copy of the unmatched ring, oldest first.
    #[must_use]
    pub fn unmatched(&self) -> Vec<UnmatchedMessage> {
        self.unmatched.iter().cloned().collect()
    }

    /// Rollup over the given declared route names, keeping zero-traffic
    /// routes visible.
    #[must_use]
    pub fn summary(&self, route_names: &[String]) -> AnalyticsSummary {
        let routes = route_names
            .iter()
            .map(|name| {
                let stats = self.executions.get(name);
                let (executions, failures, success_rate, avg_duration_ms) = match stats {
                    Some(s) if s.total > 0 => {
                        #[allow(clippy::cast_precision_loss)]
                        let rate = (s.successes as f64 / s.total as f64 * 1000.0).round() / 10.0;
                        (s.total, s.failures, rate, s.total_duration_ms / s.total)
                    }
                    _ => (0, 0, 0.0, 0),
                };
                RouteSummary {
                    name: name.clone(),
                    hits: self.hits(name),
                    executions,
                    failures,
                    success_rate,
                    avg_duration_ms,
                }
            })
            .collect();

        let recent_unmatched = self
            .unmatched
            .iter()
            .rev()
            .take(RECENT_UNMATCHED)
            .cloned()
            .collect();

        AnalyticsSummary {
            routes,
            recent_unmatched,
        }
    }
}
