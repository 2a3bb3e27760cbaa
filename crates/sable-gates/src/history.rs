//! Approval history: pattern-hash counters that let the plan gate learn
//! to skip after repeated identical approvals, plus cooldown bookkeeping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::gate::Plan;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternApproval {
    pub count: u64,
    pub last_approved_at: String,
}

/// Write-through state persisted under the audit-trail directory.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ApprovalHistory {
    #[serde(default)]
    pub patterns: HashMap<String, PatternApproval>,
    /// `cooldown:{skill}:{userId}` → epoch seconds of last approval.
    #[serde(default)]
    pub cooldowns: HashMap<String, u64>,
}

impl ApprovalHistory {
    #[must_use]
    pub fn approval_count(&self, pattern_hash: &str) -> u64 {
        self.patterns.get(pattern_hash).map_or(0, |p| p.count)
    }

    pub fn record_approval(&mut self, pattern_hash: &str, timestamp: String) {
        let entry = self
            .patterns
            .entry(pattern_hash.to_string())
            .or_insert(PatternApproval {
                count: 0,
                last_approved_at: timestamp.clone(),
            });
        entry.count += 1;
        entry.last_approved_at = timestamp;
    }

    #[must_use]
    pub fn cooldown_remaining(&self, key: &str, now_secs: u64, cooldown_secs: u64) -> Option<u64> {
        let last = self.cooldowns.get(key)?;
        let elapsed = now_secs.saturating_sub(*last);
        (elapsed < cooldown_secs).then(|| cooldown_secs - elapsed)
    }

    pub fn touch_cooldown(&mut self, key: String, now_secs: u64) {
        self.cooldowns.insert(key, now_secs);
    }
}

/// Stable hash of a plan: `md5_10` over the skill name and the canonical
/// serialization of the steps array, or the description when no steps are
/// given.
#[must_use]
pub fn plan_pattern_hash(skill: &str, plan: &Plan) -> String {
    let canonical = match &plan.steps {
        Some(steps) => serde_json::to_string(steps).unwrap_or_default(),
        None => serde_json::to_string(&plan.description).unwrap_or_default(),
    };
    sable_core::hash::md5_10(&format!("{skill}:{canonical}"))
}

/// Cooldown key for a skill/user pair.
#[must_use]
pub fn cooldown_key(skill: &str, user_id: &str) -> String {
    format!("cooldown:{skill}:{user_id}")
}
