//! Audit-trail day files and the aggregated gate statistics read from them.

use std::collections::HashMap;
use std::path::Path;

use sable_core::{Risk, time};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::GateError;
use crate::gate::{GateKind, GateStatus};
use crate::rules::CheckRecord;

/// Minimum resolutions before a skill qualifies for auto-approval.
const CANDIDATE_MIN_RESOLUTIONS: u64 = 5;

/// One resolved gate, as persisted to `audit-trail/YYYY-MM-DD.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub gate: GateKind,
    pub skill: String,
    pub status: GateStatus,
    pub risk: Risk,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Truncated plan serialization (plan gate).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Truncated output serialization (verify gate).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckRecord>,
}

/// Append one audit line to today's day file.
pub async fn append_audit(dir: &Path, entry: &AuditEntry) -> Result<(), GateError> {
    let line = format!("{}\n", serde_json::to_string(entry)?);
    let path = dir.join(format!("{}.json", time::today_stamp()));
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}

/// Read the last `days` of audit files, skipping malformed lines.
pub async fn read_audit(dir: &Path, days: u32) -> Result<Vec<AuditEntry>, GateError> {
    let mut stamps = time::recent_day_stamps(days);
    stamps.reverse();

    let mut out = Vec::new();
    for stamp in stamps {
        let path = dir.join(format!("{stamp}.json"));
        if !path.exists() {
            continue;
        }
        let raw = tokio::fs::read_to_string(&path).await?;
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => out.push(entry),
                Err(e) => tracing::debug!("skipping malformed audit line: {e}"),
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusCounts {
    pub approved: u64,
    pub rejected: u64,
    pub expired: u64,
    pub skipped: u64,
    pub auto: u64,
}

impl StatusCounts {
    fn record(&mut self, status: GateStatus) {
        match status {
            GateStatus::Approved | GateStatus::Edited => self.approved += 1,
            GateStatus::Rejected => self.rejected += 1,
            GateStatus::Expired => self.expired += 1,
            GateStatus::Skipped => self.skipped += 1,
            GateStatus::AutoPassed => self.auto += 1,
        }
    }

    /// Resolutions that actually reached a decision (skips excluded).
    #[must_use]
    pub fn resolutions(&self) -> u64 {
        self.approved + self.rejected + self.expired + self.auto
    }
}

/// Aggregated audit statistics over a window.
#[derive(Debug, Default, Serialize)]
pub struct GateStats {
    pub per_gate: HashMap<String, StatusCounts>,
    pub per_skill: HashMap<String, StatusCounts>,
    /// Skills with enough clean resolutions to propose lowering their risk.
    pub auto_approval_candidates: Vec<String>,
}

impl GateStats {
    #[must_use]
    pub fn from_entries(entries: &[AuditEntry]) -> Self {
        let mut stats = Self::default();
        for entry in entries {
            stats
                .per_gate
                .entry(entry.gate.as_str().to_string())
                .or_default()
                .record(entry.status);
            stats
                .per_skill
                .entry(entry.skill.clone())
                .or_default()
                .record(entry.status);
        }

        let mut candidates: Vec<String> = stats
            .per_skill
            .iter()
            .filter(|(_, counts)| {
                counts.resolutions() >= CANDIDATE_MIN_RESOLUTIONS && counts.rejected == 0
            })
            .map(|(skill, _)| skill.clone())
            .collect();
        candidates.sort();
        stats.auto_approval_candidates = candidates;
        stats
    }

    /// Fraction of plan gates in the window that expired, if any ran.
    #[must_use]
    pub fn plan_gate_expiry_rate(&self) -> Option<f64> {
        let gate1 = self.per_gate.get("gate1")?;
        let total = gate1.resolutions();
        if total == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(gate1.expired as f64 / total as f64)
    }
}
