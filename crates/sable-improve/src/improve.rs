//! The `SelfImprovementLoop` component.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use sable_errlog::{ErrorLogger, QueryFilter};
use sable_gates::VerificationGates;
use sable_router::WorkflowRouter;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use sable_core::{ids, time};

use crate::cluster::{cluster_messages, suggest_pattern};
use crate::error::LoopError;
use crate::events::LoopEvent;
use crate::types::{
    ActionKind, Correction, Effort, Feedback, Insight, InsightSeverity, InsightType,
    MetricsSnapshot, Proposal, ProposalSeverity, ProposalStatus, correction_pattern_hash,
};

const EVENT_CAPACITY: usize = 64;
const METRICS_CAP: usize = 90;
const TREND_WINDOW: usize = 4;
const RECURRING_SCAN: usize = 50;

const CORRECTIONS_FILE: &str = "corrections.json";
const PROPOSALS_FILE: &str = "proposals.json";
const INSIGHTS_FILE: &str = "insights.json";
const METRICS_FILE: &str = "metrics-history.json";

/// Detection thresholds, each applied at its own site.
#[derive(Debug, Clone)]
pub struct LoopThresholds {
    /// Recurring-error count at which an insight is raised.
    pub error_threshold: u64,
    /// Identical corrections at which a proposal is raised immediately.
    pub correction_threshold: usize,
    /// Gate rejections per skill at which a raise-risk insight is raised.
    pub rejection_threshold: u64,
    /// Unmatched messages required before clustering runs.
    pub miss_threshold: usize,
    /// Members a cluster needs to become a new-route insight.
    pub cluster_min: usize,
}

impl Default for LoopThresholds {
    fn default() -> Self {
        Self {
            error_threshold: 3,
            correction_threshold: 3,
            rejection_threshold: 3,
            miss_threshold: 5,
            cluster_min: 3,
        }
    }
}

/// Error-rate direction over the recent snapshot window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

/// Filters for [`SelfImprovementLoop::proposals`].
#[derive(Debug, Clone, Default)]
pub struct ProposalFilter {
    pub status: Option<ProposalStatus>,
    pub skill: Option<String>,
    pub severity: Option<ProposalSeverity>,
}

pub struct SelfImprovementLoop {
    dir: PathBuf,
    logger: Arc<ErrorLogger>,
    router: Option<Arc<WorkflowRouter>>,
    gates: Option<Arc<VerificationGates>>,
    thresholds: LoopThresholds,
    corrections: Mutex<Vec<Correction>>,
    proposals: Mutex<Vec<Proposal>>,
    insights: Mutex<Vec<Insight>>,
    metrics: Mutex<Vec<MetricsSnapshot>>,
    events: broadcast::Sender<LoopEvent>,
}

impl std::fmt::Debug for SelfImprovementLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfImprovementLoop")
            .field("dir", &self.dir)
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl SelfImprovementLoop {
    /// Open the improvement data directory and load persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a state file
    /// exists but cannot be parsed.
    pub async fn open(
        dir: impl Into<PathBuf>,
        logger: Arc<ErrorLogger>,
    ) -> Result<Self, LoopError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            corrections: Mutex::new(load_array(&dir.join(CORRECTIONS_FILE)).await?),
            proposals: Mutex::new(load_array(&dir.join(PROPOSALS_FILE)).await?),
            insights: Mutex::new(load_array(&dir.join(INSIGHTS_FILE)).await?),
            metrics: Mutex::new(load_array(&dir.join(METRICS_FILE)).await?),
            dir,
            logger,
            router: None,
            gates: None,
            thresholds: LoopThresholds::default(),
            events,
        })
    }

    #[must_use]
    pub fn with_router(mut self, router: Arc<WorkflowRouter>) -> Self {
        self.router = Some(router);
        self
    }

    #[must_use]
    pub fn with_gates(mut self, gates: Arc<VerificationGates>) -> Self {
        self.gates = Some(gates);
        self
    }

    #[must_use]
    pub fn with_thresholds(mut self, thresholds: LoopThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LoopEvent> {
        self.events.subscribe()
    }

    /// Store a correction; when enough corrections share its pattern hash,
    /// raise a `correction_pattern` proposal immediately.
    pub async fn record_correction(
        &self,
        skill: &str,
        original: Value,
        corrected: Value,
        reason: &str,
        context: Value,
    ) -> Result<(Correction, Option<Proposal>), LoopError> {
        let hash = correction_pattern_hash(skill, reason);
        let correction = Correction {
            id: ids::token12(),
            skill: skill.to_string(),
            original,
            corrected,
            reason: reason.to_string(),
            context,
            timestamp: time::now_iso(),
            pattern_hash: hash.clone(),
        };

        let group_size = {
            let mut corrections = lock(&self.corrections);
            corrections.push(correction.clone());
            corrections.iter().filter(|c| c.pattern_hash == hash).count()
        };
        self.persist_corrections().await?;

        let proposal = if group_size >= self.thresholds.correction_threshold {
            self.raise_correction_proposal(skill, &hash).await?
        } else {
            None
        };

        Ok((correction, proposal))
    }

    /// Negative feedback becomes an anonymous correction carrying the
    /// comment.
    pub async fn record_feedback(
        &self,
        skill: Option<&str>,
        feedback: Feedback,
        comment: &str,
    ) -> Result<Option<Correction>, LoopError> {
        if !feedback.is_negative() {
            return Ok(None);
        }
        let reason = if comment.trim().is_empty() {
            "negative feedback"
        } else {
            comment
        };
        let (correction, _) = self
            .record_correction(
                skill.unwrap_or("general"),
                Value::Null,
                Value::Null,
                reason,
                json!({"source": "feedback"}),
            )
            .await?;
        Ok(Some(correction))
    }

    /// Rebuild the insight list from scratch over the lookback window and
    /// append a metrics snapshot.
    pub async fn analyze(&self, lookback_days: u32) -> Result<Vec<Insight>, LoopError> {
        let mut insights = Vec::new();

        self.detect_error_patterns(&mut insights).await?;
        self.detect_skill_error_rates(&mut insights, lookback_days)
            .await?;
        self.detect_correction_patterns(&mut insights, lookback_days);
        self.detect_gate_adjustments(&mut insights, lookback_days)
            .await?;
        self.detect_route_performance(&mut insights);
        self.detect_unmatched_clusters(&mut insights);

        {
            let mut stored = lock(&self.insights);
            *stored = insights.clone();
        }
        self.persist_insights().await?;
        self.snapshot_metrics(insights.len()).await?;

        let proposals_pending = self.count_pending();
        tracing::info!(
            "analysis over {lookback_days} day(s): {} insight(s), {proposals_pending} pending proposal(s)",
            insights.len()
        );
        let _ = self.events.send(LoopEvent::AnalysisComplete {
            insights: insights.len(),
            proposals_pending,
        });
        Ok(insights)
    }

    /// Convert current insights into proposals, skipping pairs that already
    /// have a pending proposal.
    pub async fn generate_proposals(&self) -> Result<Vec<Proposal>, LoopError> {
        let insights = lock(&self.insights).clone();
        let mut created = Vec::new();

        for insight in insights {
            let duplicate = {
                let proposals = lock(&self.proposals);
                proposals.iter().any(|p| {
                    p.status == ProposalStatus::Pending
                        && p.insight_type == insight.insight_type
                        && p.skill == insight.skill
                })
            };
            if duplicate {
                continue;
            }

            let (action, effort, implementation) = action_for(insight.insight_type);
            let proposal = Proposal {
                id: ids::token12(),
                insight_type: insight.insight_type,
                skill: insight.skill.clone(),
                severity: ProposalSeverity::from(insight.severity),
                status: ProposalStatus::Pending,
                action,
                description: insight.message.clone(),
                implementation: implementation.to_string(),
                effort,
                created_at: time::now_iso(),
                approved_at: None,
                rejected_at: None,
                applied_at: None,
                notes: None,
                rejection_reason: None,
                data: insight.data.clone(),
            };
            lock(&self.proposals).push(proposal.clone());
            created.push(proposal);
        }

        if !created.is_empty() {
            self.persist_proposals().await?;
            for proposal in &created {
                let _ = self.events.send(LoopEvent::NewProposal(proposal.clone()));
            }
        }
        Ok(created)
    }

    pub async fn approve_proposal(&self, id: &str) -> Result<Proposal, LoopError> {
        let proposal = self
            .transition(id, ProposalStatus::Approved, |p| {
                p.approved_at = Some(time::now_iso());
            })
            .await?;
        let _ = self
            .events
            .send(LoopEvent::ProposalApproved(proposal.clone()));
        Ok(proposal)
    }

    pub async fn reject_proposal(&self, id: &str, reason: &str) -> Result<Proposal, LoopError> {
        let proposal = self
            .transition(id, ProposalStatus::Rejected, |p| {
                p.rejected_at = Some(time::now_iso());
                p.rejection_reason = Some(reason.to_string());
            })
            .await?;
        let _ = self
            .events
            .send(LoopEvent::ProposalRejected(proposal.clone()));
        Ok(proposal)
    }

    pub async fn mark_applied(&self, id: &str, notes: &str) -> Result<Proposal, LoopError> {
        let proposal = self
            .transition(id, ProposalStatus::Applied, |p| {
                p.applied_at = Some(time::now_iso());
                if !notes.is_empty() {
                    p.notes = Some(notes.to_string());
                }
            })
            .await?;
        let _ = self.events.send(LoopEvent::ProposalApplied(proposal.clone()));
        Ok(proposal)
    }

    /// Filtered proposal listing, sorted high → medium → low → unknown.
    #[must_use]
    pub fn proposals(&self, filter: &ProposalFilter) -> Vec<Proposal> {
        let mut out: Vec<Proposal> = lock(&self.proposals)
            .iter()
            .filter(|p| filter.status.is_none_or(|s| p.status == s))
            .filter(|p| {
                filter
                    .skill
                    .as_ref()
                    .is_none_or(|s| p.skill.as_deref() == Some(s.as_str()))
            })
            .filter(|p| filter.severity.is_none_or(|s| p.severity == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.severity.cmp(&a.severity));
        out
    }

    #[must_use]
    pub fn proposal(&self, id: &str) -> Option<Proposal> {
        lock(&self.proposals).iter().find(|p| p.id == id).cloned()
    }

    #[must_use]
    pub fn corrections_for(&self, skill: &str, limit: usize) -> Vec<Correction> {
        lock(&self.corrections)
            .iter()
            .rev()
            .filter(|c| c.skill == skill)
            .take(limit)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn insights(&self) -> Vec<Insight> {
        lock(&self.insights).clone()
    }

    /// Error-rate direction over the last four snapshots.
    #[must_use]
    pub fn trend(&self) -> Trend {
        let metrics = lock(&self.metrics);
        let rates: Vec<f64> = metrics
            .iter()
            .rev()
            .take(TREND_WINDOW)
            .filter_map(|m| m.error_rate)
            .collect();
        if rates.len() < 2 {
            return Trend::Stable;
        }
        // rates is newest-first.
        let latest = rates[0];
        let earliest = rates[rates.len() - 1];
        if latest <= earliest * 0.8 {
            Trend::Improving
        } else if latest >= earliest * 1.2 {
            Trend::Degrading
        } else {
            Trend::Stable
        }
    }

    async fn detect_error_patterns(&self, insights: &mut Vec<Insight>) -> Result<(), LoopError> {
        let recurring = self.logger.recurring(RECURRING_SCAN).await?;
        for entry in recurring {
            if entry.count < self.thresholds.error_threshold {
                continue;
            }
            let severity = if entry.count > 10 {
                InsightSeverity::High
            } else {
                InsightSeverity::Medium
            };
            let skill = entry.latest.as_ref().map(|r| r.skill.clone());
            let message = match &entry.latest {
                Some(record) => format!(
                    "Error recurring {} times in '{}': {}",
                    entry.count, record.skill, record.message
                ),
                None => format!("Error fingerprint {} recurring {} times", entry.fingerprint, entry.count),
            };
            insights.push(self.insight(
                InsightType::ErrorPattern,
                severity,
                skill,
                message,
                json!({
                    "fingerprint": entry.fingerprint,
                    "count": entry.count,
                    "classification": entry.latest.as_ref().map(|r| r.classification.as_str()),
                }),
            ));
        }
        Ok(())
    }

    async fn detect_skill_error_rates(
        &self,
        insights: &mut Vec<Insight>,
        lookback_days: u32,
    ) -> Result<(), LoopError> {
        let records = self
            .logger
            .query(&QueryFilter {
                days: Some(lookback_days),
                ..QueryFilter::default()
            })
            .await?;

        let mut per_skill: HashMap<String, u64> = HashMap::new();
        for record in &records {
            if let Some(err) = record.as_error() {
                *per_skill.entry(err.skill.clone()).or_insert(0) += 1;
            }
        }

        let mut skills: Vec<(String, u64)> = per_skill.into_iter().collect();
        skills.sort();
        for (skill, errors) in skills {
            if errors > 5 {
                insights.push(self.insight(
                    InsightType::Performance,
                    InsightSeverity::Medium,
                    Some(skill.clone()),
                    format!("Skill '{skill}' produced {errors} errors in {lookback_days} day(s)"),
                    json!({"errors": errors}),
                ));
            }
        }
        Ok(())
    }

    fn detect_correction_patterns(&self, insights: &mut Vec<Insight>, lookback_days: u32) {
        let cutoff = time::iso_from_secs(
            time::epoch_secs().saturating_sub(u64::from(lookback_days) * 86_400),
        );
        let corrections = lock(&self.corrections);

        let mut groups: HashMap<String, Vec<&Correction>> = HashMap::new();
        for correction in corrections.iter().filter(|c| c.timestamp >= cutoff) {
            groups
                .entry(correction.pattern_hash.clone())
                .or_default()
                .push(correction);
        }

        let mut hashes: Vec<&String> = groups.keys().collect();
        hashes.sort();
        for hash in hashes {
            let group = &groups[hash];
            if group.len() < self.thresholds.correction_threshold {
                continue;
            }
            let common_reason = mode_reason(group);
            let skill = group[0].skill.clone();
            insights.push(self.insight(
                InsightType::CorrectionPattern,
                InsightSeverity::High,
                Some(skill.clone()),
                format!(
                    "Skill '{skill}' corrected {} times for: {common_reason}",
                    group.len()
                ),
                json!({
                    "pattern_hash": hash,
                    "common_reason": common_reason,
                    "count": group.len(),
                }),
            ));
        }
    }

    async fn detect_gate_adjustments(
        &self,
        insights: &mut Vec<Insight>,
        lookback_days: u32,
    ) -> Result<(), LoopError> {
        let Some(gates) = &self.gates else {
            return Ok(());
        };
        let stats = gates.stats(lookback_days).await?;

        for skill in &stats.auto_approval_candidates {
            insights.push(self.insight(
                InsightType::RiskAdjustment,
                InsightSeverity::Low,
                Some(skill.clone()),
                format!("Skill '{skill}' is consistently approved; consider lowering its risk"),
                json!({"direction": "lower"}),
            ));
        }

        let mut skills: Vec<(&String, u64)> = stats
            .per_skill
            .iter()
            .map(|(skill, counts)| (skill, counts.rejected))
            .collect();
        skills.sort();
        for (skill, rejections) in skills {
            if rejections >= self.thresholds.rejection_threshold {
                insights.push(self.insight(
                    InsightType::RiskAdjustment,
                    InsightSeverity::Medium,
                    Some(skill.clone()),
                    format!("Skill '{skill}' rejected {rejections} times; consider raising its risk"),
                    json!({"direction": "raise", "rejections": rejections}),
                ));
            }
        }

        if let Some(rate) = stats.plan_gate_expiry_rate()
            && rate > 0.3
        {
            insights.push(self.insight(
                InsightType::SkillUpdate,
                InsightSeverity::Low,
                None,
                format!(
                    "{:.0}% of plan gates expire unanswered; consider longer approval timeouts",
                    rate * 100.0
                ),
                json!({"expiry_rate": rate}),
            ));
        }
        Ok(())
    }

    fn detect_route_performance(&self, insights: &mut Vec<Insight>) {
        let Some(router) = &self.router else {
            return;
        };
        let summary = router.summary();

        for route in &summary.routes {
            if route.executions > 5 && route.success_rate < 80.0 {
                insights.push(self.insight(
                    InsightType::Performance,
                    InsightSeverity::Medium,
                    Some(route.name.clone()),
                    format!(
                        "Route '{}' succeeds only {:.1}% of the time over {} executions",
                        route.name, route.success_rate, route.executions
                    ),
                    json!({"success_rate": route.success_rate, "executions": route.executions}),
                ));
            }
            if route.avg_duration_ms > 5_000 {
                insights.push(self.insight(
                    InsightType::Performance,
                    InsightSeverity::Low,
                    Some(route.name.clone()),
                    format!(
                        "Route '{}' averages {}ms per execution",
                        route.name, route.avg_duration_ms
                    ),
                    json!({"avg_duration_ms": route.avg_duration_ms}),
                ));
            }
            if route.hits == 0 && route.executions == 0 {
                insights.push(self.insight(
                    InsightType::UnusedRoute,
                    InsightSeverity::Low,
                    Some(route.name.clone()),
                    format!("Route '{}' has never been used", route.name),
                    Value::Null,
                ));
            }
        }
    }

    fn detect_unmatched_clusters(&self, insights: &mut Vec<Insight>) {
        let Some(router) = &self.router else {
            return;
        };
        let unmatched = router.unmatched_messages();
        if unmatched.len() < self.thresholds.miss_threshold {
            return;
        }

        let messages: Vec<String> = unmatched.into_iter().map(|u| u.message).collect();
        for cluster in cluster_messages(&messages) {
            if cluster.len() < self.thresholds.cluster_min {
                continue;
            }
            let pattern = suggest_pattern(&cluster);
            insights.push(self.insight(
                InsightType::NewRoute,
                InsightSeverity::Medium,
                None,
                format!(
                    "{} unmatched messages look like '{}'",
                    cluster.len(),
                    cluster.representative
                ),
                json!({
                    "representative": cluster.representative,
                    "examples": cluster.examples,
                    "suggested_pattern": pattern,
                }),
            ));
        }
    }

    async fn raise_correction_proposal(
        &self,
        skill: &str,
        hash: &str,
    ) -> Result<Option<Proposal>, LoopError> {
        let (duplicate, group_len, common_reason) = {
            let proposals = lock(&self.proposals);
            let duplicate = proposals.iter().any(|p| {
                p.status == ProposalStatus::Pending
                    && p.data.get("pattern_hash").and_then(Value::as_str) == Some(hash)
            });
            let corrections = lock(&self.corrections);
            let group: Vec<&Correction> = corrections
                .iter()
                .filter(|c| c.pattern_hash == hash)
                .collect();
            (duplicate, group.len(), mode_reason(&group))
        };
        if duplicate {
            return Ok(None);
        }

        let (action, effort, implementation) = action_for(InsightType::CorrectionPattern);
        let proposal = Proposal {
            id: ids::token12(),
            insight_type: InsightType::CorrectionPattern,
            skill: Some(skill.to_string()),
            severity: ProposalSeverity::High,
            status: ProposalStatus::Pending,
            action,
            description: format!(
                "Skill '{skill}' corrected {group_len} times for: {common_reason}"
            ),
            implementation: implementation.to_string(),
            effort,
            created_at: time::now_iso(),
            approved_at: None,
            rejected_at: None,
            applied_at: None,
            notes: None,
            rejection_reason: None,
            data: json!({
                "pattern_hash": hash,
                "common_reason": common_reason,
                "count": group_len,
            }),
        };

        lock(&self.proposals).push(proposal.clone());
        self.persist_proposals().await?;
        let _ = self.events.send(LoopEvent::NewProposal(proposal.clone()));
        Ok(Some(proposal))
    }

    fn insight(
        &self,
        insight_type: InsightType,
        severity: InsightSeverity,
        skill: Option<String>,
        message: String,
        data: Value,
    ) -> Insight {
        Insight {
            id: ids::token12(),
            insight_type,
            severity,
            skill,
            message,
            data,
            timestamp: time::now_iso(),
        }
    }

    async fn snapshot_metrics(&self, insights: usize) -> Result<(), LoopError> {
        let (error_rate, total_routed, misses) = match &self.router {
            Some(router) => {
                let summary = router.summary();
                let total: u64 = summary.routes.iter().map(|r| r.executions).sum();
                let failures: u64 = summary.routes.iter().map(|r| r.failures).sum();
                #[allow(clippy::cast_precision_loss)]
                let rate = if total == 0 {
                    0.0
                } else {
                    failures as f64 / total as f64
                };
                (
                    Some(rate),
                    Some(total),
                    Some(router.unmatched_messages().len()),
                )
            }
            None => (None, None, None),
        };

        let snapshot = MetricsSnapshot {
            timestamp: time::now_iso(),
            insights,
            proposals_pending: self.count_pending(),
            corrections: lock(&self.corrections).len(),
            error_rate,
            total_routed,
            misses,
        };

        {
            let mut metrics = lock(&self.metrics);
            metrics.push(snapshot);
            let len = metrics.len();
            if len > METRICS_CAP {
                metrics.drain(0..len - METRICS_CAP);
            }
        }
        self.persist_metrics().await
    }

    fn count_pending(&self) -> usize {
        lock(&self.proposals)
            .iter()
            .filter(|p| p.status == ProposalStatus::Pending)
            .count()
    }

    async fn transition(
        &self,
        id: &str,
        status: ProposalStatus,
        stamp: impl FnOnce(&mut Proposal),
    ) -> Result<Proposal, LoopError> {
        let proposal = {
            let mut proposals = lock(&self.proposals);
            let proposal = proposals
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| LoopError::ProposalNotFound(id.to_string()))?;
            proposal.status = status;
            stamp(proposal);
            proposal.clone()
        };
        self.persist_proposals().await?;
        Ok(proposal)
    }

    async fn persist_corrections(&self) -> Result<(), LoopError> {
        let raw = serde_json::to_string_pretty(&*lock(&self.corrections))?;
        self.write_file(CORRECTIONS_FILE, raw).await
    }

    async fn persist_proposals(&self) -> Result<(), LoopError> {
        let raw = serde_json::to_string_pretty(&*lock(&self.proposals))?;
        self.write_file(PROPOSALS_FILE, raw).await
    }

    async fn persist_insights(&self) -> Result<(), LoopError> {
        let raw = serde_json::to_string_pretty(&*lock(&self.insights))?;
        self.write_file(INSIGHTS_FILE, raw).await
    }

    async fn persist_metrics(&self) -> Result<(), LoopError> {
        let raw = serde_json::to_string_pretty(&*lock(&self.metrics))?;
        self.write_file(METRICS_FILE, raw).await
    }

    async fn write_file(&self, file: &str, raw: String) -> Result<(), LoopError> {
        tokio::fs::write(self.dir.join(file), raw).await?;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

async fn load_array<T: serde::de::DeserializeOwned>(
    path: &std::path::Path,
) -> Result<Vec<T>, LoopError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

/// Case-insensitive mode of the group's reasons.
fn mode_reason(group: &[&Correction]) -> String {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for correction in group {
        *counts
            .entry(correction.reason.trim().to_lowercase())
            .or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(reason, _)| reason)
        .unwrap_or_default()
}

fn action_for(insight_type: InsightType) -> (ActionKind, Effort, &'static str) {
    match insight_type {
        InsightType::ErrorPattern => (
            ActionKind::AddErrorHandling,
            Effort::Medium,
            "Wrap the failing call sites in targeted error handling; retry transient failures",
        ),
        InsightType::CorrectionPattern => (
            ActionKind::UpdateSkillLogic,
            Effort::High,
            "Revise the skill logic to address the repeated correction reason",
        ),
        InsightType::RiskAdjustment => (
            ActionKind::AdjustRiskLevel,
            Effort::Low,
            "Change the route's declared risk level; auto-applicable",
        ),
        InsightType::NewRoute => (
            ActionKind::AddNewRoute,
            Effort::Medium,
            "Register a route matching the suggested pattern and wire a handler",
        ),
        InsightType::Performance => (
            ActionKind::OptimizePerformance,
            Effort::Medium,
            "Profile the skill and cut the slow or failing path",
        ),
        InsightType::UnusedRoute => (
            ActionKind::ReviewUnusedRoute,
            Effort::Low,
            "Confirm the route is still needed or retire it",
        ),
        InsightType::AutoFix | InsightType::SkillUpdate => (
            ActionKind::ManualReview,
            Effort::Unknown,
            "Review manually",
        ),
    }
}
