//! The `VerificationGates` component: pending-gate index, approval
//! waiting, expiry sweeping, and the two gate entry points.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sable_core::{Risk, text, time};
use sable_errlog::ErrorLogger;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot, watch};

use crate::audit::{AuditEntry, GateStats, append_audit, read_audit};
use crate::error::GateError;
use crate::events::GateEvent;
use crate::gate::{GateContext, GateKind, GateResult, GateStatus, Plan};
use crate::history::{ApprovalHistory, cooldown_key, plan_pattern_hash};
use crate::policy::GatePolicy;
use crate::rules::{
    CheckOutcome, CheckRecord, EchoesInput, NotErrorShaped, OutputPresent, Rule, run_rules,
};

const EVENT_CAPACITY: usize = 64;
const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_AUTO_APPROVE_AFTER: u64 = 3;
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const SUMMARY_MAX: usize = 300;
const APPROVALS_FILE: &str = "_approvals.json";

#[derive(Debug)]
enum Resolution {
    Approved { edits: Option<Value> },
    Rejected { reason: Option<String> },
    Expired,
}

struct PendingGate {
    tx: oneshot::Sender<Resolution>,
    gate: GateKind,
    skill: String,
    risk: Risk,
    expires_at_ms: u128,
}

/// A pending gate as listed for the chat surface.
#[derive(Debug, Clone)]
pub struct PendingGateInfo {
    pub gate_id: String,
    pub gate: GateKind,
    pub skill: String,
    pub risk: Risk,
    pub expires_at_ms: u128,
}

pub struct VerificationGates {
    dir: PathBuf,
    logger: Arc<ErrorLogger>,
    timeout_ms: u64,
    auto_approve_after: u64,
    pending: Arc<Mutex<HashMap<String, PendingGate>>>,
    history: Mutex<ApprovalHistory>,
    rules_global: Mutex<Vec<Arc<dyn Rule>>>,
    rules_skill: Mutex<HashMap<String, Vec<Arc<dyn Rule>>>>,
    events: broadcast::Sender<GateEvent>,
    shutdown_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for VerificationGates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationGates")
            .field("dir", &self.dir)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

impl VerificationGates {
    /// Open the audit-trail directory, load approval history, install the
    /// built-in rules, and start the expiry sweeper.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the approval
    /// file cannot be parsed.
    pub async fn open(dir: impl Into<PathBuf>, logger: Arc<ErrorLogger>) -> Result<Self, GateError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let approvals_path = dir.join(APPROVALS_FILE);
        let history = if approvals_path.exists() {
            let raw = tokio::fs::read_to_string(&approvals_path).await?;
            serde_json::from_str(&raw)?
        } else {
            ApprovalHistory::default()
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pending: Arc<Mutex<HashMap<String, PendingGate>>> =
            Arc::new(Mutex::new(HashMap::new()));

        spawn_sweeper(Arc::clone(&pending), shutdown_rx);

        let gates = Self {
            dir,
            logger,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            auto_approve_after: DEFAULT_AUTO_APPROVE_AFTER,
            pending,
            history: Mutex::new(history),
            rules_global: Mutex::new(vec![
                Arc::new(OutputPresent),
                Arc::new(NotErrorShaped),
                Arc::new(EchoesInput),
            ]),
            rules_skill: Mutex::new(HashMap::new()),
            events,
            shutdown_tx,
        };
        Ok(gates)
    }

    /// Approval wait bound in milliseconds. Default 120 000.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Identical approvals after which the plan gate auto-passes. Default 3.
    #[must_use]
    pub fn with_auto_approve_after(mut self, count: u64) -> Self {
        self.auto_approve_after = count;
        self
    }

    /// Append a global rule, applied to every skill.
    pub fn add_rule(&self, rule: Arc<dyn Rule>) {
        self.rules_global
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(rule);
    }

    /// Append a skill-scoped rule.
    pub fn add_skill_rule(&self, skill: &str, rule: Arc<dyn Rule>) {
        self.rules_skill
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(skill.to_string())
            .or_default()
            .push(rule);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.events.subscribe()
    }

    /// Pre-execution plan gate.
    ///
    /// Resolves skipped, auto-passed, cooldown-rejected, or suspends until
    /// external approval, rejection, or timeout.
    pub async fn plan_gate(
        &self,
        skill: &str,
        plan: &Plan,
        ctx: &GateContext,
    ) -> Result<GateResult, GateError> {
        let risk = ctx.risk.or(plan.risk).unwrap_or_default();
        let policy = GatePolicy::for_risk(risk);
        if !policy.gate1 {
            return Ok(GateResult::skipped());
        }

        let hash = plan_pattern_hash(skill, plan);
        let auto = {
            let history = self.lock_history();
            history.approval_count(&hash) >= self.auto_approve_after
        };
        if auto {
            let result = GateResult {
                gate_id: None,
                status: GateStatus::AutoPassed,
                reason: Some(format!("pattern {hash} approved {} times", self.auto_approve_after)),
                edits: None,
                checks: Vec::new(),
            };
            self.finish_plan_gate(skill, plan, ctx, risk, &policy, &result)
                .await?;
            return Ok(result);
        }

        if policy.cooldown_secs > 0
            && let Some(user) = &ctx.user_id
        {
            let key = cooldown_key(skill, user);
            let remaining = {
                let history = self.lock_history();
                history.cooldown_remaining(&key, time::epoch_secs(), policy.cooldown_secs)
            };
            if let Some(remaining) = remaining {
                let result = GateResult {
                    gate_id: None,
                    status: GateStatus::Rejected,
                    reason: Some(format!("Cooldown active: {remaining}s remaining")),
                    edits: None,
                    checks: Vec::new(),
                };
                self.finish_plan_gate(skill, plan, ctx, risk, &policy, &result)
                    .await?;
                return Ok(result);
            }
        }

        let gate_id = format!("gate1:{skill}:{}", time::epoch_nanos());
        let rx = self.insert_pending(&gate_id, GateKind::Gate1, skill, risk);
        let _ = self.events.send(GateEvent::Pending {
            gate_id: gate_id.clone(),
            gate: GateKind::Gate1,
            skill: skill.to_string(),
            risk,
            plan: serde_json::to_value(plan).ok(),
            output: None,
            checks: Vec::new(),
            failed_checks: Vec::new(),
            timeout_ms: self.timeout_ms,
        });

        let resolution = self.await_resolution(&gate_id, rx).await;
        let (status, reason, edits) = match resolution {
            Resolution::Approved { edits } => {
                {
                    let mut history = self.lock_history();
                    history.record_approval(&hash, time::now_iso());
                    if policy.cooldown_secs > 0
                        && let Some(user) = &ctx.user_id
                    {
                        history.touch_cooldown(cooldown_key(skill, user), time::epoch_secs());
                    }
                }
                self.persist_history().await?;
                if edits.is_some() {
                    (GateStatus::Edited, None, edits)
                } else {
                    (GateStatus::Approved, None, None)
                }
            }
            Resolution::Rejected { reason } => (GateStatus::Rejected, reason, None),
            Resolution::Expired => {
                (GateStatus::Expired, Some("Approval timed out".to_string()), None)
            }
        };

        let result = GateResult {
            gate_id: Some(gate_id),
            status,
            reason,
            edits,
            checks: Vec::new(),
        };
        self.finish_plan_gate(skill, plan, ctx, risk, &policy, &result)
            .await?;
        Ok(result)
    }

    /// Post-execution verify gate: run the rule union and apply the
    /// decision table.
    pub async fn verify_gate(
        &self,
        skill: &str,
        output: &Value,
        ctx: &GateContext,
    ) -> Result<GateResult, GateError> {
        let risk = ctx.risk.unwrap_or_default();
        let policy = GatePolicy::for_risk(risk);
        if !policy.gate2 {
            return Ok(GateResult::skipped());
        }

        let rules = self.rules_for(skill);
        let checks = run_rules(&rules, output, ctx);
        let failed: Vec<CheckRecord> = checks.iter().filter(|c| !c.pass).cloned().collect();
        let all_pass = failed.is_empty();

        if !all_pass {
            let _ = self.events.send(GateEvent::VerificationFailed {
                skill: skill.to_string(),
                checks: checks.clone(),
            });
        }

        let result = match (all_pass, risk) {
            (true, Risk::Medium) => GateResult {
                gate_id: None,
                status: GateStatus::AutoPassed,
                reason: None,
                edits: None,
                checks,
            },
            (false, Risk::Medium) => {
                let reasons: Vec<String> = failed
                    .iter()
                    .map(|c| c.reason.clone().unwrap_or_else(|| c.name.clone()))
                    .collect();
                let _ = self.events.send(GateEvent::VerificationRejected {
                    skill: skill.to_string(),
                    reasons: reasons.clone(),
                });
                GateResult {
                    gate_id: None,
                    status: GateStatus::Rejected,
                    reason: Some(reasons.join("; ")),
                    edits: None,
                    checks,
                }
            }
            // High and critical always wait for a human, pass or fail.
            (_, _) => {
                self.suspend_verify(skill, output, ctx, risk, checks, failed)
                    .await
            }
        };

        self.finish_verify_gate(skill, output, ctx, risk, &policy, &result)
            .await?;
        Ok(result)
    }

    /// Resolve a pending gate as approved, optionally with edits.
    /// Returns `false` when the gate is unknown or already resolved.
    pub fn approve(&self, gate_id: &str, edits: Option<Value>) -> bool {
        match self.take_pending(gate_id) {
            Some(gate) => gate.tx.send(Resolution::Approved { edits }).is_ok(),
            None => false,
        }
    }

    /// Resolve a pending gate as rejected.
    /// Returns `false` when the gate is unknown or already resolved.
    pub fn reject(&self, gate_id: &str, reason: Option<String>) -> bool {
        match self.take_pending(gate_id) {
            Some(gate) => gate.tx.send(Resolution::Rejected { reason }).is_ok(),
            None => false,
        }
    }

    /// Snapshot of the pending-gate index.
    #[must_use]
    pub fn pending_gates(&self) -> Vec<PendingGateInfo> {
        let pending = self.lock_pending();
        let mut gates: Vec<PendingGateInfo> = pending
            .iter()
            .map(|(id, gate)| PendingGateInfo {
                gate_id: id.clone(),
                gate: gate.gate,
                skill: gate.skill.clone(),
                risk: gate.risk,
                expires_at_ms: gate.expires_at_ms,
            })
            .collect();
        gates.sort_by(|a, b| a.gate_id.cmp(&b.gate_id));
        gates
    }

    /// Aggregate audit statistics over the last `days` day files.
    pub async fn stats(&self, days: u32) -> Result<GateStats, GateError> {
        let entries = read_audit(&self.dir, days).await?;
        Ok(GateStats::from_entries(&entries))
    }

    /// Cancel the sweeper and force-resolve every pending gate as rejected.
    pub fn destroy(&self) {
        let _ = self.shutdown_tx.send(true);
        let drained: Vec<PendingGate> = {
            let mut pending = self.lock_pending();
            pending.drain().map(|(_, gate)| gate).collect()
        };
        for gate in drained {
            let _ = gate.tx.send(Resolution::Rejected {
                reason: Some("System shutdown".to_string()),
            });
        }
    }

    async fn suspend_verify(
        &self,
        skill: &str,
        output: &Value,
        _ctx: &GateContext,
        risk: Risk,
        checks: Vec<CheckRecord>,
        failed: Vec<CheckRecord>,
    ) -> GateResult {
        let gate_id = format!("gate2:{skill}:{}", time::epoch_nanos());
        let rx = self.insert_pending(&gate_id, GateKind::Gate2, skill, risk);
        let _ = self.events.send(GateEvent::Pending {
            gate_id: gate_id.clone(),
            gate: GateKind::Gate2,
            skill: skill.to_string(),
            risk,
            plan: None,
            output: Some(output.clone()),
            checks: checks.clone(),
            failed_checks: failed,
            timeout_ms: self.timeout_ms,
        });

        let resolution = self.await_resolution(&gate_id, rx).await;
        let (status, reason, edits) = match resolution {
            Resolution::Approved { edits } => {
                if edits.is_some() {
                    (GateStatus::Edited, None, edits)
                } else {
                    (GateStatus::Approved, None, None)
                }
            }
            Resolution::Rejected { reason } => {
                let reasons = vec![reason.clone().unwrap_or_else(|| "Rejected".to_string())];
                let _ = self.events.send(GateEvent::VerificationRejected {
                    skill: skill.to_string(),
                    reasons,
                });
                (GateStatus::Rejected, reason, None)
            }
            Resolution::Expired => {
                (GateStatus::Expired, Some("Approval timed out".to_string()), None)
            }
        };

        GateResult {
            gate_id: Some(gate_id),
            status,
            reason,
            edits,
            checks,
        }
    }

    async fn finish_plan_gate(
        &self,
        skill: &str,
        plan: &Plan,
        ctx: &GateContext,
        risk: Risk,
        policy: &GatePolicy,
        result: &GateResult,
    ) -> Result<(), GateError> {
        if policy.audit {
            let summary = serde_json::to_string(plan).unwrap_or_default();
            append_audit(
                &self.dir,
                &AuditEntry {
                    timestamp: time::now_iso(),
                    gate: GateKind::Gate1,
                    skill: skill.to_string(),
                    status: result.status,
                    risk,
                    user_id: ctx.user_id.clone(),
                    plan: Some(text::truncate_chars(&summary, SUMMARY_MAX)),
                    output_summary: None,
                    checks: Vec::new(),
                },
            )
            .await?;
        }
        self.logger
            .record_gate_decision("gate1", skill, result.status.as_str(), risk)
            .await?;
        Ok(())
    }

    async fn finish_verify_gate(
        &self,
        skill: &str,
        output: &Value,
        ctx: &GateContext,
        risk: Risk,
        policy: &GatePolicy,
        result: &GateResult,
    ) -> Result<(), GateError> {
        if policy.audit {
            append_audit(
                &self.dir,
                &AuditEntry {
                    timestamp: time::now_iso(),
                    gate: GateKind::Gate2,
                    skill: skill.to_string(),
                    status: result.status,
                    risk,
                    user_id: ctx.user_id.clone(),
                    plan: None,
                    output_summary: Some(text::summarize_json(output, SUMMARY_MAX)),
                    checks: result.checks.clone(),
                },
            )
            .await?;
        }
        self.logger
            .record_gate_decision("gate2", skill, result.status.as_str(), risk)
            .await?;
        Ok(())
    }

    fn insert_pending(
        &self,
        gate_id: &str,
        gate: GateKind,
        skill: &str,
        risk: Risk,
    ) -> oneshot::Receiver<Resolution> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.lock_pending();
        pending.insert(
            gate_id.to_string(),
            PendingGate {
                tx,
                gate,
                skill: skill.to_string(),
                risk,
                expires_at_ms: time::epoch_ms() + u128::from(self.timeout_ms),
            },
        );
        rx
    }

    async fn await_resolution(
        &self,
        gate_id: &str,
        rx: oneshot::Receiver<Resolution>,
    ) -> Resolution {
        // The per-gate timer is authoritative; the sweeper is a safety net.
        match tokio::time::timeout(Duration::from_millis(self.timeout_ms), rx).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_)) | Err(_) => {
                self.take_pending(gate_id);
                Resolution::Expired
            }
        }
    }

    fn take_pending(&self, gate_id: &str) -> Option<PendingGate> {
        self.lock_pending().remove(gate_id)
    }

    fn rules_for(&self, skill: &str) -> Vec<Arc<dyn Rule>> {
        let mut rules = self
            .rules_global
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        let skill_rules = self
            .rules_skill
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(extra) = skill_rules.get(skill) {
            rules.extend(extra.iter().cloned());
        }
        rules
    }

    async fn persist_history(&self) -> Result<(), GateError> {
        let snapshot = {
            let history = self.lock_history();
            serde_json::to_string_pretty(&*history)?
        };
        tokio::fs::write(self.dir.join(APPROVALS_FILE), snapshot).await?;
        Ok(())
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingGate>> {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, ApprovalHistory> {
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn spawn_sweeper(
    pending: Arc<Mutex<HashMap<String, PendingGate>>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = time::epoch_ms();
                    let expired: Vec<PendingGate> = {
                        let mut pending = pending
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner);
                        let ids: Vec<String> = pending
                            .iter()
                            .filter(|(_, gate)| gate.expires_at_ms <= now)
                            .map(|(id, _)| id.clone())
                            .collect();
                        ids.into_iter().filter_map(|id| pending.remove(&id)).collect()
                    };
                    for gate in expired {
                        tracing::debug!(skill = %gate.skill, "sweeping expired gate");
                        let _ = gate.tx.send(Resolution::Expired);
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_gates() -> (tempfile::TempDir, Arc<VerificationGates>) {
        let dir = tempfile::tempdir().unwrap();
        let logger = Arc::new(
            ErrorLogger::open(dir.path().join("errors")).await.unwrap(),
        );
        let gates = VerificationGates::open(dir.path().join("audit-trail"), logger)
            .await
            .unwrap();
        (dir, Arc::new(gates))
    }

    fn approving_task(
        gates: &Arc<VerificationGates>,
        mut events: broadcast::Receiver<GateEvent>,
    ) -> tokio::task::JoinHandle<Option<String>> {
        let gates = Arc::clone(gates);
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if let GateEvent::Pending { gate_id, .. } = event {
                    gates.approve(&gate_id, None);
                    return Some(gate_id);
                }
            }
            None
        })
    }

    #[tokio::test]
    async fn low_risk_skips_both_gates_without_pending_entries() {
        let (_dir, gates) = test_gates().await;
        for risk in [Risk::None, Risk::Low] {
            let ctx = GateContext::with_risk(risk);
            let plan = gates
                .plan_gate("audit", &Plan::new("look around"), &ctx)
                .await
                .unwrap();
            assert_eq!(plan.status, GateStatus::Skipped);

            let verify = gates.verify_gate("audit", &json!({"ok": true}), &ctx).await.unwrap();
            assert_eq!(verify.status, GateStatus::Skipped);
        }
        assert!(gates.pending_gates().is_empty());
    }

    #[tokio::test]
    async fn plan_gate_approval_cycle_with_auto_promotion() {
        let (_dir, gates) = test_gates().await;
        let ctx = GateContext {
            user_id: Some("u1".into()),
            risk: Some(Risk::High),
            ..GateContext::default()
        };
        let plan = Plan::new("Deploy v2");

        for _ in 0..3 {
            let approver = approving_task(&gates, gates.subscribe());
            let result = gates.plan_gate("deploy", &plan, &ctx).await.unwrap();
            assert_eq!(result.status, GateStatus::Approved);
            assert!(approver.await.unwrap().is_some());
        }

        // Fourth dispatch: no gate-pending event, synchronous auto-pass.
        let mut events = gates.subscribe();
        let result = gates.plan_gate("deploy", &plan, &ctx).await.unwrap();
        assert_eq!(result.status, GateStatus::AutoPassed);
        assert!(result.gate_id.is_none());
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn plan_gate_rejection() {
        let (_dir, gates) = test_gates().await;
        let ctx = GateContext::with_risk(Risk::High);
        let mut events = gates.subscribe();

        let rejecter = {
            let gates = Arc::clone(&gates);
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    if let GateEvent::Pending { gate_id, .. } = event {
                        assert!(gates.reject(&gate_id, Some("too risky".into())));
                        // A second resolution attempt finds nothing.
                        assert!(!gates.approve(&gate_id, None));
                        break;
                    }
                }
            })
        };

        let result = gates
            .plan_gate("deploy", &Plan::new("Deploy v9"), &ctx)
            .await
            .unwrap();
        assert_eq!(result.status, GateStatus::Rejected);
        assert_eq!(result.reason.as_deref(), Some("too risky"));
        rejecter.await.unwrap();
    }

    #[tokio::test]
    async fn plan_gate_approval_with_edits_is_edited() {
        let (_dir, gates) = test_gates().await;
        let ctx = GateContext::with_risk(Risk::High);
        let mut events = gates.subscribe();

        let editor = {
            let gates = Arc::clone(&gates);
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    if let GateEvent::Pending { gate_id, .. } = event {
                        gates.approve(&gate_id, Some(json!({"steps": ["careful"]})));
                        break;
                    }
                }
            })
        };

        let result = gates
            .plan_gate("deploy", &Plan::new("Deploy v9"), &ctx)
            .await
            .unwrap();
        assert_eq!(result.status, GateStatus::Edited);
        assert_eq!(result.edits.unwrap()["steps"][0], "careful");
        editor.await.unwrap();
    }

    #[tokio::test]
    async fn plan_gate_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Arc::new(ErrorLogger::open(dir.path().join("errors")).await.unwrap());
        let gates = VerificationGates::open(dir.path().join("audit-trail"), logger)
            .await
            .unwrap()
            .with_timeout_ms(50);

        let result = gates
            .plan_gate(
                "deploy",
                &Plan::new("Deploy v9"),
                &GateContext::with_risk(Risk::High),
            )
            .await
            .unwrap();
        assert_eq!(result.status, GateStatus::Expired);
        assert!(gates.pending_gates().is_empty());
    }

    #[tokio::test]
    async fn critical_cooldown_rejects_with_remaining_seconds() {
        let (_dir, gates) = test_gates().await;
        let ctx = GateContext {
            user_id: Some("u1".into()),
            risk: Some(Risk::Critical),
            ..GateContext::default()
        };

        let approver = approving_task(&gates, gates.subscribe());
        let first = gates
            .plan_gate("transfer", &Plan::new("Send 1 ETH"), &ctx)
            .await
            .unwrap();
        assert_eq!(first.status, GateStatus::Approved);
        approver.await.unwrap();

        let second = gates
            .plan_gate("transfer", &Plan::new("Send 2 ETH"), &ctx)
            .await
            .unwrap();
        assert_eq!(second.status, GateStatus::Rejected);
        let reason = second.reason.unwrap();
        assert!(reason.starts_with("Cooldown active:"), "reason: {reason}");
        assert!(reason.ends_with("s remaining"));
    }

    #[tokio::test]
    async fn verify_gate_medium_auto_passes_clean_output() {
        let (_dir, gates) = test_gates().await;
        let result = gates
            .verify_gate(
                "audit",
                &json!({"status": "done"}),
                &GateContext::with_risk(Risk::Medium),
            )
            .await
            .unwrap();
        assert_eq!(result.status, GateStatus::AutoPassed);
        assert!(result.checks.iter().all(|c| c.pass));
    }

    struct RequireVersion;
    impl Rule for RequireVersion {
        fn name(&self) -> &str {
            "require-version"
        }
        fn description(&self) -> &str {
            "output.version must be a non-empty string"
        }
        fn check(&self, output: &Value, _ctx: &GateContext) -> anyhow::Result<CheckOutcome> {
            match output.get("version").and_then(Value::as_str) {
                Some(v) if !v.is_empty() => Ok(CheckOutcome::pass()),
                _ => Ok(CheckOutcome::fail("version missing or empty")),
            }
        }
    }

    #[tokio::test]
    async fn verify_gate_skill_rule_rejects_medium() {
        let (_dir, gates) = test_gates().await;
        gates.add_skill_rule("deploy", Arc::new(RequireVersion));
        let mut events = gates.subscribe();

        let result = gates
            .verify_gate(
                "deploy",
                &json!({"status": "deployed"}),
                &GateContext::with_risk(Risk::Medium),
            )
            .await
            .unwrap();
        assert_eq!(result.status, GateStatus::Rejected);
        let failing = result
            .checks
            .iter()
            .find(|c| c.name == "require-version")
            .unwrap();
        assert!(!failing.pass);
        assert!(result.reason.unwrap().contains("version"));

        assert_eq!(events.recv().await.unwrap().kind(), "verification-failed");
        assert_eq!(events.recv().await.unwrap().kind(), "verification-rejected");
    }

    #[tokio::test]
    async fn verify_gate_high_waits_even_when_clean() {
        let (_dir, gates) = test_gates().await;
        let approver = approving_task(&gates, gates.subscribe());

        let result = gates
            .verify_gate(
                "deploy",
                &json!({"status": "deployed", "version": "2.0"}),
                &GateContext::with_risk(Risk::High),
            )
            .await
            .unwrap();
        assert_eq!(result.status, GateStatus::Approved);
        let gate_id = approver.await.unwrap().unwrap();
        assert!(gate_id.starts_with("gate2:deploy:"));
    }

    #[tokio::test]
    async fn verify_gate_high_failure_emits_and_waits() {
        let (_dir, gates) = test_gates().await;
        let mut events = gates.subscribe();

        let resolver = {
            let gates = Arc::clone(&gates);
            tokio::spawn(async move {
                let mut saw_failed = false;
                while let Ok(event) = events.recv().await {
                    match event {
                        GateEvent::VerificationFailed { .. } => saw_failed = true,
                        GateEvent::Pending {
                            gate_id,
                            failed_checks,
                            ..
                        } => {
                            assert!(!failed_checks.is_empty());
                            gates.reject(&gate_id, Some("bad output".into()));
                            return saw_failed;
                        }
                        GateEvent::VerificationRejected { .. } => {}
                    }
                }
                false
            })
        };

        let result = gates
            .verify_gate(
                "deploy",
                &json!({"error": true}),
                &GateContext::with_risk(Risk::High),
            )
            .await
            .unwrap();
        assert_eq!(result.status, GateStatus::Rejected);
        assert!(resolver.await.unwrap());
    }

    #[tokio::test]
    async fn unknown_gate_resolution_returns_false() {
        let (_dir, gates) = test_gates().await;
        assert!(!gates.approve("gate1:ghost:123", None));
        assert!(!gates.reject("gate1:ghost:123", None));
    }

    #[tokio::test]
    async fn destroy_force_rejects_pending() {
        let (_dir, gates) = test_gates().await;
        let runner = {
            let gates = Arc::clone(&gates);
            tokio::spawn(async move {
                gates
                    .plan_gate(
                        "deploy",
                        &Plan::new("Deploy v9"),
                        &GateContext::with_risk(Risk::High),
                    )
                    .await
                    .unwrap()
            })
        };

        // Wait until the gate is registered, then shut down.
        loop {
            if !gates.pending_gates().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        gates.destroy();

        let result = runner.await.unwrap();
        assert_eq!(result.status, GateStatus::Rejected);
        assert_eq!(result.reason.as_deref(), Some("System shutdown"));
    }

    #[tokio::test]
    async fn audit_trail_written_for_high_tier() {
        let (_dir, gates) = test_gates().await;
        let approver = approving_task(&gates, gates.subscribe());
        gates
            .plan_gate(
                "deploy",
                &Plan::new("Deploy v2"),
                &GateContext {
                    user_id: Some("u1".into()),
                    risk: Some(Risk::High),
                    ..GateContext::default()
                },
            )
            .await
            .unwrap();
        approver.await.unwrap();

        let stats = gates.stats(1).await.unwrap();
        assert_eq!(stats.per_skill["deploy"].approved, 1);
        assert_eq!(stats.per_gate["gate1"].approved, 1);
    }

    #[tokio::test]
    async fn medium_tier_not_audited() {
        let (_dir, gates) = test_gates().await;
        gates
            .verify_gate(
                "audit",
                &json!({"status": "done"}),
                &GateContext::with_risk(Risk::Medium),
            )
            .await
            .unwrap();
        let stats = gates.stats(1).await.unwrap();
        assert!(stats.per_skill.is_empty());
    }

    #[tokio::test]
    async fn approval_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Arc::new(ErrorLogger::open(dir.path().join("errors")).await.unwrap());
        let audit_dir = dir.path().join("audit-trail");
        let plan = Plan::new("Deploy v2");
        let ctx = GateContext::with_risk(Risk::High);

        {
            let gates = Arc::new(
                VerificationGates::open(&audit_dir, Arc::clone(&logger))
                    .await
                    .unwrap()
                    .with_auto_approve_after(1),
            );
            let approver = approving_task(&gates, gates.subscribe());
            gates.plan_gate("deploy", &plan, &ctx).await.unwrap();
            approver.await.unwrap();
            gates.destroy();
        }

        let gates = VerificationGates::open(&audit_dir, logger)
            .await
            .unwrap()
            .with_auto_approve_after(1);
        let result = gates.plan_gate("deploy", &plan, &ctx).await.unwrap();
        assert_eq!(result.status, GateStatus::AutoPassed);
    }
}
