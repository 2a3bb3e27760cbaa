//! End-to-end flows across the observe/learn/gate core.

use std::sync::Arc;

use serde_json::{Value, json};

use sable_autofix::{AutoFixEngine, FixStatus};
use sable_core::Risk;
use sable_errlog::{ErrorLogger, Failure};
use sable_gates::{GateContext, GateEvent, GateStatus, Plan, VerificationGates};
use sable_improve::{
    ActionKind, InsightType, LoopThresholds, ProposalFilter, ProposalStatus, SelfImprovementLoop,
};
use sable_llm::AnyOracle;
use sable_router::{HandlerFuture, Route, SkillHandler, SkillRequest, WorkflowRouter};

struct FlakyNetworkHandler;

impl SkillHandler for FlakyNetworkHandler {
    fn call(&self, _request: SkillRequest) -> HandlerFuture {
        Box::pin(async {
            Err(Failure::new("Error", "connect ECONNREFUSED 127.0.0.1:8545").with_stack(
                "Error: connect ECONNREFUSED 127.0.0.1:8545\n\
                 at fetchChain (/srv/bot/skills/token-audit/index.js:31:9)\n\
                 at run (/srv/bot/skills/token-audit/index.js:12:3)",
            ))
        })
    }
}

/// The offline loop end to end: repeated failures become a recurring
/// fingerprint, analysis raises an insight, proposal generation raises a
/// pending proposal, and a deployed auto-fix closes the loop by clearing
/// the counter.
#[tokio::test]
async fn error_to_deployed_fix_closes_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let logger = Arc::new(ErrorLogger::open(dir.path().join("errors")).await.unwrap());
    let router = Arc::new(WorkflowRouter::new(Arc::clone(&logger)));
    router.add_route(
        Route::builder("token-audit")
            .pattern(r"(?i)^audit\s+")
            .handler(Arc::new(FlakyNetworkHandler))
            .build()
            .unwrap(),
    );

    for i in 0..4 {
        let outcome = router
            .route(&format!("audit token {i}"), Value::Null)
            .await
            .unwrap();
        assert!(outcome.matched);
        assert!(!outcome.ok);
    }

    // One root-cause family, counted four times.
    let recurring = logger.recurring(10).await.unwrap();
    assert_eq!(recurring.len(), 1);
    assert_eq!(recurring[0].count, 4);
    let fingerprint = recurring[0].fingerprint.clone();

    let improvement = Arc::new(
        SelfImprovementLoop::open(dir.path().join("improvement-data"), Arc::clone(&logger))
            .await
            .unwrap()
            .with_router(Arc::clone(&router)),
    );

    let insights = improvement.analyze(1).await.unwrap();
    let pattern = insights
        .iter()
        .find(|i| i.insight_type == InsightType::ErrorPattern)
        .expect("recurring error should surface an insight");
    assert_eq!(pattern.skill.as_deref(), Some("token-audit"));
    assert_eq!(pattern.data["fingerprint"], fingerprint);

    let proposals = improvement.generate_proposals().await.unwrap();
    let proposal = proposals
        .iter()
        .find(|p| p.action == ActionKind::AddErrorHandling)
        .expect("error pattern should become an add_error_handling proposal");

    // At most one pending proposal per (insight_type, skill).
    improvement.analyze(1).await.unwrap();
    improvement.generate_proposals().await.unwrap();
    let pending = improvement.proposals(&ProposalFilter {
        status: Some(ProposalStatus::Pending),
        skill: Some("token-audit".to_string()),
        ..ProposalFilter::default()
    });
    assert_eq!(
        pending
            .iter()
            .filter(|p| p.insight_type == InsightType::ErrorPattern)
            .count(),
        1
    );

    improvement.approve_proposal(&proposal.id).await.unwrap();

    // Skills directory with a patchable source, no test file.
    let skills_dir = dir.path().join("skills");
    let skill_dir = skills_dir.join("token-audit");
    std::fs::create_dir_all(&skill_dir).unwrap();
    std::fs::write(
        skill_dir.join("index.js"),
        "const axios = require('axios');\n\nasync function run(input) {\n  return axios.get(input.url);\n}\n\nmodule.exports = { run };\n",
    )
    .unwrap();

    let engine: AutoFixEngine<AnyOracle> = AutoFixEngine::open(
        dir.path().join("autofix-data"),
        &skills_dir,
        Arc::clone(&logger),
        Arc::clone(&improvement),
    )
    .await
    .unwrap();

    let fix = engine.generate_fix(&proposal.id).await.unwrap();
    assert_eq!(fix.status, FixStatus::Ready);
    // Template path: network classification injects the retry helper.
    assert!(fix.fixed_code.contains("[AUTO-FIX] retry helper"));

    engine.approve_fix(&fix.id).await.unwrap();
    let deployed = engine.apply_fix(&fix.id).await.unwrap();
    assert_eq!(deployed.status, FixStatus::Deployed);

    // Loop closed: proposal applied, fingerprint counter cleared.
    assert_eq!(
        improvement.proposal(&proposal.id).unwrap().status,
        ProposalStatus::Applied
    );
    assert_eq!(logger.occurrence_count(&fingerprint), 0);
}

/// Unmatched traffic becomes a new-route proposal.
#[tokio::test]
async fn unmatched_messages_propose_a_new_route() {
    let dir = tempfile::tempdir().unwrap();
    let logger = Arc::new(ErrorLogger::open(dir.path().join("errors")).await.unwrap());
    let router = Arc::new(WorkflowRouter::new(Arc::clone(&logger)));

    for i in 0..5 {
        let outcome = router
            .route(&format!("price check BTC{i}"), Value::Null)
            .await
            .unwrap();
        assert!(!outcome.matched);
    }

    let improvement = SelfImprovementLoop::open(
        dir.path().join("improvement-data"),
        Arc::clone(&logger),
    )
    .await
    .unwrap()
    .with_router(Arc::clone(&router));

    let insights = improvement.analyze(1).await.unwrap();
    let new_route = insights
        .iter()
        .find(|i| i.insight_type == InsightType::NewRoute)
        .expect("five similar misses should cluster");
    assert_eq!(new_route.data["representative"], "price check BTC0");
    let pattern = new_route.data["suggested_pattern"].as_str().unwrap();
    assert!(pattern.contains("price"));
    assert!(pattern.contains("check"));
    assert!(pattern.contains(".*"));
}

/// The plan gate learns: three approvals of the same plan, then synchronous
/// auto-pass, with the approval history driving gate statistics.
#[tokio::test]
async fn plan_gate_cycle_feeds_gate_stats() {
    let dir = tempfile::tempdir().unwrap();
    let logger = Arc::new(ErrorLogger::open(dir.path().join("errors")).await.unwrap());
    let gates = Arc::new(
        VerificationGates::open(dir.path().join("audit-trail"), Arc::clone(&logger))
            .await
            .unwrap(),
    );

    let ctx = GateContext {
        user_id: Some("u1".to_string()),
        risk: Some(Risk::High),
        ..GateContext::default()
    };
    let plan = Plan::new("Deploy v2").with_steps(vec!["build".into(), "release".into()]);

    for _ in 0..3 {
        let approver = {
            let gates = Arc::clone(&gates);
            let mut events = gates.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    if let GateEvent::Pending { gate_id, .. } = event {
                        assert!(gates.approve(&gate_id, None));
                        break;
                    }
                }
            })
        };
        let result = gates.plan_gate("deploy", &plan, &ctx).await.unwrap();
        assert_eq!(result.status, GateStatus::Approved);
        approver.await.unwrap();
    }

    let result = gates.plan_gate("deploy", &plan, &ctx).await.unwrap();
    assert_eq!(result.status, GateStatus::AutoPassed);

    // Audited tier: the decisions are visible in gate statistics.
    let stats = gates.stats(1).await.unwrap();
    let deploy = &stats.per_skill["deploy"];
    assert_eq!(deploy.approved, 3);
    assert_eq!(deploy.auto, 1);
    assert_eq!(deploy.rejected, 0);
    // Four clean resolutions is not yet a candidate; five are needed.
    assert!(stats.auto_approval_candidates.is_empty());

    gates.destroy();
}

/// Verify-gate rejection under medium risk: structured-error output fails
/// the built-in rules without waiting for a human.
#[tokio::test]
async fn verify_gate_rejects_structured_error_output() {
    let dir = tempfile::tempdir().unwrap();
    let logger = Arc::new(ErrorLogger::open(dir.path().join("errors")).await.unwrap());
    let gates = VerificationGates::open(dir.path().join("audit-trail"), Arc::clone(&logger))
        .await
        .unwrap();

    let result = gates
        .verify_gate(
            "token-audit",
            &json!({"status": "failed"}),
            &GateContext::with_risk(Risk::Medium),
        )
        .await
        .unwrap();
    assert_eq!(result.status, GateStatus::Rejected);
    assert!(result.checks.iter().any(|c| !c.pass));

    gates.destroy();
}
