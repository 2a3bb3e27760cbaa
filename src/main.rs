use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use sable_autofix::AutoFixEngine;
use sable_core::Config;
use sable_errlog::{ErrorLogger, Failure};
use sable_gates::{GateContext, GateEvent, Plan, VerificationGates};
use sable_improve::{
    Feedback, LoopThresholds, ProposalFilter, ProposalStatus, SelfImprovementLoop, Trend,
};
use sable_llm::{AnyOracle, HttpOracle};
use sable_router::{
    HandlerFuture, Middleware, MiddlewareFuture, Route, SkillHandler, SkillRequest,
    WorkflowRouter, priority,
};

/// Plan-gate integration: a pre middleware that deliberately aborts the
/// pipeline when the plan gate does not allow execution.
struct PlanGateMiddleware {
    gates: Arc<VerificationGates>,
}

impl Middleware for PlanGateMiddleware {
    fn name(&self) -> &str {
        "plan-gate"
    }

    fn before<'a>(&'a self, request: &'a SkillRequest) -> MiddlewareFuture<'a> {
        Box::pin(async move {
            let plan = Plan::new(request.message.clone());
            let ctx = GateContext {
                user_id: Some("cli".to_string()),
                risk: Some(request.risk),
                ..GateContext::default()
            };
            let result = self
                .gates
                .plan_gate(&request.skill, &plan, &ctx)
                .await
                .map_err(|e| Failure::new("GateError", e.to_string()))?;
            if result.allows_execution() {
                Ok(())
            } else {
                let reason = result
                    .reason
                    .unwrap_or_else(|| format!("plan gate resolved {}", result.status));
                Err(Failure::new("PlanGateRejected", reason))
            }
        })
    }
}

struct PingHandler;

impl SkillHandler for PingHandler {
    fn call(&self, _request: SkillRequest) -> HandlerFuture {
        Box::pin(async { Ok(serde_json::json!({"reply": "pong"})) })
    }
}

struct EchoHandler;

impl SkillHandler for EchoHandler {
    fn call(&self, request: SkillRequest) -> HandlerFuture {
        Box::pin(async move {
            let text = request
                .captures
                .get(1)
                .and_then(Clone::clone)
                .unwrap_or_default();
            Ok(serde_json::json!({"reply": text}))
        })
    }
}

fn register_builtin_routes(router: &WorkflowRouter) -> anyhow::Result<()> {
    router.add_route(
        Route::builder("ping")
            .pattern(r"(?i)^ping$")
            .priority(priority::HIGH)
            .handler(Arc::new(PingHandler))
            .build()?,
    );
    router.add_route(
        Route::builder("echo")
            .pattern(r"(?i)^echo\s+(.+)$")
            .priority(priority::LOW)
            .handler(Arc::new(EchoHandler))
            .build()?,
    );
    Ok(())
}

fn create_oracle(config: &Config) -> Option<AnyOracle> {
    let oracle = config.oracle.as_ref()?;
    let mut http = HttpOracle::new(&oracle.base_url, &oracle.model, oracle.max_tokens);
    if let Some(env_name) = &oracle.api_key_env
        && let Ok(key) = std::env::var(env_name)
    {
        http = http.with_api_key(key);
    }
    Some(AnyOracle::Http(http))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load(Path::new("config/default.toml"))?;
    config.validate()?;
    let data_dir = config.data_dir();

    let logger = Arc::new(
        ErrorLogger::open(data_dir.join("errors"))
            .await?
            .with_occurrence_threshold(config.logger.occurrence_threshold),
    );
    let gates = Arc::new(
        VerificationGates::open(data_dir.join("audit-trail"), Arc::clone(&logger))
            .await?
            .with_timeout_ms(config.gates.approval_timeout_secs * 1_000)
            .with_auto_approve_after(config.gates.auto_approve_after),
    );
    let router = Arc::new(WorkflowRouter::new(Arc::clone(&logger)));
    register_builtin_routes(&router)?;
    router.add_pre_middleware(Arc::new(PlanGateMiddleware {
        gates: Arc::clone(&gates),
    }));

    let improvement = Arc::new(
        SelfImprovementLoop::open(data_dir.join("improvement-data"), Arc::clone(&logger))
            .await?
            .with_router(Arc::clone(&router))
            .with_gates(Arc::clone(&gates))
            .with_thresholds(LoopThresholds {
                error_threshold: config.improvement.error_threshold,
                correction_threshold: config.improvement.correction_threshold,
                rejection_threshold: config.improvement.rejection_threshold,
                miss_threshold: config.improvement.miss_threshold,
                ..LoopThresholds::default()
            }),
    );

    let engine: AutoFixEngine<AnyOracle> = AutoFixEngine::open(
        data_dir.join("autofix-data"),
        &config.autofix.skills_dir,
        Arc::clone(&logger),
        Arc::clone(&improvement),
    )
    .await?
    .with_test_timeout(Duration::from_secs(config.autofix.test_timeout_secs));
    let engine = Arc::new(match create_oracle(&config) {
        Some(oracle) => engine.with_oracle(oracle),
        None => {
            tracing::info!("no oracle configured, template fixes only");
            engine
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    spawn_gate_prompt_printer(&gates);
    spawn_analysis_schedule(&config, &improvement, shutdown_rx.clone());

    println!("sable v{}", env!("CARGO_PKG_VERSION"));
    run_cli(&router, &gates, &improvement, &engine, shutdown_rx).await;

    gates.destroy();
    Ok(())
}

/// Surface pending gates on stdout so the operator can approve or reject.
fn spawn_gate_prompt_printer(gates: &Arc<VerificationGates>) {
    let mut events = gates.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                GateEvent::Pending {
                    gate_id,
                    gate,
                    skill,
                    risk,
                    ..
                } => {
                    println!(
                        "[{gate}] approval needed for '{skill}' (risk {risk})\n  \
                         /approve {gate_id}\n  /reject {gate_id} [reason]"
                    );
                }
                GateEvent::VerificationFailed { skill, checks } => {
                    let failed: Vec<&str> = checks
                        .iter()
                        .filter(|c| !c.pass)
                        .map(|c| c.name.as_str())
                        .collect();
                    println!("[verify] checks failed for '{skill}': {}", failed.join(", "));
                }
                GateEvent::VerificationRejected { skill, reasons } => {
                    println!("[verify] '{skill}' rejected: {}", reasons.join("; "));
                }
            }
        }
    });
}

fn spawn_analysis_schedule(
    config: &Config,
    improvement: &Arc<SelfImprovementLoop>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let interval_secs = config.improvement.analysis_interval_secs;
    if interval_secs == 0 {
        return;
    }
    let lookback_days = config.logger.lookback_days;
    let improvement = Arc::clone(improvement);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.tick().await; // consume the immediate first tick
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match improvement.analyze(lookback_days).await {
                        Ok(insights) => {
                            tracing::info!("scheduled analysis: {} insight(s)", insights.len());
                            if let Err(e) = improvement.generate_proposals().await {
                                tracing::warn!("proposal generation failed: {e:#}");
                            }
                        }
                        Err(e) => tracing::warn!("scheduled analysis failed: {e:#}"),
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

async fn read_line() -> anyhow::Result<Option<String>> {
    let line = tokio::task::spawn_blocking(|| {
        use std::io::{BufRead, Write};
        let stdin = std::io::stdin();
        let mut reader = stdin.lock();
        let mut buf = String::new();

        print!("> ");
        std::io::stdout().flush()?;

        match reader.read_line(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf)),
            Err(e) => Err(anyhow::anyhow!(e)),
        }
    })
    .await??;
    Ok(line)
}

/// Route a free-text message, then run the verify gate over its output.
fn dispatch_message(
    router: &Arc<WorkflowRouter>,
    gates: &Arc<VerificationGates>,
    message: String,
) {
    let router = Arc::clone(router);
    let gates = Arc::clone(gates);
    // Spawned so the prompt stays responsive while a gate waits.
    tokio::spawn(async move {
        match router.route(&message, serde_json::Value::Null).await {
            Ok(outcome) => {
                if outcome.ok
                    && let (Some(skill), Some(result)) =
                        (outcome.skill.as_deref(), outcome.result.as_ref())
                {
                    let risk = router.route_risk(skill).unwrap_or_default();
                    let ctx = GateContext {
                        user_id: Some("cli".to_string()),
                        risk: Some(risk),
                        original_input: Some(serde_json::json!({"message": message})),
                        ..GateContext::default()
                    };
                    match gates.verify_gate(skill, result, &ctx).await {
                        Ok(verify) if verify.allows_execution() => println!("{result}"),
                        Ok(verify) => {
                            println!("output withheld: verify gate {}", verify.status);
                        }
                        Err(e) => println!("verify error: {e}"),
                    }
                } else if let Some(error) = outcome.error {
                    println!("{error}");
                }
            }
            Err(e) => println!("route error: {e}"),
        }
    });
}

#[allow(clippy::too_many_lines)]
async fn run_cli(
    router: &Arc<WorkflowRouter>,
    gates: &Arc<VerificationGates>,
    improvement: &Arc<SelfImprovementLoop>,
    engine: &Arc<AutoFixEngine<AnyOracle>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let line = tokio::select! {
            line = read_line() => line,
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("stdin error: {e:#}");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "exit" || trimmed == "quit" {
            break;
        }

        let mut parts = trimmed.split_whitespace();
        match parts.next() {
            Some("/gates") => {
                let pending = gates.pending_gates();
                if pending.is_empty() {
                    println!("no pending gates");
                }
                for gate in pending {
                    println!(
                        "{} {} '{}' risk {}",
                        gate.gate_id, gate.gate, gate.skill, gate.risk
                    );
                }
            }
            Some("/approve") => {
                let Some(id) = parts.next() else {
                    println!("usage: /approve <gate-id>");
                    continue;
                };
                println!("approve {} -> {}", id, gates.approve(id, None));
            }
            Some("/reject") => {
                let Some(id) = parts.next() else {
                    println!("usage: /reject <gate-id> [reason]");
                    continue;
                };
                let reason: String = parts.collect::<Vec<&str>>().join(" ");
                let reason = (!reason.is_empty()).then_some(reason);
                println!("reject {} -> {}", id, gates.reject(id, reason));
            }
            Some("/proposals") => {
                let pending = improvement.proposals(&ProposalFilter {
                    status: Some(ProposalStatus::Pending),
                    ..ProposalFilter::default()
                });
                if pending.is_empty() {
                    println!("no pending proposals");
                }
                for proposal in pending {
                    println!(
                        "{} [{}] {} — {}",
                        proposal.id,
                        proposal.action.as_str(),
                        proposal.insight_type.as_str(),
                        proposal.description
                    );
                }
            }
            Some("/correct") => {
                let Some(skill) = parts.next() else {
                    println!("usage: /correct <skill> <reason>");
                    continue;
                };
                let reason: String = parts.collect::<Vec<&str>>().join(" ");
                if reason.is_empty() {
                    println!("usage: /correct <skill> <reason>");
                    continue;
                }
                match improvement
                    .record_correction(
                        skill,
                        serde_json::Value::Null,
                        serde_json::Value::Null,
                        &reason,
                        serde_json::json!({"source": "cli"}),
                    )
                    .await
                {
                    Ok((correction, proposal)) => {
                        println!("recorded correction {}", correction.id);
                        if let Some(proposal) = proposal {
                            println!("raised proposal {}", proposal.id);
                        }
                    }
                    Err(e) => println!("error: {e}"),
                }
            }
            Some("/feedback") => {
                let Some(skill) = parts.next() else {
                    println!("usage: /feedback <skill> <1-5|down> [comment]");
                    continue;
                };
                let feedback = match parts.next() {
                    Some("down") => Feedback::ThumbsDown,
                    Some(raw) => match raw.parse::<u8>() {
                        Ok(score) => Feedback::Rating(score),
                        Err(_) => {
                            println!("usage: /feedback <skill> <1-5|down> [comment]");
                            continue;
                        }
                    },
                    None => {
                        println!("usage: /feedback <skill> <1-5|down> [comment]");
                        continue;
                    }
                };
                let comment: String = parts.collect::<Vec<&str>>().join(" ");
                match improvement
                    .record_feedback(Some(skill), feedback, &comment)
                    .await
                {
                    Ok(Some(correction)) => println!("recorded as correction {}", correction.id),
                    Ok(None) => println!("noted"),
                    Err(e) => println!("error: {e}"),
                }
            }
            Some("/analyze") => match improvement.analyze(7).await {
                Ok(insights) => {
                    println!("{} insight(s)", insights.len());
                    match improvement.generate_proposals().await {
                        Ok(proposals) => println!("{} new proposal(s)", proposals.len()),
                        Err(e) => println!("error: {e}"),
                    }
                }
                Err(e) => println!("error: {e}"),
            },
            Some("/autofix") => {
                let Some(id) = parts.next() else {
                    println!("usage: /autofix <proposal-id>");
                    continue;
                };
                let id = id.to_string();
                let engine = Arc::clone(engine);
                let improvement = Arc::clone(improvement);
                tokio::spawn(async move {
                    match improvement.approve_proposal(&id).await {
                        Ok(_) => match engine.generate_fix(&id).await {
                            Ok(fix) => println!(
                                "fix {} is {}\n{}\n  /fix approve {}  then  /fix apply {}",
                                fix.id, fix.status, fix.diff, fix.id, fix.id
                            ),
                            Err(e) => println!("error: {e}"),
                        },
                        Err(e) => println!("error: {e}"),
                    }
                });
            }
            Some("/fix") => {
                let (Some(verb), Some(id)) = (parts.next(), parts.next()) else {
                    println!("usage: /fix <approve|reject|apply> <fix-id>");
                    continue;
                };
                let id = id.to_string();
                let verb = verb.to_string();
                let engine = Arc::clone(engine);
                tokio::spawn(async move {
                    let result = match verb.as_str() {
                        "approve" => engine.approve_fix(&id).await,
                        "reject" => engine.reject_fix(&id).await,
                        "apply" => engine.apply_fix(&id).await,
                        _ => {
                            println!("usage: /fix <approve|reject|apply> <fix-id>");
                            return;
                        }
                    };
                    match result {
                        Ok(fix) => println!("fix {} is now {}", fix.id, fix.status),
                        Err(e) => println!("error: {e}"),
                    }
                });
            }
            Some("/trend") => {
                let trend = match improvement.trend() {
                    Trend::Improving => "improving",
                    Trend::Stable => "stable",
                    Trend::Degrading => "degrading",
                };
                println!("error-rate trend: {trend}");
            }
            Some("/status") => {
                let summary = router.summary();
                for route in &summary.routes {
                    println!(
                        "{}: {} hits, {} executions, {:.1}% ok, {}ms avg",
                        route.name,
                        route.hits,
                        route.executions,
                        route.success_rate,
                        route.avg_duration_ms
                    );
                }
                println!("recent unmatched: {}", summary.recent_unmatched.len());
            }
            _ => dispatch_message(router, gates, trimmed.to_string()),
        }
    }
}
