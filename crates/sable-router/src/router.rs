//! The `WorkflowRouter`: priority-ordered matching, the execution
//! pipeline, and parallel dispatch.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use sable_core::Risk;
use sable_errlog::{ErrorLogger, ErrorRecord, Failure, Severity};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::analytics::{AnalyticsSummary, RouteAnalytics, UnmatchedMessage};
use crate::error::RouterError;
use crate::events::RouterEvent;
use crate::middleware::Middleware;
use crate::route::{Route, SkillHandler, SkillRequest};

const EVENT_CAPACITY: usize = 64;
const NO_MATCH_ERROR: &str = "No matching route";

/// Typed outcome of a routed message.
#[derive(Debug)]
pub struct RouteOutcome {
    pub matched: bool,
    pub skill: Option<String>,
    pub ok: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub entry: Option<ErrorRecord>,
    pub duration_ms: u64,
}

impl RouteOutcome {
    fn no_match() -> Self {
        Self {
            matched: false,
            skill: None,
            ok: false,
            result: None,
            error: Some(NO_MATCH_ERROR.to_string()),
            entry: None,
            duration_ms: 0,
        }
    }

    fn pre_check_failure(skill: String, reason: String) -> Self {
        Self {
            matched: true,
            skill: Some(skill),
            ok: false,
            result: None,
            error: Some(format!("Pre-check failed: {reason}")),
            entry: None,
            duration_ms: 0,
        }
    }
}

/// Result map of a parallel dispatch, keyed deterministically by name.
#[derive(Debug, Default)]
pub struct ParallelDispatch {
    pub results: BTreeMap<String, Value>,
    pub errors: BTreeMap<String, String>,
}

struct MatchedRoute {
    name: String,
    agent: String,
    risk: Risk,
    handler: Arc<dyn SkillHandler>,
    pre_checks: Vec<Arc<dyn crate::route::PreCheck>>,
}

pub struct WorkflowRouter {
    logger: Arc<ErrorLogger>,
    routes: RwLock<Vec<Route>>,
    middleware_pre: Mutex<Vec<Arc<dyn Middleware>>>,
    middleware_post: Mutex<Vec<Arc<dyn Middleware>>>,
    fallback: Mutex<Option<Arc<dyn SkillHandler>>>,
    analytics: Mutex<RouteAnalytics>,
    events: broadcast::Sender<RouterEvent>,
}

impl std::fmt::Debug for WorkflowRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRouter")
            .field("routes", &self.route_names())
            .finish_non_exhaustive()
    }
}

impl WorkflowRouter {
    #[must_use]
    pub fn new(logger: Arc<ErrorLogger>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            logger,
            routes: RwLock::new(Vec::new()),
            middleware_pre: Mutex::new(Vec::new()),
            middleware_post: Mutex::new(Vec::new()),
            fallback: Mutex::new(None),
            analytics: Mutex::new(RouteAnalytics::default()),
            events,
        }
    }

    /// Add a route, keeping the list ordered by priority. Insertion order
    /// breaks ties.
    pub fn add_route(&self, route: Route) {
        let mut routes = self.lock_routes_mut();
        routes.push(route);
        routes.sort_by_key(|r| r.priority);
    }

    /// Enable or disable a route. Returns `false` for unknown names.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut routes = self.lock_routes_mut();
        match routes.iter_mut().find(|r| r.name == name) {
            Some(route) => {
                route.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn add_pre_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.middleware_pre
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(middleware);
    }

    pub fn add_post_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.middleware_post
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(middleware);
    }

    pub fn set_fallback(&self, handler: Arc<dyn SkillHandler>) {
        *self
            .fallback
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handler);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn route_names(&self) -> Vec<String> {
        self.lock_routes().iter().map(|r| r.name.clone()).collect()
    }

    /// Risk tier of a declared route.
    #[must_use]
    pub fn route_risk(&self, name: &str) -> Option<Risk> {
        self.lock_routes()
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.risk)
    }

    /// Route a message through the full pipeline:
    /// match → pre-middleware → pre-checks → handler (logger-wrapped) →
    /// analytics → post-middleware → event.
    ///
    /// # Errors
    ///
    /// Handler failures are recovered into the outcome; only filesystem
    /// failures from the logger propagate.
    pub async fn route(&self, message: &str, context: Value) -> Result<RouteOutcome, RouterError> {
        let trimmed = message.trim();

        let matched = self.find_match(trimmed);
        let Some((route, captures)) = matched else {
            self.lock_analytics().record_miss(trimmed);
            let _ = self.events.send(RouterEvent::NoMatch {
                message: trimmed.to_string(),
            });
            return self.run_fallback(trimmed, context).await;
        };

        self.lock_analytics().record_hit(&route.name);
        let _ = self.events.send(RouterEvent::Match {
            skill: route.name.clone(),
            message: trimmed.to_string(),
        });

        let request = SkillRequest {
            skill: route.name.clone(),
            agent: route.agent.clone(),
            risk: route.risk,
            message: trimmed.to_string(),
            captures,
            context,
        };

        // Pre middleware: an Err is a deliberate abort.
        for mw in self.pre_middleware() {
            if let Err(failure) = mw.before(&request).await {
                self.log_middleware_failure("middleware-pre", &failure).await?;
                return Ok(RouteOutcome::pre_check_failure(
                    route.name.clone(),
                    failure.message,
                ));
            }
        }

        for check in &route.pre_checks {
            if let Err(reason) = check.check(&request) {
                tracing::debug!(skill = %route.name, check = check.name(), "pre-check failed");
                return Ok(RouteOutcome::pre_check_failure(route.name.clone(), reason));
            }
        }

        let input = serde_json::json!({
            "message": request.message,
            "context": request.context,
        });
        let severity = Severity::from_risk(route.risk);
        let wrapped = self
            .logger
            .wrap_execution(
                &route.name,
                &route.agent,
                &input,
                Some(severity),
                route.handler.call(request),
            )
            .await?;

        self.lock_analytics()
            .record_execution(&route.name, wrapped.ok, wrapped.duration_ms);

        let outcome = RouteOutcome {
            matched: true,
            skill: Some(route.name.clone()),
            ok: wrapped.ok,
            result: wrapped.result,
            error: wrapped.error.map(|f| f.to_string()),
            entry: wrapped.entry,
            duration_ms: wrapped.duration_ms,
        };

        for mw in self.post_middleware() {
            if let Err(failure) = mw.after(&outcome).await {
                self.log_middleware_failure("middleware-post", &failure).await?;
            }
        }

        let event = if outcome.ok {
            RouterEvent::Success {
                skill: route.name.clone(),
                duration_ms: outcome.duration_ms,
            }
        } else if let Some(entry) = outcome.entry.clone() {
            RouterEvent::Error {
                skill: route.name,
                entry,
            }
        } else {
            RouterEvent::Success {
                skill: route.name,
                duration_ms: outcome.duration_ms,
            }
        };
        let _ = self.events.send(event);

        Ok(outcome)
    }

    /// Invoke a set of routes concurrently against a shared input.
    ///
    /// Unknown names produce a per-name error without aborting the others.
    pub async fn dispatch_parallel(
        &self,
        names: &[&str],
        input: Value,
    ) -> Result<ParallelDispatch, RouterError> {
        let mut dispatch = ParallelDispatch::default();
        let mut targets = Vec::new();
        {
            let routes = self.lock_routes();
            for &name in names {
                match routes.iter().find(|r| r.name == name) {
                    Some(route) => targets.push(MatchedRoute {
                        name: route.name.clone(),
                        agent: route.agent.clone(),
                        risk: route.risk,
                        handler: Arc::clone(&route.handler),
                        pre_checks: Vec::new(),
                    }),
                    None => {
                        dispatch
                            .errors
                            .insert(name.to_string(), format!("Unknown route: {name}"));
                    }
                }
            }
        }

        let tasks = targets.into_iter().map(|target| {
            let input = input.clone();
            async move {
                let request = SkillRequest {
                    skill: target.name.clone(),
                    agent: target.agent.clone(),
                    risk: target.risk,
                    message: String::new(),
                    captures: Vec::new(),
                    context: input.clone(),
                };
                let severity = Severity::from_risk(target.risk);
                let wrapped = self
                    .logger
                    .wrap_execution(
                        &target.name,
                        &target.agent,
                        &input,
                        Some(severity),
                        target.handler.call(request),
                    )
                    .await;
                (target.name, wrapped)
            }
        });

        for (name, wrapped) in futures::future::join_all(tasks).await {
            match wrapped {
                Ok(w) => {
                    self.lock_analytics()
                        .record_execution(&name, w.ok, w.duration_ms);
                    if w.ok {
                        dispatch
                            .results
                            .insert(name, w.result.unwrap_or(Value::Null));
                    } else {
                        let reason = w
                            .error
                            .map_or_else(|| "unknown failure".to_string(), |f| f.to_string());
                        dispatch.errors.insert(name, reason);
                    }
                }
                Err(e) => {
                    dispatch.errors.insert(name, e.to_string());
                }
            }
        }

        Ok(dispatch)
    }

    /// Per-route rollup plus the last five unmatched messages.
    #[must_use]
    pub fn summary(&self) -> AnalyticsSummary {
        let names = self.route_names();
        self.lock_analytics().summary(&names)
    }

    /// Full copy of the unmatched-message ring, oldest first.
    #[must_use]
    pub fn unmatched_messages(&self) -> Vec<UnmatchedMessage> {
        self.lock_analytics().unmatched()
    }

    fn find_match(&self, message: &str) -> Option<(MatchedRoute, Vec<Option<String>>)> {
        let routes = self.lock_routes();
        for route in routes.iter().filter(|r| r.enabled) {
            if let Some(captures) = route.match_message(message) {
                return Some((
                    MatchedRoute {
                        name: route.name.clone(),
                        agent: route.agent.clone(),
                        risk: route.risk,
                        handler: Arc::clone(&route.handler),
                        pre_checks: route.pre_checks.clone(),
                    },
                    captures,
                ));
            }
        }
        None
    }

    async fn run_fallback(
        &self,
        message: &str,
        context: Value,
    ) -> Result<RouteOutcome, RouterError> {
        let handler = {
            let fallback = self
                .fallback
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            fallback.clone()
        };
        let Some(handler) = handler else {
            return Ok(RouteOutcome::no_match());
        };

        let request = SkillRequest {
            skill: "fallback".to_string(),
            agent: "main".to_string(),
            risk: Risk::Low,
            message: message.to_string(),
            captures: Vec::new(),
            context,
        };
        let input = serde_json::json!({ "message": message });
        let wrapped = self
            .logger
            .wrap_execution("fallback", "main", &input, None, handler.call(request))
            .await?;

        Ok(RouteOutcome {
            matched: false,
            skill: None,
            ok: wrapped.ok,
            result: wrapped.result,
            error: wrapped.error.map(|f| f.to_string()),
            entry: wrapped.entry,
            duration_ms: wrapped.duration_ms,
        })
    }

    async fn log_middleware_failure(
        &self,
        pseudo_skill: &str,
        failure: &Failure,
    ) -> Result<(), RouterError> {
        self.logger
            .capture(pseudo_skill, "system", failure, &Value::Null, None, Value::Null)
            .await?;
        Ok(())
    }

    fn pre_middleware(&self) -> Vec<Arc<dyn Middleware>> {
        self.middleware_pre
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn post_middleware(&self) -> Vec<Arc<dyn Middleware>> {
        self.middleware_post
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn lock_routes(&self) -> std::sync::RwLockReadGuard<'_, Vec<Route>> {
        self.routes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_routes_mut(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Route>> {
        self.routes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_analytics(&self) -> std::sync::MutexGuard<'_, RouteAnalytics> {
        self.analytics
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
