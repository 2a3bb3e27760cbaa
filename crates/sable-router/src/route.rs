//! Declarative skill bindings: patterns, priority, risk, and pre-checks.

use std::pin::Pin;
use std::sync::Arc;

use regex::Regex;
use sable_core::Risk;
use sable_errlog::Failure;
use serde_json::Value;

use crate::error::RouterError;

/// Canonical priority tiers. Lower sorts earlier.
pub mod priority {
    pub const CRITICAL: i32 = 0;
    pub const HIGH: i32 = 1;
    pub const NORMAL: i32 = 2;
    pub const LOW: i32 = 3;
    pub const FALLBACK: i32 = 99;
}

/// What a matched handler receives: the message, its capture groups, and
/// the routing context.
#[derive(Debug, Clone)]
pub struct SkillRequest {
    pub skill: String,
    pub agent: String,
    pub risk: Risk,
    pub message: String,
    /// Capture groups from the matching pattern, group 0 included.
    pub captures: Vec<Option<String>>,
    pub context: Value,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, Failure>> + Send>>;

/// An invokable unit of work bound to a route.
pub trait SkillHandler: Send + Sync {
    fn call(&self, request: SkillRequest) -> HandlerFuture;
}

/// A predicate evaluated before the handler runs.
pub trait PreCheck: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Returns the human-readable reason when the check does not pass.
    fn check(&self, request: &SkillRequest) -> Result<(), String>;
}

pub struct Route {
    pub name: String,
    pub(crate) patterns: Vec<Regex>,
    pub(crate) handler: Arc<dyn SkillHandler>,
    pub agent: String,
    pub priority: i32,
    pub risk: Risk,
    pub auto_execute: bool,
    pub(crate) pre_checks: Vec<Arc<dyn PreCheck>>,
    pub enabled: bool,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("risk", &self.risk)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl Route {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> RouteBuilder {
        RouteBuilder::new(name)
    }

    /// First pattern matching the message, with its captures.
    #[must_use]
    pub(crate) fn match_message(&self, message: &str) -> Option<Vec<Option<String>>> {
        for pattern in &self.patterns {
            if let Some(caps) = pattern.captures(message) {
                return Some(
                    caps.iter()
                        .map(|g| g.map(|m| m.as_str().to_string()))
                        .collect(),
                );
            }
        }
        None
    }
}

pub struct RouteBuilder {
    name: String,
    patterns: Vec<String>,
    aliases: Vec<String>,
    handler: Option<Arc<dyn SkillHandler>>,
    agent: String,
    priority: i32,
    risk: Risk,
    auto_execute: Option<bool>,
    pre_checks: Vec<Arc<dyn PreCheck>>,
}

impl RouteBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            patterns: Vec::new(),
            aliases: Vec::new(),
            handler: None,
            agent: "main".into(),
            priority: priority::NORMAL,
            risk: Risk::Low,
            auto_execute: None,
            pre_checks: Vec::new(),
        }
    }

    #[must_use]
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// A word alias, expanded into a case-insensitive word-boundary pattern.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn SkillHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    #[must_use]
    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn risk(mut self, risk: Risk) -> Self {
        self.risk = risk;
        self
    }

    #[must_use]
    pub fn auto_execute(mut self, auto: bool) -> Self {
        self.auto_execute = Some(auto);
        self
    }

    #[must_use]
    pub fn pre_check(mut self, check: Arc<dyn PreCheck>) -> Self {
        self.pre_checks.push(check);
        self
    }

    /// Compile patterns and finish the route.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern fails to compile or no handler was
    /// supplied.
    pub fn build(self) -> Result<Route, RouterError> {
        let mut patterns = Vec::with_capacity(self.patterns.len() + self.aliases.len());
        for raw in &self.patterns {
            patterns.push(Regex::new(raw)?);
        }
        for alias in &self.aliases {
            patterns.push(Regex::new(&format!(r"(?i)\b{}\b", regex::escape(alias)))?);
        }

        let handler = self.handler.ok_or_else(|| {
            RouterError::RouteNotFound(format!("route '{}' built without a handler", self.name))
        })?;

        // High-tier skills never run unattended unless explicitly allowed.
        let auto_execute = self
            .auto_execute
            .unwrap_or(!matches!(self.risk, Risk::High | Risk::Critical));

        Ok(Route {
            name: self.name,
            patterns,
            handler,
            agent: self.agent,
            priority: self.priority,
            risk: self.risk,
            auto_execute,
            pre_checks: self.pre_checks,
            enabled: true,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub struct EchoHandler;

    impl SkillHandler for EchoHandler {
        fn call(&self, request: SkillRequest) -> HandlerFuture {
            Box::pin(async move {
                Ok(serde_json::json!({
                    "skill": request.skill,
                    "message": request.message,
                }))
            })
        }
    }

    pub struct FailingHandler {
        pub name: &'static str,
        pub message: &'static str,
    }

    impl SkillHandler for FailingHandler {
        fn call(&self, _request: SkillRequest) -> HandlerFuture {
            let failure = Failure::new(self.name, self.message);
            Box::pin(async move { Err(failure) })
        }
    }
}
