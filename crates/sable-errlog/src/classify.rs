//! Deterministic error classification and severity inference.

use crate::record::{Classification, Severity};

/// Skill-name fragments that force critical severity: a failure while
/// moving value or destroying state is never routine.
const DESTRUCTIVE_SKILLS: &[&str] = &["deploy", "delete", "transfer", "swap", "send"];

/// Classify an error by name and message.
///
/// The cascade order is load-bearing: the logic tier is checked before
/// dependency so `TypeError("x is not a function")` resolves to logic.
#[must_use]
pub fn classify(name: &str, message: &str) -> Classification {
    let msg = message.to_lowercase();

    if name == "SyntaxError" || msg.contains("unexpected token") {
        return Classification::Syntax;
    }
    if msg.contains("econnrefused")
        || msg.contains("enotfound")
        || msg.contains("fetch failed")
        || msg.contains("network")
    {
        return Classification::Network;
    }
    if msg.contains("timeout") || msg.contains("etimedout") || msg.contains("deadline") {
        return Classification::Timeout;
    }
    if msg.contains("401")
        || msg.contains("403")
        || msg.contains("unauthorized")
        || msg.contains("permission")
    {
        return Classification::Permission;
    }
    if msg.contains("404")
        || msg.contains("429")
        || msg.contains("500")
        || msg.contains("api")
        || msg.contains("rate limit")
    {
        return Classification::Api;
    }
    if name == "TypeError" || name == "ReferenceError" || name == "RangeError" {
        return Classification::Logic;
    }
    if msg.contains("cannot find module")
        || msg.contains("module not found")
        || msg.contains("is not a function")
    {
        return Classification::Dependency;
    }
    if msg.contains("invalid")
        || msg.contains("required")
        || msg.contains("expected")
        || msg.contains("must be")
    {
        return Classification::Validation;
    }
    Classification::Unknown
}

/// Infer severity from the skill name and classification.
/// An explicit caller-supplied severity always wins over this.
#[must_use]
pub fn infer_severity(skill: &str, classification: Classification) -> Severity {
    let skill_lower = skill.to_lowercase();
    if DESTRUCTIVE_SKILLS.iter().any(|s| skill_lower.contains(s)) {
        return Severity::Critical;
    }
    match classification {
        Classification::Api | Classification::Network | Classification::Permission => {
            Severity::High
        }
        Classification::Logic | Classification::Validation => Severity::Medium,
        _ => Severity::Low,
    }
}
