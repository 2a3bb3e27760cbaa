//! Output verification rules. Global rules apply to every skill;
//! skill-scoped rules are additive.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gate::GateContext;

/// What a rule reports about an output.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub pass: bool,
    pub reason: Option<String>,
}

impl CheckOutcome {
    #[must_use]
    pub fn pass() -> Self {
        Self {
            pass: true,
            reason: None,
        }
    }

    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            pass: false,
            reason: Some(reason.into()),
        }
    }
}

/// A named predicate over a skill's output.
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// # Errors
    ///
    /// An error is converted by the gate into a failed check, never
    /// propagated.
    fn check(&self, output: &Value, ctx: &GateContext) -> anyhow::Result<CheckOutcome>;
}

/// One evaluated rule, as it appears in gate results and audit entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecord {
    pub name: String,
    pub pass: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Evaluate rules in declaration order, converting a rule error into a
/// failed check.
#[must_use]
pub fn run_rules(rules: &[std::sync::Arc<dyn Rule>], output: &Value, ctx: &GateContext) -> Vec<CheckRecord> {
    rules
        .iter()
        .map(|rule| match rule.check(output, ctx) {
            Ok(outcome) => CheckRecord {
                name: rule.name().to_string(),
                pass: outcome.pass,
                reason: outcome.reason,
            },
            Err(e) => CheckRecord {
                name: rule.name().to_string(),
                pass: false,
                reason: Some(format!("Rule threw error: {e:#}")),
            },
        })
        .collect()
}

/// Built-in rule: output is non-nil.
pub struct OutputPresent;

impl Rule for OutputPresent {
    fn name(&self) -> &str {
        "output-present"
    }

    fn description(&self) -> &str {
        "output must not be empty"
    }

    fn check(&self, output: &Value, _ctx: &GateContext) -> anyhow::Result<CheckOutcome> {
        if output.is_null() {
            Ok(CheckOutcome::fail("output is empty"))
        } else {
            Ok(CheckOutcome::pass())
        }
    }
}

/// Built-in rule: output is not a structured error.
pub struct NotErrorShaped;

impl Rule for NotErrorShaped {
    fn name(&self) -> &str {
        "not-error-shaped"
    }

    fn description(&self) -> &str {
        "output must not carry an error marker"
    }

    fn check(&self, output: &Value, _ctx: &GateContext) -> anyhow::Result<CheckOutcome> {
        if output.get("error").and_then(Value::as_bool) == Some(true) {
            return Ok(CheckOutcome::fail("output carries error=true"));
        }
        if let Some(status) = output.get("status").and_then(Value::as_str)
            && matches!(status, "error" | "failed")
        {
            return Ok(CheckOutcome::fail(format!("output status is '{status}'")));
        }
        Ok(CheckOutcome::pass())
    }
}

/// Built-in rule: the output echoes at least one substantial token of the
/// input, when the original input is known.
pub struct EchoesInput;

impl Rule for EchoesInput {
    fn name(&self) -> &str {
        "echoes-input"
    }

    fn description(&self) -> &str {
        "output must reference the input"
    }

    fn check(&self, output: &Value, ctx: &GateContext) -> anyhow::Result<CheckOutcome> {
        let Some(input) = &ctx.original_input else {
            return Ok(CheckOutcome::pass());
        };

        let input_text = input.to_string().to_lowercase();
        let output_text = output.to_string().to_lowercase();

        let mut tokens = input_text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 4)
            .peekable();
        if tokens.peek().is_none() {
            return Ok(CheckOutcome::pass());
        }
        if tokens.any(|t| output_text.contains(t)) {
            Ok(CheckOutcome::pass())
        } else {
            Ok(CheckOutcome::fail("output does not reference the input"))
        }
    }
}
