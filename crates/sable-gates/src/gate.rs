//! Gate types: kinds, statuses, plans, and contexts.

use sable_core::Risk;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rules::CheckRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateKind {
    Gate1,
    Gate2,
}

impl GateKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gate1 => "gate1",
            Self::Gate2 => "gate2",
        }
    }
}

impl std::fmt::Display for GateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a gate dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Skipped,
    AutoPassed,
    Approved,
    Edited,
    Rejected,
    Expired,
}

impl GateStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::AutoPassed => "auto_passed",
            Self::Approved => "approved",
            Self::Edited => "edited",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    /// Whether execution may proceed under this status.
    #[must_use]
    pub fn allows_execution(self) -> bool {
        matches!(
            self,
            Self::Skipped | Self::AutoPassed | Self::Approved | Self::Edited
        )
    }
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the plan gate reviews before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<Risk>,
}

impl Plan {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            steps: None,
            rollback: None,
            risk: None,
        }
    }

    #[must_use]
    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = Some(steps);
        self
    }

    #[must_use]
    pub fn with_risk(mut self, risk: Risk) -> Self {
        self.risk = Some(risk);
        self
    }
}

/// Caller-supplied context for a gate dispatch.
#[derive(Debug, Clone, Default)]
pub struct GateContext {
    pub user_id: Option<String>,
    pub chat_id: Option<String>,
    pub risk: Option<Risk>,
    /// Input of the execution being verified; enables the echo rule.
    pub original_input: Option<Value>,
}

impl GateContext {
    #[must_use]
    pub fn with_risk(risk: Risk) -> Self {
        Self {
            risk: Some(risk),
            ..Self::default()
        }
    }
}

/// Resolution of a gate dispatch, returned to the caller.
#[derive(Debug, Clone)]
pub struct GateResult {
    pub gate_id: Option<String>,
    pub status: GateStatus,
    pub reason: Option<String>,
    pub edits: Option<Value>,
    pub checks: Vec<CheckRecord>,
}

impl GateResult {
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            gate_id: None,
            status: GateStatus::Skipped,
            reason: None,
            edits: None,
            checks: Vec::new(),
        }
    }

    #[must_use]
    pub fn allows_execution(&self) -> bool {
        self.status.allows_execution()
    }
}
