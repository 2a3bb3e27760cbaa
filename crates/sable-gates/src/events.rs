//! Gate lifecycle events consumed by the chat surface.

use sable_core::Risk;
use serde_json::Value;

use crate::gate::GateKind;
use crate::rules::CheckRecord;

#[derive(Debug, Clone)]
pub enum GateEvent {
    /// A gate is awaiting external resolution via `approve`/`reject`.
    Pending {
        gate_id: String,
        gate: GateKind,
        skill: String,
        risk: Risk,
        plan: Option<Value>,
        output: Option<Value>,
        checks: Vec<CheckRecord>,
        failed_checks: Vec<CheckRecord>,
        timeout_ms: u64,
    },
    /// One or more verify-gate checks failed.
    VerificationFailed {
        skill: String,
        checks: Vec<CheckRecord>,
    },
    /// A verify gate resolved rejected.
    VerificationRejected {
        skill: String,
        reasons: Vec<String>,
    },
}

impl GateEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pending { .. } => "gate-pending",
            Self::VerificationFailed { .. } => "verification-failed",
            Self::VerificationRejected { .. } => "verification-rejected",
        }
    }
}
