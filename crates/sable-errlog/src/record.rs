//! Persisted outcome records, one JSON line per execution attempt.

use sable_core::Risk;
use serde::{Deserialize, Serialize};

/// Error family assigned by the classification cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Syntax,
    Logic,
    Api,
    Dependency,
    Timeout,
    Permission,
    Validation,
    Network,
    Unknown,
}

impl Classification {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Logic => "logic",
            Self::Api => "api",
            Self::Dependency => "dependency",
            Self::Timeout => "timeout",
            Self::Permission => "permission",
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a captured error. Ordering is by increasing severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Default severity for an execution wrapped at a given risk tier.
    #[must_use]
    pub fn from_risk(risk: Risk) -> Self {
        match risk {
            Risk::Critical => Self::Critical,
            Risk::High => Self::High,
            Risk::Medium => Self::Medium,
            Risk::Low | Risk::None => Self::Low,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a day file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeRecord {
    Error(ErrorRecord),
    Success(SuccessRecord),
    FixNote(FixNoteRecord),
    GateDecision(GateDecisionRecord),
}

impl OutcomeRecord {
    #[must_use]
    pub fn skill(&self) -> Option<&str> {
        match self {
            Self::Error(r) => Some(&r.skill),
            Self::Success(r) => Some(&r.skill),
            Self::FixNote(r) => Some(&r.skill),
            Self::GateDecision(r) => Some(&r.skill),
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> &str {
        match self {
            Self::Error(r) => &r.timestamp,
            Self::Success(r) => &r.timestamp,
            Self::FixNote(r) => &r.timestamp,
            Self::GateDecision(r) => &r.timestamp,
        }
    }

    #[must_use]
    pub fn as_error(&self) -> Option<&ErrorRecord> {
        match self {
            Self::Error(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub id: String,
    pub timestamp: String,
    pub classification: Classification,
    pub severity: Severity,
    pub skill: String,
    pub agent: String,
    pub message: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// 12-hex digest of the normalized stack. Two errors sharing a
    /// fingerprint share the same root-cause identity.
    pub fingerprint: String,
    pub input_summary: String,
    pub occurrence_count: u64,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessRecord {
    pub id: String,
    pub timestamp: String,
    pub skill: String,
    pub agent: String,
    pub duration_ms: u64,
    pub input_summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixNoteRecord {
    pub id: String,
    pub timestamp: String,
    pub skill: String,
    pub fingerprint: String,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecisionRecord {
    pub id: String,
    pub timestamp: String,
    pub gate: String,
    pub skill: String,
    pub status: String,
    pub risk: Risk,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tag_on_wire() {
        let record = OutcomeRecord::Success(SuccessRecord {
            id: "abc123def456".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            skill: "token-audit".into(),
            agent: "main".into(),
            duration_ms: 12,
            input_summary: "{}".into(),
        });
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"success\""));
    }

    #[test]
    fn fix_note_kind_is_snake_case() {
        let record = OutcomeRecord::FixNote(FixNoteRecord {
            id: "a".into(),
            timestamp: "t".into(),
            skill: "s".into(),
            fingerprint: "f".into(),
            note: "patched".into(),
        });
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"fix_note\""));
    }

    #[test]
    fn gate_decision_round_trip() {
        let record = OutcomeRecord::GateDecision(GateDecisionRecord {
            id: "a".into(),
            timestamp: "t".into(),
            gate: "gate1".into(),
            skill: "deploy".into(),
            status: "approved".into(),
            risk: Risk::High,
        });
        let json = serde_json::to_string(&record).unwrap();
        let back: OutcomeRecord = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, OutcomeRecord::GateDecision(r) if r.risk == Risk::High));
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_from_risk_mapping() {
        assert_eq!(Severity::from_risk(Risk::Critical), Severity::Critical);
        assert_eq!(Severity::from_risk(Risk::High), Severity::High);
        assert_eq!(Severity::from_risk(Risk::Medium), Severity::Medium);
        assert_eq!(Severity::from_risk(Risk::Low), Severity::Low);
        assert_eq!(Severity::from_risk(Risk::None), Severity::Low);
    }

    #[test]
    fn missing_stack_deserializes() {
        let json = r#"{"kind":"error","id":"a","timestamp":"t","classification":"logic",
            "severity":"medium","skill":"s","agent":"m","message":"boom","name":"TypeError",
            "fingerprint":"no-stack","input_summary":"{}","occurrence_count":1}"#;
        let record: OutcomeRecord = serde_json::from_str(json).unwrap();
        let err = record.as_error().unwrap();
        assert!(err.stack.is_none());
        assert!(err.metadata.is_null());
    }
}
