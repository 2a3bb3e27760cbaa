//! Corrections, insights, proposals, and metrics snapshots.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A user-recorded correction of a skill's output. Never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    pub id: String,
    pub skill: String,
    pub original: Value,
    pub corrected: Value,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub context: Value,
    pub timestamp: String,
    pub pattern_hash: String,
}

/// Stable hash clustering semantically equivalent corrections: `md5_10`
/// over the skill name and the lowercased, trimmed reason.
#[must_use]
pub fn correction_pattern_hash(skill: &str, reason: &str) -> String {
    sable_core::hash::md5_10(&format!("{skill}:{}", reason.trim().to_lowercase()))
}

/// User feedback on a skill response. Negative feedback becomes an
/// anonymous correction.
#[derive(Debug, Clone)]
pub enum Feedback {
    Rating(u8),
    ThumbsUp,
    ThumbsDown,
}

impl Feedback {
    #[must_use]
    pub fn is_negative(&self) -> bool {
        match self {
            Self::Rating(score) => *score <= 2,
            Self::ThumbsDown => true,
            Self::ThumbsUp => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    ErrorPattern,
    CorrectionPattern,
    RiskAdjustment,
    NewRoute,
    Performance,
    UnusedRoute,
    AutoFix,
    SkillUpdate,
}

impl InsightType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ErrorPattern => "error_pattern",
            Self::CorrectionPattern => "correction_pattern",
            Self::RiskAdjustment => "risk_adjustment",
            Self::NewRoute => "new_route",
            Self::Performance => "performance",
            Self::UnusedRoute => "unused_route",
            Self::AutoFix => "auto_fix",
            Self::SkillUpdate => "skill_update",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightSeverity {
    Low,
    Medium,
    High,
}

/// A typed observation produced by one analysis cycle. Regenerated from
/// scratch each cycle, never authoritative across cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub severity: InsightSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
    Expired,
}

/// Ascending order sorts unknown last when listing descending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalSeverity {
    #[default]
    Unknown,
    Low,
    Medium,
    High,
}

impl From<InsightSeverity> for ProposalSeverity {
    fn from(severity: InsightSeverity) -> Self {
        match severity {
            InsightSeverity::Low => Self::Low,
            InsightSeverity::Medium => Self::Medium,
            InsightSeverity::High => Self::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AddErrorHandling,
    UpdateSkillLogic,
    AdjustRiskLevel,
    AddNewRoute,
    OptimizePerformance,
    ReviewUnusedRoute,
    ManualReview,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddErrorHandling => "add_error_handling",
            Self::UpdateSkillLogic => "update_skill_logic",
            Self::AdjustRiskLevel => "adjust_risk_level",
            Self::AddNewRoute => "add_new_route",
            Self::OptimizePerformance => "optimize_performance",
            Self::ReviewUnusedRoute => "review_unused_route",
            Self::ManualReview => "manual_review",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    Low,
    Medium,
    High,
    Unknown,
}

/// A structured suggestion tracked through an approval lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub insight_type: InsightType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    #[serde(default)]
    pub severity: ProposalSeverity,
    pub status: ProposalStatus,
    pub action: ActionKind,
    pub description: String,
    /// Human hint on how to carry the proposal out.
    pub implementation: String,
    pub effort: Effort,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// One periodic summary appended per analysis run; bounded ring of 90.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub insights: usize,
    pub proposals_pending: usize,
    pub corrections: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_routed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misses: Option<usize>,
}
