//! Fix records, persisted to `autofix-data/fixes.json`.

use serde::{Deserialize, Serialize};

/// Status is monotonic except for `applying → rolled_back` on test failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixStatus {
    Generating,
    Ready,
    Approved,
    Applying,
    Testing,
    Deployed,
    Failed,
    RolledBack,
    Rejected,
}

impl FixStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Ready => "ready",
            Self::Approved => "approved",
            Self::Applying => "applying",
            Self::Testing => "testing",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for FixStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub passed: bool,
    pub output: String,
    /// No test file was found; treated as a pass with this annotation.
    #[serde(default)]
    pub skipped: bool,
}

/// A concrete source patch shepherded through the apply pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fix {
    pub id: String,
    pub proposal_id: String,
    pub skill: String,
    pub status: FixStatus,
    pub source_file: String,
    pub original_code: String,
    pub fixed_code: String,
    pub diff: String,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<TestReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
    /// Fingerprint of the originating error, when the proposal carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_snake_case_on_wire() {
        assert_eq!(
            serde_json::to_string(&FixStatus::RolledBack).unwrap(),
            "\"rolled_back\""
        );
        assert_eq!(FixStatus::RolledBack.as_str(), "rolled_back");
    }

    #[test]
    fn fix_round_trips() {
        let fix = Fix {
            id: "a".into(),
            proposal_id: "p".into(),
            skill: "token-audit".into(),
            status: FixStatus::Ready,
            source_file: "/skills/token-audit/index.js".into(),
            original_code: "old".into(),
            fixed_code: "new".into(),
            diff: "- old\n+ new".into(),
            explanation: "retry added".into(),
            test_results: None,
            backup_path: None,
            fingerprint: Some("abcdef012345".into()),
            created_at: "t".into(),
            approved_at: None,
            deployed_at: None,
            rejected_at: None,
            error: None,
        };
        let json = serde_json::to_string(&fix).unwrap();
        let back: Fix = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, FixStatus::Ready);
        assert!(!json.contains("approved_at"));
    }
}
