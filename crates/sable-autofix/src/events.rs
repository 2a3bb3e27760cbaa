//! Fix lifecycle events.

use crate::types::FixStatus;

#[derive(Debug, Clone)]
pub enum FixEvent {
    Generating { proposal_id: String },
    Ready { fix_id: String },
    Failed { proposal_id: String, error: String },
    Approved { fix_id: String },
    Rejected { fix_id: String },
    Testing { fix_id: String },
    Deployed { fix_id: String },
    RolledBack { fix_id: String, reason: String },
    PipelineComplete { fix_id: String, status: FixStatus },
}

impl FixEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generating { .. } => "fix-generating",
            Self::Ready { .. } => "fix-ready",
            Self::Failed { .. } => "fix-failed",
            Self::Approved { .. } => "fix-approved",
            Self::Rejected { .. } => "fix-rejected",
            Self::Testing { .. } => "fix-testing",
            Self::Deployed { .. } => "fix-deployed",
            Self::RolledBack { .. } => "fix-rolled-back",
            Self::PipelineComplete { .. } => "pipeline-complete",
        }
    }
}
