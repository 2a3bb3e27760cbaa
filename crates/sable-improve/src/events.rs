//! Events emitted by the improvement loop.

use crate::types::Proposal;

#[derive(Debug, Clone)]
pub enum LoopEvent {
    NewProposal(Proposal),
    AnalysisComplete { insights: usize, proposals_pending: usize },
    ProposalApproved(Proposal),
    ProposalRejected(Proposal),
    ProposalApplied(Proposal),
}

impl LoopEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewProposal(_) => "new-proposal",
            Self::AnalysisComplete { .. } => "analysis-complete",
            Self::ProposalApproved(_) => "proposal-approved",
            Self::ProposalRejected(_) => "proposal-rejected",
            Self::ProposalApplied(_) => "proposal-applied",
        }
    }
}
