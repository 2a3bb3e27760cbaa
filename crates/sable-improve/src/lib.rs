//! The self-improvement loop: synthesizes logger, router, and gate signals
//! plus user corrections into typed insights and approval-tracked proposals.

pub mod cluster;
pub mod error;
pub mod events;
pub mod improve;
pub mod types;

pub use cluster::{MessageCluster, cluster_messages, suggest_pattern};
pub use error::LoopError;
pub use events::LoopEvent;
pub use improve::{LoopThresholds, ProposalFilter, SelfImprovementLoop, Trend};
pub use types::{
    ActionKind, Correction, Effort, Feedback, Insight, InsightSeverity, InsightType,
    MetricsSnapshot, Proposal, ProposalSeverity, ProposalStatus, correction_pattern_hash,
};
