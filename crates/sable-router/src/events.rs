//! Lifecycle events emitted by the router.

use sable_errlog::ErrorRecord;

/// Emitted once per routed message, after the post-middleware chain.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    Match { skill: String, message: String },
    NoMatch { message: String },
    Success { skill: String, duration_ms: u64 },
    Error { skill: String, entry: ErrorRecord },
}

impl RouterEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Match { .. } => "match",
            Self::NoMatch { .. } => "no-match",
            Self::Success { .. } => "success",
            Self::Error { .. } => "error",
        }
    }
}
