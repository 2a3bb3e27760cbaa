#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Log(#[from] sable_errlog::LogError),

    #[error(transparent)]
    Gate(#[from] sable_gates::GateError),

    #[error("proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("{0}")]
    Other(String),
}
