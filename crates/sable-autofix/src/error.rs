#[derive(Debug, thiserror::Error)]
pub enum FixError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Log(#[from] sable_errlog::LogError),

    #[error(transparent)]
    Loop(#[from] sable_improve::LoopError),

    #[error(transparent)]
    Oracle(#[from] sable_llm::OracleError),

    #[error("proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("fix not found: {0}")]
    FixNotFound(String),

    #[error("could not locate source for skill: {0}")]
    SourceNotFound(String),

    #[error("proposal {0} names no skill")]
    NoSkill(String),

    #[error("oracle response contained no code block")]
    NoCodeBlock,

    #[error("fix {id} is {status}, expected {expected}")]
    InvalidState {
        id: String,
        status: &'static str,
        expected: &'static str,
    },
}
