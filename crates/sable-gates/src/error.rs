#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Log(#[from] sable_errlog::LogError),

    #[error("{0}")]
    Other(String),
}
