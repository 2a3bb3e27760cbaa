#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Log(#[from] sable_errlog::LogError),

    #[error("route not found: {0}")]
    RouteNotFound(String),
}
