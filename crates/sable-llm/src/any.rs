//! Enum dispatch for runtime oracle selection.

use crate::error::OracleError;
use crate::http::HttpOracle;
use crate::mock::MockOracle;
use crate::oracle::Oracle;

#[derive(Debug, Clone)]
pub enum AnyOracle {
    Http(HttpOracle),
    Mock(MockOracle),
}

impl Oracle for AnyOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        match self {
            Self::Http(o) => o.complete(prompt).await,
            Self::Mock(o) => o.complete(prompt).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Http(o) => o.name(),
            Self::Mock(o) => o.name(),
        }
    }
}
