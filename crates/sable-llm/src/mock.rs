//! Test-only mock oracle.

use std::sync::{Arc, Mutex};

use crate::error::OracleError;
use crate::oracle::Oracle;

#[derive(Debug, Clone)]
pub struct MockOracle {
    responses: Arc<Mutex<Vec<String>>>,
    pub default_response: String,
    pub fail: bool,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock completion".into(),
            fail: false,
            delay_ms: 0,
        }
    }
}

impl MockOracle {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }
}

impl Oracle for MockOracle {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail {
            return Err(OracleError::Other("mock oracle error".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(self.default_response.clone())
        } else {
            Ok(responses.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_drain_in_order() {
        let oracle = MockOracle::with_responses(vec!["one".into(), "two".into()]);
        assert_eq!(oracle.complete("p").await.unwrap(), "one");
        assert_eq!(oracle.complete("p").await.unwrap(), "two");
        assert_eq!(oracle.complete("p").await.unwrap(), "mock completion");
    }

    #[tokio::test]
    async fn failing_mock_errors() {
        let oracle = MockOracle::failing();
        assert!(oracle.complete("p").await.is_err());
    }
}
