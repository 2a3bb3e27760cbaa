use crate::error::OracleError;

/// A text-in/text-out completion oracle.
pub trait Oracle: Send + Sync {
    /// Send a prompt and return the completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the oracle fails to respond or the response is
    /// empty.
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String, OracleError>> + Send;

    /// Oracle name for logging and identification.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubOracle;

    impl Oracle for StubOracle {
        async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
            Ok(format!("echo: {prompt}"))
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn stub_round_trip() {
        let oracle = StubOracle;
        assert_eq!(oracle.complete("hi").await.unwrap(), "echo: hi");
        assert_eq!(oracle.name(), "stub");
    }
}
