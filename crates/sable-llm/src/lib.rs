//! Oracle seam for patch synthesis: a single text-in/text-out callable.

pub mod any;
pub mod error;
pub mod http;
pub mod mock;
pub mod oracle;
mod retry;

pub use any::AnyOracle;
pub use error::OracleError;
pub use http::HttpOracle;
pub use mock::MockOracle;
pub use oracle::Oracle;
