//! Pre/post middleware around routed executions.

use std::pin::Pin;

use sable_errlog::Failure;

use crate::route::SkillRequest;
use crate::router::RouteOutcome;

pub type MiddlewareFuture<'a> = Pin<Box<dyn Future<Output = Result<(), Failure>> + Send + 'a>>;

/// A hook running around every routed execution.
///
/// A pre hook returning `Err` deliberately aborts the pipeline; the failure
/// is logged against the `middleware-pre` pseudo-skill and surfaced as a
/// pre-check failure. Post hook failures are logged against
/// `middleware-post` and never abort the call.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    fn before<'a>(&'a self, request: &'a SkillRequest) -> MiddlewareFuture<'a> {
        let _ = request;
        Box::pin(async { Ok(()) })
    }

    fn after<'a>(&'a self, outcome: &'a RouteOutcome) -> MiddlewareFuture<'a> {
        let _ = outcome;
        Box::pin(async { Ok(()) })
    }
}
