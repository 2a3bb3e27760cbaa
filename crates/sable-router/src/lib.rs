//! Workflow routing: one asynchronous entry point that turns an opaque
//! message into a typed outcome, with analytics and lifecycle events.

pub mod analytics;
pub mod error;
pub mod events;
pub mod middleware;
pub mod route;
pub mod router;

pub use analytics::{AnalyticsSummary, RouteSummary, UnmatchedMessage};
pub use error::RouterError;
pub use events::RouterEvent;
pub use middleware::{Middleware, MiddlewareFuture};
pub use route::{HandlerFuture, PreCheck, Route, RouteBuilder, SkillHandler, SkillRequest, priority};
pub use router::{ParallelDispatch, RouteOutcome, WorkflowRouter};
