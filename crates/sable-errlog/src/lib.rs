//! Outcome capture for skill executions: classification, stack
//! fingerprinting, occurrence counting, and day-file queries.

pub mod classify;
pub mod error;
pub mod fingerprint;
pub mod logger;
pub mod record;

pub use classify::{classify, infer_severity};
pub use error::LogError;
pub use fingerprint::fingerprint;
pub use logger::{
    CriticalHook, ErrorLogger, Failure, QueryFilter, RecurringError, ThresholdHook, WrappedOutcome,
};
pub use record::{
    Classification, ErrorRecord, FixNoteRecord, GateDecisionRecord, OutcomeRecord, Severity,
    SuccessRecord,
};
