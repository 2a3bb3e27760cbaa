//! The `ErrorLogger`: append-only day files plus a write-through
//! occurrence counter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::classify::{classify, infer_severity};
use crate::error::LogError;
use crate::fingerprint::fingerprint;
use crate::record::{
    Classification, ErrorRecord, FixNoteRecord, GateDecisionRecord, OutcomeRecord, Severity,
    SuccessRecord,
};
use sable_core::{Risk, ids, text, time};

const OCCURRENCES_FILE: &str = "_occurrences.json";
const INPUT_SUMMARY_MAX: usize = 500;

/// A structured handler failure: what the skill reported when it fell over.
#[derive(Debug, Clone)]
pub struct Failure {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl Failure {
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Fired when a captured error carries critical severity.
pub trait CriticalHook: Send + Sync {
    fn on_critical(&self, record: &ErrorRecord);
}

/// Fired when a fingerprint's occurrence count strictly exceeds the
/// configured threshold.
pub trait ThresholdHook: Send + Sync {
    fn on_threshold(&self, record: &ErrorRecord, count: u64);
}

/// Filters for [`ErrorLogger::query`]. All supplied filters must match.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Day files to scan, newest first. Defaults to 7.
    pub days: Option<u32>,
    pub skill: Option<String>,
    pub classification: Option<Classification>,
    pub fingerprint: Option<String>,
    pub min_occurrences: Option<u64>,
}

/// A fingerprint ranked by occurrence count, with its most recent record.
#[derive(Debug, Clone)]
pub struct RecurringError {
    pub fingerprint: String,
    pub count: u64,
    pub latest: Option<ErrorRecord>,
}

/// Outcome of an execution wrapped by the logger.
#[derive(Debug)]
pub struct WrappedOutcome {
    pub ok: bool,
    pub result: Option<Value>,
    pub error: Option<Failure>,
    pub entry: Option<ErrorRecord>,
    pub duration_ms: u64,
}

pub struct ErrorLogger {
    dir: PathBuf,
    occurrence_threshold: u64,
    counts: Mutex<HashMap<String, u64>>,
    critical_hook: Option<Arc<dyn CriticalHook>>,
    threshold_hook: Option<Arc<dyn ThresholdHook>>,
}

impl std::fmt::Debug for ErrorLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorLogger")
            .field("dir", &self.dir)
            .field("occurrence_threshold", &self.occurrence_threshold)
            .finish_non_exhaustive()
    }
}

impl ErrorLogger {
    /// Open (or create) the log directory and load the occurrence counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the counter
    /// file exists but cannot be parsed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, LogError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let counts_path = dir.join(OCCURRENCES_FILE);
        let counts = if counts_path.exists() {
            let raw = tokio::fs::read_to_string(&counts_path).await?;
            serde_json::from_str(&raw)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            dir,
            occurrence_threshold: 2,
            counts: Mutex::new(counts),
            critical_hook: None,
            threshold_hook: None,
        })
    }

    /// Occurrence count above which the threshold hook fires. Default 2.
    #[must_use]
    pub fn with_occurrence_threshold(mut self, threshold: u64) -> Self {
        self.occurrence_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_critical_hook(mut self, hook: Arc<dyn CriticalHook>) -> Self {
        self.critical_hook = Some(hook);
        self
    }

    #[must_use]
    pub fn with_threshold_hook(mut self, hook: Arc<dyn ThresholdHook>) -> Self {
        self.threshold_hook = Some(hook);
        self
    }

    /// Capture a handler failure as an error record.
    ///
    /// Classifies, fingerprints, increments the occurrence counter, appends
    /// the record to today's day file, and persists the counter. Filesystem
    /// failures propagate: loss of an audit entry is itself a bug.
    pub async fn capture(
        &self,
        skill: &str,
        agent: &str,
        failure: &Failure,
        input: &Value,
        severity: Option<Severity>,
        metadata: Value,
    ) -> Result<ErrorRecord, LogError> {
        let classification = classify(&failure.name, &failure.message);
        let severity = severity.unwrap_or_else(|| infer_severity(skill, classification));
        let fp = fingerprint(failure.stack.as_deref());

        let count = {
            let mut counts = self.counts.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let entry = counts.entry(fp.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        let record = ErrorRecord {
            id: ids::token12(),
            timestamp: time::now_iso(),
            classification,
            severity,
            skill: skill.to_string(),
            agent: agent.to_string(),
            message: failure.message.clone(),
            name: failure.name.clone(),
            stack: failure.stack.clone(),
            fingerprint: fp,
            input_summary: text::summarize_json(input, INPUT_SUMMARY_MAX),
            occurrence_count: count,
            metadata,
        };

        self.append(&OutcomeRecord::Error(record.clone())).await?;
        self.persist_counts().await?;

        if record.severity == Severity::Critical
            && let Some(hook) = &self.critical_hook
        {
            hook.on_critical(&record);
        }
        if count > self.occurrence_threshold
            && let Some(hook) = &self.threshold_hook
        {
            hook.on_threshold(&record, count);
        }

        Ok(record)
    }

    /// Append a success record for a completed execution.
    pub async fn log_success(
        &self,
        skill: &str,
        agent: &str,
        duration_ms: u64,
        input: &Value,
    ) -> Result<SuccessRecord, LogError> {
        let record = SuccessRecord {
            id: ids::token12(),
            timestamp: time::now_iso(),
            skill: skill.to_string(),
            agent: agent.to_string(),
            duration_ms,
            input_summary: text::summarize_json(input, INPUT_SUMMARY_MAX),
        };
        self.append(&OutcomeRecord::Success(record.clone())).await?;
        Ok(record)
    }

    /// Record a resolved gate decision.
    pub async fn record_gate_decision(
        &self,
        gate: &str,
        skill: &str,
        status: &str,
        risk: Risk,
    ) -> Result<GateDecisionRecord, LogError> {
        let record = GateDecisionRecord {
            id: ids::token12(),
            timestamp: time::now_iso(),
            gate: gate.to_string(),
            skill: skill.to_string(),
            status: status.to_string(),
            risk,
        };
        self.append(&OutcomeRecord::GateDecision(record.clone()))
            .await?;
        Ok(record)
    }

    /// Record that a fix landed for a fingerprint, and clear its counter so
    /// a re-occurrence re-escalates from zero.
    pub async fn record_fix(
        &self,
        skill: &str,
        fp: &str,
        note: &str,
    ) -> Result<FixNoteRecord, LogError> {
        let record = FixNoteRecord {
            id: ids::token12(),
            timestamp: time::now_iso(),
            skill: skill.to_string(),
            fingerprint: fp.to_string(),
            note: note.to_string(),
        };
        self.append(&OutcomeRecord::FixNote(record.clone())).await?;
        {
            let mut counts = self.counts.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            counts.remove(fp);
        }
        self.persist_counts().await?;
        Ok(record)
    }

    /// Time an execution, logging success or capturing failure.
    ///
    /// # Errors
    ///
    /// Propagates filesystem failures from the underlying capture or
    /// success append; handler failures themselves are recovered into the
    /// returned outcome.
    pub async fn wrap_execution<F>(
        &self,
        skill: &str,
        agent: &str,
        input: &Value,
        severity: Option<Severity>,
        fut: F,
    ) -> Result<WrappedOutcome, LogError>
    where
        F: Future<Output = Result<Value, Failure>>,
    {
        let started = Instant::now();
        let result = fut.await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(value) => {
                self.log_success(skill, agent, duration_ms, input).await?;
                Ok(WrappedOutcome {
                    ok: true,
                    result: Some(value),
                    error: None,
                    entry: None,
                    duration_ms,
                })
            }
            Err(failure) => {
                let entry = self
                    .capture(skill, agent, &failure, input, severity, Value::Null)
                    .await?;
                Ok(WrappedOutcome {
                    ok: false,
                    result: None,
                    error: Some(failure),
                    entry: Some(entry),
                    duration_ms,
                })
            }
        }
    }

    /// Scan the last N day files and return records matching all filters.
    ///
    /// A classification, fingerprint, or occurrence filter implicitly
    /// restricts the result to error records. Malformed lines are skipped.
    pub async fn query(&self, filter: &QueryFilter) -> Result<Vec<OutcomeRecord>, LogError> {
        let days = filter.days.unwrap_or(7);
        let mut stamps = time::recent_day_stamps(days);
        stamps.reverse(); // chronological order

        let mut out = Vec::new();
        for stamp in stamps {
            let path = self.day_file(&stamp);
            if !path.exists() {
                continue;
            }
            let raw = tokio::fs::read_to_string(&path).await?;
            for line in raw.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<OutcomeRecord>(line) {
                    Ok(record) => {
                        if matches(&record, filter) {
                            out.push(record);
                        }
                    }
                    Err(e) => tracing::debug!("skipping malformed log line: {e}"),
                }
            }
        }
        Ok(out)
    }

    /// The top-K fingerprints by occurrence count, each annotated with the
    /// most recent matching error record from the last 7 days.
    pub async fn recurring(&self, top_k: usize) -> Result<Vec<RecurringError>, LogError> {
        let mut ranked: Vec<(String, u64)> = {
            let counts = self.counts.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            counts.iter().map(|(k, v)| (k.clone(), *v)).collect()
        };
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(top_k);

        let mut out = Vec::with_capacity(ranked.len());
        for (fp, count) in ranked {
            let records = self
                .query(&QueryFilter {
                    fingerprint: Some(fp.clone()),
                    ..QueryFilter::default()
                })
                .await?;
            let latest = records
                .into_iter()
                .filter_map(|r| match r {
                    OutcomeRecord::Error(e) => Some(e),
                    _ => None,
                })
                .next_back();
            out.push(RecurringError {
                fingerprint: fp,
                count,
                latest,
            });
        }
        Ok(out)
    }

    /// Current occurrence count for a fingerprint.
    #[must_use]
    pub fn occurrence_count(&self, fp: &str) -> u64 {
        let counts = self.counts.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        counts.get(fp).copied().unwrap_or(0)
    }

    fn day_file(&self, stamp: &str) -> PathBuf {
        self.dir.join(format!("{stamp}.json"))
    }

    async fn append(&self, record: &OutcomeRecord) -> Result<(), LogError> {
        let line = format!("{}\n", serde_json::to_string(record)?);
        let path = self.day_file(&time::today_stamp());
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn persist_counts(&self) -> Result<(), LogError> {
        let snapshot = {
            let counts = self.counts.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            serde_json::to_string_pretty(&*counts)?
        };
        tokio::fs::write(self.dir.join(OCCURRENCES_FILE), snapshot).await?;
        Ok(())
    }
}

/// Path of the occurrence counter file under a log directory.
#[must_use]
pub fn occurrences_path(dir: &Path) -> PathBuf {
    dir.join(OCCURRENCES_FILE)
}

fn matches(record: &OutcomeRecord, filter: &QueryFilter) -> bool {
    if let Some(skill) = &filter.skill
        && record.skill() != Some(skill.as_str())
    {
        return false;
    }

    let errors_only = filter.classification.is_some()
        || filter.fingerprint.is_some()
        || filter.min_occurrences.is_some();
    if !errors_only {
        return true;
    }

    let Some(err) = record.as_error() else {
        return false;
    };
    if let Some(classification) = filter.classification
        && err.classification != classification
    {
        return false;
    }
    if let Some(fp) = &filter.fingerprint
        && &err.fingerprint != fp
    {
        return false;
    }
    if let Some(min) = filter.min_occurrences
        && err.occurrence_count < min
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn econnrefused() -> Failure {
        Failure::new("Error", "connect ECONNREFUSED 127.0.0.1:8545").with_stack(
            "Error: connect ECONNREFUSED 127.0.0.1:8545\n\
             at fetchChain (/home/bot/skills/token-audit/index.js:31:9)\n\
             at run (/home/bot/skills/token-audit/index.js:12:3)",
        )
    }

    async fn test_logger() -> (tempfile::TempDir, ErrorLogger) {
        let dir = tempfile::tempdir().unwrap();
        let logger = ErrorLogger::open(dir.path().join("errors")).await.unwrap();
        (dir, logger)
    }

    #[tokio::test]
    async fn capture_classifies_and_counts() {
        let (_dir, logger) = test_logger().await;
        let input = serde_json::json!({"token": "BTC"});

        let first = logger
            .capture("token-audit", "main", &econnrefused(), &input, None, Value::Null)
            .await
            .unwrap();
        assert_eq!(first.classification, Classification::Network);
        assert_eq!(first.severity, Severity::High);
        assert_eq!(first.occurrence_count, 1);
        assert_eq!(first.fingerprint.len(), 12);

        let second = logger
            .capture("token-audit", "main", &econnrefused(), &input, None, Value::Null)
            .await
            .unwrap();
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(second.occurrence_count, 2);
        assert_eq!(logger.occurrence_count(&first.fingerprint), 2);
    }

    #[tokio::test]
    async fn explicit_severity_wins() {
        let (_dir, logger) = test_logger().await;
        let record = logger
            .capture(
                "token-audit",
                "main",
                &econnrefused(),
                &Value::Null,
                Some(Severity::Low),
                Value::Null,
            )
            .await
            .unwrap();
        assert_eq!(record.severity, Severity::Low);
    }

    #[tokio::test]
    async fn counter_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors");
        let fp;
        {
            let logger = ErrorLogger::open(&path).await.unwrap();
            fp = logger
                .capture("s", "m", &econnrefused(), &Value::Null, None, Value::Null)
                .await
                .unwrap()
                .fingerprint;
        }
        let reopened = ErrorLogger::open(&path).await.unwrap();
        assert_eq!(reopened.occurrence_count(&fp), 1);
    }

    #[tokio::test]
    async fn capture_then_query_same_day() {
        let (_dir, logger) = test_logger().await;
        let record = logger
            .capture("token-audit", "main", &econnrefused(), &Value::Null, None, Value::Null)
            .await
            .unwrap();

        let results = logger
            .query(&QueryFilter {
                skill: Some("token-audit".into()),
                fingerprint: Some(record.fingerprint.clone()),
                days: Some(1),
                ..QueryFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_error().unwrap().id, record.id);
    }

    #[tokio::test]
    async fn classification_filter_excludes_successes() {
        let (_dir, logger) = test_logger().await;
        logger
            .log_success("token-audit", "main", 10, &Value::Null)
            .await
            .unwrap();
        logger
            .capture("token-audit", "main", &econnrefused(), &Value::Null, None, Value::Null)
            .await
            .unwrap();

        let all = logger
            .query(&QueryFilter {
                skill: Some("token-audit".into()),
                ..QueryFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let errors = logger
            .query(&QueryFilter {
                classification: Some(Classification::Network),
                ..QueryFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_error().is_some());
    }

    #[tokio::test]
    async fn min_occurrences_filter() {
        let (_dir, logger) = test_logger().await;
        for _ in 0..3 {
            logger
                .capture("s", "m", &econnrefused(), &Value::Null, None, Value::Null)
                .await
                .unwrap();
        }
        let hits = logger
            .query(&QueryFilter {
                min_occurrences: Some(3),
                ..QueryFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].as_error().unwrap().occurrence_count, 3);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let (_dir, logger) = test_logger().await;
        logger
            .capture("s", "m", &econnrefused(), &Value::Null, None, Value::Null)
            .await
            .unwrap();

        // Corrupt the day file with a partial line.
        let path = logger.day_file(&time::today_stamp());
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{\"kind\":\"err");
        std::fs::write(&path, raw).unwrap();

        let results = logger.query(&QueryFilter::default()).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn fix_clears_counter_and_reescalates() {
        let (_dir, logger) = test_logger().await;
        let fp = logger
            .capture("s", "m", &econnrefused(), &Value::Null, None, Value::Null)
            .await
            .unwrap()
            .fingerprint;
        logger
            .capture("s", "m", &econnrefused(), &Value::Null, None, Value::Null)
            .await
            .unwrap();
        assert_eq!(logger.occurrence_count(&fp), 2);

        logger.record_fix("s", &fp, "patched retry").await.unwrap();
        assert_eq!(logger.occurrence_count(&fp), 0);

        let again = logger
            .capture("s", "m", &econnrefused(), &Value::Null, None, Value::Null)
            .await
            .unwrap();
        assert_eq!(again.occurrence_count, 1);
    }

    struct CountingThreshold(AtomicU64);
    impl ThresholdHook for CountingThreshold {
        fn on_threshold(&self, _record: &ErrorRecord, _count: u64) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    struct CountingCritical(AtomicU64);
    impl CriticalHook for CountingCritical {
        fn on_critical(&self, _record: &ErrorRecord) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn threshold_hook_fires_strictly_above() {
        let dir = tempfile::tempdir().unwrap();
        let hook = Arc::new(CountingThreshold(AtomicU64::new(0)));
        let logger = ErrorLogger::open(dir.path().join("errors"))
            .await
            .unwrap()
            .with_occurrence_threshold(2)
            .with_threshold_hook(hook.clone());

        for _ in 0..3 {
            logger
                .capture("s", "m", &econnrefused(), &Value::Null, None, Value::Null)
                .await
                .unwrap();
        }
        // Counts 1 and 2 do not exceed 2; count 3 does.
        assert_eq!(hook.0.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn critical_hook_fires_for_destructive_skill() {
        let dir = tempfile::tempdir().unwrap();
        let hook = Arc::new(CountingCritical(AtomicU64::new(0)));
        let logger = ErrorLogger::open(dir.path().join("errors"))
            .await
            .unwrap()
            .with_critical_hook(hook.clone());

        logger
            .capture("token-transfer", "main", &econnrefused(), &Value::Null, None, Value::Null)
            .await
            .unwrap();
        assert_eq!(hook.0.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn wrap_execution_success() {
        let (_dir, logger) = test_logger().await;
        let outcome = logger
            .wrap_execution("s", "m", &Value::Null, None, async {
                Ok(serde_json::json!({"price": 42}))
            })
            .await
            .unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.result.unwrap()["price"], 42);
        assert!(outcome.entry.is_none());
    }

    #[tokio::test]
    async fn wrap_execution_failure_captures() {
        let (_dir, logger) = test_logger().await;
        let outcome = logger
            .wrap_execution("s", "m", &Value::Null, None, async {
                Err(Failure::new("TypeError", "x is not a function"))
            })
            .await
            .unwrap();
        assert!(!outcome.ok);
        let entry = outcome.entry.unwrap();
        assert_eq!(entry.classification, Classification::Logic);
        assert_eq!(entry.fingerprint, crate::fingerprint::NO_STACK);
    }

    #[tokio::test]
    async fn recurring_ranks_by_count() {
        let (_dir, logger) = test_logger().await;
        let noisy = econnrefused();
        let quiet = Failure::new("Error", "deadline exceeded").with_stack(
            "Error: deadline exceeded\n at poll (/app/skills/slow/index.js:8:2)",
        );
        for _ in 0..4 {
            logger
                .capture("token-audit", "m", &noisy, &Value::Null, None, Value::Null)
                .await
                .unwrap();
        }
        logger
            .capture("slow", "m", &quiet, &Value::Null, None, Value::Null)
            .await
            .unwrap();

        let recurring = logger.recurring(10).await.unwrap();
        assert_eq!(recurring.len(), 2);
        assert_eq!(recurring[0].count, 4);
        let latest = recurring[0].latest.as_ref().unwrap();
        assert_eq!(latest.skill, "token-audit");
        assert_eq!(latest.occurrence_count, 4);
    }

    #[tokio::test]
    async fn empty_stack_is_queryable_under_sentinel() {
        let (_dir, logger) = test_logger().await;
        logger
            .capture(
                "s",
                "m",
                &Failure::new("Error", "mystery"),
                &Value::Null,
                None,
                Value::Null,
            )
            .await
            .unwrap();
        let hits = logger
            .query(&QueryFilter {
                fingerprint: Some(crate::fingerprint::NO_STACK.into()),
                ..QueryFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
