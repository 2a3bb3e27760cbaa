//! The `AutoFixEngine`: generate, approve, and apply fixes under
//! backup/test/rollback discipline.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sable_core::{ids, text, time};
use sable_errlog::{Classification, ErrorLogger};
use sable_improve::SelfImprovementLoop;
use sable_llm::Oracle;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::diff::line_diff;
use crate::error::FixError;
use crate::events::FixEvent;
use crate::locate::{latest_error, locate_source, locate_test};
use crate::synth::{build_prompt, parse_response};
use crate::template::apply_template;
use crate::types::{Fix, FixStatus, TestReport};

const EVENT_CAPACITY: usize = 64;
const FIXES_FILE: &str = "fixes.json";
const BACKUPS_DIR: &str = "backups";
const TEST_OUTPUT_MAX: usize = 2_000;
const CORRECTION_EXAMPLES: usize = 5;
const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AutoFixEngine<O: Oracle> {
    dir: PathBuf,
    backups_dir: PathBuf,
    skills_dir: PathBuf,
    logger: Arc<ErrorLogger>,
    improvement: Arc<SelfImprovementLoop>,
    oracle: Option<O>,
    fixes: Mutex<Vec<Fix>>,
    events: broadcast::Sender<FixEvent>,
    test_timeout: Duration,
    test_program: String,
}

impl<O: Oracle> std::fmt::Debug for AutoFixEngine<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoFixEngine")
            .field("dir", &self.dir)
            .field("skills_dir", &self.skills_dir)
            .field("has_oracle", &self.oracle.is_some())
            .finish_non_exhaustive()
    }
}

impl<O: Oracle> AutoFixEngine<O> {
    /// Open the autofix data directory and load the fix list.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the fixes file
    /// cannot be parsed.
    pub async fn open(
        dir: impl Into<PathBuf>,
        skills_dir: impl Into<PathBuf>,
        logger: Arc<ErrorLogger>,
        improvement: Arc<SelfImprovementLoop>,
    ) -> Result<Self, FixError> {
        let dir = dir.into();
        let backups_dir = dir.join(BACKUPS_DIR);
        tokio::fs::create_dir_all(&backups_dir).await?;

        let fixes_path = dir.join(FIXES_FILE);
        let fixes = if fixes_path.exists() {
            let raw = tokio::fs::read_to_string(&fixes_path).await?;
            serde_json::from_str(&raw)?
        } else {
            Vec::new()
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            dir,
            backups_dir,
            skills_dir: skills_dir.into(),
            logger,
            improvement,
            oracle: None,
            fixes: Mutex::new(fixes),
            events,
            test_timeout: DEFAULT_TEST_TIMEOUT,
            test_program: "node".to_string(),
        })
    }

    #[must_use]
    pub fn with_oracle(mut self, oracle: O) -> Self {
        self.oracle = Some(oracle);
        self
    }

    #[must_use]
    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    /// Program used to run skill tests. Default `node`.
    #[must_use]
    pub fn with_test_program(mut self, program: impl Into<String>) -> Self {
        self.test_program = program.into();
        self
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FixEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn fix(&self, id: &str) -> Option<Fix> {
        self.lock_fixes().iter().find(|f| f.id == id).cloned()
    }

    #[must_use]
    pub fn fixes(&self) -> Vec<Fix> {
        self.lock_fixes().clone()
    }

    /// Materialize a proposal into a fix: localize the source, synthesize a
    /// patch via the oracle or the template table, and diff.
    ///
    /// Synthesis failures are recorded as a `failed` fix; hard failures
    /// (unknown proposal, unlocatable source) propagate.
    pub async fn generate_fix(&self, proposal_id: &str) -> Result<Fix, FixError> {
        let proposal = self
            .improvement
            .proposal(proposal_id)
            .ok_or_else(|| FixError::ProposalNotFound(proposal_id.to_string()))?;
        let skill = proposal
            .skill
            .clone()
            .ok_or_else(|| FixError::NoSkill(proposal_id.to_string()))?;

        let _ = self.events.send(FixEvent::Generating {
            proposal_id: proposal_id.to_string(),
        });

        let fingerprint = proposal
            .data
            .get("fingerprint")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let latest = match &fingerprint {
            Some(fp) => latest_error(&self.logger, fp).await?,
            None => None,
        };

        let source_file = match locate_source(&skill, latest.as_ref(), &self.skills_dir).await {
            Ok(path) => path,
            Err(e) => {
                let _ = self.events.send(FixEvent::Failed {
                    proposal_id: proposal_id.to_string(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };
        let original_code = tokio::fs::read_to_string(&source_file).await?;

        let synthesis = match &self.oracle {
            Some(oracle) => {
                let corrections = self
                    .improvement
                    .corrections_for(&skill, CORRECTION_EXAMPLES);
                let prompt = build_prompt(&proposal, latest.as_ref(), &corrections, &original_code);
                match self.synthesize(oracle, &prompt).await {
                    Ok(synthesis) => synthesis,
                    Err(e) => {
                        let fix = self
                            .record_failed(
                                proposal_id,
                                &skill,
                                &source_file,
                                &original_code,
                                fingerprint.as_deref(),
                                &e,
                            )
                            .await?;
                        let _ = self.events.send(FixEvent::Failed {
                            proposal_id: proposal_id.to_string(),
                            error: e.to_string(),
                        });
                        return Ok(fix);
                    }
                }
            }
            None => {
                let classification = latest
                    .as_ref()
                    .map_or(Classification::Unknown, |r| r.classification);
                let template = apply_template(classification, &original_code, latest.as_ref());
                crate::synth::Synthesis {
                    explanation: template.explanation,
                    fixed_code: template.fixed_code,
                }
            }
        };

        let fix = Fix {
            id: ids::token12(),
            proposal_id: proposal_id.to_string(),
            skill,
            status: FixStatus::Ready,
            source_file: source_file.display().to_string(),
            diff: line_diff(&original_code, &synthesis.fixed_code),
            original_code,
            fixed_code: synthesis.fixed_code,
            explanation: synthesis.explanation,
            test_results: None,
            backup_path: None,
            fingerprint,
            created_at: time::now_iso(),
            approved_at: None,
            deployed_at: None,
            rejected_at: None,
            error: None,
        };

        self.lock_fixes().push(fix.clone());
        self.persist_fixes().await?;
        let _ = self.events.send(FixEvent::Ready {
            fix_id: fix.id.clone(),
        });
        Ok(fix)
    }

    /// Approve a ready fix. Approval does not auto-apply.
    pub async fn approve_fix(&self, id: &str) -> Result<Fix, FixError> {
        let fix = self
            .update_fix(id, FixStatus::Ready, "ready", |fix| {
                fix.status = FixStatus::Approved;
                fix.approved_at = Some(time::now_iso());
            })
            .await?;
        let _ = self.events.send(FixEvent::Approved {
            fix_id: id.to_string(),
        });
        Ok(fix)
    }

    /// Reject a fix that has not yet been applied.
    pub async fn reject_fix(&self, id: &str) -> Result<Fix, FixError> {
        let fix = {
            let mut fixes = self.lock_fixes();
            let fix = fixes
                .iter_mut()
                .find(|f| f.id == id)
                .ok_or_else(|| FixError::FixNotFound(id.to_string()))?;
            if !matches!(fix.status, FixStatus::Ready | FixStatus::Approved) {
                return Err(FixError::InvalidState {
                    id: id.to_string(),
                    status: fix.status.as_str(),
                    expected: "ready or approved",
                });
            }
            fix.status = FixStatus::Rejected;
            fix.rejected_at = Some(time::now_iso());
            fix.clone()
        };
        self.persist_fixes().await?;
        let _ = self.events.send(FixEvent::Rejected {
            fix_id: id.to_string(),
        });
        Ok(fix)
    }

    /// Apply an approved fix: back up, overwrite, test, then deploy or
    /// roll back. The source file is always restored from backup on a
    /// failed test before the transition completes.
    pub async fn apply_fix(&self, id: &str) -> Result<Fix, FixError> {
        let fix = self
            .fix(id)
            .ok_or_else(|| FixError::FixNotFound(id.to_string()))?;
        if fix.status != FixStatus::Approved {
            return Err(FixError::InvalidState {
                id: id.to_string(),
                status: fix.status.as_str(),
                expected: "approved",
            });
        }

        let source_path = PathBuf::from(&fix.source_file);
        let basename = source_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("source");
        let backup_path = self
            .backups_dir
            .join(format!("{basename}.{}.bak", time::epoch_ms()));

        self.update_status(id, FixStatus::Applying).await?;
        tokio::fs::copy(&source_path, &backup_path).await?;
        self.update_fix(id, FixStatus::Applying, "applying", |fix| {
            fix.backup_path = Some(backup_path.display().to_string());
        })
        .await?;

        if let Err(e) = tokio::fs::write(&source_path, &fix.fixed_code).await {
            // Restore before surfacing the write failure.
            let _ = tokio::fs::copy(&backup_path, &source_path).await;
            return Err(e.into());
        }

        self.update_status(id, FixStatus::Testing).await?;
        let _ = self.events.send(FixEvent::Testing {
            fix_id: id.to_string(),
        });

        let report = match locate_test(&fix.skill, &self.skills_dir) {
            Some(test_file) => self.run_test(&test_file).await,
            None => TestReport {
                passed: true,
                output: "no test file found".to_string(),
                skipped: true,
            },
        };

        if report.passed {
            let fix = self
                .update_fix(id, FixStatus::Testing, "testing", |fix| {
                    fix.status = FixStatus::Deployed;
                    fix.deployed_at = Some(time::now_iso());
                    fix.test_results = Some(report.clone());
                })
                .await?;

            if let Some(fp) = &fix.fingerprint {
                self.logger
                    .record_fix(&fix.skill, fp, &format!("auto-fix {} deployed", fix.id))
                    .await?;
            }
            self.improvement
                .mark_applied(&fix.proposal_id, "deployed by auto-fix")
                .await?;

            tracing::info!(skill = %fix.skill, "fix {} deployed", fix.id);
            let _ = self.events.send(FixEvent::Deployed {
                fix_id: id.to_string(),
            });
            let _ = self.events.send(FixEvent::PipelineComplete {
                fix_id: id.to_string(),
                status: FixStatus::Deployed,
            });
            Ok(fix)
        } else {
            tokio::fs::copy(&backup_path, &source_path).await?;
            let reason = format!("test failed: {}", text::truncate_chars(&report.output, 200));
            let fix = self
                .update_fix(id, FixStatus::Testing, "testing", |fix| {
                    fix.status = FixStatus::RolledBack;
                    fix.error = Some(reason.clone());
                    fix.test_results = Some(report.clone());
                })
                .await?;

            tracing::warn!(skill = %fix.skill, "fix {} rolled back: {reason}", fix.id);
            let _ = self.events.send(FixEvent::RolledBack {
                fix_id: id.to_string(),
                reason,
            });
            let _ = self.events.send(FixEvent::PipelineComplete {
                fix_id: id.to_string(),
                status: FixStatus::RolledBack,
            });
            Ok(fix)
        }
    }

    async fn synthesize(&self, oracle: &O, prompt: &str) -> Result<crate::synth::Synthesis, FixError> {
        let response = oracle.complete(prompt).await?;
        parse_response(&response)
    }

    async fn run_test(&self, test_file: &Path) -> TestReport {
        let file_name = test_file.file_name().and_then(|n| n.to_str()).unwrap_or("test.js");
        let cwd = test_file.parent().unwrap_or(Path::new("."));

        let output = tokio::time::timeout(
            self.test_timeout,
            tokio::process::Command::new(&self.test_program)
                .arg(file_name)
                .current_dir(cwd)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match output {
            Err(_) => TestReport {
                passed: false,
                output: format!("test timed out after {}s", self.test_timeout.as_secs()),
                skipped: false,
            },
            Ok(Err(e)) => TestReport {
                passed: false,
                output: format!("failed to run test: {e}"),
                skipped: false,
            },
            Ok(Ok(out)) => {
                let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&out.stderr));
                let lower = combined.to_lowercase();
                let passed = !(lower.contains("failed") && !lower.contains("0 failed"));
                TestReport {
                    passed,
                    output: text::truncate_chars(&combined, TEST_OUTPUT_MAX),
                    skipped: false,
                }
            }
        }
    }

    async fn record_failed(
        &self,
        proposal_id: &str,
        skill: &str,
        source_file: &Path,
        original_code: &str,
        fingerprint: Option<&str>,
        error: &FixError,
    ) -> Result<Fix, FixError> {
        let fix = Fix {
            id: ids::token12(),
            proposal_id: proposal_id.to_string(),
            skill: skill.to_string(),
            status: FixStatus::Failed,
            source_file: source_file.display().to_string(),
            original_code: original_code.to_string(),
            fixed_code: String::new(),
            diff: String::new(),
            explanation: String::new(),
            test_results: None,
            backup_path: None,
            fingerprint: fingerprint.map(ToString::to_string),
            created_at: time::now_iso(),
            approved_at: None,
            deployed_at: None,
            rejected_at: None,
            error: Some(error.to_string()),
        };
        self.lock_fixes().push(fix.clone());
        self.persist_fixes().await?;
        Ok(fix)
    }

    async fn update_status(&self, id: &str, status: FixStatus) -> Result<(), FixError> {
        {
            let mut fixes = self.lock_fixes();
            let fix = fixes
                .iter_mut()
                .find(|f| f.id == id)
                .ok_or_else(|| FixError::FixNotFound(id.to_string()))?;
            fix.status = status;
        }
        self.persist_fixes().await
    }

    async fn update_fix(
        &self,
        id: &str,
        expected: FixStatus,
        expected_name: &'static str,
        mutate: impl FnOnce(&mut Fix),
    ) -> Result<Fix, FixError> {
        let fix = {
            let mut fixes = self.lock_fixes();
            let fix = fixes
                .iter_mut()
                .find(|f| f.id == id)
                .ok_or_else(|| FixError::FixNotFound(id.to_string()))?;
            if fix.status != expected {
                return Err(FixError::InvalidState {
                    id: id.to_string(),
                    status: fix.status.as_str(),
                    expected: expected_name,
                });
            }
            mutate(fix);
            fix.clone()
        };
        self.persist_fixes().await?;
        Ok(fix)
    }

    async fn persist_fixes(&self) -> Result<(), FixError> {
        let raw = serde_json::to_string_pretty(&*self.lock_fixes())?;
        tokio::fs::write(self.dir.join(FIXES_FILE), raw).await?;
        Ok(())
    }

    fn lock_fixes(&self) -> std::sync::MutexGuard<'_, Vec<Fix>> {
        self.fixes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
