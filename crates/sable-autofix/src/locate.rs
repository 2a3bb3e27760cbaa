//! Source localization: find the file a fix should patch.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use sable_errlog::{ErrorLogger, ErrorRecord, QueryFilter};

use crate::error::FixError;

/// Path segments that disqualify a stack frame from localization.
const EXCLUDED_SEGMENTS: &[&str] = &["node_modules", "error-logger", "errlog"];

const SOURCE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts"];

static FRAME_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(?([^\s():]+):(\d+):\d+\)?").unwrap());

/// Extract `(path, line)` from the first usable frame of a stack.
#[must_use]
pub fn first_own_frame(stack: &str) -> Option<(PathBuf, usize)> {
    for line in stack.lines().map(str::trim).filter(|l| l.starts_with("at ")) {
        let Some(caps) = FRAME_LOCATION.captures(line) else {
            continue;
        };
        let path = &caps[1];
        if path.starts_with("node:") {
            continue;
        }
        if EXCLUDED_SEGMENTS.iter().any(|seg| path.contains(seg)) {
            continue;
        }
        let line_number = caps[2].parse().ok()?;
        return Some((PathBuf::from(path), line_number));
    }
    None
}

/// The most recent error record for a fingerprint, if any.
pub async fn latest_error(
    logger: &ErrorLogger,
    fingerprint: &str,
) -> Result<Option<ErrorRecord>, FixError> {
    let records = logger
        .query(&QueryFilter {
            fingerprint: Some(fingerprint.to_string()),
            ..QueryFilter::default()
        })
        .await?;
    Ok(records
        .into_iter()
        .filter_map(|r| r.as_error().cloned())
        .next_back())
}

/// Locate the source file for a skill: first from the recorded stack, then
/// by searching the skills directory.
pub async fn locate_source(
    skill: &str,
    latest: Option<&ErrorRecord>,
    skills_dir: &Path,
) -> Result<PathBuf, FixError> {
    if let Some(record) = latest
        && let Some(stack) = &record.stack
        && let Some((path, _)) = first_own_frame(stack)
        && path.exists()
    {
        return Ok(path);
    }

    for dir_name in [skill.to_string(), format!("x1-{skill}")] {
        let dir = skills_dir.join(&dir_name);
        if !dir.is_dir() {
            continue;
        }
        for entry_name in ["index.js", "main.js"] {
            let candidate = dir.join(entry_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        if let Some(found) = first_source_file(&dir).await? {
            return Ok(found);
        }
    }

    Err(FixError::SourceNotFound(skill.to_string()))
}

async fn first_source_file(dir: &Path) -> Result<Option<PathBuf>, FixError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file()
            && let Some(ext) = path.extension().and_then(|e| e.to_str())
            && SOURCE_EXTENSIONS.contains(&ext)
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files.into_iter().next())
}

/// Find a test file for a skill: `test.js` under the skill directory,
/// under its `tests/` subdirectory, or under `x1-{skill}`.
#[must_use]
pub fn locate_test(skill: &str, skills_dir: &Path) -> Option<PathBuf> {
    let candidates = [
        skills_dir.join(skill).join("test.js"),
        skills_dir.join(skill).join("tests").join("test.js"),
        skills_dir.join(format!("x1-{skill}")).join("test.js"),
    ];
    candidates.into_iter().find(|p| p.is_file())
}
