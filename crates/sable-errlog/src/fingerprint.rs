//! Stack fingerprinting: a 12-hex digest stable across line numbers,
//! column numbers, and absolute path prefixes.

use std::sync::LazyLock;

use regex::Regex;

/// Sentinel fingerprint for errors captured without a stack.
pub const NO_STACK: &str = "no-stack";

static LINE_COL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":\d+(?::\d+)?").unwrap());

static PATH_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:[A-Za-z]:)?[/\\][^\s()]*[/\\]").unwrap());

/// Derive the stack fingerprint.
///
/// Call-site frames are kept, line/column numbers and directory prefixes are
/// stripped, the top five frames are joined with `|` and hashed with SHA-256
/// truncated to 12 hex characters. A missing or empty stack yields
/// [`NO_STACK`].
#[must_use]
pub fn fingerprint(stack: Option<&str>) -> String {
    let Some(stack) = stack else {
        return NO_STACK.to_string();
    };
    if stack.trim().is_empty() {
        return NO_STACK.to_string();
    }

    let frames: Vec<String> = stack
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("at "))
        .take(5)
        .map(normalize_frame)
        .collect();

    if frames.is_empty() {
        return NO_STACK.to_string();
    }

    sable_core::hash::sha256_12(&frames.join("|"))
}

fn normalize_frame(frame: &str) -> String {
    let without_positions = LINE_COL.replace_all(frame, "");
    PATH_PREFIX.replace_all(&without_positions, "").into_owned()
}
