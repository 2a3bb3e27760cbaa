//! Deterministic fix templates, used when no oracle is configured.
//! Every injected block carries an `[AUTO-FIX]` marker so the diff is
//! unambiguous.

use std::sync::LazyLock;

use regex::Regex;
use sable_errlog::{Classification, ErrorRecord};

use crate::locate::first_own_frame;

static FUNCTION_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:async\s+)?function\s+[\w$]+\s*\([^)]*\)\s*\{").unwrap()
});

static EXPORTED_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)module\.exports\s*=\s*(?:async\s+)?(?:function\s*[\w$]*\s*\([^)]*\)|\([^)]*\)\s*=>)\s*\{")
        .unwrap()
});

static REQUIRE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^.*\brequire\s*\(.*$").unwrap());

static READING_PROPERTY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"reading '([^']+)'").unwrap());

const VALIDATION_PREAMBLE: &str = "\n  // [AUTO-FIX] input validation\n  \
    if (typeof input === 'undefined' || input === null) {\n    \
    throw new Error('Invalid input: expected a value');\n  }\n";

const RETRY_HELPER: &str = "\n\n// [AUTO-FIX] retry helper with exponential backoff\n\
    async function withRetry(fn, retries = 3, baseMs = 500) {\n\
    \x20 let lastErr;\n\
    \x20 for (let attempt = 0; attempt < retries; attempt++) {\n\
    \x20   try {\n\
    \x20     return await fn();\n\
    \x20   } catch (err) {\n\
    \x20     lastErr = err;\n\
    \x20     await new Promise((resolve) => setTimeout(resolve, baseMs * 2 ** attempt));\n\
    \x20   }\n\
    \x20 }\n\
    \x20 throw lastErr;\n\
    }\n";

const TIMEOUT_HELPER: &str = "\n\n// [AUTO-FIX] timeout guard\n\
    function withTimeout(promise, ms = 10000) {\n\
    \x20 let timer;\n\
    \x20 const deadline = new Promise((_, reject) => {\n\
    \x20   timer = setTimeout(() => reject(new Error('operation timed out')), ms);\n\
    \x20 });\n\
    \x20 return Promise.race([promise, deadline]).finally(() => clearTimeout(timer));\n\
    }\n";

#[derive(Debug, Clone)]
pub struct TemplateFix {
    pub fixed_code: String,
    pub explanation: String,
}

/// Apply the template strategy for a classification.
#[must_use]
pub fn apply_template(
    classification: Classification,
    source: &str,
    error: Option<&ErrorRecord>,
) -> TemplateFix {
    match classification {
        Classification::Validation => inject_validation(source),
        Classification::Api | Classification::Network => TemplateFix {
            fixed_code: insert_after_requires(source, RETRY_HELPER),
            explanation: "Added a retry helper with exponential backoff for transient upstream failures"
                .to_string(),
        },
        Classification::Timeout => TemplateFix {
            fixed_code: insert_after_requires(source, TIMEOUT_HELPER),
            explanation: "Added a race-against-timer guard for slow operations".to_string(),
        },
        Classification::Logic => {
            if let Some(record) = error
                && record.message.contains("Cannot read properties of undefined")
                && let Some(fix) = null_check_guard(source, record)
            {
                return fix;
            }
            wrap_try_catch(source)
        }
        _ => wrap_try_catch(source),
    }
}

fn inject_validation(source: &str) -> TemplateFix {
    let fixed_code = match entry_body_start(source) {
        Some(idx) => {
            let mut out = String::with_capacity(source.len() + VALIDATION_PREAMBLE.len());
            out.push_str(&source[..idx]);
            out.push_str(VALIDATION_PREAMBLE);
            out.push_str(&source[idx..]);
            out
        }
        None => format!("{VALIDATION_PREAMBLE}{source}"),
    };
    TemplateFix {
        fixed_code,
        explanation: "Injected an input-validation preamble into the entry function".to_string(),
    }
}

fn insert_after_requires(source: &str, helper: &str) -> String {
    match REQUIRE_LINE.find_iter(source).last() {
        Some(last) => {
            let idx = last.end();
            let mut out = String::with_capacity(source.len() + helper.len());
            out.push_str(&source[..idx]);
            out.push_str(helper);
            out.push_str(&source[idx..]);
            out
        }
        None => format!("{}{source}", helper.trim_start_matches('\n').to_string() + "\n"),
    }
}

fn null_check_guard(source: &str, record: &ErrorRecord) -> Option<TemplateFix> {
    let property = READING_PROPERTY
        .captures(&record.message)
        .map(|c| c[1].to_string())?;
    let stack = record.stack.as_deref()?;
    let (_, line_number) = first_own_frame(stack)?;

    let lines: Vec<&str> = source.lines().collect();
    if line_number == 0 || line_number > lines.len() {
        return None;
    }
    let offending = lines[line_number - 1];
    let receiver_re = Regex::new(&format!(r"([\w$]+(?:\.[\w$]+)*)\.{}", regex::escape(&property)))
        .ok()?;
    let receiver = receiver_re.captures(offending).map(|c| c[1].to_string())?;

    let indent: String = offending
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect();
    let guard = format!(
        "{indent}// [AUTO-FIX] guard against undefined '{receiver}'\n\
         {indent}if (!{receiver}) {{ return null; }}\n"
    );

    let mut out = String::with_capacity(source.len() + guard.len());
    for (i, line) in lines.iter().enumerate() {
        if i == line_number - 1 {
            out.push_str(&guard);
        }
        out.push_str(line);
        out.push('\n');
    }

    Some(TemplateFix {
        fixed_code: out,
        explanation: format!(
            "Inserted a null-check for '{receiver}' before the access to '{property}'"
        ),
    })
}

fn wrap_try_catch(source: &str) -> TemplateFix {
    let fallback = TemplateFix {
        fixed_code: format!("// [AUTO-FIX] review: no entry function found to wrap\n{source}"),
        explanation: "No entry function found; flagged for manual review".to_string(),
    };

    let Some(open_idx) = entry_body_start(source) else {
        return fallback;
    };
    let Some(close_idx) = matching_brace(source, open_idx - 1) else {
        return fallback;
    };

    let body = &source[open_idx..close_idx];
    let wrapped = format!(
        "\n  // [AUTO-FIX] recover from unexpected failures\n  try {{{body}  }} catch (err) {{\n    \
         console.error('[AUTO-FIX] unhandled error:', err.message);\n    throw err;\n  }}\n"
    );

    let mut out = String::with_capacity(source.len() + 64);
    out.push_str(&source[..open_idx]);
    out.push_str(&wrapped);
    out.push_str(&source[close_idx..]);

    TemplateFix {
        fixed_code: out,
        explanation: "Wrapped the entry function body in try/catch".to_string(),
    }
}

/// Byte index just past the `{` of the first entry function.
fn entry_body_start(source: &str) -> Option<usize> {
    FUNCTION_DECL
        .find(source)
        .or_else(|| EXPORTED_FN.find(source))
        .map(|m| m.end())
}

/// Index of the `}` matching the `{` at `open_idx`.
fn matching_brace(source: &str, open_idx: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    if bytes.get(open_idx) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(open_idx) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_errlog::Severity;

    const SKILL_SOURCE: &str = "\
const axios = require('axios');\n\
const util = require('util');\n\
\n\
async function run(input) {\n\
  const data = await axios.get(input.url);\n\
  return data.body.value;\n\
}\n\
\n\
module.exports = { run };\n";

    fn logic_error(message: &str, line: usize) -> ErrorRecord {
        ErrorRecord {
            id: "a".into(),
            timestamp: "t".into(),
            classification: Classification::Logic,
            severity: Severity::Medium,
            skill: "token-audit".into(),
            agent: "main".into(),
            message: message.into(),
            name: "TypeError".into(),
            stack: Some(format!(
                "TypeError: {message}\n at run (/app/skills/token-audit/index.js:{line}:20)"
            )),
            fingerprint: "abc123def456".into(),
            input_summary: "{}".into(),
            occurrence_count: 1,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn validation_preamble_lands_in_entry_function() {
        let fix = apply_template(Classification::Validation, SKILL_SOURCE, None);
        assert!(fix.fixed_code.contains("[AUTO-FIX] input validation"));
        // Preamble sits after the function opening, before the first await.
        let marker = fix.fixed_code.find("[AUTO-FIX]").unwrap();
        let body = fix.fixed_code.find("axios.get").unwrap();
        let decl = fix.fixed_code.find("async function run").unwrap();
        assert!(decl < marker && marker < body);
    }

    #[test]
    fn retry_helper_after_last_require() {
        let fix = apply_template(Classification::Network, SKILL_SOURCE, None);
        let helper = fix.fixed_code.find("withRetry").unwrap();
        let last_require = fix.fixed_code.rfind("require(").unwrap();
        assert!(helper > last_require);
        assert!(fix.fixed_code.contains("[AUTO-FIX] retry helper"));
        // Api class shares the same strategy.
        let api = apply_template(Classification::Api, SKILL_SOURCE, None);
        assert!(api.fixed_code.contains("withRetry"));
    }

    #[test]
    fn timeout_helper_injected() {
        let fix = apply_template(Classification::Timeout, SKILL_SOURCE, None);
        assert!(fix.fixed_code.contains("withTimeout"));
        assert!(fix.fixed_code.contains("[AUTO-FIX] timeout guard"));
    }

    #[test]
    fn null_check_targets_offending_line() {
        // Line 6 is `return data.body.value;`.
        let record = logic_error("Cannot read properties of undefined (reading 'value')", 6);
        let fix = apply_template(Classification::Logic, SKILL_SOURCE, Some(&record));
        assert!(fix.fixed_code.contains("if (!data.body) { return null; }"));
        let guard = fix.fixed_code.find("if (!data.body)").unwrap();
        let access = fix.fixed_code.find("return data.body.value").unwrap();
        assert!(guard < access);
    }

    #[test]
    fn logic_without_undefined_message_wraps_try_catch() {
        let record = logic_error("x is not a function", 5);
        let fix = apply_template(Classification::Logic, SKILL_SOURCE, Some(&record));
        assert!(fix.fixed_code.contains("try {"));
        assert!(fix.fixed_code.contains("} catch (err) {"));
        assert!(fix.fixed_code.contains("[AUTO-FIX]"));
    }

    #[test]
    fn null_check_with_drifted_line_falls_back() {
        // Stack names line 40, which no longer exists.
        let record = logic_error("Cannot read properties of undefined (reading 'value')", 40);
        let fix = apply_template(Classification::Logic, SKILL_SOURCE, Some(&record));
        assert!(fix.fixed_code.contains("try {"));
    }

    #[test]
    fn unknown_classification_wraps_try_catch() {
        let fix = apply_template(Classification::Unknown, SKILL_SOURCE, None);
        assert!(fix.fixed_code.contains("try {"));
        // The wrapped body is preserved.
        assert!(fix.fixed_code.contains("axios.get"));
        assert!(fix.fixed_code.contains("module.exports = { run };"));
    }

    #[test]
    fn source_without_functions_still_marked() {
        let bare = "const x = 1;\n";
        let fix = apply_template(Classification::Unknown, bare, None);
        assert!(fix.fixed_code.contains("[AUTO-FIX]"));
        assert!(fix.fixed_code.contains("const x = 1;"));
    }

    #[test]
    fn matching_brace_handles_nesting() {
        let src = "function a() { if (x) { y(); } return z; }";
        let open = src.find('{').unwrap();
        let close = matching_brace(src, open).unwrap();
        assert_eq!(&src[close..], "}");
    }

    #[test]
    fn helper_without_requires_prepends() {
        let bare = "async function go() { return 1; }\n";
        let fix = apply_template(Classification::Api, bare, None);
        assert!(fix.fixed_code.starts_with("// [AUTO-FIX] retry helper"));
    }
}
