//! Oracle prompt construction and response parsing.

use std::sync::LazyLock;

use regex::Regex;
use sable_errlog::ErrorRecord;
use sable_improve::{Correction, Proposal};

use crate::error::FixError;

static CODE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:\w+)?\n(.*?)```").unwrap());

/// Parsed oracle response.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub explanation: String,
    pub fixed_code: String,
}

/// Build the fix prompt: issue, error details, correction examples, the
/// source, and the output rules.
#[must_use]
pub fn build_prompt(
    proposal: &Proposal,
    error: Option<&ErrorRecord>,
    corrections: &[Correction],
    source: &str,
) -> String {
    use std::fmt::Write;

    let mut prompt = String::new();
    let _ = writeln!(prompt, "You maintain the source of an agent skill.");
    let _ = writeln!(prompt, "\nIssue to fix:\n{}", proposal.description);

    if let Some(record) = error {
        let _ = writeln!(
            prompt,
            "\nError details:\n- message: {}\n- classification: {}\n- occurrences: {}",
            record.message, record.classification, record.occurrence_count
        );
        if let Some(stack) = &record.stack {
            let _ = writeln!(prompt, "- stack:\n{stack}");
        }
        let _ = writeln!(prompt, "- input summary: {}", record.input_summary);
    }

    if !corrections.is_empty() {
        let _ = writeln!(prompt, "\nRecent user corrections of this skill:");
        for correction in corrections {
            let _ = writeln!(prompt, "- {}", correction.reason);
        }
    }

    let _ = writeln!(prompt, "\nCurrent source:\n```js\n{source}\n```");
    let _ = writeln!(
        prompt,
        "\nRules:\n\
         - Return only the complete fixed file.\n\
         - Do not add new dependencies.\n\
         - Make the minimum change that fixes the issue.\n\
         \nRespond with a line starting with EXPLANATION: followed by the \
         full fixed file in a fenced code block."
    );
    prompt
}

/// Parse `EXPLANATION:` free text and the fenced code block.
///
/// # Errors
///
/// Returns [`FixError::NoCodeBlock`] when no fenced block is present.
pub fn parse_response(text: &str) -> Result<Synthesis, FixError> {
    let fixed_code = CODE_BLOCK
        .captures(text)
        .map(|c| c[1].to_string())
        .ok_or(FixError::NoCodeBlock)?;

    let explanation = text
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("EXPLANATION:"))
        .take_while(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<&str>>()
        .join("\n")
        .trim_start_matches("EXPLANATION:")
        .trim()
        .to_string();

    Ok(Synthesis {
        explanation,
        fixed_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_improve::{ActionKind, Effort, InsightType, ProposalSeverity, ProposalStatus};

    fn proposal() -> Proposal {
        Proposal {
            id: "p".into(),
            insight_type: InsightType::ErrorPattern,
            skill: Some("token-audit".into()),
            severity: ProposalSeverity::Medium,
            status: ProposalStatus::Approved,
            action: ActionKind::AddErrorHandling,
            description: "Recurring ECONNREFUSED in token-audit".into(),
            implementation: "add retry".into(),
            effort: Effort::Medium,
            created_at: "t".into(),
            approved_at: None,
            rejected_at: None,
            applied_at: None,
            notes: None,
            rejection_reason: None,
            data: serde_json::Value::Null,
        }
    }

    #[test]
    fn prompt_carries_issue_source_and_rules() {
        let prompt = build_prompt(&proposal(), None, &[], "const x = 1;");
        assert!(prompt.contains("Recurring ECONNREFUSED"));
        assert!(prompt.contains("const x = 1;"));
        assert!(prompt.contains("Return only the complete fixed file."));
        assert!(prompt.contains("Do not add new dependencies."));
        assert!(prompt.contains("minimum change"));
    }

    #[test]
    fn prompt_includes_corrections() {
        let corrections = vec![Correction {
            id: "c".into(),
            skill: "token-audit".into(),
            original: serde_json::Value::Null,
            corrected: serde_json::Value::Null,
            reason: "wrong risk score".into(),
            context: serde_json::Value::Null,
            timestamp: "t".into(),
            pattern_hash: "h".into(),
        }];
        let prompt = build_prompt(&proposal(), None, &corrections, "src");
        assert!(prompt.contains("wrong risk score"));
    }

    #[test]
    fn parses_explanation_and_code() {
        let response = "EXPLANATION: Added retry around the fetch.\n\
            \n\
            ```js\nconst fixed = true;\n```\n";
        let synthesis = parse_response(response).unwrap();
        assert_eq!(synthesis.explanation, "Added retry around the fetch.");
        assert_eq!(synthesis.fixed_code, "const fixed = true;\n");
    }

    #[test]
    fn multiline_explanation() {
        let response = "EXPLANATION: line one\nline two\n```\ncode\n```";
        let synthesis = parse_response(response).unwrap();
        assert!(synthesis.explanation.contains("line one"));
        assert!(synthesis.explanation.contains("line two"));
    }

    #[test]
    fn missing_code_block_is_synthesis_failure() {
        let result = parse_response("EXPLANATION: no code here");
        assert!(matches!(result, Err(FixError::NoCodeBlock)));
    }

    #[test]
    fn code_block_without_explanation_still_parses() {
        let synthesis = parse_response("```js\nx\n```").unwrap();
        assert_eq!(synthesis.fixed_code, "x\n");
        assert!(synthesis.explanation.is_empty());
    }
}
