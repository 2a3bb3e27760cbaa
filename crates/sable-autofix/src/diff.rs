//! Line-by-line diff between original and fixed sources.

/// Positional diff: lines that differ are emitted as a `-` original line
/// followed by a `+` fixed line; unpaired tail lines appear on their own.
#[must_use]
pub fn line_diff(original: &str, fixed: &str) -> String {
    let old_lines: Vec<&str> = original.lines().collect();
    let new_lines: Vec<&str> = fixed.lines().collect();
    let mut out = String::new();

    for i in 0..old_lines.len().max(new_lines.len()) {
        match (old_lines.get(i), new_lines.get(i)) {
            (Some(old), Some(new)) if old != new => {
                out.push_str(&format!("- {old}\n+ {new}\n"));
            }
            (Some(old), None) => out.push_str(&format!("- {old}\n")),
            (None, Some(new)) => out.push_str(&format!("+ {new}\n")),
            _ => {}
        }
    }
    out
}
