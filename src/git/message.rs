//! Commit messages for published documents.
//!
//! Subject is `"<author>: <reason>"`. The body lists up to ten changed lines
//! and ends with a `Persona-Actor` trailer.

use std::path::Path;

use crate::core::DocPath;

const MAX_SUMMARY_LINES: usize = 10;
const MAX_LINE_CHARS: usize = 120;

pub fn commit_message(
    author: &str,
    reason: &str,
    path: &DocPath,
    before: Option<&[u8]>,
    after: &[u8],
) -> String {
    let reason = reason.lines().next().unwrap_or("").trim();
    let mut out = format!("{author}: {reason}\n\nPath: {path}\n\n");
    out.push_str(&diff_summary(path, before, after));
    out.push_str(&format!("\n\nPersona-Actor: {author}\n"));
    out
}

/// First changed lines between two versions of a file.
pub fn diff_summary(path: &DocPath, before: Option<&[u8]>, after: &[u8]) -> String {
    let Some(before) = before else {
        return "New file created.".to_string();
    };
    let as_path = Path::new(path.as_str());
    let lines = match git2::Patch::from_buffers(before, Some(as_path), after, Some(as_path), None)
    {
        Ok(patch) => changed_lines(&patch),
        Err(err) => {
            tracing::debug!(path = %path, error = %err, "diff summary unavailable");
            Vec::new()
        }
    };
    if lines.is_empty() {
        "No significant changes detected.".to_string()
    } else {
        lines.join("\n")
    }
}

fn changed_lines(patch: &git2::Patch<'_>) -> Vec<String> {
    let mut out = Vec::new();
    for hunk in 0..patch.num_hunks() {
        let Ok(count) = patch.num_lines_in_hunk(hunk) else {
            continue;
        };
        for idx in 0..count {
            let Ok(line) = patch.line_in_hunk(hunk, idx) else {
                continue;
            };
            let origin = line.origin();
            if origin != '+' && origin != '-' {
                continue;
            }
            let text = String::from_utf8_lossy(line.content());
            let text: String = text.trim_end().chars().take(MAX_LINE_CHARS).collect();
            out.push(format!("{origin}{text}"));
            if out.len() == MAX_SUMMARY_LINES {
                return out;
            }
        }
    }
    out
}
