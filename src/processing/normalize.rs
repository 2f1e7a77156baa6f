//! Noise removal for raw PDF text.
//!
//! Extracted PDF text carries artifacts that hurt retrieval quality: page
//! numbers, repeated boilerplate markers, decorative rules, and erratic
//! whitespace. [`normalize`] strips them while preserving blank lines as
//! paragraph separators, so the chunker downstream can split on `\n\n`.

use regex::Regex;
use std::sync::OnceLock;

fn horizontal_whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\u{a0}]+").expect("valid regex"))
}

fn decorative_rule() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-_]{3,}").expect("valid regex"))
}

fn noise_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(page\s+\d+(\s+of\s+\d+)?|\d+|confidential|draft)$")
            .expect("valid regex")
    })
}

/// Normalize raw extracted text.
///
/// - Collapses non-breaking spaces and runs of horizontal whitespace to single spaces.
/// - Removes page-number lines (`Page 3`, `Page 3 of 12`, bare integers) and
///   boilerplate markers (`confidential`, `draft`) standing alone on a line.
/// - Removes runs of three or more dashes/underscores.
/// - Collapses three or more consecutive newlines to exactly two.
///
/// The function is idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let mut lines: Vec<String> = Vec::new();

    for line in raw.lines() {
        if line.trim().is_empty() {
            lines.push(String::new());
            continue;
        }

        let stripped = decorative_rule().replace_all(line, "");
        let collapsed = horizontal_whitespace().replace_all(&stripped, " ");
        let trimmed = collapsed.trim();

        if trimmed.is_empty() || noise_line().is_match(trimmed) {
            continue;
        }

        lines.push(trimmed.to_string());
    }

    collapse_blank_runs(&lines)
}

/// Join lines, reducing any run of blank lines to a single blank line.
fn collapse_blank_runs(lines: &[String]) -> String {
    let mut out = String::new();
    let mut pending_blank = false;

    for line in lines {
        if line.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if pending_blank {
            out.push_str("\n\n");
            pending_blank = false;
        } else if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }

    out
}
