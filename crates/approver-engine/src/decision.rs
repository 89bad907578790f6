//! Decision parser: free-form analyzer output -> verdict + reasoning
//!
//! Never fails. Keyword matching is ASCII case-insensitive so that byte
//! offsets found in the lowered text are valid in the original text.

use approver_core::{ReviewDecision, Verdict};

const DECISION_MARKER: &str = "decision:";
const FINAL_ANSWER_MARKER: &str = "final answer:";

const MAX_REASONING_CHARS: usize = 1000;
const TRUNCATED_CHARS: usize = 997;
const ELLIPSIS: &str = "...";

pub const APPROVED_MESSAGE: &str = "Approved by AI agent analysis";
pub const REJECTED_MESSAGE: &str = "Rejected by AI agent analysis";
pub const NO_DECISION_MESSAGE: &str = "No clear decision found, defaulting to reject";

/// Code-block delimiters stripped from captured reasoning.
const CODE_TOKENS: &[&str] = &["<code>", "</code>", "```"];

pub fn parse(raw: &str) -> ReviewDecision {
    let lower = raw.to_ascii_lowercase();

    let (verdict, defaulted) = match extract_verdict(&lower) {
        Some(v) => (v, false),
        None => (Verdict::Reject, true),
    };

    let message = extract_reasoning(raw, &lower).unwrap_or_else(|| {
        match (verdict, defaulted) {
            (_, true) => NO_DECISION_MESSAGE,
            (Verdict::Approve, false) => APPROVED_MESSAGE,
            (Verdict::Reject, false) => REJECTED_MESSAGE,
        }
        .to_string()
    });

    ReviewDecision::new(verdict, message)
}

/// Reject wins over approve within a marked section.
fn keyword_verdict(section: &str) -> Option<Verdict> {
    if section.contains("reject") {
        Some(Verdict::Reject)
    } else if section.contains("approve") {
        Some(Verdict::Approve)
    } else {
        None
    }
}

fn extract_verdict(lower: &str) -> Option<Verdict> {
    if let Some(line) = lower.lines().find(|l| l.contains(DECISION_MARKER)) {
        if let Some(v) = keyword_verdict(line) {
            return Some(v);
        }
    }

    if let Some(pos) = lower.rfind(FINAL_ANSWER_MARKER) {
        if let Some(v) = keyword_verdict(&lower[pos + FINAL_ANSWER_MARKER.len()..]) {
            return Some(v);
        }
    }

    // Whichever keyword appears first in the text decides.
    match (lower.find("approve"), lower.find("reject")) {
        (Some(a), Some(r)) if r < a => Some(Verdict::Reject),
        (Some(_), _) => Some(Verdict::Approve),
        (None, Some(_)) => Some(Verdict::Reject),
        (None, None) => None,
    }
}

fn extract_reasoning(raw: &str, lower: &str) -> Option<String> {
    let start = lower
        .rfind(FINAL_ANSWER_MARKER)
        .map(|p| p + FINAL_ANSWER_MARKER.len())
        .or_else(|| {
            lower
                .rfind(DECISION_MARKER)
                .map(|p| p + DECISION_MARKER.len())
        })?;

    let cleaned = clean(&raw[start..]);
    if cleaned.is_empty() {
        None
    } else {
        Some(truncate(cleaned))
    }
}

fn clean(text: &str) -> String {
    let mut s = text.to_string();
    for token in CODE_TOKENS {
        s = s.replace(token, "");
    }
    let trimmed = s.trim();
    unwrap_call(trimmed).unwrap_or(trimmed).trim().to_string()
}

/// Inner text of `name("...")` when the whole string has exactly that shape.
fn unwrap_call(s: &str) -> Option<&str> {
    let open = s.find("(\"")?;
    let name = &s[..open];
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let inner_start = open + 2;
    let inner_end = s.len().checked_sub(2)?;
    if !s.ends_with("\")") || inner_start > inner_end {
        return None;
    }
    Some(&s[inner_start..inner_end])
}

fn truncate(s: String) -> String {
    if s.chars().count() > MAX_REASONING_CHARS {
        let mut out: String = s.chars().take(TRUNCATED_CHARS).collect();
        out.push_str(ELLIPSIS);
        out
    } else {
        s
    }
}
