// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound text sanitization.
//!
//! Strips control characters, truncates overly long messages, and redacts
//! suspiciously long URLs. The issue list is recorded alongside the
//! persisted message for auditing.

use std::sync::OnceLock;

use regex::Regex;

/// Maximum message length after sanitization.
const MAX_LEN: usize = 4000;

/// URLs at or above this length are replaced wholesale.
const URL_REDACT_LEN: usize = 120;

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)https?://\S+").expect("static regex"))
}

/// Sanitizes inbound text, returning the cleaned string and the list of
/// issues found.
pub fn sanitize_text(text: &str) -> (String, Vec<String>) {
    let mut issues = Vec::new();

    // Remove control characters except newline and tab.
    let mut cleaned: String = text
        .chars()
        .filter(|&ch| ch >= ' ' || ch == '\n' || ch == '\t')
        .collect();
    if cleaned != text {
        issues.push("control_chars_removed".to_string());
    }

    let url_count = url_re().find_iter(&cleaned).count();

    if cleaned.chars().count() > MAX_LEN {
        cleaned = cleaned.chars().take(MAX_LEN).collect();
        issues.push("truncated".to_string());
    }

    // Redact long query-string-laden links.
    let redacted = url_re().replace_all(&cleaned, |caps: &regex::Captures<'_>| {
        let m = &caps[0];
        if m.len() >= URL_REDACT_LEN {
            "[link_redacted]".to_string()
        } else {
            m.to_string()
        }
    });
    cleaned = redacted.into_owned();

    if url_count > 0 {
        issues.push(format!("urls:{url_count}"));
    }

    (cleaned, issues)
}
