//! Attack signature detection.
//!
//! # Responsibilities
//! - Scan the request URL and body for SQL injection, XSS and path traversal
//! - Report the first matching family as the block reason
//!
//! # Design Decisions
//! - Families are checked in a fixed order: SQL injection, XSS, path traversal.
//!   When a payload matches more than one family only the first is reported.
//!   The order is arbitrary but must stay stable.
//! - The URL is scanned raw and percent-decoded (twice, for double encoding)
//! - Heuristics deliberately over-block; do not narrow them to cut false positives

use std::borrow::Cow;
use std::fmt;

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

static SQL_INJECTION: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        // ' OR '1'='1, " and x=x
        r#"(?i)['"]\s*(?:or|and)\s+['"]?\w+['"]?\s*=\s*['"]?\w+"#,
        // OR 1=1
        r"(?i)\b(?:or|and)\s+\d+\s*=\s*\d+",
        r"(?is)\bunion\b.*\bselect\b",
        r"(?is)\b(?:select|insert|update|delete|drop|alter|create|truncate|exec|execute)\b.*\b(?:from|into|table|database|set)\b",
        r"(?i);\s*(?:select|insert|update|delete|drop|alter|create|truncate|shutdown)\b",
        // Quote followed by a comment terminator
        r#"['"]\s*(?:--|#|/\*)"#,
        r"(?s)/\*.*?\*/",
        r"(?i)\b(?:sleep|benchmark|pg_sleep|load_file)\s*\(",
        r"(?i)\bwaitfor\s+delay\b",
    ])
    .expect("SQL injection patterns compile")
});

static XSS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)<\s*script\b",
        r"(?i)<\s*/\s*script\s*>",
        r"(?i)\b(?:javascript|vbscript|livescript)\s*:",
        // Event handler attribute inside a tag
        r"(?i)<[^>]*\bon[a-z]+\s*=",
        r"(?i)\bon(?:load|error|click|mouseover|mouseenter|focus|blur|submit|change|input|keydown|keyup|animationstart)\s*=",
        r"(?i)<\s*(?:iframe|object|embed|applet|base)\b",
        r"(?i)\bexpression\s*\(",
        r"(?i)data\s*:\s*text/html",
    ])
    .expect("XSS patterns compile")
});

static PATH_TRAVERSAL: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"\.\./",
        r"\.\.\\",
        r"(?i)%2e%2e(?:%2f|%5c|/|\\)",
        r"(?i)\.\.(?:%2f|%5c)",
        r"(?i)%252e%252e",
    ])
    .expect("path traversal patterns compile")
});

/// Signature family that caused a request to be flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    SqlInjection,
    Xss,
    PathTraversal,
}

impl ThreatKind {
    /// Priority order in which families are evaluated.
    pub const PRIORITY: [ThreatKind; 3] = [
        ThreatKind::SqlInjection,
        ThreatKind::Xss,
        ThreatKind::PathTraversal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatKind::SqlInjection => "sql_injection",
            ThreatKind::Xss => "xss",
            ThreatKind::PathTraversal => "path_traversal",
        }
    }

    fn patterns(&self) -> &'static RegexSet {
        match self {
            ThreatKind::SqlInjection => &SQL_INJECTION,
            ThreatKind::Xss => &XSS,
            ThreatKind::PathTraversal => &PATH_TRAVERSAL,
        }
    }
}

impl fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of scanning one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanResult {
    pub suspicious: bool,
    pub reason: Option<ThreatKind>,
}

impl ScanResult {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn flagged(reason: ThreatKind) -> Self {
        Self {
            suspicious: true,
            reason: Some(reason),
        }
    }
}

/// Scan a request URL and body for known attack signatures.
///
/// A match in either input flags the request. Returns on the first family that
/// matches, in [`ThreatKind::PRIORITY`] order.
pub fn scan(url: &str, body: &str) -> ScanResult {
    let candidates = variants(url)
        .into_iter()
        .chain(variants(body))
        .collect::<Vec<_>>();

    for kind in ThreatKind::PRIORITY {
        let patterns = kind.patterns();
        if candidates.iter().any(|text| patterns.is_match(text)) {
            return ScanResult::flagged(kind);
        }
    }
    ScanResult::clean()
}

/// The raw text plus up to two rounds of percent-decoding.
fn variants(raw: &str) -> Vec<Cow<'_, str>> {
    let mut out = vec![Cow::Borrowed(raw)];
    if raw.is_empty() {
        return out;
    }
    let mut current = raw.to_string();
    for _ in 0..2 {
        if !current.contains('%') && !current.contains('+') {
            break;
        }
        let decoded = decode(&current);
        if decoded == current {
            break;
        }
        out.push(Cow::Owned(decoded.clone()));
        current = decoded;
    }
    out
}

fn decode(text: &str) -> String {
    let spaced = text.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_attacks() {
        assert_eq!(scan("/api/users", "' OR '1'='1"), ScanResult::flagged(ThreatKind::SqlInjection));
        assert_eq!(
            scan("/api/comments", "<script>alert(1)</script>"),
            ScanResult::flagged(ThreatKind::Xss)
        );
        assert_eq!(
            scan("/api/files/../../etc/passwd", ""),
            ScanResult::flagged(ThreatKind::PathTraversal)
        );
    }

    #[test]
    fn test_url_and_body_both_scanned() {
        assert!(scan("/search?q=<script>alert(1)</script>", "").suspicious);
        assert!(scan("/search", "{\"q\":\"../../etc/passwd\"}").suspicious);
    }

    #[test]
    fn test_percent_encoded_url() {
        assert_eq!(
            scan("/api/users?id=%27%20OR%20%271%27%3D%271", "").reason,
            Some(ThreatKind::SqlInjection)
        );
        assert_eq!(
            scan("/api/users?id=1'+OR+'1'='1", "").reason,
            Some(ThreatKind::SqlInjection)
        );
        assert_eq!(
            scan("/static/%2e%2e%2f%2e%2e%2fetc/passwd", "").reason,
            Some(ThreatKind::PathTraversal)
        );
        assert_eq!(
            scan("/static/%252e%252e%252fetc/passwd", "").reason,
            Some(ThreatKind::PathTraversal)
        );
        assert_eq!(
            scan("/q?x=%3Cscript%3Ealert(1)%3C%2Fscript%3E", "").reason,
            Some(ThreatKind::Xss)
        );
    }

    #[test]
    fn test_priority_when_families_overlap() {
        // Matches both SQL (comment block) and XSS; SQL wins.
        let result = scan("/", "/* x */ <script>alert(1)</script>");
        assert_eq!(result.reason, Some(ThreatKind::SqlInjection));

        // Matches XSS and traversal; XSS wins.
        let result = scan("/../x", "<iframe src=x>");
        assert_eq!(result.reason, Some(ThreatKind::Xss));
    }

    #[test]
    fn test_more_sql_signatures() {
        for payload in [
            "1 OR 1=1",
            "1 UNION SELECT password FROM users",
            "x'; DROP TABLE users; --",
            "admin'--",
            "1 AND SLEEP(5)",
            "1; WAITFOR DELAY '0:0:5'",
        ] {
            assert_eq!(scan("/", payload).reason, Some(ThreatKind::SqlInjection), "{}", payload);
        }
    }

    #[test]
    fn test_more_xss_signatures() {
        for payload in [
            "<img src=x onerror=alert(1)>",
            "javascript:alert(document.cookie)",
            "<svg onload=alert(1)>",
            "<iframe src=\"https://evil.example\">",
            "<body onload = steal()>",
        ] {
            assert_eq!(scan("/", payload).reason, Some(ThreatKind::Xss), "{}", payload);
        }
    }

    #[test]
    fn test_backslash_traversal() {
        assert_eq!(scan("/", "..\\..\\windows\\win.ini").reason, Some(ThreatKind::PathTraversal));
    }

    #[test]
    fn test_benign_traffic() {
        assert_eq!(scan("/api/projects?page=2&sort=name", ""), ScanResult::clean());
        assert_eq!(
            scan("/api/auth/login", r#"{"email":"dev@example.com","password":"hunter2"}"#),
            ScanResult::clean()
        );
        assert_eq!(
            scan("/api/ai/chat", r#"{"prompt":"Summarise the weekly report","count":3}"#),
            ScanResult::clean()
        );
        assert_eq!(scan("/api/docs/v1.2/index", ""), ScanResult::clean());
        assert_eq!(scan("", ""), ScanResult::clean());
    }

    #[test]
    fn test_deterministic() {
        let inputs = [
            ("/a", "' OR '1'='1"),
            ("/b", "<script>alert(1)</script>"),
            ("/c/../../etc/passwd", ""),
            ("/d", "hello"),
        ];
        let first: Vec<_> = inputs.iter().map(|(u, b)| scan(u, b)).collect();
        let second: Vec<_> = inputs.iter().rev().map(|(u, b)| scan(u, b)).collect();
        let second: Vec<_> = second.into_iter().rev().collect();
        assert_eq!(first, second);
    }
}
