//! Failure classification from captured stderr.
//!
//! [`classify`] runs an ordered table of detectors over a failed task's
//! stderr and returns the diagnosis for the first one that matches. The
//! table is evaluated most-specific first, so a missing binary is never
//! reported as a network problem even if both patterns appear.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

use crate::expand::COMPOSITE_SEPARATOR;

/// Kind of failure recognised in a tool's stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagCategory {
    ModelNotFound,
    AuthFailure,
    RateLimit,
    BinaryMissing,
    NetworkError,
    PermissionDenied,
    Overloaded,
}

impl DiagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelNotFound => "model_not_found",
            Self::AuthFailure => "auth_failure",
            Self::RateLimit => "rate_limit",
            Self::BinaryMissing => "binary_missing",
            Self::NetworkError => "network_error",
            Self::PermissionDenied => "permission_denied",
            Self::Overloaded => "overloaded",
        }
    }
}

impl fmt::Display for DiagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable explanation of a task failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnosis {
    pub category: DiagCategory,
    pub message: String,
    pub suggestion: String,
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.message, self.suggestion)
    }
}

type Detector = fn(&str) -> bool;

/// Detectors in priority order.
const RULES: &[(DiagCategory, Detector)] = &[
    (DiagCategory::BinaryMissing, is_binary_missing),
    (DiagCategory::ModelNotFound, is_model_not_found),
    (DiagCategory::AuthFailure, is_auth_failure),
    (DiagCategory::RateLimit, is_rate_limited),
    (DiagCategory::Overloaded, is_overloaded),
    (DiagCategory::PermissionDenied, is_permission_denied),
    (DiagCategory::NetworkError, is_network_error),
];

/// Classify a failed task from its stderr.
///
/// `task_hint` is the task id; it only shapes the wording (tool name, API key
/// variable). Returns `None` when nothing matches, which callers treat as a
/// generic failure.
pub fn classify(task_hint: &str, stderr: &str, _exit_code: i32) -> Option<Diagnosis> {
    let (category, _) = RULES.iter().find(|(_, detect)| detect(stderr))?;
    Some(describe(*category, task_hint, stderr))
}

fn describe(category: DiagCategory, task_hint: &str, stderr: &str) -> Diagnosis {
    let tool = tool_base_name(task_hint);
    let (message, suggestion) = match category {
        DiagCategory::BinaryMissing => {
            let binary = missing_binary(stderr).unwrap_or(tool);
            (
                format!("Binary \"{}\" not found on PATH.", binary),
                format!("Install {} or check that it is in your PATH.", binary),
            )
        }
        DiagCategory::ModelNotFound => (
            format!("The requested model was not found by {}.", tool),
            "Check that the model name is valid and available for your account.".to_string(),
        ),
        DiagCategory::AuthFailure => (
            format!("Authentication failed for {}.", tool),
            match api_key_env_var(tool) {
                Some(var) => format!("Check that {} is set and valid.", var),
                None => "Check that your API key is set and valid.".to_string(),
            },
        ),
        DiagCategory::RateLimit => (
            format!("Rate limited by {}.", tool),
            "Wait a moment and try again, or check your usage quota.".to_string(),
        ),
        DiagCategory::Overloaded => (
            "The API is temporarily overloaded.".to_string(),
            "Wait a moment and try again.".to_string(),
        ),
        DiagCategory::PermissionDenied => (
            format!("Permission denied by {}.", tool),
            "Check that your API key has the required permissions.".to_string(),
        ),
        DiagCategory::NetworkError => (
            "A network error occurred.".to_string(),
            "Check your internet connection and try again.".to_string(),
        ),
    };
    Diagnosis {
        category,
        message,
        suggestion,
    }
}

fn binary_missing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""([^"]+)": executable file not found"#).expect("valid binary-missing regex")
    })
}

fn missing_binary(stderr: &str) -> Option<&str> {
    binary_missing_re()
        .captures(stderr)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// `code: N`, `status: N` and `"code":N` markers used by the vendor CLIs.
fn has_status(stderr: &str, code: u16) -> bool {
    let markers = [
        format!("code: {}", code),
        format!("status: {}", code),
        format!("\"code\":{}", code),
    ];
    markers.iter().any(|m| stderr.contains(m.as_str()))
}

fn is_binary_missing(stderr: &str) -> bool {
    binary_missing_re().is_match(stderr)
}

fn is_model_not_found(stderr: &str) -> bool {
    const PATTERNS: &[&str] = &[
        "ModelNotFoundError",
        "model_not_found",
        "Model not found",
        "Requested entity was not found",
        "The model `",
        "does not exist",
    ];
    if contains_any(stderr, PATTERNS) {
        return true;
    }
    // A bare 404 only counts when something model-shaped is mentioned.
    has_status(stderr, 404) && contains_any(stderr, &["model", "Model", "entity"])
}

fn is_auth_failure(stderr: &str) -> bool {
    const PATTERNS: &[&str] = &[
        "UNAUTHENTICATED",
        "authentication_error",
        "Invalid API Key",
        "invalid_api_key",
        "invalid x-api-key",
        "API key not valid",
        "API key is invalid",
        "Unauthorized",
    ];
    has_status(stderr, 401) || stderr.contains("status_code: 401") || contains_any(stderr, PATTERNS)
}

fn is_rate_limited(stderr: &str) -> bool {
    const PATTERNS: &[&str] = &[
        "RESOURCE_EXHAUSTED",
        "rate_limit_error",
        "Rate limit",
        "rate limit",
        "Too many requests",
        "too many requests",
        "quota exceeded",
        "Quota exceeded",
    ];
    has_status(stderr, 429) || contains_any(stderr, PATTERNS)
}

fn is_overloaded(stderr: &str) -> bool {
    contains_any(
        stderr,
        &[
            "overloaded_error",
            "overloaded",
            "server_error",
            "503",
            "Service Unavailable",
        ],
    )
}

fn is_permission_denied(stderr: &str) -> bool {
    const PATTERNS: &[&str] = &[
        "PERMISSION_DENIED",
        "permission_denied",
        "Forbidden",
        "Access denied",
        "access denied",
    ];
    has_status(stderr, 403) || contains_any(stderr, PATTERNS)
}

fn is_network_error(stderr: &str) -> bool {
    contains_any(
        stderr,
        &[
            "connection refused",
            "Connection refused",
            "no such host",
            "dial tcp",
            "network is unreachable",
            "Network is unreachable",
            "TLS handshake timeout",
            "certificate",
            "ECONNREFUSED",
            "ENOTFOUND",
            "getaddrinfo",
        ],
    )
}

/// Tool family of a task id: `gemini-3.1-pro@security` -> `gemini`.
fn tool_base_name(task_hint: &str) -> &str {
    let base = task_hint
        .split_once(COMPOSITE_SEPARATOR)
        .map_or(task_hint, |(base, _)| base);
    let lower = base.to_ascii_lowercase();
    ["claude", "codex", "gemini", "amp"]
        .into_iter()
        .find(|prefix| lower.starts_with(prefix))
        .unwrap_or(base)
}

fn api_key_env_var(tool: &str) -> Option<&'static str> {
    match tool.to_ascii_lowercase().as_str() {
        "claude" => Some("ANTHROPIC_API_KEY"),
        "codex" => Some("OPENAI_API_KEY"),
        "gemini" => Some("GEMINI_API_KEY or GOOGLE_API_KEY"),
        "amp" => Some("AMP_API_KEY"),
        _ => None,
    }
}
