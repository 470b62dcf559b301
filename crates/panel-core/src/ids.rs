//! Newtype wrappers for identifiers to ensure type safety.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::expand::COMPOSITE_SEPARATOR;

/// True if `id` is non-empty and only uses `[a-zA-Z0-9._-]`, so it can be
/// used as a file name without escaping its directory.
pub fn is_file_safe(id: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9._-]+$").expect("valid file-safe id regex"));
    re.is_match(id)
}

/// Identifier of a task within one dispatch batch.
///
/// Task ids double as file name stems for per-task output, so they are kept
/// as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new TaskId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<CompositeId> for TaskId {
    fn from(id: CompositeId) -> Self {
        Self(id.to_string())
    }
}

/// A base task paired with an optional modifier (e.g. a persona).
///
/// Kept as two fields internally; the `base@modifier` form only exists at
/// the boundary (task ids, file names, display).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    /// The base task the composite was expanded from.
    pub base: TaskId,

    /// The modifier applied to the base, if any.
    pub modifier: Option<String>,
}

impl CompositeId {
    /// Create a composite of `base` and `modifier`.
    pub fn new(base: impl Into<TaskId>, modifier: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            modifier: Some(modifier.into()),
        }
    }

    /// A composite with no modifier.
    pub fn bare(base: impl Into<TaskId>) -> Self {
        Self {
            base: base.into(),
            modifier: None,
        }
    }

    /// Split a joined identifier at the first separator.
    ///
    /// `"a@b@c"` parses as base `a`, modifier `b@c`. Identifiers without a
    /// separator yield no modifier.
    pub fn parse(s: &str) -> Self {
        match s.split_once(COMPOSITE_SEPARATOR) {
            Some((base, modifier)) => Self::new(base, modifier),
            None => Self::bare(s),
        }
    }

    /// The modifier, or an empty string when there is none.
    pub fn modifier_str(&self) -> &str {
        self.modifier.as_deref().unwrap_or("")
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.modifier {
            Some(m) => write!(f, "{}{}{}", self.base, COMPOSITE_SEPARATOR, m),
            None => write!(f, "{}", self.base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_safe_ids() {
        assert!(is_file_safe("claude-opus_4.1"));
        assert!(!is_file_safe("../x"));
        assert!(!is_file_safe("a/b"));
        assert!(!is_file_safe("with space"));
        assert!(!is_file_safe(""));
    }

    #[test]
    fn test_id_display() {
        let id = TaskId::new("claude-opus");
        assert_eq!(format!("{}", id), "claude-opus");
    }

    #[test]
    fn test_composite_display() {
        let id = CompositeId::new("claude", "security");
        assert_eq!(id.to_string(), "claude@security");
        assert_eq!(CompositeId::bare("claude").to_string(), "claude");
    }

    #[test]
    fn test_composite_parse_splits_at_first_separator() {
        let id = CompositeId::parse("gemini@devil@advocate");
        assert_eq!(id.base.as_str(), "gemini");
        assert_eq!(id.modifier.as_deref(), Some("devil@advocate"));
    }

    #[test]
    fn test_composite_parse_without_separator() {
        let id = CompositeId::parse("codex");
        assert_eq!(id.base.as_str(), "codex");
        assert_eq!(id.modifier, None);
        assert_eq!(id.modifier_str(), "");
    }

    #[test]
    fn test_composite_into_task_id() {
        let id: TaskId = CompositeId::new("amp", "reviewer").into();
        assert_eq!(id.as_str(), "amp@reviewer");
    }
}
