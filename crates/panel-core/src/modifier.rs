//! Modifier (persona) content loading.
//!
//! A modifier is a named block of text injected ahead of the prompt. Many
//! composite tasks usually share the same few modifiers, so loads go through
//! a [`ModifierCache`] that reads each modifier at most once per batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::ids::is_file_safe;
use crate::CoreError;

/// Source of modifier content by id.
pub trait ModifierSource {
    fn load(&self, id: &str) -> Result<String, CoreError>;
}

/// Check that a modifier id is safe to use as a file name.
pub fn validate_modifier_id(id: &str) -> Result<(), CoreError> {
    if is_file_safe(id) {
        Ok(())
    } else {
        Err(CoreError::InvalidModifierId(id.to_string()))
    }
}

/// Loads `<dir>/<id>.md`.
#[derive(Debug, Clone)]
pub struct FsModifierSource {
    dir: PathBuf,
}

impl FsModifierSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ModifierSource for FsModifierSource {
    fn load(&self, id: &str) -> Result<String, CoreError> {
        validate_modifier_id(id)?;
        let path = self.dir.join(format!("{}.md", id));
        let content = std::fs::read_to_string(&path).map_err(|source| CoreError::ModifierNotFound {
            id: id.to_string(),
            source,
        })?;
        if content.trim().is_empty() {
            return Err(CoreError::EmptyModifier(id.to_string()));
        }
        Ok(content)
    }
}

/// Memoizes modifier loads for one batch.
pub struct ModifierCache<S> {
    source: S,
    loaded: HashMap<String, String>,
}

impl<S: ModifierSource> ModifierCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            loaded: HashMap::new(),
        }
    }

    /// Content for `id`, reading from the source only on first use.
    pub fn get(&mut self, id: &str) -> Result<&str, CoreError> {
        if !self.loaded.contains_key(id) {
            let content = self.source.load(id)?;
            self.loaded.insert(id.to_string(), content);
        }
        Ok(self.loaded[id].as_str())
    }

    /// Number of distinct modifiers loaded so far.
    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

/// Put modifier content ahead of the prompt as a role section.
///
/// Empty content leaves the prompt untouched.
pub fn inject(content: &str, prompt: &str) -> String {
    let content = content.trim();
    if content.is_empty() {
        return prompt.to_string();
    }
    format!("## Role\n\n{}\n\n---\n\n{}", content, prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct CountingSource {
        loads: RefCell<Vec<String>>,
    }

    impl ModifierSource for CountingSource {
        fn load(&self, id: &str) -> Result<String, CoreError> {
            self.loads.borrow_mut().push(id.to_string());
            Ok(format!("content of {}", id))
        }
    }

    #[test]
    fn test_cache_loads_once() {
        let mut cache = ModifierCache::new(CountingSource {
            loads: RefCell::new(Vec::new()),
        });

        for id in ["security", "architect", "security", "security", "architect"] {
            assert_eq!(cache.get(id).unwrap(), format!("content of {}", id));
        }

        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.source.loads.borrow().as_slice(),
            ["security", "architect"]
        );
    }

    #[test]
    fn test_validate_modifier_id() {
        assert!(validate_modifier_id("security").is_ok());
        assert!(validate_modifier_id("devil.v2_final-1").is_ok());
        assert!(matches!(
            validate_modifier_id("../etc/passwd"),
            Err(CoreError::InvalidModifierId(_))
        ));
        assert!(validate_modifier_id("").is_err());
    }

    #[test]
    fn test_fs_source_reads_markdown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("security.md"), "You are a security engineer.").unwrap();
        std::fs::write(dir.path().join("blank.md"), "  \n").unwrap();

        let source = FsModifierSource::new(dir.path());
        assert_eq!(source.load("security").unwrap(), "You are a security engineer.");
        assert!(matches!(source.load("blank"), Err(CoreError::EmptyModifier(_))));
        assert!(matches!(
            source.load("missing"),
            Err(CoreError::ModifierNotFound { .. })
        ));
        assert!(matches!(
            source.load("../security"),
            Err(CoreError::InvalidModifierId(_))
        ));
    }

    #[test]
    fn test_inject() {
        let out = inject("You are a security expert.", "Review this code");
        assert!(out.starts_with("## Role"));
        assert!(out.contains("You are a security expert."));
        assert!(out.contains("---"));
        assert!(out.find("## Role").unwrap() < out.find("Review this code").unwrap());
    }

    #[test]
    fn test_inject_empty() {
        assert_eq!(inject("", "Review this code"), "Review this code");
    }
}
