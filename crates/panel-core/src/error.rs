//! Core domain errors.

use thiserror::Error;

/// Core domain errors for Panel.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Modifier id is not safe to use as a file name.
    #[error("Invalid modifier id '{0}': must match [a-zA-Z0-9._-]+")]
    InvalidModifierId(String),

    /// Modifier file could not be read.
    #[error("Modifier '{id}' not found: {source}")]
    ModifierNotFound {
        id: String,
        #[source]
        source: std::io::Error,
    },

    /// Modifier file exists but has no content.
    #[error("Modifier '{0}' is empty")]
    EmptyModifier(String),
}
