//! Panel configuration.
//!
//! Read from `panel.json`. The file is never written by the binary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use panel_core::{is_file_safe, unalias, AccessPolicy, CompositeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "panel.json";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown tool: {0:?}")]
    UnknownTool(String),

    #[error("Invalid tool id {0:?}: must match [a-zA-Z0-9._-]+")]
    InvalidToolId(String),

    #[error("Unknown team: {0:?}")]
    UnknownTeam(String),

    #[error("Team {0:?} has no modifiers")]
    EmptyTeam(String),

    #[error("No tools configured; add a \"tools\" section to panel.json")]
    NoTools,
}

/// Panel configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run-wide defaults.
    pub defaults: Defaults,

    /// Tools by id.
    pub tools: BTreeMap<String, ToolConfig>,

    /// Named lists of modifiers.
    pub teams: BTreeMap<String, Vec<String>>,
}

/// Run-wide defaults, overridable from the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Per-tool timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum tools running at once.
    pub max_parallel: usize,

    /// Base directory for run directories.
    pub output_dir: PathBuf,

    /// Directory holding `<modifier>.md` files.
    pub modifiers_dir: PathBuf,

    /// Access policy requested from tools.
    pub access: AccessPolicy,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            max_parallel: 4,
            output_dir: PathBuf::from("./agents/panel"),
            modifiers_dir: PathBuf::from("./agents/modifiers"),
            access: AccessPolicy::Enforced,
        }
    }
}

/// How one tool is launched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Executable name or path.
    pub binary: String,

    /// Argument template; may use `{prompt}` and `{prompt_file}`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Send the prompt on stdin instead of as an argument.
    #[serde(default)]
    pub stdin: bool,

    /// Included when no tools are named explicitly.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Config {
    /// Load from `path`, or from `./panel.json` when it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Tool for a task id, looking through aliases and composite ids.
    pub fn tool(&self, id: &str) -> Option<&ToolConfig> {
        let base = CompositeId::parse(id).base;
        self.tools.get(unalias(base.as_str()))
    }

    /// Tools to run: the requested ids in order, or every enabled tool.
    ///
    /// Tool ids become output file names, so each must be file-safe.
    pub fn resolve_tools(&self, requested: &[String]) -> Result<Vec<String>, ConfigError> {
        let tools = self.select_tools(requested)?;
        if let Some(bad) = tools.iter().find(|id| !is_file_safe(id)) {
            return Err(ConfigError::InvalidToolId(bad.clone()));
        }
        Ok(tools)
    }

    fn select_tools(&self, requested: &[String]) -> Result<Vec<String>, ConfigError> {
        if requested.is_empty() {
            let enabled: Vec<String> = self
                .tools
                .iter()
                .filter(|(_, tool)| tool.enabled)
                .map(|(id, _)| id.clone())
                .collect();
            if enabled.is_empty() {
                return Err(ConfigError::NoTools);
            }
            return Ok(enabled);
        }

        for id in requested {
            if !self.tools.contains_key(id) {
                return Err(ConfigError::UnknownTool(id.clone()));
            }
        }
        Ok(requested.to_vec())
    }

    /// Modifiers of a named team.
    pub fn team(&self, name: &str) -> Result<&[String], ConfigError> {
        let team = self
            .teams
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTeam(name.to_string()))?;
        if team.is_empty() {
            return Err(ConfigError::EmptyTeam(name.to_string()));
        }
        Ok(team)
    }
}
