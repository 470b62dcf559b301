//! Invocation descriptions and the builder seam that produces them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How one external process is launched.
///
/// Produced by an [`InvocationBuilder`]; the dispatch engine treats it as
/// opaque and never edits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable name or path.
    pub program: String,

    /// Ordered argument list.
    pub args: Vec<String>,

    /// Data piped to the process's standard input, if any.
    pub stdin: Option<String>,

    /// Working directory for the process.
    pub working_dir: PathBuf,
}

impl Invocation {
    /// Create an invocation of `program` with no arguments in the current directory.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            working_dir: PathBuf::from("."),
        }
    }

    /// Builder method to append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Builder method to append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Builder method to set the stdin payload.
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Builder method to set the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Resource-access policy requested from a tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessPolicy {
    /// The tool must be restricted to read-only operations.
    #[default]
    Enforced,
    /// Ask the tool to stay read-only where it supports it.
    BestEffort,
    /// No restriction.
    None,
}

impl AccessPolicy {
    /// Name as written in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enforced => "enforced",
            Self::BestEffort => "bestEffort",
            Self::None => "none",
        }
    }
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared run parameters handed to every invocation builder.
#[derive(Debug, Clone, PartialEq)]
pub struct RunParams {
    /// The prompt text.
    pub prompt: String,

    /// Path of a file holding the prompt, when one was written.
    pub prompt_file: Option<PathBuf>,

    /// Directory the tool should work in.
    pub working_dir: PathBuf,

    /// Requested access policy. Builders translate it into tool flags; the
    /// engine does not enforce it.
    pub access: AccessPolicy,

    /// Per-task deadline. Enforced by the engine; builders may pass it on to
    /// tools that accept their own time limit.
    pub timeout: Duration,
}

impl RunParams {
    /// Create run parameters for `prompt` with default policy and timeout.
    pub fn new(prompt: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            prompt_file: None,
            working_dir: working_dir.into(),
            access: AccessPolicy::default(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Builder method to set the prompt file.
    pub fn with_prompt_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.prompt_file = Some(path.into());
        self
    }

    /// Builder method to set the access policy.
    pub fn with_access(mut self, access: AccessPolicy) -> Self {
        self.access = access;
        self
    }

    /// Builder method to set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Builds the invocation for one named tool.
///
/// Implementations own all knowledge of a tool's command line; the engine
/// never constructs argument lists itself.
pub trait InvocationBuilder: Send + Sync {
    /// Short name of the tool family this builder targets.
    fn name(&self) -> &str;

    /// Build the invocation for the given parameters.
    fn build(&self, params: &RunParams) -> Invocation;
}
