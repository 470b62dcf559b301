//! Invocation builder driven by the argument templates in `panel.json`.

use panel_core::{Invocation, InvocationBuilder, RunParams};

use crate::config::ToolConfig;

const PROMPT_PLACEHOLDER: &str = "{prompt}";
const PROMPT_FILE_PLACEHOLDER: &str = "{prompt_file}";
const ACCESS_PLACEHOLDER: &str = "{access}";
const TIMEOUT_PLACEHOLDER: &str = "{timeout}";

/// A tool launched from a configured command template.
///
/// `{prompt}` and `{prompt_file}` in arguments are substituted. Without
/// either placeholder the prompt is appended as the last argument, unless
/// the tool reads it from stdin. `{access}` becomes the access policy name
/// and `{timeout}` the timeout in whole seconds; a template without them
/// does not pass either on to the tool.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    name: String,
    binary: String,
    args: Vec<String>,
    stdin: bool,
}

impl CommandTemplate {
    pub fn new(name: impl Into<String>, binary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binary: binary.into(),
            args: Vec::new(),
            stdin: false,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_stdin(mut self, stdin: bool) -> Self {
        self.stdin = stdin;
        self
    }

    /// Template for the configured tool `name`.
    pub fn from_config(name: impl Into<String>, tool: &ToolConfig) -> Self {
        Self::new(name, tool.binary.clone())
            .with_args(tool.args.clone())
            .with_stdin(tool.stdin)
    }
}

impl InvocationBuilder for CommandTemplate {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, params: &RunParams) -> Invocation {
        let prompt_file = params
            .prompt_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let access = params.access.as_str();
        let timeout = params.timeout.as_secs().to_string();

        let mut has_placeholder = false;
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(PROMPT_PLACEHOLDER) || arg.contains(PROMPT_FILE_PLACEHOLDER) {
                    has_placeholder = true;
                }
                // The prompt goes last so its own text is never expanded.
                arg.replace(PROMPT_FILE_PLACEHOLDER, &prompt_file)
                    .replace(ACCESS_PLACEHOLDER, access)
                    .replace(TIMEOUT_PLACEHOLDER, &timeout)
                    .replace(PROMPT_PLACEHOLDER, &params.prompt)
            })
            .collect();

        let mut invocation = Invocation::new(&self.binary)
            .args(args)
            .with_working_dir(&params.working_dir);

        if self.stdin {
            invocation = invocation.with_stdin(&params.prompt);
        } else if !has_placeholder {
            invocation = invocation.arg(&params.prompt);
        }
        invocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panel_core::AccessPolicy;
    use std::path::PathBuf;
    use std::time::Duration;

    fn params() -> RunParams {
        RunParams::new("review {this}", "/work").with_prompt_file("/runs/x/prompt.md")
    }

    #[test]
    fn test_prompt_placeholder() {
        let tool = CommandTemplate::new("claude", "claude")
            .with_args(vec!["-p".into(), "{prompt}".into(), "--verbose".into()]);
        let inv = tool.build(&params());

        assert_eq!(inv.program, "claude");
        assert_eq!(inv.args, ["-p", "review {this}", "--verbose"]);
        assert_eq!(inv.stdin, None);
        assert_eq!(inv.working_dir, PathBuf::from("/work"));
    }

    #[test]
    fn test_prompt_file_placeholder() {
        let tool = CommandTemplate::new("codex", "codex")
            .with_args(vec!["exec".into(), "--input={prompt_file}".into()]);
        let inv = tool.build(&params());
        assert_eq!(inv.args, ["exec", "--input=/runs/x/prompt.md"]);
    }

    #[test]
    fn test_prompt_appended_without_placeholder() {
        let tool = CommandTemplate::new("amp", "amp").with_args(vec!["-x".into()]);
        let inv = tool.build(&params());
        assert_eq!(inv.args, ["-x", "review {this}"]);
    }

    #[test]
    fn test_access_and_timeout_placeholders() {
        let tool = CommandTemplate::new("custom", "custom").with_args(vec![
            "--sandbox={access}".into(),
            "--max-seconds".into(),
            "{timeout}".into(),
        ]);
        let params = params()
            .with_access(AccessPolicy::BestEffort)
            .with_timeout(Duration::from_secs(90));
        let inv = tool.build(&params);

        // Neither placeholder stands in for the prompt.
        assert_eq!(inv.args, ["--sandbox=bestEffort", "--max-seconds", "90", "review {this}"]);
    }

    #[test]
    fn test_prompt_text_is_not_expanded() {
        let tool = CommandTemplate::new("claude", "claude").with_args(vec!["{prompt}".into()]);
        let params = RunParams::new("use {access} and {timeout}", "/work");
        assert_eq!(tool.build(&params).args, ["use {access} and {timeout}"]);
    }

    #[test]
    fn test_stdin_tool() {
        let tool = CommandTemplate::new("gemini", "gemini").with_stdin(true);
        let inv = tool.build(&params());
        assert!(inv.args.is_empty());
        assert_eq!(inv.stdin.as_deref(), Some("review {this}"));
    }

    #[test]
    fn test_from_config() {
        let config = ToolConfig {
            binary: "/opt/bin/tool".into(),
            args: vec!["{prompt}".into()],
            stdin: false,
            enabled: true,
        };
        let tool = CommandTemplate::from_config("custom", &config);
        assert_eq!(tool.name(), "custom");
        assert_eq!(tool.build(&params()).program, "/opt/bin/tool");
    }
}
