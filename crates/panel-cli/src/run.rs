//! The `run` command: plan tasks, dispatch them, record the run.

use std::error::Error;
use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Args;
use panel_core::{
    alias_duplicates, expand, inject, unalias, AccessPolicy, CompositeId, FsModifierSource,
    InvocationBuilder, ModifierCache, ModifierSource, ProgressObserver, RunParams, Task,
};
use panel_runner::{CancellationToken, Dispatcher};
use tracing::{debug, info};

use crate::config::{Config, ConfigError};
use crate::json_output::{JsonEvent, JsonReporter};
use crate::manifest::{self, Manifest, ManifestConfig};
use crate::report::{write_summary, TextReporter};
use crate::tools::CommandTemplate;

/// Arguments of `panel run`.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Prompt text (joined with spaces); read from stdin when omitted
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,

    /// Read the prompt from a file
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Comma-separated tool ids; repeat an id to run it twice
    #[arg(short, long, value_delimiter = ',')]
    pub tools: Vec<String>,

    /// Run every tool once per modifier of this team
    #[arg(short = 'T', long, conflicts_with = "modifier")]
    pub team: Option<String>,

    /// Modifier applied to every tool
    #[arg(short = 'E', long, alias = "expert")]
    pub modifier: Option<String>,

    /// Per-tool timeout in seconds
    #[arg(long, allow_negative_numbers = true)]
    pub timeout: Option<i64>,

    /// Maximum tools running at once
    #[arg(long, allow_negative_numbers = true)]
    pub max_parallel: Option<i64>,

    /// Base output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Access policy: enforced, bestEffort or none
    #[arg(long, value_parser = parse_access)]
    pub access: Option<AccessPolicy>,

    /// Emit JSON lines on stdout instead of text
    #[arg(long)]
    pub json: bool,

    /// Print the invocations without running anything
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_access(s: &str) -> Result<AccessPolicy, String> {
    match s {
        "enforced" => Ok(AccessPolicy::Enforced),
        "bestEffort" => Ok(AccessPolicy::BestEffort),
        "none" => Ok(AccessPolicy::None),
        other => Err(format!(
            "invalid access policy {:?} (expected enforced, bestEffort or none)",
            other
        )),
    }
}

/// Settings after applying command-line overrides to the config defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub timeout: Duration,
    pub max_parallel: usize,
    pub output_dir: PathBuf,
    pub access: AccessPolicy,
}

impl Settings {
    pub fn resolve(args: &RunArgs, config: &Config) -> Self {
        let defaults = &config.defaults;
        // Negative values clamp to zero: an immediate deadline, or the
        // dispatcher's default concurrency.
        let timeout = args
            .timeout
            .map(|t| t.max(0) as u64)
            .unwrap_or(defaults.timeout_secs);
        let max_parallel = args
            .max_parallel
            .map(|n| n.max(0) as usize)
            .unwrap_or(defaults.max_parallel);
        Self {
            timeout: Duration::from_secs(timeout),
            max_parallel,
            output_dir: args.output.clone().unwrap_or_else(|| defaults.output_dir.clone()),
            access: args.access.unwrap_or(defaults.access),
        }
    }
}

/// One task of a run before it is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTask {
    /// Task id, also the output file stem.
    pub id: String,
    /// Config key of the tool.
    pub tool: String,
    pub modifier: Option<String>,
}

/// Decide which tasks a run has.
///
/// With a team every distinct tool runs once per team modifier. Otherwise
/// repeated tools get aliased ids, and a single modifier applies to all.
pub fn plan(tools: &[String], team: Option<&[String]>, modifier: Option<&str>) -> Vec<PlannedTask> {
    if let Some(team) = team {
        return expand(tools, team)
            .into_iter()
            .map(|composite| PlannedTask {
                id: composite.to_string(),
                tool: composite.base.into_inner(),
                modifier: composite.modifier,
            })
            .collect();
    }

    alias_duplicates(tools)
        .into_iter()
        .map(|alias| {
            let tool = unalias(&alias).to_string();
            let id = match modifier {
                Some(m) => CompositeId::new(alias.as_str(), m).to_string(),
                None => alias,
            };
            PlannedTask {
                id,
                tool,
                modifier: modifier.map(String::from),
            }
        })
        .collect()
}

/// A built task plus the injected prompt it needs on disk.
pub struct Prepared {
    pub task: Task,
    pub prompt_file: Option<(PathBuf, String)>,
}

/// Turn a plan into tasks, loading each modifier once.
pub fn prepare<S: ModifierSource>(
    planned: &[PlannedTask],
    config: &Config,
    base: &RunParams,
    run_dir: &Path,
    modifiers: &mut ModifierCache<S>,
) -> Result<Vec<Prepared>, Box<dyn Error>> {
    let mut prepared = Vec::with_capacity(planned.len());
    for entry in planned {
        let tool = config
            .tool(&entry.tool)
            .ok_or_else(|| ConfigError::UnknownTool(entry.tool.clone()))?;
        let builder = CommandTemplate::from_config(entry.tool.as_str(), tool);

        let (params, prompt_file) = match &entry.modifier {
            Some(modifier) => {
                let prompt = inject(modifiers.get(modifier)?, &base.prompt);
                let path = run_dir.join(format!("{}.prompt.md", entry.id));
                let mut params = base.clone().with_prompt_file(&path);
                params.prompt = prompt.clone();
                (params, Some((path, prompt)))
            }
            None => (base.clone(), None),
        };

        debug!(task_id = %entry.id, tool = builder.name(), "Prepared task");
        prepared.push(Prepared {
            task: Task::new(entry.id.as_str(), builder.build(&params)),
            prompt_file,
        });
    }
    Ok(prepared)
}

/// Prompt from `--file`, the positional words, or piped stdin.
pub fn resolve_prompt(file: Option<&Path>, words: &[String]) -> Result<String, Box<dyn Error>> {
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .map_err(|e| format!("reading prompt file {}: {}", path.display(), e).into());
    }
    if !words.is_empty() {
        return Ok(words.join(" "));
    }
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        let mut prompt = String::new();
        stdin.lock().read_to_string(&mut prompt)?;
        if !prompt.trim().is_empty() {
            return Ok(prompt);
        }
    }
    Err("no prompt provided (pass it as arguments, use --file, or pipe it to stdin)".into())
}

/// Execute `panel run`.
pub async fn execute(
    args: RunArgs,
    config: Config,
    cancel: CancellationToken,
) -> Result<(), Box<dyn Error>> {
    let prompt = resolve_prompt(args.file.as_deref(), &args.prompt)?;
    let settings = Settings::resolve(&args, &config);

    let tools = config.resolve_tools(&args.tools)?;
    let team = args.team.as_deref().map(|t| config.team(t)).transpose()?;
    let planned = plan(&tools, team, args.modifier.as_deref());
    let ids: Vec<String> = planned.iter().map(|p| p.id.clone()).collect();

    let working_dir = std::env::current_dir()?;
    let mut modifiers = ModifierCache::new(FsModifierSource::new(&config.defaults.modifiers_dir));
    let base = RunParams::new(prompt.as_str(), &working_dir)
        .with_access(settings.access)
        .with_timeout(settings.timeout);

    if args.dry_run {
        let placeholder = Path::new("<output>");
        let base = base.with_prompt_file(placeholder.join("prompt.md"));
        let prepared = prepare(&planned, &config, &base, placeholder, &mut modifiers)?;
        print_dry_run(&prepared, &planned);
        return Ok(());
    }

    let started_at = Utc::now();
    let run_dir = manifest::create_run_dir(&settings.output_dir, &prompt, started_at)?;
    let prompt_path = run_dir.join("prompt.md");
    manifest::write_private(&prompt_path, prompt.as_bytes())?;

    let base = base.with_prompt_file(&prompt_path);
    let prepared = prepare(&planned, &config, &base, &run_dir, &mut modifiers)?;
    let mut tasks = Vec::with_capacity(prepared.len());
    for Prepared { task, prompt_file } in prepared {
        if let Some((path, text)) = prompt_file {
            manifest::write_private(&path, text.as_bytes())?;
        }
        tasks.push(task);
    }

    info!(
        tasks = tasks.len(),
        modifiers = modifiers.len(),
        run_dir = %run_dir.display(),
        "Starting run"
    );

    let json = args.json.then(|| Arc::new(JsonReporter::new(std::io::stdout())));
    let observer: Arc<dyn ProgressObserver> = match &json {
        Some(reporter) => {
            reporter.emit(&JsonEvent::run_started(&run_dir, &ids));
            reporter.clone()
        }
        None => {
            eprintln!("Dispatching to {} tool(s): {}", ids.len(), ids.join(", "));
            eprintln!("Output: {}", run_dir.display());
            Arc::new(TextReporter::new(std::io::stderr()))
        }
    };

    let dispatcher = Dispatcher::new(&run_dir)
        .with_max_concurrency(settings.max_parallel)
        .with_timeout(settings.timeout)
        .with_observer(observer)
        .with_cancellation(cancel);
    let results = dispatcher.dispatch(tasks).await?;

    // Written even after Ctrl-C so the partial run is still recorded.
    let manifest = Manifest::build(
        &prompt,
        started_at,
        &results,
        ManifestConfig {
            access: settings.access,
            timeout_secs: settings.timeout.as_secs(),
            max_parallel: dispatcher.max_concurrency(),
        },
    );
    manifest.write(&run_dir)?;

    match json {
        Some(reporter) => reporter.emit(&JsonEvent::run_completed(&manifest)),
        None => write_summary(&mut std::io::stderr(), &results, &run_dir)?,
    }
    Ok(())
}

fn print_dry_run(prepared: &[Prepared], planned: &[PlannedTask]) {
    for (entry, plan) in prepared.iter().zip(planned) {
        let invocation = &entry.task.invocation;
        eprintln!("{}:", entry.task.id);
        eprintln!("  {}", invocation);
        if let Some(stdin) = &invocation.stdin {
            eprintln!("  stdin: {} bytes", stdin.len());
        }
        if let Some(modifier) = &plan.modifier {
            eprintln!("  modifier: {}", modifier);
        }
    }
}
