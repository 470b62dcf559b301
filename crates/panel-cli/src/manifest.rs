//! Run directories and the `run.json` manifest.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use panel_core::{AccessPolicy, CompositeId, TaskResult, Usage};
use panel_runner::{stderr_path, stdout_path};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Current manifest format.
pub const MANIFEST_VERSION: u32 = 1;

const SLUG_MAX: usize = 60;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Lowercase, dash-separated, at most 60 characters; `"prompt"` if empty.
pub fn slug(prompt: &str) -> String {
    let mut out = String::new();
    for c in prompt.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let mut out = out.trim_end_matches('-').to_string();
    if out.len() > SLUG_MAX {
        out.truncate(SLUG_MAX);
        out = out.trim_end_matches('-').to_string();
    }
    if out.is_empty() {
        "prompt".to_string()
    } else {
        out
    }
}

/// Create `<base>/<slug>-<unix_ts>/`, owner-only.
pub fn create_run_dir(base: &Path, prompt: &str, started_at: DateTime<Utc>) -> io::Result<PathBuf> {
    let path = base.join(format!("{}-{}", slug(prompt), started_at.timestamp()));
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(&path)?;
    Ok(path)
}

/// Write a file readable only by the owner.
pub fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// Write through a temporary sibling and rename over `path`.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = dir.join(format!(".panel-{}.tmp", Uuid::new_v4()));
    if let Err(e) = write_private(&tmp, contents).and_then(|_| std::fs::rename(&tmp, path)) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Settings a run was made with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestConfig {
    pub access: AccessPolicy,
    pub timeout_secs: u64,
    pub max_parallel: usize,
}

/// One task's entry in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResult {
    pub tool_id: String,
    pub status: String,
    pub duration_ms: u64,
    pub exit_code: i32,
    pub output_file: String,
    pub stderr_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifier: Option<String>,
}

impl ManifestResult {
    pub fn from_result(result: &TaskResult) -> Self {
        let file_name = |p: PathBuf| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        Self {
            tool_id: result.id.to_string(),
            status: result.status.to_string(),
            duration_ms: result.duration.as_millis() as u64,
            exit_code: result.exit_code,
            output_file: file_name(stdout_path(Path::new(""), &result.id)),
            stderr_file: file_name(stderr_path(Path::new(""), &result.id)),
            usage: result.usage.filter(|u| !u.is_empty()),
            modifier: CompositeId::parse(result.id.as_str()).modifier,
        }
    }
}

/// Record of one run, stored as `run.json` in the run directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    pub run_id: Uuid,
    pub prompt: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub platform: String,
    pub config: ManifestConfig,
    pub results: Vec<ManifestResult>,
}

impl Manifest {
    /// Build a manifest for a run that just completed.
    pub fn build(
        prompt: &str,
        started_at: DateTime<Utc>,
        results: &[TaskResult],
        config: ManifestConfig,
    ) -> Self {
        let completed_at = Utc::now();
        Self {
            version: MANIFEST_VERSION,
            run_id: Uuid::new_v4(),
            prompt: prompt.to_string(),
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
            platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            config,
            results: results.iter().map(ManifestResult::from_result).collect(),
        }
    }

    /// Write `run.json` into `dir` atomically.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, ManifestError> {
        let mut data = serde_json::to_vec_pretty(self)?;
        data.push(b'\n');
        let path = dir.join("run.json");
        atomic_write(&path, &data)?;
        Ok(path)
    }

    /// Read `run.json` from `dir`.
    pub fn read(dir: &Path) -> Result<Self, ManifestError> {
        let data = std::fs::read(dir.join("run.json"))?;
        Ok(serde_json::from_slice(&data)?)
    }
}
