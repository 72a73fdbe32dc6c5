//! Pipeline configuration stored under `.relay/config.toml`.
//!
//! The file is optional. Environment variables set by a supervising dashboard
//! take precedence over the file (see [`EnvOverrides`]).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::ProjectKind;

/// Pipeline configuration (TOML).
///
/// Missing fields default to the values the pipeline ships with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    /// Model name passed to the agent runtime.
    pub model: String,

    /// Upper bound on model turns per stage, passed to the runtime.
    pub max_turns: u32,

    pub runtime: RuntimeConfig,
    pub reasoning: ReasoningConfig,
    pub approval: ApprovalConfig,
    pub handoff: HandoffConfig,
    pub project: ProjectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Command that runs one agent turn (prompt on stdin, JSONL on stdout).
    pub command: Vec<String>,

    /// Wall-clock budget for one stage in seconds.
    pub timeout_secs: u64,

    /// Truncate runtime stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "codex".to_string(),
                "exec".to_string(),
                "--json".to_string(),
                "-".to_string(),
            ],
            timeout_secs: 30 * 60,
            output_limit_bytes: 4_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReasoningConfig {
    pub effort: String,
    /// Ask the runtime to carry encrypted reasoning content between turns.
    pub encrypted_content: bool,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            effort: "low".to_string(),
            encrypted_content: false,
        }
    }
}

/// How approval between stages is collected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Prompt on the controlling terminal.
    #[default]
    Console,
    /// Emit `APPROVAL_REQUEST|…` and poll for a decision file.
    Dashboard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApprovalConfig {
    pub required: bool,
    pub mode: ApprovalMode,
    /// Directory polled for `<approval-id>.json` decisions; relative to the
    /// project root unless absolute.
    pub approvals_dir: PathBuf,
    pub poll_interval_ms: u64,
    /// Give up waiting after this many seconds; `0` waits forever.
    pub timeout_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            required: true,
            mode: ApprovalMode::Console,
            approvals_dir: PathBuf::from("approvals"),
            poll_interval_ms: 1_000,
            timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HandoffConfig {
    /// Prepend the previous stage's reconciled context to the next stage's input.
    pub carry_context: bool,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            carry_context: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub kind: ProjectKind,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5.1".to_string(),
            max_turns: 20,
            runtime: RuntimeConfig::default(),
            reasoning: ReasoningConfig::default(),
            approval: ApprovalConfig::default(),
            handoff: HandoffConfig::default(),
            project: ProjectConfig::default(),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if self.max_turns == 0 {
            return Err(anyhow!("max_turns must be > 0"));
        }
        if self.runtime.command.is_empty() || self.runtime.command[0].trim().is_empty() {
            return Err(anyhow!("runtime.command must be a non-empty array"));
        }
        if self.runtime.timeout_secs == 0 {
            return Err(anyhow!("runtime.timeout_secs must be > 0"));
        }
        if self.runtime.output_limit_bytes == 0 {
            return Err(anyhow!("runtime.output_limit_bytes must be > 0"));
        }
        if self.approval.poll_interval_ms == 0 {
            return Err(anyhow!("approval.poll_interval_ms must be > 0"));
        }
        Ok(())
    }

    /// Approvals directory resolved against `root`.
    pub fn approvals_dir(&self, root: &Path) -> PathBuf {
        if self.approval.approvals_dir.is_absolute() {
            self.approval.approvals_dir.clone()
        } else {
            root.join(&self.approval.approvals_dir)
        }
    }

    /// Apply environment overrides on top of file values.
    pub fn apply_env(&mut self, env: &EnvOverrides) -> Result<()> {
        if let Some(required) = &env.approval_required {
            self.approval.required = required.trim() != "0";
        }
        if let Some(mode) = &env.approval_mode {
            self.approval.mode = match mode.trim().to_ascii_lowercase().as_str() {
                "dashboard" => ApprovalMode::Dashboard,
                "console" | "" => ApprovalMode::Console,
                other => return Err(anyhow!("unknown APPROVAL_MODE '{other}'")),
            };
        }
        if let Some(dir) = &env.approvals_dir {
            self.approval.approvals_dir = PathBuf::from(dir);
        }
        if let Some(kind) = &env.project_type {
            self.project.kind = ProjectKind::from_env_value(kind);
        }
        if let Some(id) = &env.project_id {
            self.project.id = Some(id.clone()).filter(|id| !id.trim().is_empty());
        }
        if let Some(flag) = &env.reasoning_encrypted {
            self.reasoning.encrypted_content = is_truthy(flag);
        }
        Ok(())
    }
}

/// Environment variables that override file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// `AGENT_APPROVAL_REQUIRED`; `"0"` disables approval.
    pub approval_required: Option<String>,
    /// `APPROVAL_MODE`: `console` or `dashboard`.
    pub approval_mode: Option<String>,
    /// `APPROVALS_DIR`.
    pub approvals_dir: Option<String>,
    /// `PROJECT_TYPE`.
    pub project_type: Option<String>,
    /// `PROJECT_ID`.
    pub project_id: Option<String>,
    /// `OPENAI_REASONING_ENCRYPTED`.
    pub reasoning_encrypted: Option<String>,
}

impl EnvOverrides {
    pub fn from_process_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            approval_required: var("AGENT_APPROVAL_REQUIRED"),
            approval_mode: var("APPROVAL_MODE"),
            approvals_dir: var("APPROVALS_DIR"),
            project_type: var("PROJECT_TYPE"),
            project_id: var("PROJECT_ID"),
            reasoning_encrypted: var("OPENAI_REASONING_ENCRYPTED"),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RelayConfig::default()`.
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = RelayConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RelayConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load config from `path`, then apply `env` and re-validate.
pub fn load_effective_config(path: &Path, env: &EnvOverrides) -> Result<RelayConfig> {
    let mut cfg = load_config(path)?;
    cfg.apply_env(env)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RelayConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
