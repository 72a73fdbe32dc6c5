//! Orchestration for `relay run`: every role stage in order.
//!
//! Each stage runs one agent turn, reconciles the context handed to the next
//! stage, writes the agent's file blocks, reports on the status stream, and
//! waits at the approval gate before the next stage starts.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::agents::stage::{RoleAgent, StageSettings, base_input_items};
use crate::agents::{ROLES, Role};
use crate::core::file_blocks::parse_file_blocks;
use crate::core::handoff::{HandoffInput, HandoffReport, History, reconcile_handoff};
use crate::core::items::Item;
use crate::core::types::{AgentState, ApprovalDecision, ProjectKind};
use crate::io::approval::{ApprovalGate, ApprovalRejected};
use crate::io::config::RelayConfig;
use crate::io::files::{read_text, write_files, write_text};
use crate::io::handoff_log::{HandoffRecord, write_handoff};
use crate::io::prompt::PromptEngine;
use crate::io::runtime::AgentRuntime;
use crate::io::status::{ApprovalRequest, StatusSink};

/// A stage finished without writing a file later stages depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDeliverable {
    pub agent_id: String,
    pub path: String,
}

impl fmt::Display for MissingDeliverable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} did not write required deliverable {}",
            self.agent_id, self.path
        )
    }
}

impl std::error::Error for MissingDeliverable {}

/// Context attached when a stage's agent turn fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailed {
    pub agent_id: String,
    pub role: String,
}

impl fmt::Display for StageFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({}) failed", self.agent_id, self.role)
    }
}

/// Where the task list for the first stage comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaskSource {
    #[default]
    Default,
    /// Contents of a task file.
    File(PathBuf),
    /// Project brief in `AGENTS.md` at the project root; falls back to the
    /// default task when the file is missing or empty.
    AgentsBrief,
}

pub fn resolve_task(
    engine: &PromptEngine,
    root: &Path,
    source: &TaskSource,
    kind: ProjectKind,
) -> Result<String> {
    match source {
        TaskSource::Default => engine.default_task(),
        TaskSource::File(path) => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                root.join(path)
            };
            if !path.is_file() {
                bail!("task file {} not found", path.display());
            }
            let task = read_text(&path)?;
            if task.is_empty() {
                bail!("task file {} is empty", path.display());
            }
            Ok(task)
        }
        TaskSource::AgentsBrief => {
            let brief = read_text(&root.join("AGENTS.md"))?;
            if brief.is_empty() {
                warn!("AGENTS.md missing or empty, using default task");
                return engine.default_task();
            }
            engine.task_from_brief(&brief, kind)
        }
    }
}

/// Inputs for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRequest<'a> {
    pub root: &'a Path,
    pub cfg: &'a RelayConfig,
    pub task: &'a str,
    /// Shell reported in the environment context.
    pub shell: &'a str,
}

/// What one stage produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub agent_id: &'static str,
    pub written: Vec<String>,
    pub tokens: u64,
    pub handoff: HandoffReport,
    pub handoff_log: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub stages: Vec<StageReport>,
    pub readme_written: bool,
}

impl PipelineOutcome {
    pub fn total_tokens(&self) -> u64 {
        self.stages.iter().map(|stage| stage.tokens).sum()
    }

    pub fn total_dropped(&self) -> usize {
        self.stages
            .iter()
            .map(|stage| stage.handoff.total_dropped())
            .sum()
    }
}

/// Run every role stage in order.
///
/// Stops at the first runtime error, missing deliverable, or rejection.
#[instrument(skip_all, fields(root = %request.root.display()))]
pub fn run_pipeline<R: AgentRuntime + ?Sized, G: ApprovalGate + ?Sized>(
    request: &PipelineRequest<'_>,
    runtime: &R,
    gate: &mut G,
    status: &mut StatusSink,
) -> Result<PipelineOutcome> {
    let engine = PromptEngine::new();
    let settings = StageSettings::from_config(request.root, request.cfg);
    let base = base_input_items(&engine, request.root, request.shell)?;

    let mut carried: Option<Vec<Item>> = None;
    let mut stages = Vec::with_capacity(ROLES.len());

    for (offset, role) in ROLES.iter().enumerate() {
        let index = offset + 1;
        let next = ROLES.get(index).map(|next| next.id);
        let context = match carried.take() {
            Some(context) if request.cfg.handoff.carry_context => context,
            _ => base.clone(),
        };

        let stage = StageRun {
            index,
            role,
            next,
            settings: &settings,
            engine: &engine,
            task: request.task,
        };
        let (report, next_context) = stage.run(runtime, gate, status, context)?;
        carried = Some(next_context);
        stages.push(report);
    }

    let readme_written = write_readme_fallback(&engine, request.root, request.cfg)?;
    let outcome = PipelineOutcome {
        stages,
        readme_written,
    };
    info!(
        tokens = outcome.total_tokens(),
        dropped = outcome.total_dropped(),
        readme_written,
        "pipeline finished"
    );
    Ok(outcome)
}

struct StageRun<'a> {
    index: usize,
    role: &'static Role,
    next: Option<&'static str>,
    settings: &'a StageSettings,
    engine: &'a PromptEngine,
    task: &'a str,
}

impl StageRun<'_> {
    fn run<R: AgentRuntime + ?Sized, G: ApprovalGate + ?Sized>(
        &self,
        runtime: &R,
        gate: &mut G,
        status: &mut StatusSink,
        context: Vec<Item>,
    ) -> Result<(StageReport, Vec<Item>)> {
        let role = self.role;
        let root = self.settings.root.as_path();
        status.status(role.id, AgentState::Running, role.step)?;
        status.log(role.id, role.start_log)?;

        let agent = RoleAgent::new(role, self.engine);
        let turn = agent
            .turn_request(self.index, self.settings, context, self.task)
            .and_then(|request| {
                let result = runtime.run_turn(&request)?;
                Ok((request, result))
            });
        let (request, result) = match turn {
            Ok(turn) => turn,
            Err(err) => {
                let message = format!("{err:#}");
                warn!(agent = role.id, err = %message, "stage failed");
                status.status(role.id, AgentState::Failed, "Failed")?;
                status.log(role.id, &format!("Stage failed: {message}"))?;
                return Err(err.context(StageFailed {
                    agent_id: role.id.to_string(),
                    role: role.name.to_string(),
                }));
            }
        };
        status.tokens(role.id, result.total_tokens)?;

        let outcome = reconcile_handoff(HandoffInput {
            history: History::Items(request.input),
            new_items: result.new_items,
        });
        if let Some(diagnostic) = outcome.diagnostic() {
            warn!(
                from = role.id,
                to = self.next.unwrap_or("end"),
                history_dropped = diagnostic.history_dropped,
                new_items_dropped = diagnostic.new_items_dropped,
                stray_outputs = diagnostic.stray_outputs,
                total = diagnostic.total,
                "dropped unpaired items at handoff"
            );
        }
        let handoff_log = write_handoff(
            root,
            &HandoffRecord::new(
                self.index,
                role.id,
                self.next,
                Utc::now().to_rfc3339(),
                &outcome,
            ),
        )?;
        debug!(
            agent = role.id,
            history_items = outcome.history.item_count(),
            new_items = outcome.new_items.len(),
            log = %handoff_log.display(),
            "handoff recorded"
        );
        let handoff = outcome.report;

        let blocks = parse_file_blocks(&result.final_output);
        if blocks.is_empty() {
            warn!(agent = role.id, "final output contained no file blocks");
        }
        let written = write_files(root, &blocks)
            .with_context(|| format!("write files for {}", role.id))?;

        for path in role.required_deliverables() {
            if !root.join(path).is_file() {
                status.status(role.id, AgentState::Failed, "Missing deliverable")?;
                return Err(MissingDeliverable {
                    agent_id: role.id.to_string(),
                    path: path.to_string(),
                }
                .into());
            }
        }

        status.status(role.id, AgentState::Idle, "Done")?;
        status.log(role.id, role.done_log)?;
        info!(agent = role.id, files = written.len(), tokens = result.total_tokens, "stage complete");

        let approval = ApprovalRequest {
            id: format!("{}-{}-{}", role.id, self.index, Utc::now().format("%Y%m%dT%H%M%S%3f")),
            agent_id: role.id.to_string(),
            role: role.name.to_string(),
            summary: ApprovalRequest::files_summary(&written),
            files: written.clone(),
        };
        match gate.review(&approval, status)? {
            ApprovalDecision::Approved => {}
            ApprovalDecision::Rejected => {
                status.log(role.id, "Approval rejected. Exiting workflow.")?;
                return Err(ApprovalRejected {
                    agent_id: role.id.to_string(),
                    role: role.name.to_string(),
                }
                .into());
            }
        }

        let report = StageReport {
            agent_id: role.id,
            written,
            tokens: result.total_tokens,
            handoff,
            handoff_log,
        };
        Ok((report, outcome.into_context()))
    }
}

/// Write `README.md` when no stage produced one. Returns whether it wrote.
fn write_readme_fallback(engine: &PromptEngine, root: &Path, cfg: &RelayConfig) -> Result<bool> {
    let path = root.join("README.md");
    if path.exists() {
        return Ok(false);
    }
    write_text(&path, &engine.readme_fallback(cfg.project.kind)?)?;
    info!(path = %path.display(), "wrote fallback README");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn task_file_is_read_relative_to_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("tasks.md"), "\nGoal: tiny\n").expect("write");
        let engine = PromptEngine::new();
        let task = resolve_task(
            &engine,
            temp.path(),
            &TaskSource::File(PathBuf::from("tasks.md")),
            ProjectKind::Web,
        )
        .expect("task");
        assert_eq!(task, "Goal: tiny");
    }

    #[test]
    fn missing_task_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let engine = PromptEngine::new();
        let err = resolve_task(
            &engine,
            temp.path(),
            &TaskSource::File(PathBuf::from("nope.md")),
            ProjectKind::Web,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn agents_brief_falls_back_to_default_task() {
        let temp = tempfile::tempdir().expect("tempdir");
        let engine = PromptEngine::new();
        let task = resolve_task(&engine, temp.path(), &TaskSource::AgentsBrief, ProjectKind::Web)
            .expect("task");
        assert_eq!(task, engine.default_task().expect("default"));

        fs::write(temp.path().join("AGENTS.md"), "Snake game.\n").expect("write");
        let task = resolve_task(
            &engine,
            temp.path(),
            &TaskSource::AgentsBrief,
            ProjectKind::Blazor,
        )
        .expect("task");
        assert!(task.contains("Snake game."));
        assert!(task.contains("Blazor WebAssembly"));
    }

    #[test]
    fn readme_fallback_respects_existing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let engine = PromptEngine::new();
        let cfg = RelayConfig::default();
        assert!(write_readme_fallback(&engine, temp.path(), &cfg).expect("first"));
        fs::write(temp.path().join("README.md"), "mine\n").expect("write");
        assert!(!write_readme_fallback(&engine, temp.path(), &cfg).expect("second"));
        assert_eq!(
            fs::read_to_string(temp.path().join("README.md")).expect("read"),
            "mine\n"
        );
    }

    #[test]
    fn missing_deliverable_message() {
        let err = anyhow::Error::new(MissingDeliverable {
            agent_id: "pm".to_string(),
            path: "REQUIREMENTS.md".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "pm did not write required deliverable REQUIREMENTS.md"
        );
    }
}
