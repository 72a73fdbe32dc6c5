//! Role agent wrapper: instructions, payload, and turn request for one stage.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;

use crate::core::items::{Item, message, user_message};
use crate::io::config::{ReasoningConfig, RelayConfig};
use crate::io::files::read_text;
use crate::io::prompt::{Document, PromptEngine};
use crate::io::runtime::TurnRequest;

use super::Role;

/// Runtime settings shared by every stage of a run.
#[derive(Debug, Clone)]
pub struct StageSettings {
    pub root: PathBuf,
    pub model: String,
    pub max_turns: u32,
    pub reasoning: ReasoningConfig,
    pub timeout: Duration,
    pub project_id: Option<String>,
}

impl StageSettings {
    pub fn from_config(root: &Path, cfg: &RelayConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            model: cfg.model.clone(),
            max_turns: cfg.max_turns,
            reasoning: cfg.reasoning.clone(),
            timeout: Duration::from_secs(cfg.runtime.timeout_secs),
            project_id: cfg.project.id.clone(),
        }
    }

    pub fn turns_dir(&self) -> PathBuf {
        self.root.join(".relay").join("turns")
    }
}

/// Developer permissions message followed by the environment context.
pub fn base_input_items(engine: &PromptEngine, cwd: &Path, shell: &str) -> Result<Vec<Item>> {
    Ok(vec![
        Item::Structural(message("developer", &engine.permissions()?)),
        Item::Structural(user_message(&engine.environment_context(cwd, shell)?)),
    ])
}

/// Binds a [`Role`] to the prompt engine.
pub struct RoleAgent<'a> {
    role: &'a Role,
    engine: &'a PromptEngine,
}

impl<'a> RoleAgent<'a> {
    pub fn new(role: &'a Role, engine: &'a PromptEngine) -> Self {
        Self { role, engine }
    }

    pub fn instructions(&self) -> Result<String> {
        self.engine.role_instructions(self.role)
    }

    /// User payload for this stage.
    ///
    /// A role that reads no documents receives the task list; every other
    /// role receives the documents it reads, taken from disk.
    pub fn payload(&self, root: &Path, task: &str) -> Result<String> {
        if self.role.reads.is_empty() {
            return Ok(task.trim().to_string());
        }
        let documents = self
            .role
            .reads
            .iter()
            .map(|path| {
                Ok(Document {
                    path: (*path).to_string(),
                    content: read_text(&root.join(path))?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.engine.stage_payload(&documents)
    }

    /// Assemble the turn request: `context` followed by the stage payload.
    pub fn turn_request(
        &self,
        index: usize,
        settings: &StageSettings,
        mut context: Vec<Item>,
        task: &str,
    ) -> Result<TurnRequest> {
        let payload = self.payload(&settings.root, task)?;
        context.push(Item::Structural(user_message(&payload)));
        Ok(TurnRequest {
            agent_id: self.role.id.to_string(),
            agent_name: self.role.name.to_string(),
            instructions: self.instructions()?,
            input: context,
            workdir: settings.root.clone(),
            artifacts_dir: settings
                .turns_dir()
                .join(format!("{index}-{}", self.role.id)),
            model: settings.model.clone(),
            max_turns: settings.max_turns,
            reasoning: settings.reasoning.clone(),
            timeout: settings.timeout,
            project_id: settings.project_id.clone(),
        })
    }
}
