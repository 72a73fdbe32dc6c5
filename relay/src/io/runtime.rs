//! Agent runtime abstraction.
//!
//! The [`AgentRuntime`] trait decouples the pipeline from the backend that
//! actually talks to a model. [`CommandRuntime`] spawns a configured command,
//! feeds it the prompt on stdin, and reads a JSONL stream of items from its
//! stdout. Tests use scripted runtimes that return predetermined turns.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::handoff::History;
use crate::core::items::{Item, message_role, message_text};
use crate::io::config::ReasoningConfig;
use crate::io::process::{ProcessOutput, run_process};

/// Parameters for one agent turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Stable agent id (`pm`, `designer`, …).
    pub agent_id: String,
    /// Display name (`Project Manager`, …).
    pub agent_name: String,
    /// System instructions for the agent.
    pub instructions: String,
    /// Conversation handed to the agent.
    pub input: Vec<Item>,
    /// Working directory for the runtime process.
    pub workdir: PathBuf,
    /// Directory for per-turn artifacts (`input.json`, `stream.jsonl`).
    pub artifacts_dir: PathBuf,
    pub model: String,
    pub max_turns: u32,
    pub reasoning: ReasoningConfig,
    pub timeout: Duration,
    /// Dashboard project this run belongs to, if any.
    pub project_id: Option<String>,
}

/// What a completed turn yields.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    /// Text of the agent's last assistant message.
    pub final_output: String,
    /// Items produced during the turn, in order.
    pub new_items: Vec<Item>,
    /// Sum of reported token usage.
    pub total_tokens: u64,
}

/// Abstraction over agent execution backends.
pub trait AgentRuntime {
    fn run_turn(&self, request: &TurnRequest) -> Result<TurnResult>;
}

/// Runtime that spawns an external command per turn.
#[derive(Debug, Clone)]
pub struct CommandRuntime {
    command: Vec<String>,
    output_limit_bytes: usize,
}

impl CommandRuntime {
    pub fn new(command: Vec<String>, output_limit_bytes: usize) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(anyhow!("runtime command must be non-empty"));
        }
        Ok(Self {
            command,
            output_limit_bytes,
        })
    }
}

impl AgentRuntime for CommandRuntime {
    #[instrument(skip_all, fields(agent = %request.agent_id, timeout_secs = request.timeout.as_secs()))]
    fn run_turn(&self, request: &TurnRequest) -> Result<TurnResult> {
        info!(workdir = %request.workdir.display(), program = %self.command[0], "starting agent turn");

        fs::create_dir_all(&request.artifacts_dir).with_context(|| {
            format!("create artifacts dir {}", request.artifacts_dir.display())
        })?;
        let input_path = request.artifacts_dir.join("input.json");
        let mut input_json =
            serde_json::to_string_pretty(&request.input).context("serialize turn input")?;
        input_json.push('\n');
        fs::write(&input_path, input_json)
            .with_context(|| format!("write turn input {}", input_path.display()))?;

        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .current_dir(&request.workdir)
            .env("RELAY_AGENT_ID", &request.agent_id)
            .env("RELAY_AGENT_NAME", &request.agent_name)
            .env("RELAY_MODEL", &request.model)
            .env("RELAY_MAX_TURNS", request.max_turns.to_string())
            .env("RELAY_REASONING_EFFORT", &request.reasoning.effort)
            .env(
                "RELAY_REASONING_ENCRYPTED",
                if request.reasoning.encrypted_content { "1" } else { "0" },
            )
            .env("RELAY_INPUT_PATH", &input_path);
        if let Some(project_id) = &request.project_id {
            cmd.env("RELAY_PROJECT_ID", project_id);
        }

        let prompt = render_prompt(request);
        let stream_path = request.artifacts_dir.join("stream.jsonl");
        let output = run_process(
            cmd,
            Some(prompt.as_bytes()),
            request.timeout,
            self.output_limit_bytes,
            Some(&stream_path),
        )
        .with_context(|| format!("run agent runtime for {}", request.agent_id))?;

        check_exit(&output, request)?;
        if output.stdout_truncated > 0 {
            warn!(
                truncated = output.stdout_truncated,
                "runtime stdout truncated; trailing items lost"
            );
        }

        let result = parse_turn_stream(&String::from_utf8_lossy(&output.stdout));
        debug!(
            items = result.new_items.len(),
            tokens = result.total_tokens,
            "agent turn parsed"
        );
        Ok(result)
    }
}

fn check_exit(output: &ProcessOutput, request: &TurnRequest) -> Result<()> {
    if output.timed_out {
        warn!(timeout_secs = request.timeout.as_secs(), "agent runtime timed out");
        return Err(anyhow!(
            "agent runtime for {} timed out after {:?}",
            request.agent_id,
            request.timeout
        ));
    }
    if !output.status.success() {
        warn!(exit_code = ?output.status.code(), "agent runtime failed");
        return Err(anyhow!(
            "agent runtime for {} failed with status {:?}: {}",
            request.agent_id,
            output.status.code(),
            output.stderr_tail(400)
        ));
    }
    Ok(())
}

/// Prompt text fed on stdin: instructions followed by the conversation.
pub fn render_prompt(request: &TurnRequest) -> String {
    let transcript = History::Items(request.input.clone()).flatten();
    format!(
        "{}\n\n<conversation>\n{}\n</conversation>\n",
        request.instructions.trim(),
        transcript
    )
}

/// Parse a JSONL turn stream.
///
/// Usage lines add to the token total; every other JSON value is an item.
/// Lines that are not JSON are skipped.
pub fn parse_turn_stream(stdout: &str) -> TurnResult {
    let mut new_items = Vec::new();
    let mut total_tokens = 0u64;

    for (line_no, line) in stdout.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                debug!(line_no = line_no + 1, err = %err, "skipping non-json runtime line");
                continue;
            }
        };
        if let Some(tokens) = usage_tokens(&value) {
            total_tokens += tokens;
            continue;
        }
        new_items.push(Item::Structural(value));
    }

    let final_output = new_items
        .iter()
        .rev()
        .filter_map(Item::to_structural)
        .find(|value| message_role(value) == Some("assistant"))
        .and_then(|value| message_text(&value))
        .unwrap_or_default();

    TurnResult {
        final_output,
        new_items,
        total_tokens,
    }
}

/// Token count carried by a usage line, if this is one.
fn usage_tokens(value: &Value) -> Option<u64> {
    if value.get("type").and_then(Value::as_str) == Some("usage") {
        return Some(value.get("total_tokens").and_then(Value::as_u64).unwrap_or(0));
    }
    value
        .get("usage")
        .and_then(|usage| usage.get("total_tokens"))
        .and_then(Value::as_u64)
}
