//! Test-only helpers: scripted runtime, recording gate, and builders.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tempfile::TempDir;

use crate::core::items::{Item, assistant_message};
use crate::core::types::ApprovalDecision;
use crate::io::approval::ApprovalGate;
use crate::io::config::{RelayConfig, write_config};
use crate::io::init::{InitOptions, RelayPaths, init_relay};
use crate::io::runtime::{AgentRuntime, TurnRequest, TurnResult};
use crate::io::status::{ApprovalRequest, StatusSink};

/// Temporary project root with `.relay/` initialized.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        init_relay(dir.path(), &InitOptions { force: false })?;
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn paths(&self) -> RelayPaths {
        RelayPaths::new(self.root())
    }

    pub fn write_config(&self, cfg: &RelayConfig) -> Result<()> {
        write_config(&self.paths().config_path, cfg)
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.root().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let path = self.root().join(rel);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}

/// Cloneable in-memory writer; clones share one buffer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().map(|buf| buf.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self
            .0
            .lock()
            .map_err(|_| io::Error::other("shared buffer poisoned"))?;
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Status sink writing into a [`SharedBuffer`].
pub fn status_sink() -> (StatusSink, SharedBuffer) {
    let buffer = SharedBuffer::default();
    (StatusSink::new(buffer.clone()), buffer)
}

/// One scripted turn outcome.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    Ok(TurnResult),
    Fail(String),
}

/// Runtime that replays scripted turns in order and records every request.
#[derive(Debug, Default)]
pub struct ScriptedRuntime {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<TurnRequest>>,
}

impl ScriptedRuntime {
    pub fn new(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl AgentRuntime for ScriptedRuntime {
    fn run_turn(&self, request: &TurnRequest) -> Result<TurnResult> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("requests poisoned"))?
            .push(request.clone());
        let next = self
            .turns
            .lock()
            .map_err(|_| anyhow!("turns poisoned"))?
            .pop_front();
        match next {
            Some(ScriptedTurn::Ok(result)) => Ok(result),
            Some(ScriptedTurn::Fail(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted turn left for {}", request.agent_id)),
        }
    }
}

/// Gate that answers from a queue (approving once it runs dry) and records
/// every request it sees.
#[derive(Debug, Default)]
pub struct RecordingGate {
    decisions: VecDeque<ApprovalDecision>,
    pub requests: Vec<ApprovalRequest>,
}

impl RecordingGate {
    pub fn new(decisions: impl IntoIterator<Item = ApprovalDecision>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
            requests: Vec::new(),
        }
    }
}

impl ApprovalGate for RecordingGate {
    fn review(&mut self, request: &ApprovalRequest, _: &mut StatusSink) -> Result<ApprovalDecision> {
        self.requests.push(request.clone());
        Ok(self
            .decisions
            .pop_front()
            .unwrap_or(ApprovalDecision::Approved))
    }
}

/// Agent output text declaring `files` as `### FILE:` blocks.
pub fn file_output(files: &[(&str, &str)]) -> String {
    files
        .iter()
        .map(|(path, content)| format!("### FILE: {path}\n{content}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Successful turn whose items end with an assistant message carrying
/// `final_output`.
pub fn turn(final_output: &str, mut items: Vec<Value>, tokens: u64) -> ScriptedTurn {
    items.push(assistant_message(final_output));
    ScriptedTurn::Ok(TurnResult {
        final_output: final_output.to_string(),
        new_items: structural(items),
        total_tokens: tokens,
    })
}

pub fn structural(values: Vec<Value>) -> Vec<Item> {
    values.into_iter().map(Item::Structural).collect()
}

/// Same record with `call_id` moved to the legacy `tool_call_id` key.
pub fn with_legacy_id(value: Value) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };
    if let Some(id) = map.remove("call_id") {
        map.insert("tool_call_id".to_string(), id);
    }
    Value::Object(map)
}
