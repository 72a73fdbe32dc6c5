//! Handoff records under `.relay/handoffs/`.
//!
//! One JSON file per agent boundary, written after reconciliation so the
//! cleaned context a stage received can be inspected after the run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::handoff::{HandoffDiagnostic, HandoffOutcome, HandoffReport, History};
use crate::core::items::Item;

#[derive(Debug, Clone, Serialize)]
pub struct HandoffRecord<'a> {
    /// 1-based stage index of the agent that produced `new_items`.
    pub index: usize,
    pub from_agent: &'a str,
    /// `None` after the last stage.
    pub to_agent: Option<&'a str>,
    pub recorded_at: String,
    pub diagnostic: Option<HandoffDiagnostic>,
    pub report: HandoffReport,
    pub history: &'a History,
    pub new_items: &'a [Item],
}

impl<'a> HandoffRecord<'a> {
    pub fn new(
        index: usize,
        from_agent: &'a str,
        to_agent: Option<&'a str>,
        recorded_at: String,
        outcome: &'a HandoffOutcome,
    ) -> Self {
        Self {
            index,
            from_agent,
            to_agent,
            recorded_at,
            diagnostic: outcome.diagnostic(),
            report: outcome.report,
            history: &outcome.history,
            new_items: &outcome.new_items,
        }
    }
}

pub fn handoffs_dir(root: &Path) -> PathBuf {
    root.join(".relay").join("handoffs")
}

pub fn handoff_path(root: &Path, index: usize, agent_id: &str) -> PathBuf {
    handoffs_dir(root).join(format!("{index}-{agent_id}.json"))
}

pub fn write_handoff(root: &Path, record: &HandoffRecord<'_>) -> Result<PathBuf> {
    let dir = handoffs_dir(root);
    fs::create_dir_all(&dir).with_context(|| format!("create handoff dir {}", dir.display()))?;

    let path = handoff_path(root, record.index, record.from_agent);
    let mut buf = serde_json::to_string_pretty(record).context("serialize handoff record")?;
    buf.push('\n');
    fs::write(&path, buf).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}
