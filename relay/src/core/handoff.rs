//! Handoff adapter: reconcile everything that crosses an agent boundary.
//!
//! History may already be flattened to text; it then passes through
//! untouched. Structured history and the new items of the finished turn are
//! reconciled independently. The adapter reports counts and leaves the
//! decision to log with the caller.

use serde::Serialize;
use serde_json::Value;

use crate::core::continuity::{ContinuityStats, reconcile};
use crate::core::items::{Item, message_role, message_text, user_message};

/// Accumulated conversation history handed to the next agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum History {
    Text(String),
    Items(Vec<Item>),
}

impl History {
    /// Number of structured items; text history has none.
    pub fn item_count(&self) -> usize {
        match self {
            History::Text(_) => 0,
            History::Items(items) => items.len(),
        }
    }

    /// Render history as a plain transcript of its messages.
    ///
    /// Reasoning, calls and outputs carry no transcript text and are skipped.
    pub fn flatten(&self) -> String {
        match self {
            History::Text(text) => text.clone(),
            History::Items(items) => items
                .iter()
                .filter_map(Item::to_structural)
                .filter_map(|value| transcript_line(&value))
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

fn transcript_line(value: &Value) -> Option<String> {
    let text = message_text(value)?;
    let role = message_role(value).unwrap_or("message");
    Some(format!("[{role}]\n{}", text.trim()))
}

/// Everything exchanged at one agent-to-agent boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffInput {
    pub history: History,
    pub new_items: Vec<Item>,
}

/// Per-sequence reconciliation counters for one handoff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HandoffReport {
    /// `None` when history was text and passed through.
    pub history: Option<ContinuityStats>,
    pub new_items: ContinuityStats,
}

impl HandoffReport {
    pub fn history_dropped(&self) -> usize {
        self.history.map(|stats| stats.dropped()).unwrap_or(0)
    }

    pub fn new_items_dropped(&self) -> usize {
        self.new_items.dropped()
    }

    pub fn total_dropped(&self) -> usize {
        self.history_dropped() + self.new_items_dropped()
    }
}

/// Counts-only record emitted when a handoff dropped anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HandoffDiagnostic {
    pub history_dropped: usize,
    pub new_items_dropped: usize,
    pub stray_outputs: usize,
    pub total: usize,
}

/// Cleaned sequences plus the report describing what was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffOutcome {
    pub history: History,
    pub new_items: Vec<Item>,
    pub report: HandoffReport,
}

impl HandoffOutcome {
    pub fn total_dropped(&self) -> usize {
        self.report.total_dropped()
    }

    /// Diagnostic record, present only when something was dropped.
    pub fn diagnostic(&self) -> Option<HandoffDiagnostic> {
        let total = self.report.total_dropped();
        if total == 0 {
            return None;
        }
        let stray_outputs = self.report.history.map(|s| s.stray_outputs).unwrap_or(0)
            + self.report.new_items.stray_outputs;
        Some(HandoffDiagnostic {
            history_dropped: self.report.history_dropped(),
            new_items_dropped: self.report.new_items_dropped(),
            stray_outputs,
            total,
        })
    }

    /// Cleaned history followed by cleaned new items, as one context.
    ///
    /// Text history becomes a single user message ahead of the new items.
    pub fn into_context(self) -> Vec<Item> {
        let mut context = match self.history {
            History::Items(items) => items,
            History::Text(text) if text.is_empty() => Vec::new(),
            History::Text(text) => vec![Item::Structural(user_message(&text))],
        };
        context.extend(self.new_items);
        context
    }
}

/// Reconcile both sides of a handoff.
pub fn reconcile_handoff(input: HandoffInput) -> HandoffOutcome {
    let (history, history_stats) = match input.history {
        History::Text(text) => (History::Text(text), None),
        History::Items(items) => {
            let cleaned = reconcile(items);
            (History::Items(cleaned.items), Some(cleaned.stats))
        }
    };
    let new_items = reconcile(input.new_items);

    HandoffOutcome {
        history,
        new_items: new_items.items,
        report: HandoffReport {
            history: history_stats,
            new_items: new_items.stats,
        },
    }
}
