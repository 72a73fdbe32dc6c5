//! Continuity reconciliation for conversation item sequences.
//!
//! A single left-to-right pass keeps complete `reasoning -> call -> output`
//! triples and `call -> output` pairs, keeps every message in place, and drops
//! every other reasoning/call/output item. Matching is strictly adjacent: a
//! call is never paired with a later, non-adjacent output.
//!
//! The scan runs on canonical [`Entry`] values, so one implementation serves
//! structural records, tagged objects and mixed sequences alike.

use serde::Serialize;

use crate::core::items::{Continuity, Entry, ItemKind};

/// Counters describing what one reconciliation pass kept and dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContinuityStats {
    /// Retained `reasoning -> call -> output` groups.
    pub triples: usize,
    /// Retained `call -> output` groups.
    pub pairs: usize,
    /// Retained messages.
    pub kept_singles: usize,
    pub dropped_reasoning: usize,
    pub dropped_calls: usize,
    /// All dropped outputs, including `stray_outputs`.
    pub dropped_outputs: usize,
    /// Dropped outputs sitting directly after a retained group.
    pub stray_outputs: usize,
}

impl ContinuityStats {
    /// Total number of items removed.
    pub fn dropped(&self) -> usize {
        self.dropped_reasoning + self.dropped_calls + self.dropped_outputs
    }

    /// Total number of items retained.
    pub fn kept(&self) -> usize {
        self.triples * 3 + self.pairs * 2 + self.kept_singles
    }
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<T> {
    pub items: Vec<T>,
    pub stats: ContinuityStats,
}

impl<T> Reconciled<T> {
    pub fn dropped(&self) -> usize {
        self.stats.dropped()
    }
}

/// What the cursor decided for the item under it.
enum Step {
    /// Keep this many items starting at the cursor.
    Keep(usize),
    /// Drop the item under the cursor.
    Drop,
}

/// Reconcile `items`, preserving their element type and relative order.
///
/// Never fails: malformed items are either messages (kept) or orphans
/// (dropped and counted).
pub fn reconcile<T: Continuity>(items: Vec<T>) -> Reconciled<T> {
    let entries: Vec<Entry> = items.iter().map(Continuity::entry).collect();
    let (keep, stats) = scan(&entries);
    let items = items
        .into_iter()
        .zip(keep)
        .filter_map(|(item, keep)| keep.then_some(item))
        .collect();
    Reconciled { items, stats }
}

/// Decide, per position, whether the entry survives.
fn scan(entries: &[Entry]) -> (Vec<bool>, ContinuityStats) {
    let mut keep = vec![false; entries.len()];
    let mut stats = ContinuityStats::default();
    // Index just past the most recently retained group.
    let mut group_end = None;
    let mut index = 0;

    while index < entries.len() {
        let step = match entries[index].kind {
            ItemKind::Reasoning => {
                if triple_at(entries, index) {
                    stats.triples += 1;
                    Step::Keep(3)
                } else {
                    stats.dropped_reasoning += 1;
                    Step::Drop
                }
            }
            ItemKind::Call => {
                if pair_at(entries, index) {
                    stats.pairs += 1;
                    Step::Keep(2)
                } else {
                    stats.dropped_calls += 1;
                    Step::Drop
                }
            }
            ItemKind::Output => {
                stats.dropped_outputs += 1;
                if group_end == Some(index) {
                    stats.stray_outputs += 1;
                }
                Step::Drop
            }
            ItemKind::Message => {
                stats.kept_singles += 1;
                Step::Keep(1)
            }
        };

        match step {
            Step::Keep(len) => {
                keep[index..index + len].fill(true);
                index += len;
                if len > 1 {
                    group_end = Some(index);
                }
            }
            Step::Drop => index += 1,
        }
    }

    (keep, stats)
}

/// `entries[index]` is reasoning; is it followed by a matching call/output?
fn triple_at(entries: &[Entry], index: usize) -> bool {
    match (entries.get(index + 1), entries.get(index + 2)) {
        (Some(call), Some(output)) => {
            call.kind == ItemKind::Call && output.kind == ItemKind::Output && call.ids_match(output)
        }
        _ => false,
    }
}

/// `entries[index]` is a call; is it followed by its matching output?
fn pair_at(entries: &[Entry], index: usize) -> bool {
    match entries.get(index + 1) {
        Some(output) => output.kind == ItemKind::Output && entries[index].ids_match(output),
        None => false,
    }
}
