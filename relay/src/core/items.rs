//! Conversation item model shared by the reconciler and the pipeline.
//!
//! Items arrive in two encodings:
//!
//! - **Structural records**: loosely typed JSON objects distinguished by their
//!   `type` string (the shape model APIs accept as input).
//! - **Tagged objects**: the strongly typed [`RunItem`] enum produced by the
//!   agent runtime. Its call id is only reachable through
//!   [`RunItem::to_input_item`], which may fail.
//!
//! Both are normalized into a canonical [`Entry`] before any scan runs.
//! Classification is fail-open: anything unrecognized is a [`ItemKind::Message`].

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Structural `type` values that denote a tool/handoff call.
pub const CALL_TYPES: [&str; 2] = ["function_call", "tool_call"];
/// Structural `type` values that denote a call output.
pub const OUTPUT_TYPES: [&str; 2] = ["function_call_output", "tool_call_output"];
/// Structural `type` value for a reasoning note.
pub const REASONING_TYPE: &str = "reasoning";

/// Legacy field names that may hold a call identifier, in lookup order.
const CALL_ID_KEYS: [&str; 2] = ["call_id", "tool_call_id"];

/// Logical kind of a conversation item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Message,
    Reasoning,
    Call,
    Output,
}

/// Canonical form of an item: its kind plus the call id when one applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: ItemKind,
    pub call_id: Option<String>,
}

impl Entry {
    pub fn message() -> Self {
        Self {
            kind: ItemKind::Message,
            call_id: None,
        }
    }

    /// Normalize a structural record.
    pub fn from_structural(value: &Value) -> Self {
        let kind = structural_kind(value);
        let call_id = match kind {
            ItemKind::Call | ItemKind::Output => extract_call_id(value),
            ItemKind::Message | ItemKind::Reasoning => None,
        };
        Self { kind, call_id }
    }

    /// Normalize a tagged object.
    ///
    /// A failed conversion to structural form leaves the id absent.
    pub fn from_tagged(item: &RunItem) -> Self {
        let kind = item.kind();
        let call_id = match kind {
            ItemKind::Call | ItemKind::Output => item
                .to_input_item()
                .ok()
                .and_then(|value| extract_call_id(&value)),
            ItemKind::Message | ItemKind::Reasoning => None,
        };
        Self { kind, call_id }
    }

    /// True iff both entries carry the same present, non-empty call id.
    pub fn ids_match(&self, other: &Entry) -> bool {
        match (self.call_id.as_deref(), other.call_id.as_deref()) {
            (Some(left), Some(right)) => !left.is_empty() && left == right,
            _ => false,
        }
    }
}

fn structural_kind(value: &Value) -> ItemKind {
    let Some(item_type) = value.get("type").and_then(Value::as_str) else {
        return ItemKind::Message;
    };
    if item_type == REASONING_TYPE {
        ItemKind::Reasoning
    } else if CALL_TYPES.contains(&item_type) {
        ItemKind::Call
    } else if OUTPUT_TYPES.contains(&item_type) {
        ItemKind::Output
    } else {
        ItemKind::Message
    }
}

/// First present, non-empty string under one of the legacy id keys.
fn extract_call_id(value: &Value) -> Option<String> {
    CALL_ID_KEYS
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|id| !id.is_empty())
        .map(str::to_string)
}

/// Strongly typed item as yielded by the agent runtime.
///
/// Every variant wraps the raw payload the runtime received from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", content = "raw_item", rename_all = "snake_case")]
pub enum RunItem {
    MessageOutput(Value),
    Reasoning(Value),
    ToolCall(Value),
    ToolCallOutput(Value),
    HandoffCall(Value),
    HandoffOutput(Value),
    /// Anything the runtime emits that has no continuity semantics.
    Other(Value),
}

impl RunItem {
    pub fn kind(&self) -> ItemKind {
        match self {
            RunItem::Reasoning(_) => ItemKind::Reasoning,
            RunItem::ToolCall(_) | RunItem::HandoffCall(_) => ItemKind::Call,
            RunItem::ToolCallOutput(_) | RunItem::HandoffOutput(_) => ItemKind::Output,
            RunItem::MessageOutput(_) | RunItem::Other(_) => ItemKind::Message,
        }
    }

    pub fn raw_item(&self) -> &Value {
        match self {
            RunItem::MessageOutput(raw)
            | RunItem::Reasoning(raw)
            | RunItem::ToolCall(raw)
            | RunItem::ToolCallOutput(raw)
            | RunItem::HandoffCall(raw)
            | RunItem::HandoffOutput(raw)
            | RunItem::Other(raw) => raw,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RunItem::MessageOutput(_) => "message_output",
            RunItem::Reasoning(_) => "reasoning",
            RunItem::ToolCall(_) => "tool_call",
            RunItem::ToolCallOutput(_) => "tool_call_output",
            RunItem::HandoffCall(_) => "handoff_call",
            RunItem::HandoffOutput(_) => "handoff_output",
            RunItem::Other(_) => "other",
        }
    }

    /// Structural `type` written when the raw payload lacks one.
    fn default_type(&self) -> Option<&'static str> {
        match self {
            RunItem::MessageOutput(_) => Some("message"),
            RunItem::Reasoning(_) => Some(REASONING_TYPE),
            RunItem::ToolCall(_) | RunItem::HandoffCall(_) => Some("function_call"),
            RunItem::ToolCallOutput(_) | RunItem::HandoffOutput(_) => {
                Some("function_call_output")
            }
            RunItem::Other(_) => None,
        }
    }

    /// Convert to the structural record accepted as model input.
    ///
    /// Fails when the raw payload is not a JSON object.
    pub fn to_input_item(&self) -> Result<Value> {
        let Value::Object(raw) = self.raw_item() else {
            return Err(anyhow!(
                "{} payload is not an object: {}",
                self.label(),
                self.raw_item()
            ));
        };
        let mut record = raw.clone();
        if let Some(default_type) = self.default_type() {
            record
                .entry("type")
                .or_insert_with(|| Value::String(default_type.to_string()));
        }
        Ok(Value::Object(record))
    }
}

/// One element of a possibly mixed-encoding sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Item {
    Tagged(RunItem),
    Structural(Value),
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        Item::Structural(value)
    }
}

impl From<RunItem> for Item {
    fn from(item: RunItem) -> Self {
        Item::Tagged(item)
    }
}

impl Item {
    /// Structural form of this item, if it has one.
    pub fn to_structural(&self) -> Option<Value> {
        match self {
            Item::Structural(value) => Some(value.clone()),
            Item::Tagged(item) => item.to_input_item().ok(),
        }
    }
}

/// Anything the reconciler can scan.
pub trait Continuity {
    fn entry(&self) -> Entry;
}

impl Continuity for Value {
    fn entry(&self) -> Entry {
        Entry::from_structural(self)
    }
}

impl Continuity for RunItem {
    fn entry(&self) -> Entry {
        Entry::from_tagged(self)
    }
}

impl Continuity for Item {
    fn entry(&self) -> Entry {
        match self {
            Item::Structural(value) => Entry::from_structural(value),
            Item::Tagged(item) => Entry::from_tagged(item),
        }
    }
}

impl Continuity for Entry {
    fn entry(&self) -> Entry {
        self.clone()
    }
}

/// Classify an item in either encoding. Never fails.
pub fn classify<T: Continuity + ?Sized>(item: &T) -> ItemKind {
    item.entry().kind
}

/// Call id of a `Call`/`Output` item, from `call_id` or `tool_call_id`.
pub fn call_id_of<T: Continuity + ?Sized>(item: &T) -> Option<String> {
    item.entry().call_id
}

/// True iff both items have a present, non-empty, equal call id.
pub fn ids_match<A: Continuity + ?Sized, B: Continuity + ?Sized>(left: &A, right: &B) -> bool {
    left.entry().ids_match(&right.entry())
}

/// Text carried by a message record: a string `content`, or the joined
/// `text` fields of a content-part array.
pub fn message_text(value: &Value) -> Option<String> {
    match value.get("content")? {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join(""))
            }
        }
        _ => None,
    }
}

/// Role of a message record, if present.
pub fn message_role(value: &Value) -> Option<&str> {
    value.get("role").and_then(Value::as_str)
}

pub fn message(role: &str, text: &str) -> Value {
    json!({
        "type": "message",
        "role": role,
        "content": [{"type": "input_text", "text": text}],
    })
}

pub fn user_message(text: &str) -> Value {
    message("user", text)
}

pub fn assistant_message(text: &str) -> Value {
    json!({
        "type": "message",
        "role": "assistant",
        "content": [{"type": "output_text", "text": text}],
    })
}

pub fn reasoning(id: &str) -> Value {
    json!({"type": REASONING_TYPE, "id": id, "summary": []})
}

pub fn function_call(call_id: &str, name: &str, arguments: &str) -> Value {
    json!({
        "type": "function_call",
        "call_id": call_id,
        "name": name,
        "arguments": arguments,
    })
}

pub fn function_call_output(call_id: &str, output: &str) -> Value {
    json!({
        "type": "function_call_output",
        "call_id": call_id,
        "output": output,
    })
}
