//! Line-oriented status protocol read by the dashboard.
//!
//! Every line is `KIND|field|field…` and flushed as soon as it is written.
//! Free-text fields are sanitized so a stray `|` or newline cannot split a
//! record.

use std::fmt;
use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::AgentState;

/// Payload of an `APPROVAL_REQUEST|<json>` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: String,
    pub agent_id: String,
    /// Display name of the role under review.
    pub role: String,
    pub files: Vec<String>,
    pub summary: String,
}

impl ApprovalRequest {
    /// `Files:` bullet summary used when the agent gave none.
    pub fn files_summary(files: &[String]) -> String {
        if files.is_empty() {
            return "No files written.".to_string();
        }
        format!("Files:\n- {}", files.join("\n- "))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum StatusLine<'a> {
    Status {
        agent_id: &'a str,
        state: AgentState,
        step: &'a str,
    },
    Log {
        agent_id: &'a str,
        message: &'a str,
    },
    Tokens {
        agent_id: &'a str,
        tokens: u64,
    },
    ApprovalRequest(&'a ApprovalRequest),
}

impl fmt::Display for StatusLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLine::Status {
                agent_id,
                state,
                step,
            } => write!(
                f,
                "AGENT_STATUS|{}|{}|{}",
                sanitize_field(agent_id),
                state,
                sanitize_field(step)
            ),
            StatusLine::Log { agent_id, message } => write!(
                f,
                "AGENT_LOG|{}|{}",
                sanitize_field(agent_id),
                sanitize_field(message)
            ),
            StatusLine::Tokens { agent_id, tokens } => {
                write!(f, "AGENT_TOKENS|{}|{tokens}", sanitize_field(agent_id))
            }
            StatusLine::ApprovalRequest(request) => {
                // serde_json escapes newlines; the payload stays on one line.
                let json = serde_json::to_string(request).map_err(|_| fmt::Error)?;
                write!(f, "APPROVAL_REQUEST|{json}")
            }
        }
    }
}

/// Replace separators and line breaks so the field stays in its column.
pub fn sanitize_field(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '|' | '\n' | '\r' => ' ',
            other => other,
        })
        .collect()
}

/// Writer for status lines.
pub struct StatusSink {
    out: Box<dyn Write + Send>,
}

impl fmt::Debug for StatusSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusSink").finish_non_exhaustive()
    }
}

impl StatusSink {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self { out: Box::new(out) }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn emit(&mut self, line: StatusLine<'_>) -> Result<()> {
        writeln!(self.out, "{line}").context("write status line")?;
        self.out.flush().context("flush status line")
    }

    pub fn status(&mut self, agent_id: &str, state: AgentState, step: &str) -> Result<()> {
        self.emit(StatusLine::Status {
            agent_id,
            state,
            step,
        })
    }

    pub fn log(&mut self, agent_id: &str, message: &str) -> Result<()> {
        self.emit(StatusLine::Log { agent_id, message })
    }

    pub fn tokens(&mut self, agent_id: &str, tokens: u64) -> Result<()> {
        self.emit(StatusLine::Tokens { agent_id, tokens })
    }

    pub fn approval_request(&mut self, request: &ApprovalRequest) -> Result<()> {
        self.emit(StatusLine::ApprovalRequest(request))
    }
}
