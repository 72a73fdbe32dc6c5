//! Approval gate between pipeline stages.
//!
//! A stage's written files are reviewed before the next stage starts. The
//! reviewer is either a person at the console or a dashboard that answers by
//! dropping a decision file into the approvals directory.

use std::fmt;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::core::types::ApprovalDecision;
use crate::io::config::{ApprovalMode, RelayConfig};
use crate::io::status::{ApprovalRequest, StatusSink};

/// Returned when a reviewer rejects a stage's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRejected {
    pub agent_id: String,
    pub role: String,
}

impl fmt::Display for ApprovalRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "approval rejected for {} ({})", self.role, self.agent_id)
    }
}

impl std::error::Error for ApprovalRejected {}

/// Abstraction over approval backends.
pub trait ApprovalGate {
    fn review(
        &mut self,
        request: &ApprovalRequest,
        status: &mut StatusSink,
    ) -> Result<ApprovalDecision>;
}

/// Build the gate selected by configuration.
pub fn gate_from_config(cfg: &RelayConfig, root: &Path) -> Box<dyn ApprovalGate> {
    if !cfg.approval.required {
        return Box::new(NoApproval);
    }
    match cfg.approval.mode {
        ApprovalMode::Console => Box::new(ConsoleApproval::new(io::stdin().lock(), io::stdout())),
        ApprovalMode::Dashboard => {
            let timeout = (cfg.approval.timeout_secs > 0)
                .then(|| Duration::from_secs(cfg.approval.timeout_secs));
            Box::new(DashboardApproval::new(
                cfg.approvals_dir(root),
                Duration::from_millis(cfg.approval.poll_interval_ms),
                timeout,
            ))
        }
    }
}

/// Approves everything without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoApproval;

impl ApprovalGate for NoApproval {
    fn review(&mut self, request: &ApprovalRequest, _: &mut StatusSink) -> Result<ApprovalDecision> {
        debug!(agent = %request.agent_id, "approval not required");
        Ok(ApprovalDecision::Approved)
    }
}

/// Interactive y/n prompt.
pub struct ConsoleApproval<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsoleApproval<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn ask(&mut self, request: &ApprovalRequest) -> Result<ApprovalDecision> {
        writeln!(self.output, "\nApproval gate: {}", request.role)?;
        for path in &request.files {
            writeln!(self.output, "- {path}")?;
        }
        loop {
            write!(self.output, "Approve this output? (y/n): ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                bail!("approval input closed before a decision for {}", request.role);
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(ApprovalDecision::Approved),
                "n" | "no" => return Ok(ApprovalDecision::Rejected),
                _ => writeln!(self.output, "Please enter y or n.")?,
            }
        }
    }
}

impl<R: BufRead, W: Write> ApprovalGate for ConsoleApproval<R, W> {
    #[instrument(skip_all, fields(agent = %request.agent_id))]
    fn review(&mut self, request: &ApprovalRequest, _: &mut StatusSink) -> Result<ApprovalDecision> {
        let decision = self.ask(request).context("console approval")?;
        info!(?decision, "console approval decided");
        Ok(decision)
    }
}

/// Dashboard handshake: announce on the status stream, then poll
/// `<dir>/<id>.json` until its `status` is `approved` or `rejected`.
#[derive(Debug, Clone)]
pub struct DashboardApproval {
    dir: PathBuf,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

#[derive(Debug, Deserialize)]
struct DecisionFile {
    #[serde(default)]
    status: String,
}

impl DashboardApproval {
    pub fn new(dir: PathBuf, poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            dir,
            poll_interval,
            timeout,
        }
    }

    pub fn decision_path(&self, approval_id: &str) -> PathBuf {
        self.dir.join(format!("{approval_id}.json"))
    }

    fn read_decision(path: &Path) -> Result<Option<ApprovalDecision>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("read {}", path.display())),
        };
        // The dashboard may be mid-write; an unparsable file means "not yet".
        let decision: DecisionFile = match serde_json::from_str(&contents) {
            Ok(decision) => decision,
            Err(err) => {
                debug!(path = %path.display(), err = %err, "decision file not parseable yet");
                return Ok(None);
            }
        };
        Ok(match decision.status.trim().to_ascii_lowercase().as_str() {
            "approved" => Some(ApprovalDecision::Approved),
            "rejected" => Some(ApprovalDecision::Rejected),
            _ => None,
        })
    }
}

impl ApprovalGate for DashboardApproval {
    #[instrument(skip_all, fields(agent = %request.agent_id, approval_id = %request.id))]
    fn review(
        &mut self,
        request: &ApprovalRequest,
        status: &mut StatusSink,
    ) -> Result<ApprovalDecision> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create approvals dir {}", self.dir.display()))?;
        status.approval_request(request)?;

        let path = self.decision_path(&request.id);
        info!(path = %path.display(), "waiting for dashboard decision");
        let started = Instant::now();
        loop {
            if let Some(decision) = Self::read_decision(&path)? {
                info!(?decision, "dashboard approval decided");
                return Ok(decision);
            }
            if let Some(timeout) = self.timeout
                && started.elapsed() >= timeout
            {
                warn!(timeout_secs = timeout.as_secs(), "approval timed out");
                return Err(anyhow!(
                    "timed out after {:?} waiting for approval {}",
                    timeout,
                    request.id
                ));
            }
            thread::sleep(self.poll_interval);
        }
    }
}
