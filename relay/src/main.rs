//! Sequential multi-agent pipeline with reconciled handoffs.
//!
//! `relay run` drives the role agents one after another, cleaning the
//! conversation at every boundary so no tool call crosses without its output.
//! `relay reconcile` applies the same cleaning to a JSON file of items.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use relay::core::continuity::reconcile;
use relay::core::items::Item;
use relay::exit_codes;
use relay::io::approval::{ApprovalRejected, gate_from_config};
use relay::io::config::{EnvOverrides, load_effective_config};
use relay::io::init::{InitOptions, RelayPaths, init_relay};
use relay::io::prompt::PromptEngine;
use relay::io::runtime::CommandRuntime;
use relay::io::status::StatusSink;
use relay::logging;
use relay::pipeline::{
    MissingDeliverable, PipelineRequest, StageFailed, TaskSource, resolve_task, run_pipeline,
};

#[derive(Parser)]
#[command(
    name = "relay",
    version,
    about = "Sequential multi-agent pipeline with reconciled handoffs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.relay/` with a default config.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
        /// Project root (defaults to the current directory).
        #[arg(long)]
        project_root: Option<PathBuf>,
    },
    /// Run every role stage against the project root.
    Run {
        /// Project root (defaults to the current directory).
        #[arg(long)]
        project_root: Option<PathBuf>,
        /// Build the task list from `AGENTS.md`.
        #[arg(long, conflicts_with = "task_file")]
        task_from_agents: bool,
        /// Read the task list from a file.
        #[arg(long)]
        task_file: Option<PathBuf>,
    },
    /// Clean a JSON array of items and print the result.
    Reconcile {
        /// File holding a JSON array of items.
        file: PathBuf,
    },
}

fn main() {
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init {
            force,
            project_root,
        } => cmd_init(&resolve_root(project_root)?, force),
        Command::Run {
            project_root,
            task_from_agents,
            task_file,
        } => {
            let source = match (task_file, task_from_agents) {
                (Some(path), _) => TaskSource::File(path),
                (None, true) => TaskSource::AgentsBrief,
                (None, false) => TaskSource::Default,
            };
            cmd_run(&resolve_root(project_root)?, &source)
        }
        Command::Reconcile { file } => cmd_reconcile(&file),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ApprovalRejected>().is_some() {
        exit_codes::REJECTED
    } else if err.downcast_ref::<MissingDeliverable>().is_some()
        || err.downcast_ref::<StageFailed>().is_some()
    {
        exit_codes::RUNTIME
    } else {
        exit_codes::INVALID
    }
}

fn resolve_root(project_root: Option<PathBuf>) -> Result<PathBuf> {
    let root = match project_root {
        Some(root) => root,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    if !root.is_dir() {
        anyhow::bail!("project root {} is not a directory", root.display());
    }
    Ok(root)
}

fn cmd_init(root: &Path, force: bool) -> Result<()> {
    logging::init(None)?;
    let paths = init_relay(root, &InitOptions { force })?;
    println!("initialized {}", paths.relay_dir.display());
    Ok(())
}

fn cmd_run(root: &Path, source: &TaskSource) -> Result<()> {
    let paths = RelayPaths::new(root);
    let log_path = logging::init(Some(&paths.logs_dir))?;

    let cfg = load_effective_config(&paths.config_path, &EnvOverrides::from_process_env())?;
    let engine = PromptEngine::new();
    let task = resolve_task(&engine, root, source, cfg.project.kind)?;
    let runtime = CommandRuntime::new(
        cfg.runtime.command.clone(),
        cfg.runtime.output_limit_bytes,
    )?;
    let mut gate = gate_from_config(&cfg, root);
    let mut status = StatusSink::stdout();
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "bash".to_string());

    info!(
        root = %root.display(),
        log = ?log_path,
        model = %cfg.model,
        approval = cfg.approval.required,
        "starting relay run"
    );
    let outcome = run_pipeline(
        &PipelineRequest {
            root,
            cfg: &cfg,
            task: &task,
            shell: &shell,
        },
        &runtime,
        gate.as_mut(),
        &mut status,
    )?;
    info!(
        stages = outcome.stages.len(),
        tokens = outcome.total_tokens(),
        dropped = outcome.total_dropped(),
        "relay run complete"
    );
    Ok(())
}

fn cmd_reconcile(file: &Path) -> Result<()> {
    logging::init(None)?;
    let raw = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let items: Vec<Item> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", file.display()))?;

    let cleaned = reconcile(items);
    let mut out = serde_json::to_string_pretty(&cleaned.items).context("serialize items")?;
    out.push('\n');
    print!("{out}");

    let stats = json!({
        "dropped": cleaned.dropped(),
        "stats": cleaned.stats,
    });
    eprintln!("{stats}");
    Ok(())
}
