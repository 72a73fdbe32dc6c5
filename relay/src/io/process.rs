//! Child process execution with a timeout and bounded output capture.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{ChildStdin, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

type Tee = Arc<Option<Mutex<BufWriter<File>>>>;

/// Captured child process output.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Tail of stderr for error messages.
    pub fn stderr_tail(&self, max_bytes: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let trimmed = text.trim();
        if trimmed.len() <= max_bytes {
            return trimmed.to_string();
        }
        let mut start = trimmed.len() - max_bytes;
        while !trimmed.is_char_boundary(start) {
            start += 1;
        }
        format!("…{}", &trimmed[start..])
    }
}

/// Run `cmd`, feeding `stdin`, and wait at most `timeout`.
///
/// stdout and stderr are drained concurrently so the child never blocks on a
/// full pipe; at most `output_limit_bytes` of each is kept. When `tee_path` is
/// set, every stdout line is also appended to that file and flushed
/// immediately.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes, tee = tee_path.is_some()))]
pub fn run_process(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
    tee_path: Option<&Path>,
) -> Result<ProcessOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let tee: Tee = Arc::new(match tee_path {
        Some(path) => Some(Mutex::new(open_tee(path)?)),
        None => None,
    });

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_lines_limited(stdout, output_limit_bytes, tee));
    let stderr_handle = thread::spawn(move || read_limited(stderr, output_limit_bytes));

    // The timeout covers a child that never drains stdin.
    let stdin_handle = match stdin {
        Some(input) => {
            let child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || write_stdin(child_stdin, &input)))
        }
        None => None,
    };

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    if let Some(handle) = stdin_handle {
        join_writer(handle)?;
    }
    let (stdout, stdout_truncated) = join_reader(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_reader(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn open_tee(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create stream dir {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("create stream file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Write all of `input` and close the pipe.
fn write_stdin(mut child_stdin: ChildStdin, input: &[u8]) -> io::Result<()> {
    child_stdin.write_all(input)?;
    child_stdin.flush()
}

/// A child that exits without reading all of stdin closes the pipe early;
/// its exit status is reported instead.
fn join_writer(handle: thread::JoinHandle<io::Result<()>>) -> Result<()> {
    match handle.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("child closed stdin before reading all input");
            Ok(())
        }
        Ok(Err(e)) => Err(e).context("write stdin"),
        Err(_) => Err(anyhow!("stdin writer thread panicked")),
    }
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Append up to the remaining budget of `chunk`; return bytes discarded.
fn keep_within(collected: &mut Vec<u8>, chunk: &[u8], limit: usize) -> usize {
    let keep = chunk.len().min(limit.saturating_sub(collected.len()));
    collected.extend_from_slice(&chunk[..keep]);
    chunk.len() - keep
}

fn read_lines_limited<R: Read>(reader: R, limit: usize, tee: Tee) -> Result<(Vec<u8>, usize)> {
    let mut reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).context("read line")?;
        if n == 0 {
            break;
        }
        if let Some(writer) = &*tee
            && let Ok(mut writer) = writer.lock()
        {
            if let Err(e) = writer.write_all(&line).and_then(|()| writer.flush()) {
                warn!(err = %e, "failed to write stream file");
            }
        }
        truncated += keep_within(&mut collected, &line, limit);
    }

    Ok((collected, truncated))
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut collected = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        truncated += keep_within(&mut collected, &chunk[..n], limit);
    }

    Ok((collected, truncated))
}
