//! Parsing of `### FILE: <path>` blocks from an agent's final output.
//!
//! Pure text handling only; writing to disk lives in `io::files`.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

static FILE_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^### FILE:\s*(.+?)\s*$").expect("valid header regex"));
static FENCE_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*```[a-zA-Z0-9_-]*\s*$").expect("valid fence regex"));
static FENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*```\s*$").expect("valid fence regex"));

/// One file declared in agent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub path: String,
    pub content: String,
}

/// Split `text` into file blocks.
///
/// Lines before the first header are ignored. Content is right-trimmed and
/// ends with exactly one newline. A repeated path keeps its first position
/// and takes the last content.
pub fn parse_file_blocks(text: &str) -> Vec<FileBlock> {
    let mut blocks: Vec<FileBlock> = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(caps) = FILE_HEADER_RE.captures(line) {
            if let Some((path, buffer)) = current.take() {
                push_block(&mut blocks, path, &buffer);
            }
            current = Some((caps[1].to_string(), Vec::new()));
            continue;
        }
        if let Some((_, buffer)) = current.as_mut() {
            buffer.push(line);
        }
    }
    if let Some((path, buffer)) = current {
        push_block(&mut blocks, path, &buffer);
    }

    blocks
}

fn push_block(blocks: &mut Vec<FileBlock>, path: String, buffer: &[&str]) {
    let mut content = buffer.join("\n").trim_end().to_string();
    content.push('\n');
    match blocks.iter_mut().find(|block| block.path == path) {
        Some(existing) => existing.content = content,
        None => blocks.push(FileBlock { path, content }),
    }
}

/// Remove one markdown fence wrapping the whole content, if present.
pub fn strip_markdown_fences(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let (Some(first), Some(last)) = (lines.first(), lines.last()) else {
        return content.to_string();
    };
    if lines.len() >= 2 && FENCE_START_RE.is_match(first) && FENCE_END_RE.is_match(last) {
        let mut inner = lines[1..lines.len() - 1].join("\n").trim_end().to_string();
        inner.push('\n');
        return inner;
    }
    content.to_string()
}

/// Normalize a declared path into a path relative to the project root.
///
/// Leading `./` and `/` are stripped. Returns `None` for empty paths and for
/// paths that would escape the root.
pub fn sanitize_relative_path(raw: &str) -> Option<PathBuf> {
    let mut trimmed = raw.trim();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    if trimmed.is_empty() {
        return None;
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if normalized.as_os_str().is_empty() {
        return None;
    }
    Some(normalized)
}
