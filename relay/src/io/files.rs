//! Writing agent file blocks under the project root.

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::file_blocks::{FileBlock, sanitize_relative_path, strip_markdown_fences};

/// Write each block relative to `root`.
///
/// Returns the written paths, `/`-separated and relative to `root`, in block
/// order. Blocks whose path is empty or escapes the root are skipped.
#[instrument(skip_all, fields(root = %root.display(), blocks = blocks.len()))]
pub fn write_files(root: &Path, blocks: &[FileBlock]) -> Result<Vec<String>> {
    let mut written = Vec::with_capacity(blocks.len());
    for block in blocks {
        let Some(rel_path) = sanitize_relative_path(&block.path) else {
            warn!(path = %block.path, "skipping file block with unusable path");
            continue;
        };
        let abs_path = root.join(&rel_path);
        write_text(&abs_path, &strip_markdown_fences(&block.content))?;

        let shown = rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        debug!(path = %shown, "wrote file block");
        written.push(shown);
    }
    Ok(written)
}

/// Read a file as trimmed text; a missing file reads as empty.
pub fn read_text(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents.trim().to_string()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "document missing, reading as empty");
            Ok(String::new())
        }
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
