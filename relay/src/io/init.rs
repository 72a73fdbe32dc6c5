//! Initialization helpers for `.relay/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{RelayConfig, write_config};

/// All canonical paths within `.relay/` for a project root.
#[derive(Debug, Clone)]
pub struct RelayPaths {
    pub root: PathBuf,
    pub relay_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
    pub handoffs_dir: PathBuf,
    pub turns_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl RelayPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let relay_dir = root.join(".relay");
        Self {
            root: root.clone(),
            relay_dir: relay_dir.clone(),
            config_path: relay_dir.join("config.toml"),
            gitignore_path: relay_dir.join(".gitignore"),
            handoffs_dir: relay_dir.join("handoffs"),
            turns_dir: relay_dir.join("turns"),
            logs_dir: root.join("logs"),
        }
    }
}

/// Options for `init_relay`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing relay-owned files.
    pub force: bool,
}

/// Create `.relay/` scaffolding in `root`.
///
/// Fails if `.relay/` already exists unless `options.force` is set.
pub fn init_relay(root: &Path, options: &InitOptions) -> Result<RelayPaths> {
    let paths = RelayPaths::new(root);
    if paths.relay_dir.exists() && !paths.relay_dir.is_dir() {
        return Err(anyhow!("relay init: .relay exists but is not a directory"));
    }
    if paths.relay_dir.exists() && !options.force {
        return Err(anyhow!(
            "relay init: .relay already exists (use --force to overwrite)"
        ));
    }

    create_dir(&paths.relay_dir)?;
    create_dir(&paths.handoffs_dir)?;
    create_dir(&paths.turns_dir)?;

    fs::write(&paths.gitignore_path, RELAY_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;
    write_config(&paths.config_path, &RelayConfig::default())?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

const RELAY_GITIGNORE: &str = "handoffs/\nturns/\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_relay(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.relay_dir.is_dir());
        assert!(paths.handoffs_dir.is_dir());
        assert!(paths.turns_dir.is_dir());
        assert_eq!(
            fs::read_to_string(&paths.gitignore_path).expect("read"),
            RELAY_GITIGNORE
        );
        assert_eq!(
            load_config(&paths.config_path).expect("load"),
            RelayConfig::default()
        );
    }

    #[test]
    fn init_without_force_refuses_existing_relay_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_relay(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_relay(temp.path(), &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_with_force_restores_default_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_relay(temp.path(), &InitOptions { force: false }).expect("init");
        fs::write(&paths.config_path, "model = \"custom\"\n").expect("write custom");

        init_relay(temp.path(), &InitOptions { force: true }).expect("re-init");
        assert_eq!(load_config(&paths.config_path).expect("load").model, "gpt-5.1");
    }
}
