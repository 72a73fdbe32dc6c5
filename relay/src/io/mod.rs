//! I/O helpers for relay commands.

pub mod approval;
pub mod config;
pub mod files;
pub mod handoff_log;
pub mod init;
pub mod process;
pub mod prompt;
pub mod runtime;
pub mod status;
