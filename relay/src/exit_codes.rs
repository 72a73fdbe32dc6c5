//! Stable exit codes for relay CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config, arguments, input files, or other errors.
pub const INVALID: i32 = 1;
/// A reviewer rejected a stage's output at the approval gate.
pub const REJECTED: i32 = 2;
/// The agent runtime failed or a stage did not produce a required deliverable.
pub const RUNTIME: i32 = 3;
