//! Sequential multi-agent pipeline with reconciled handoffs.
//!
//! Role agents run one after another; everything that crosses an agent
//! boundary is cleaned so that tool calls only travel together with their
//! outputs. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (item normalization, continuity
//!   reconciliation, handoff reports, file-block parsing). No I/O.
//! - **[`io`]**: Side-effecting operations (config, runtime subprocess,
//!   status stream, approval gate, files). Isolated behind traits where tests
//!   need to substitute them.
//!
//! [`pipeline`] coordinates the [`agents`] with core logic and I/O to
//! implement `relay run`.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
