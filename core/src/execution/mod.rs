//! Execution: running selected instances to a terminal state.
//!
//! This module holds the engine (lifecycle ledger, scheduling, fail-fast),
//! the `Session` context handed to bodies, and the `Runner` capability.
//! Only `runner::ShellRunner` spawns processes.

pub mod context;
pub mod engine;
pub mod runner;
