//! Bare-repository Git worktree orchestration.
//!
//! Arbor manages a workspace where one bare repository backs any number of
//! linked worktrees: creating them, keeping their link files and
//! per-worktree config repaired, installing branch-declared hooks, and
//! synchronizing all of them against the remote in one pass.
//!
//! The `arb` CLI is the primary consumer; this library API is not stable.

pub mod cancel;
pub mod config;
pub mod create;
pub mod error;
pub mod git;
pub mod hooks;
pub mod meta;
pub mod repair;
pub mod shell_exec;
pub mod sync;
pub mod workspace;

pub use cancel::CancelFlag;
pub use config::Config;
pub use error::ArborError;
pub use workspace::{Workspace, Worktree};
