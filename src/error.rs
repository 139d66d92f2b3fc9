//! Arbor error types.
//!
//! `ArborError` is a typed enum for domain errors that can be pattern-matched
//! and tested. Use `.into()` to convert to `anyhow::Error` while preserving
//! the type for downcasting. Every variant names the entity it concerns
//! (repository path, worktree id, branch) so a multi-target run can attribute
//! failures precisely.

use std::path::PathBuf;

/// Domain errors for workspace and worktree operations.
///
/// # Usage
///
/// ```ignore
/// return Err(ArborError::BaseBranchNotFound { base: "main".into() }.into());
///
/// if let Some(ArborError::WorktreeConflict { branch, .. }) = err.downcast_ref() {
///     eprintln!("pick a different branch than {branch}");
/// }
/// ```
#[derive(Debug, Clone)]
pub enum ArborError {
    /// No bare repository inside the workspace directory.
    RepositoryNotFound { search_root: PathBuf },
    /// More than one bare-repository candidate; requires human disambiguation.
    AmbiguousRepository {
        search_root: PathBuf,
        candidates: Vec<PathBuf>,
    },
    /// No registered worktree matches the requested id or branch.
    WorktreeNotFound { id: String },
    /// The branch is already checked out in another worktree.
    WorktreeConflict {
        branch: String,
        existing_path: PathBuf,
    },
    /// The base branch to fork from does not exist.
    BaseBranchNotFound { base: String },
    /// The target worktree directory already exists.
    PathExists { branch: String, path: PathBuf },
    /// Repair fixed what it could, but this divergence needs manual
    /// intervention (e.g. a permission-denied write).
    DivergenceUnrepairable {
        id: String,
        divergence: String,
        reason: String,
    },
    /// An external operation exceeded its deadline. State is left at the
    /// last consistent checkpoint and the operation is safe to retry.
    Timeout { operation: String, secs: u64 },
    /// Per-worktree integration failure during sync. Recorded in the run's
    /// result set; never aborts the remaining worktrees.
    SyncConflict { id: String, reason: String },
    /// The registry lock could not be acquired within the retry budget.
    LockTimeout { lock_path: PathBuf, attempts: u32 },
}

impl std::error::Error for ArborError {}

impl std::fmt::Display for ArborError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArborError::RepositoryNotFound { search_root } => {
                write!(
                    f,
                    "No bare repository in {}\nhint: expected one '<name>.git' directory containing an 'objects' subdirectory",
                    search_root.display()
                )
            }

            ArborError::AmbiguousRepository {
                search_root,
                candidates,
            } => {
                let names: Vec<_> = candidates
                    .iter()
                    .map(|p| {
                        p.file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| p.display().to_string())
                    })
                    .collect();
                write!(
                    f,
                    "Multiple bare repositories in {}: {}\nhint: a workspace must contain exactly one",
                    search_root.display(),
                    names.join(", ")
                )
            }

            ArborError::WorktreeNotFound { id } => {
                write!(
                    f,
                    "No worktree named {id}\nhint: run 'arb list' to see registered worktrees"
                )
            }

            ArborError::WorktreeConflict {
                branch,
                existing_path,
            } => {
                write!(
                    f,
                    "Branch {branch} is already checked out at {}\nhint: choose a different branch, or remove that worktree first",
                    existing_path.display()
                )
            }

            ArborError::BaseBranchNotFound { base } => {
                write!(f, "No branch named {base} to use as a base")
            }

            ArborError::PathExists { branch, path } => {
                write!(
                    f,
                    "Cannot create worktree for {branch}: {} already exists",
                    path.display()
                )
            }

            ArborError::DivergenceUnrepairable {
                id,
                divergence,
                reason,
            } => {
                write!(f, "Cannot repair {id}: {divergence}: {reason}")
            }

            ArborError::Timeout { operation, secs } => {
                write!(
                    f,
                    "Timed out after {secs}s: {operation}\nhint: state is at the last completed step; safe to retry"
                )
            }

            ArborError::SyncConflict { id, reason } => {
                write!(f, "Sync conflict in {id}: {reason}")
            }

            ArborError::LockTimeout {
                lock_path,
                attempts,
            } => {
                write!(
                    f,
                    "Registry lock at {} still held after {attempts} attempts\nhint: another arbor process may be mutating the registry; retry when it finishes",
                    lock_path.display()
                )
            }
        }
    }
}

/// Map an error chain to a process exit code.
///
/// Typed domain errors get distinct codes so the outer layer can react to
/// the taxonomy; anything else is a generic failure (1). Code 2 is left to
/// clap for usage errors.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ArborError>() {
        Some(ArborError::RepositoryNotFound { .. }) | Some(ArborError::WorktreeNotFound { .. }) => {
            3
        }
        Some(ArborError::AmbiguousRepository { .. }) => 4,
        Some(ArborError::WorktreeConflict { .. }) => 5,
        Some(ArborError::BaseBranchNotFound { .. }) => 6,
        Some(ArborError::PathExists { .. }) => 7,
        Some(ArborError::DivergenceUnrepairable { .. }) => 8,
        Some(ArborError::Timeout { .. }) => 9,
        Some(ArborError::SyncConflict { .. }) => 10,
        Some(ArborError::LockTimeout { .. }) => 11,
        None => 1,
    }
}
