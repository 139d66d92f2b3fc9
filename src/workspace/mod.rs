//! Workspace layout: one bare repository (`<name>.git`) at the workspace
//! root, fronted by linked worktrees in sibling directories.
//!
//! The locator never walks into worktrees or asks git; it inspects the
//! immediate children of the workspace directory and picks the single
//! `*.git` directory that has an `objects/` subdirectory. Everything else
//! in the workspace is either a worktree or unrelated clutter.

mod lock;
mod registry;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

pub use lock::{LOCK_FILE_NAME, RegistryLock};
pub use registry::{Registry, Worktree};

use crate::config::Config;
use crate::error::ArborError;
use crate::git::Repository;

/// Handle to the workspace's bare repository. Constructed explicitly by the
/// locator; nothing in the crate discovers a repository from ambient state.
#[derive(Debug)]
pub struct BareRepository {
    path: PathBuf,
    git: Repository,
}

impl BareRepository {
    fn new(path: PathBuf, timeout: Duration) -> Self {
        let git = Repository::at(&path).with_timeout(timeout);
        Self { path, git }
    }

    /// Directory of the bare repository itself (`<workspace>/<name>.git`).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Git command runner rooted at the bare repository.
    pub fn git(&self) -> &Repository {
        &self.git
    }

    /// Directory holding per-worktree metadata (`<bare>/worktrees`).
    pub fn worktrees_metadata_dir(&self) -> PathBuf {
        self.path.join("worktrees")
    }

    /// Acquire the registry mutation lock with the configured retry policy.
    pub fn lock(&self, config: &Config) -> anyhow::Result<RegistryLock> {
        RegistryLock::acquire(&self.path, config.lock_attempts, config.lock_backoff())
    }

    /// Make sure per-worktree configuration is honored. Without the
    /// extension, `config.worktree` files are silently ignored by git.
    pub fn ensure_worktree_config_extension(&self) -> anyhow::Result<()> {
        if self.git.config_get("extensions.worktreeConfig").as_deref() != Some("true") {
            self.git.config_set("extensions.worktreeConfig", "true")?;
        }
        Ok(())
    }
}

/// Locate the bare repository among the immediate children of
/// `workspace_dir`.
///
/// Zero candidates is [`ArborError::RepositoryNotFound`]; more than one is
/// [`ArborError::AmbiguousRepository`] and never a silent pick.
pub fn locate(workspace_dir: &Path) -> anyhow::Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    let entries = std::fs::read_dir(workspace_dir)
        .with_context(|| format!("Failed to read directory: {}", workspace_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let is_git_dir = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".git"));
        if is_git_dir && path.join("objects").is_dir() {
            candidates.push(path);
        }
    }
    candidates.sort();

    match candidates.len() {
        0 => Err(ArborError::RepositoryNotFound {
            search_root: workspace_dir.to_path_buf(),
        }
        .into()),
        1 => {
            let found = candidates.remove(0);
            Ok(dunce::canonicalize(&found).unwrap_or(found))
        }
        _ => Err(ArborError::AmbiguousRepository {
            search_root: workspace_dir.to_path_buf(),
            candidates,
        }
        .into()),
    }
}

/// A located workspace: root directory, bare repository, and the loaded
/// configuration that governs timeouts and locking.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    repo: BareRepository,
    config: Config,
}

impl Workspace {
    /// Open the workspace rooted at `root`, failing if it does not contain
    /// exactly one bare repository.
    pub fn open(root: &Path, config: Config) -> anyhow::Result<Self> {
        let root = dunce::canonicalize(root)
            .with_context(|| format!("Failed to resolve directory: {}", root.display()))?;
        let bare = locate(&root)?;
        let repo = BareRepository::new(bare, config.command_timeout());
        Ok(Self { root, repo, config })
    }

    /// Walk upward from `start` until a directory with a bare repository is
    /// found. Ambiguity in an ancestor is an error, not a reason to keep
    /// climbing.
    pub fn discover(start: &Path, config: Config) -> anyhow::Result<Self> {
        let start = dunce::canonicalize(start)
            .with_context(|| format!("Failed to resolve directory: {}", start.display()))?;
        let mut dir: Option<&Path> = Some(&start);
        while let Some(candidate) = dir {
            match locate(candidate) {
                Ok(bare) => {
                    let repo = BareRepository::new(bare, config.command_timeout());
                    return Ok(Self {
                        root: candidate.to_path_buf(),
                        repo,
                        config,
                    });
                }
                Err(e) => match e.downcast_ref::<ArborError>() {
                    Some(ArborError::RepositoryNotFound { .. }) => dir = candidate.parent(),
                    _ => return Err(e),
                },
            }
        }
        Err(ArborError::RepositoryNotFound { search_root: start }.into())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repo(&self) -> &BareRepository {
        &self.repo
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The worktree registry, backed by this workspace's bare repository.
    pub fn registry(&self) -> Registry<'_> {
        Registry::new(&self.repo, &self.root)
    }

    /// Where a worktree for `branch` lives: `<root>/<branch>`, so slashed
    /// branch names nest naturally.
    pub fn worktree_path(&self, branch: &str) -> PathBuf {
        self.root.join(branch)
    }

    /// Git command runner for an individual worktree directory.
    pub fn git_at(&self, worktree_path: &Path) -> Repository {
        Repository::at(worktree_path).with_timeout(self.config.command_timeout())
    }
}
