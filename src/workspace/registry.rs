//! The worktree registry, backed entirely by git's own worktree metadata.
//!
//! Listing parses `git worktree list --porcelain` and the reverse pointers
//! under `<bare>/worktrees/*/gitdir`. It never scans the workspace for
//! directories that look like worktrees; a directory git does not know
//! about is not a worktree, no matter what it contains.

use std::path::{Path, PathBuf};

use anyhow::Context;
use normalize_path::NormalizePath;
use serde::Serialize;

use super::lock::RegistryLock;
use super::BareRepository;
use crate::error::ArborError;
use crate::git::WorktreeEntry;

/// One registered worktree, as the registry sees it.
#[derive(Debug, Clone, Serialize)]
pub struct Worktree {
    /// Stable identifier: the workspace-relative path, `/`-separated. For
    /// worktrees created by arbor this equals the branch name.
    pub id: String,
    /// Absolute path of the working directory.
    pub path: PathBuf,
    /// Checked-out branch, `None` when the HEAD is detached.
    pub branch: Option<String>,
    /// Commit the worktree is at.
    pub head: String,
    pub detached: bool,
    /// Lock reason, if git has the worktree locked.
    pub locked: Option<String>,
    /// Prune reason, if git considers the entry stale.
    pub prunable: Option<String>,
    /// Metadata directory inside the bare repository
    /// (`<bare>/worktrees/<name>`), when the reverse pointer resolves.
    #[serde(skip)]
    pub metadata_dir: Option<PathBuf>,
}

impl Worktree {
    /// The link file at the worktree root (`<path>/.git`).
    pub fn link_file_path(&self) -> PathBuf {
        self.path.join(".git")
    }

    /// The private hooks directory inside the worktree's metadata dir.
    pub fn hooks_dir(&self) -> Option<PathBuf> {
        self.metadata_dir.as_ref().map(|m| m.join("hooks"))
    }

    /// The per-worktree config file inside the metadata dir.
    pub fn worktree_config_path(&self) -> Option<PathBuf> {
        self.metadata_dir.as_ref().map(|m| m.join("config.worktree"))
    }
}

/// Registry operations over one workspace's bare repository.
///
/// Reads need no lock. Mutations take a [`RegistryLock`] witness so the
/// caller decides the span a lock is held for; a creator holds one lock
/// across its whole branch-create-plus-register sequence.
#[derive(Debug)]
pub struct Registry<'a> {
    repo: &'a BareRepository,
    root: &'a Path,
}

impl<'a> Registry<'a> {
    pub(super) fn new(repo: &'a BareRepository, root: &'a Path) -> Self {
        Self { repo, root }
    }

    /// List registered worktrees in git's order (creation order for linked
    /// worktrees). The bare entry itself is filtered out.
    pub fn list(&self) -> anyhow::Result<Vec<Worktree>> {
        let stdout = self.repo.git().worktree_list_porcelain()?;
        let entries = WorktreeEntry::parse_porcelain_list(&stdout)?;
        let metadata = self.metadata_dirs()?;

        Ok(entries
            .into_iter()
            .filter(|e| !e.bare)
            .map(|e| {
                let normalized = e.path.normalize();
                let metadata_dir = metadata
                    .iter()
                    .find(|(wt_path, _)| *wt_path == normalized)
                    .map(|(_, meta)| meta.clone());
                Worktree {
                    id: worktree_id(self.root, &e.path),
                    path: e.path,
                    branch: e.branch,
                    head: e.head,
                    detached: e.detached,
                    locked: e.locked,
                    prunable: e.prunable,
                    metadata_dir,
                }
            })
            .collect())
    }

    /// Resolve `id` to a registered worktree. Accepts the registry id, a
    /// branch name, or an absolute path.
    pub fn find(&self, id: &str) -> anyhow::Result<Worktree> {
        let target_path = Path::new(id).normalize();
        self.list()?
            .into_iter()
            .find(|wt| {
                wt.id == id
                    || wt.branch.as_deref() == Some(id)
                    || wt.path.normalize() == target_path
            })
            .ok_or_else(|| ArborError::WorktreeNotFound { id: id.to_string() }.into())
    }

    /// The registered worktree for `branch`, if any.
    pub fn find_by_branch(&self, branch: &str) -> anyhow::Result<Option<Worktree>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|wt| wt.branch.as_deref() == Some(branch)))
    }

    /// Attach a worktree for an existing branch.
    ///
    /// Atomic from the caller's view: `git worktree add` either completes
    /// the registration or unwinds it. Half-written state from a killed
    /// process is the repair engine's job, not a state this call leaves on
    /// a normal failure.
    pub fn register_existing(
        &self,
        _lock: &RegistryLock,
        branch: &str,
        path: &Path,
    ) -> anyhow::Result<()> {
        self.repo.git().worktree_add(path, branch)
    }

    /// Create `branch` from `base` and attach its worktree in one step.
    pub fn register_new_branch(
        &self,
        _lock: &RegistryLock,
        branch: &str,
        base: &str,
        path: &Path,
    ) -> anyhow::Result<()> {
        self.repo.git().worktree_add_new_branch(path, branch, base)
    }

    /// Detach a worktree. `force` discards uncommitted changes.
    pub fn deregister(&self, _lock: &RegistryLock, path: &Path, force: bool) -> anyhow::Result<()> {
        self.repo.git().worktree_remove(path, force)
    }

    /// Drop one registry entry whose working directory no longer exists,
    /// by removing its metadata directory. Scoped to the single entry so
    /// that other damaged worktrees stay registered for their own repair.
    pub fn prune_entry(&self, _lock: &RegistryLock, worktree: &Worktree) -> anyhow::Result<()> {
        anyhow::ensure!(
            !worktree.path.is_dir(),
            "working directory reappeared at {}",
            worktree.path.display()
        );
        let metadata_dir = worktree
            .metadata_dir
            .as_ref()
            .context("No metadata directory resolves for this worktree")?;
        std::fs::remove_dir_all(metadata_dir)
            .with_context(|| format!("Failed to prune {}", metadata_dir.display()))
    }

    /// Map each worktree's working directory to its metadata directory by
    /// reading the `gitdir` reverse pointers. Entries that cannot be read
    /// are skipped; a missing pointer is one of the things repair detects.
    fn metadata_dirs(&self) -> anyhow::Result<Vec<(PathBuf, PathBuf)>> {
        let worktrees_dir = self.repo.worktrees_metadata_dir();
        let mut map = Vec::new();
        let entries = match std::fs::read_dir(&worktrees_dir) {
            Ok(entries) => entries,
            // No linked worktrees yet.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(map),
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!(
                    "Failed to read worktree metadata: {}",
                    worktrees_dir.display()
                )));
            }
        };
        for entry in entries {
            let entry = entry?;
            let meta_dir = entry.path();
            if !meta_dir.is_dir() {
                continue;
            }
            let Ok(pointer) = std::fs::read_to_string(meta_dir.join("gitdir")) else {
                continue;
            };
            // Points at `<worktree>/.git`; the worktree root is its parent.
            let link_path = PathBuf::from(pointer.trim());
            if let Some(wt_dir) = link_path.parent() {
                map.push((wt_dir.normalize(), meta_dir));
            }
        }
        Ok(map)
    }
}

/// Workspace-relative id with `/` separators; worktrees living outside the
/// workspace keep their absolute path as id.
fn worktree_id(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}
