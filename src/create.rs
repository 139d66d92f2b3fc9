//! Worktree creation.
//!
//! `create` is reuse-friendly: a branch that already exists gets a worktree
//! attached to it, only a missing branch is forked from the base. Creation
//! is not done until the new worktree passes a repair check, because
//! `git worktree add` can leave a half-initialized directory behind when
//! the process dies mid-flight.

use anyhow::Context;

use crate::error::ArborError;
use crate::repair::RepairEngine;
use crate::workspace::{Workspace, Worktree};

/// Name of the issue note file written into the worktree root.
pub const ISSUE_NOTE_FILE: &str = ".arbor-issue";

pub struct WorktreeCreator<'a> {
    ws: &'a Workspace,
}

impl<'a> WorktreeCreator<'a> {
    pub fn new(ws: &'a Workspace) -> Self {
        Self { ws }
    }

    /// Create (or attach) a worktree for `branch` and return it.
    ///
    /// `base` defaults to the repository's default branch and is only
    /// consulted when `branch` does not exist yet. `issue` is stored as the
    /// branch description and as a note file in the worktree; bookkeeping
    /// for humans, not state the repair engine owns.
    pub fn create(
        &self,
        branch: &str,
        base: Option<&str>,
        issue: Option<&str>,
    ) -> anyhow::Result<Worktree> {
        let repo = self.ws.repo();
        let git = repo.git();
        let registry = self.ws.registry();
        let path = self.ws.worktree_path(branch);

        // The lock spans every check that feeds the mutation; two racing
        // creates for the same branch serialize here.
        {
            let lock = repo.lock(self.ws.config())?;

            if let Some(existing) = registry.find_by_branch(branch)? {
                return Err(ArborError::WorktreeConflict {
                    branch: branch.to_string(),
                    existing_path: existing.path,
                }
                .into());
            }
            if path.exists() {
                return Err(ArborError::PathExists {
                    branch: branch.to_string(),
                    path,
                }
                .into());
            }

            if git.local_branch_exists(branch)? {
                log::debug!("branch '{branch}' exists, attaching worktree");
                registry.register_existing(&lock, branch, &path)?;
            } else {
                let base = match base {
                    Some(base) => base.to_string(),
                    None => git.default_branch()?.to_string(),
                };
                match git.rev_parse(&base) {
                    Ok(_) => {}
                    // Timeouts and other typed failures keep their identity.
                    Err(e) if e.downcast_ref::<ArborError>().is_some() => return Err(e),
                    Err(_) => return Err(ArborError::BaseBranchNotFound { base }.into()),
                }
                log::debug!("creating branch '{branch}' from '{base}'");
                registry.register_new_branch(&lock, branch, &base, &path)?;
            }
        }

        // Verify and finish initialization: link file, per-worktree config,
        // hooks. Failure here fails the create.
        repo.ensure_worktree_config_extension()?;
        let worktree = registry
            .find_by_branch(branch)?
            .with_context(|| format!("Worktree for '{branch}' missing right after registration"))?;
        RepairEngine::new(self.ws).repair_worktree(&worktree)?;

        self.bind_tracking(branch)?;

        if let Some(issue) = issue {
            git.set_branch_description(branch, issue)?;
            let note_path = worktree.path.join(ISSUE_NOTE_FILE);
            std::fs::write(&note_path, format!("Issue: {issue}\nBranch: {branch}\n"))
                .with_context(|| format!("Failed to write issue note: {}", note_path.display()))?;
        }

        registry.find(&worktree.id)
    }

    /// Point the branch at its remote counterpart when one exists and no
    /// upstream is bound yet. An existing upstream is left alone.
    fn bind_tracking(&self, branch: &str) -> anyhow::Result<()> {
        let git = self.ws.repo().git();
        if git.upstream_branch(branch)?.is_some() {
            return Ok(());
        }
        let remote = match self.ws.config().remote.as_deref() {
            Some(remote) => remote.to_string(),
            None => git.primary_remote()?.to_string(),
        };
        if git.remote_branch_exists(&remote, branch)? {
            log::debug!("binding '{branch}' to {remote}/{branch}");
            git.set_upstream(branch, &format!("{remote}/{branch}"))?;
        }
        Ok(())
    }
}

/// Remove a worktree and its registry entry.
///
/// `force` passes through to git and discards uncommitted changes; without
/// it, a dirty worktree refuses removal.
pub fn remove(ws: &Workspace, id: &str, force: bool) -> anyhow::Result<Worktree> {
    let worktree = ws.registry().find(id)?;
    let lock = ws.repo().lock(ws.config())?;
    ws.registry().deregister(&lock, &worktree.path, force)?;
    Ok(worktree)
}
