//! Workspace-wide synchronization.
//!
//! One fetch updates the shared object store, then every non-detached
//! worktree gets its remote-tracking counterpart integrated fast-forward
//! only. The run is best-effort per worktree: a conflict is an outcome,
//! not an abort.

use strum::Display;

use crate::cancel::CancelFlag;
use crate::workspace::{Workspace, Worktree};

/// What happened to one worktree during a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SyncOutcome {
    /// Fast-forwarded to the remote-tracking branch (or already there).
    Updated,
    /// The branch has no remote-tracking counterpart to integrate.
    NoRemoteTracking,
    /// Integration failed; the worktree was left as it was.
    Conflict { reason: String },
    /// Detached HEAD, never mutated by sync.
    SkippedDetached,
}

/// Result of one sync run: per-worktree outcomes in registry order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub results: Vec<(Worktree, SyncOutcome)>,
    /// True when a cancellation request stopped the run early.
    pub cancelled: bool,
}

impl SyncReport {
    pub fn count(&self, matches: impl Fn(&SyncOutcome) -> bool) -> usize {
        self.results.iter().filter(|(_, o)| matches(o)).count()
    }
}

pub struct Synchronizer<'a> {
    ws: &'a Workspace,
}

impl<'a> Synchronizer<'a> {
    pub fn new(ws: &'a Workspace) -> Self {
        Self { ws }
    }

    /// Fetch once, then integrate each worktree in registry order.
    ///
    /// A failed fetch aborts the run before any worktree is touched; with
    /// a stale object store every per-worktree integration would be
    /// working from old refs.
    pub fn sync_all(&self, cancel: &CancelFlag) -> anyhow::Result<SyncReport> {
        let git = self.ws.repo().git();
        let remote = match self.ws.config().remote.as_deref() {
            Some(remote) => remote.to_string(),
            None => git.primary_remote()?.to_string(),
        };
        git.fetch(&remote)?;

        let mut report = SyncReport::default();
        for worktree in self.ws.registry().list()? {
            if cancel.is_cancelled() {
                log::debug!("sync cancelled before '{}'", worktree.id);
                report.cancelled = true;
                break;
            }
            let outcome = self.sync_worktree(&worktree, &remote);
            log::debug!("sync '{}': {}", worktree.id, outcome);
            report.results.push((worktree, outcome));
        }
        Ok(report)
    }

    fn sync_worktree(&self, worktree: &Worktree, remote: &str) -> SyncOutcome {
        let Some(branch) = worktree.branch.as_deref() else {
            return SyncOutcome::SkippedDetached;
        };

        let reference = match self.tracking_reference(branch, remote) {
            Ok(Some(reference)) => reference,
            Ok(None) => return SyncOutcome::NoRemoteTracking,
            Err(e) => {
                return SyncOutcome::Conflict {
                    reason: short_reason(&e),
                };
            }
        };

        match self.ws.git_at(&worktree.path).merge_ff_only(&reference) {
            Ok(()) => SyncOutcome::Updated,
            Err(e) => SyncOutcome::Conflict {
                reason: short_reason(&e),
            },
        }
    }

    /// The ref to integrate: the configured upstream when one is bound,
    /// otherwise the same-name branch on the fetch remote.
    fn tracking_reference(&self, branch: &str, remote: &str) -> anyhow::Result<Option<String>> {
        let git = self.ws.repo().git();
        if let Some(upstream) = git.upstream_branch(branch)? {
            return Ok(Some(upstream));
        }
        if git.remote_branch_exists(remote, branch)? {
            return Ok(Some(format!("{remote}/{branch}")));
        }
        Ok(None)
    }
}

/// First line of the root cause, for one-line outcome display.
fn short_reason(e: &anyhow::Error) -> String {
    e.root_cause()
        .to_string()
        .lines()
        .next()
        .unwrap_or("unknown error")
        .to_string()
}
