//! Divergence detection and repair.
//!
//! A worktree's on-disk state can drift from what the registry declares:
//! link files get deleted or mangled, per-worktree config never gets
//! written, directories get `rm -rf`ed behind git's back, installed hooks
//! fall behind the branch. Each divergence has a fix that overwrites from
//! the authoritative source, so repairing twice gives the same end state
//! as repairing once.
//!
//! Detection is read-only and runs across worktrees in parallel; fixes run
//! sequentially, one worktree at a time.

use std::path::PathBuf;

use anyhow::Context;
use normalize_path::NormalizePath;
use rayon::prelude::*;

use crate::cancel::CancelFlag;
use crate::error::ArborError;
use crate::hooks::{HookInstaller, HookSet, MARKER_FILE_NAME};
use crate::meta::{HookMarker, LinkFile, WorktreeConfig};
use crate::workspace::{Workspace, Worktree};

/// One detected mismatch between a worktree's actual state and the state
/// the registry and its branch declare.
#[derive(Debug, Clone, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Divergence {
    /// Link file missing, malformed, or pointing at the wrong metadata dir.
    BrokenLink { expected_gitdir: PathBuf },
    /// `config.worktree` missing or not declaring this directory a real
    /// working tree with its own hooks path.
    MissingConfig { expected_hooks_path: PathBuf },
    /// Registry entry whose working directory no longer exists.
    StaleEntry,
    /// Installed hooks differ from what the checked-out branch declares.
    HookMismatch,
    /// No metadata directory resolves for this worktree, so there is no
    /// authoritative source to repair from.
    UnresolvedMetadata,
}

/// Per-worktree result of a repair pass.
#[derive(Debug)]
pub struct RepairEntry {
    pub worktree_id: String,
    /// Divergences that were present and fixed.
    pub fixed: Vec<Divergence>,
    /// Set when repair could not restore the worktree's invariants.
    pub error: Option<anyhow::Error>,
}

/// Outcome of a targeted or full-sweep repair run.
#[derive(Debug, Default)]
pub struct RepairReport {
    pub entries: Vec<RepairEntry>,
    /// True when a cancellation request stopped the sweep early.
    pub cancelled: bool,
}

impl RepairReport {
    /// Total number of fixes applied across all worktrees.
    pub fn fixes_applied(&self) -> usize {
        self.entries.iter().map(|e| e.fixed.len()).sum()
    }

    /// First unrepairable worktree, if any.
    pub fn first_error(&mut self) -> Option<anyhow::Error> {
        self.entries.iter_mut().find_map(|e| e.error.take())
    }
}

pub struct RepairEngine<'a> {
    ws: &'a Workspace,
}

impl<'a> RepairEngine<'a> {
    pub fn new(ws: &'a Workspace) -> Self {
        Self { ws }
    }

    /// Detect divergences without touching anything.
    ///
    /// A stale entry shadows every other check: with the working directory
    /// gone there is nothing else worth reporting. Git also flags worktrees
    /// with damaged link files as prunable, so only a missing directory
    /// counts as stale here; a damaged link with the directory still in
    /// place is a broken link, which is repairable.
    pub fn check(&self, worktree: &Worktree) -> Vec<Divergence> {
        if !worktree.path.is_dir() {
            return vec![Divergence::StaleEntry];
        }
        let Some(metadata_dir) = &worktree.metadata_dir else {
            return vec![Divergence::UnresolvedMetadata];
        };

        let mut divergences = Vec::new();

        let link_ok = std::fs::read_to_string(worktree.link_file_path())
            .ok()
            .and_then(|text| LinkFile::parse(&text).ok())
            .is_some_and(|link| link.gitdir.normalize() == metadata_dir.normalize());
        if !link_ok {
            divergences.push(Divergence::BrokenLink {
                expected_gitdir: metadata_dir.clone(),
            });
        }

        let hooks_dir = metadata_dir.join("hooks");
        let config_ok = std::fs::read_to_string(metadata_dir.join("config.worktree"))
            .ok()
            .and_then(|text| WorktreeConfig::parse(&text).ok())
            .is_some_and(|cfg| {
                !cfg.bare
                    && cfg
                        .hooks_path
                        .as_deref()
                        .is_some_and(|p| p.normalize() == hooks_dir.normalize())
            });
        if !config_ok {
            divergences.push(Divergence::MissingConfig {
                expected_hooks_path: hooks_dir.clone(),
            });
        }

        if self.hooks_diverged(worktree, &hooks_dir) {
            divergences.push(Divergence::HookMismatch);
        }

        divergences
    }

    /// Compare the branch-declared hook version against the installed
    /// marker. Read-only twin of [`HookInstaller::reconcile`].
    fn hooks_diverged(&self, worktree: &Worktree, hooks_dir: &std::path::Path) -> bool {
        let declared = worktree.branch.as_deref().and_then(|branch| {
            match HookSet::for_branch(self.ws.repo().git(), branch) {
                Ok(set) => set.map(|s| s.version),
                Err(e) => {
                    log::debug!("treating branch '{branch}' as having no hooks: {e:#}");
                    None
                }
            }
        });
        let installed = std::fs::read_to_string(hooks_dir.join(MARKER_FILE_NAME))
            .ok()
            .and_then(|text| HookMarker::parse(&text).ok())
            .map(|marker| marker.version);

        match (declared, installed) {
            (None, None) => {
                // Leftover scripts from a half-finished install still count.
                // Only regular files: removal never touches subdirectories,
                // so counting one here would re-report the mismatch forever.
                std::fs::read_dir(hooks_dir)
                    .map(|entries| {
                        entries
                            .filter_map(|e| e.ok())
                            .any(|e| e.file_type().is_ok_and(|t| t.is_file()))
                    })
                    .unwrap_or(false)
            }
            (declared, installed) => declared != installed,
        }
    }

    /// Apply fixes for the given divergences. Order within one worktree is
    /// fixed: link first, then config, then hooks, since hook installation
    /// relies on the link and config being sound.
    pub fn repair(
        &self,
        worktree: &Worktree,
        divergences: &[Divergence],
    ) -> anyhow::Result<Vec<Divergence>> {
        let mut fixed = Vec::new();
        for divergence in divergences {
            match divergence {
                Divergence::BrokenLink { expected_gitdir } => {
                    let link_path = worktree.link_file_path();
                    LinkFile::new(expected_gitdir.clone())
                        .write(&link_path)
                        .with_context(|| {
                            format!("Failed to rewrite link file: {}", link_path.display())
                        })?;
                }
                Divergence::MissingConfig { expected_hooks_path } => {
                    self.ws.repo().ensure_worktree_config_extension()?;
                    let config_path = worktree
                        .worktree_config_path()
                        .context("No metadata directory for config fix")?;
                    WorktreeConfig::standard(expected_hooks_path.clone())
                        .write(&config_path)
                        .with_context(|| {
                            format!("Failed to write config: {}", config_path.display())
                        })?;
                }
                Divergence::StaleEntry => {
                    // Matches `git worktree prune`, which refuses to drop
                    // locked entries.
                    if worktree.locked.is_some() {
                        return Err(ArborError::DivergenceUnrepairable {
                            id: worktree.id.clone(),
                            divergence: divergence.to_string(),
                            reason: "worktree is locked; unlock it before pruning".into(),
                        }
                        .into());
                    }
                    let lock = self.ws.repo().lock(self.ws.config())?;
                    self.ws.registry().prune_entry(&lock, worktree)?;
                }
                Divergence::HookMismatch => {
                    HookInstaller::new(self.ws.repo().git()).reconcile(worktree)?;
                }
                Divergence::UnresolvedMetadata => {
                    return Err(ArborError::DivergenceUnrepairable {
                        id: worktree.id.clone(),
                        divergence: divergence.to_string(),
                        reason: "no metadata directory resolves for this worktree".into(),
                    }
                    .into());
                }
            }
            log::debug!("fixed {divergence} for '{}'", worktree.id);
            fixed.push(divergence.clone());
        }
        Ok(fixed)
    }

    /// Targeted mode: check and repair a single worktree.
    pub fn repair_worktree(&self, worktree: &Worktree) -> anyhow::Result<RepairEntry> {
        let divergences = self.check(worktree);
        let fixed = self.repair(worktree, &divergences)?;
        Ok(RepairEntry {
            worktree_id: worktree.id.clone(),
            fixed,
            error: None,
        })
    }

    /// Full sweep: detect across all worktrees in parallel, then fix each
    /// one in registry order. One worktree failing to repair never stops
    /// the rest; its error lands in the report instead.
    pub fn repair_all(&self, cancel: &CancelFlag) -> anyhow::Result<RepairReport> {
        let worktrees = self.ws.registry().list()?;
        let checked: Vec<(Worktree, Vec<Divergence>)> = worktrees
            .into_par_iter()
            .map(|wt| {
                let divergences = self.check(&wt);
                (wt, divergences)
            })
            .collect();

        let mut report = RepairReport::default();
        for (worktree, divergences) in checked {
            if cancel.is_cancelled() {
                log::debug!("repair cancelled before '{}'", worktree.id);
                report.cancelled = true;
                break;
            }
            if divergences.is_empty() {
                continue;
            }
            let entry = match self.repair(&worktree, &divergences) {
                Ok(fixed) => RepairEntry {
                    worktree_id: worktree.id.clone(),
                    fixed,
                    error: None,
                },
                Err(e) => RepairEntry {
                    worktree_id: worktree.id.clone(),
                    fixed: Vec::new(),
                    error: Some(e),
                },
            };
            report.entries.push(entry);
        }
        Ok(report)
    }
}
