//! Version-aware hook installation.
//!
//! Each worktree gets hooks installed into its *own* metadata hooks
//! directory (`<bare>/worktrees/<name>/hooks`), never the shared hooks
//! directory of the bare repository, so two worktrees on different branches
//! can run different hook versions side by side. A marker file records what
//! is installed; matching versions short-circuit the whole operation.

mod manifest;

use std::path::Path;

use anyhow::{Context, bail};

pub use manifest::{HookManifest, HookSet, MANIFEST_PATH, SCRIPT_DIR};

use crate::git::Repository;
use crate::meta::HookMarker;
use crate::workspace::Worktree;

/// Marker file inside a worktree's hooks directory.
pub const MARKER_FILE_NAME: &str = ".installed";

/// What reconciliation did to a worktree's hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookState {
    /// Scripts were (re)written and the marker now records `version`.
    Installed { version: String },
    /// The marker already matched the branch's version; nothing touched.
    UpToDate { version: String },
    /// The branch declares no hooks; previously installed ones were removed.
    Removed,
    /// No hooks declared and none installed.
    Absent,
}

/// Reconciles a worktree's private hooks directory against the hook set
/// declared by its checked-out branch.
#[derive(Debug)]
pub struct HookInstaller<'a> {
    git: &'a Repository,
}

impl<'a> HookInstaller<'a> {
    /// `git` must be rooted at the bare repository so branch trees resolve.
    pub fn new(git: &'a Repository) -> Self {
        Self { git }
    }

    /// Bring the worktree's installed hooks in line with its branch.
    ///
    /// Detached worktrees declare no hook set. A branch whose manifest is
    /// unreadable is logged and treated as declaring none; stale hooks are
    /// removed rather than left behind in both cases.
    pub fn reconcile(&self, worktree: &Worktree) -> anyhow::Result<HookState> {
        let Some(hooks_dir) = worktree.hooks_dir() else {
            bail!(
                "Cannot reconcile hooks for '{}': its metadata directory was not resolved; run repair first",
                worktree.id
            );
        };

        let set = match &worktree.branch {
            None => None,
            Some(branch) => match HookSet::for_branch(self.git, branch) {
                Ok(set) => set,
                Err(e) => {
                    log::warn!("treating branch '{branch}' as having no hooks: {e:#}");
                    None
                }
            },
        };

        match set {
            Some(set) => self.install(worktree, &hooks_dir, &set),
            None => remove_installed(&hooks_dir),
        }
    }

    fn install(
        &self,
        worktree: &Worktree,
        hooks_dir: &Path,
        set: &HookSet,
    ) -> anyhow::Result<HookState> {
        let marker_path = hooks_dir.join(MARKER_FILE_NAME);
        if let Ok(text) = std::fs::read_to_string(&marker_path)
            && let Ok(marker) = HookMarker::parse(&text)
            && marker.version == set.version
        {
            log::debug!(
                "hooks for '{}' already at version {}",
                worktree.id,
                set.version
            );
            return Ok(HookState::UpToDate {
                version: set.version.clone(),
            });
        }

        std::fs::create_dir_all(hooks_dir)
            .with_context(|| format!("Failed to create hooks dir: {}", hooks_dir.display()))?;

        for (name, body) in &set.scripts {
            let script_path = hooks_dir.join(name);
            std::fs::write(&script_path, body)
                .with_context(|| format!("Failed to write hook: {}", script_path.display()))?;
            make_executable(&script_path)?;
        }

        // Scripts from an older hook set that the branch no longer declares.
        for entry in std::fs::read_dir(hooks_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == MARKER_FILE_NAME || set.scripts.contains_key(name.as_ref()) {
                continue;
            }
            if entry.file_type()?.is_file() {
                std::fs::remove_file(entry.path())?;
            }
        }

        let source_branch = worktree.branch.as_deref().unwrap_or_default();
        let marker = HookMarker::now(source_branch, &set.version);
        marker.write(&marker_path)?;
        log::debug!(
            "installed {} hook(s) at version {} for '{}'",
            set.scripts.len(),
            set.version,
            worktree.id
        );
        Ok(HookState::Installed {
            version: set.version.clone(),
        })
    }
}

/// Clear out everything in the hooks directory. Also covers the crashed
/// half-install case where scripts exist without a marker.
fn remove_installed(hooks_dir: &Path) -> anyhow::Result<HookState> {
    let entries = match std::fs::read_dir(hooks_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HookState::Absent),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to read hooks dir: {}", hooks_dir.display())));
        }
    };

    let mut removed_any = false;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove hook: {}", entry.path().display()))?;
            removed_any = true;
        }
    }
    Ok(if removed_any {
        HookState::Removed
    } else {
        HookState::Absent
    })
}

#[cfg(unix)]
fn make_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|| format!("Failed to mark executable: {}", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
