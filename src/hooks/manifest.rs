//! Branch-declared hook sets.
//!
//! Hooks are versioned inside the branch's own tree: `.arbor/hooks.toml`
//! declares a version and the script names, and each script lives under
//! `.arbor/hooks/`. Reading goes through `git show` against the branch ref,
//! so the worktree's possibly-dirty checkout never influences what gets
//! installed.

use anyhow::{Context, bail};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::git::Repository;

/// Tree path of the hook manifest.
pub const MANIFEST_PATH: &str = ".arbor/hooks.toml";

/// Tree directory holding the hook scripts named by the manifest.
pub const SCRIPT_DIR: &str = ".arbor/hooks";

/// The manifest as committed: a version identifier plus the script names.
///
/// ```toml
/// version = "v2"
/// hooks = ["pre-commit", "post-checkout"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct HookManifest {
    pub version: String,
    #[serde(default)]
    pub hooks: Vec<String>,
}

/// A fully resolved hook set: the declared version and every script body,
/// in manifest order.
#[derive(Debug, Clone)]
pub struct HookSet {
    pub version: String,
    pub scripts: IndexMap<String, String>,
}

impl HookSet {
    /// Load the hook set `branch` declares, or `None` when the branch has
    /// no manifest.
    ///
    /// A manifest that exists but cannot be used (invalid TOML, empty
    /// version, bad script name, script missing from the tree) is an error;
    /// the installer downgrades that to "no hooks" with a warning.
    pub fn for_branch(git: &Repository, branch: &str) -> anyhow::Result<Option<Self>> {
        let Some(text) = git.show_blob(branch, MANIFEST_PATH) else {
            return Ok(None);
        };
        let manifest: HookManifest = toml::from_str(&text)
            .with_context(|| format!("Invalid hook manifest on branch '{branch}'"))?;
        if manifest.version.trim().is_empty() {
            bail!("Hook manifest on branch '{branch}' declares an empty version");
        }

        let mut scripts = IndexMap::new();
        for name in &manifest.hooks {
            validate_hook_name(name)?;
            let tree_path = format!("{SCRIPT_DIR}/{name}");
            let body = git.show_blob(branch, &tree_path).with_context(|| {
                format!("Hook '{name}' is declared on branch '{branch}' but {tree_path} is not in its tree")
            })?;
            scripts.insert(name.clone(), body);
        }
        Ok(Some(Self {
            version: manifest.version,
            scripts,
        }))
    }
}

/// Hook names become file names inside a directory we manage; anything that
/// could escape that directory or hide as a dotfile is rejected.
fn validate_hook_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        bail!("Hook manifest contains an empty hook name");
    }
    if name.starts_with('.') || name.contains('/') || name.contains('\\') {
        bail!("Invalid hook name '{name}': must be a plain file name");
    }
    Ok(())
}
