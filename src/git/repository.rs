use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::bail;
use once_cell::sync::OnceCell;

use crate::error::ArborError;

/// Default deadline for a single git invocation. Overridden by the
/// `command-timeout-secs` configuration key.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Cached values for git queries that don't change during a process run.
#[derive(Debug, Default)]
struct RepoCache {
    primary_remote: OnceCell<String>,
    default_branch: OnceCell<String>,
}

/// Git execution context rooted at one directory.
///
/// This is the single place arbor constructs git command lines. It exposes
/// exactly the primitives the rest of the crate needs: worktree
/// list/add/remove, fetch, branch-ref queries, and config updates.
/// Construct one per directory you operate in (a bare repository or a
/// single worktree) and pass it explicitly; nothing here rediscovers a
/// repository from ambient process state.
///
/// # Examples
///
/// ```no_run
/// use arbor::git::Repository;
///
/// let repo = Repository::at("/ws/proj.git");
/// let exists = repo.local_branch_exists("main")?;
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct Repository {
    path: PathBuf,
    timeout: Duration,
    cache: RepoCache,
}

impl Repository {
    /// Create a git context at the specified directory.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            cache: RepoCache::default(),
        }
    }

    /// Replace the per-command deadline (from configuration).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The directory this context runs git in.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Short display name used as the logging context: the directory name.
    fn logging_context(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("?")
            .to_string()
    }

    /// Run a git command in this context and return its stdout.
    ///
    /// Failures carry the joined stderr/stdout text; a command that exceeds
    /// the deadline surfaces as [`ArborError::Timeout`].
    pub fn run_command(&self, args: &[&str]) -> anyhow::Result<String> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        cmd.current_dir(&self.path);
        self.run_prepared(cmd, args)
    }

    /// Run a git command and return whether it exited 0.
    ///
    /// For commands that use exit codes as boolean results, like
    /// `git merge-base --is-ancestor`.
    pub fn run_command_check(&self, args: &[&str]) -> anyhow::Result<bool> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        cmd.current_dir(&self.path);

        let output = self.spawn(&mut cmd, args)?;
        Ok(output.status.success())
    }

    fn run_prepared(&self, mut cmd: Command, args: &[&str]) -> anyhow::Result<String> {
        let output = self.spawn(&mut cmd, args)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Git uses \r for progress updates; normalize for stable output
            let stderr = stderr.replace('\r', "\n");
            for line in stderr.trim().lines() {
                log::debug!("  ! {}", line);
            }
            // Some git commands print errors to stdout
            let stdout = String::from_utf8_lossy(&output.stdout);
            let error_msg = [stderr.trim(), stdout.trim()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            bail!("{}", error_msg);
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !stdout.is_empty() {
            for line in stdout.trim().lines() {
                log::debug!("  {}", line);
            }
        }
        Ok(stdout)
    }

    fn spawn(&self, cmd: &mut Command, args: &[&str]) -> anyhow::Result<std::process::Output> {
        match crate::shell_exec::run(cmd, Some(&self.logging_context()), self.timeout) {
            Ok(output) => Ok(output),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(ArborError::Timeout {
                operation: format!("git {}", args.join(" ")),
                secs: self.timeout.as_secs(),
            }
            .into()),
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to execute: git {}", args.join(" ")))),
        }
    }

    // --- branch refs ---

    /// Check if a local branch exists.
    pub fn local_branch_exists(&self, branch: &str) -> anyhow::Result<bool> {
        self.run_command_check(&[
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("refs/heads/{}", branch),
        ])
    }

    /// Check if a remote-tracking ref exists for `branch` on `remote`.
    pub fn remote_branch_exists(&self, remote: &str, branch: &str) -> anyhow::Result<bool> {
        self.run_command_check(&[
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("refs/remotes/{}/{}", remote, branch),
        ])
    }

    /// Resolve a revision to a commit SHA.
    pub fn rev_parse(&self, rev: &str) -> anyhow::Result<String> {
        let stdout = self.run_command(&["rev-parse", "--verify", rev])?;
        Ok(stdout.trim().to_string())
    }

    /// Get the upstream tracking branch for the given branch.
    ///
    /// Uses `@{upstream}` resolution; `None` means no upstream is configured,
    /// which is a normal state and distinct from a failure.
    pub fn upstream_branch(&self, branch: &str) -> anyhow::Result<Option<String>> {
        let result =
            self.run_command(&["rev-parse", "--abbrev-ref", &format!("{}@{{u}}", branch)]);

        match result {
            Ok(upstream) => {
                let trimmed = upstream.trim();
                Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
            }
            Err(_) => Ok(None), // No upstream configured
        }
    }

    /// Bind `branch` to track `upstream` (e.g. `origin/feature`).
    pub fn set_upstream(&self, branch: &str, upstream: &str) -> anyhow::Result<()> {
        self.run_command(&["branch", "--set-upstream-to", upstream, branch])?;
        Ok(())
    }

    /// Set the branch description used as branch-scoped metadata.
    pub fn set_branch_description(&self, branch: &str, text: &str) -> anyhow::Result<()> {
        self.run_command(&["config", &format!("branch.{}.description", branch), text])?;
        Ok(())
    }

    // --- config ---

    /// Read a config value, `None` when unset.
    pub fn config_get(&self, key: &str) -> Option<String> {
        self.run_command(&["config", "--get", key])
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Write a config value.
    pub fn config_set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.run_command(&["config", key, value])?;
        Ok(())
    }

    /// Get the primary remote name for this repository.
    ///
    /// Uses git's `checkout.defaultRemote` if set and backed by a URL,
    /// otherwise the first remote with a configured URL, falling back to
    /// "origin". Cached for the lifetime of this instance.
    pub fn primary_remote(&self) -> anyhow::Result<&str> {
        self.cache
            .primary_remote
            .get_or_try_init(|| {
                if let Some(default_remote) = self.config_get("checkout.defaultRemote")
                    && self.remote_has_url(&default_remote)
                {
                    return Ok(default_remote);
                }

                let output = self
                    .run_command(&["config", "--get-regexp", r"remote\..+\.url"])
                    .unwrap_or_default();
                let first_remote = output.lines().next().and_then(|line| {
                    // "remote.<name>.url <value>"; split on ".url " to keep
                    // remote names containing dots intact
                    line.strip_prefix("remote.")
                        .and_then(|s| s.split_once(".url "))
                        .map(|(name, _)| name)
                });

                Ok(first_remote.unwrap_or("origin").to_string())
            })
            .map(String::as_str)
    }

    fn remote_has_url(&self, remote: &str) -> bool {
        self.config_get(&format!("remote.{}.url", remote)).is_some()
    }

    /// Get the default branch for the repository.
    ///
    /// Tries the primary remote's cached HEAD (e.g. `origin/HEAD`), then
    /// falls back to local inference. Result is cached for the lifetime of
    /// this instance.
    pub fn default_branch(&self) -> anyhow::Result<&str> {
        self.cache
            .default_branch
            .get_or_try_init(|| {
                if let Ok(remote) = self.primary_remote() {
                    let head = format!("refs/remotes/{}/HEAD", remote);
                    if let Ok(output) =
                        self.run_command(&["symbolic-ref", "--short", "--quiet", &head])
                    {
                        let prefix = format!("{}/", remote);
                        let trimmed = output.trim();
                        let branch = trimmed.strip_prefix(&prefix).unwrap_or(trimmed);
                        if !branch.is_empty() {
                            return Ok(branch.to_string());
                        }
                    }
                }
                self.infer_default_branch_locally()
            })
            .map(String::as_str)
    }

    /// Infer the default branch without a remote: a single local branch wins,
    /// then `init.defaultBranch`, then common names.
    fn infer_default_branch_locally(&self) -> anyhow::Result<String> {
        let branches = self.local_branches()?;
        if branches.len() == 1 {
            return Ok(branches[0].clone());
        }

        if let Some(default) = self.config_get("init.defaultBranch")
            && branches.contains(&default)
        {
            return Ok(default);
        }

        for name in ["main", "master", "develop", "trunk"] {
            if branches.contains(&name.to_string()) {
                return Ok(name.to_string());
            }
        }

        bail!("Could not infer a default branch; pass --base explicitly")
    }

    /// List all local branches.
    pub fn local_branches(&self) -> anyhow::Result<Vec<String>> {
        // lstrip=2 instead of refname:short; git adds a "heads/" prefix to
        // short names when disambiguation is needed
        let stdout = self.run_command(&["branch", "--format=%(refname:lstrip=2)"])?;
        Ok(stdout
            .lines()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    // --- worktrees ---

    /// Raw porcelain worktree listing; parsed by the workspace registry.
    pub fn worktree_list_porcelain(&self) -> anyhow::Result<String> {
        self.run_command(&["worktree", "list", "--porcelain"])
    }

    /// Attach a worktree for an existing branch.
    pub fn worktree_add(&self, path: &Path, branch: &str) -> anyhow::Result<()> {
        self.run_command(&["worktree", "add", &path.to_string_lossy(), branch])?;
        Ok(())
    }

    /// Create `branch` from `base` and attach a worktree for it in one step.
    pub fn worktree_add_new_branch(
        &self,
        path: &Path,
        branch: &str,
        base: &str,
    ) -> anyhow::Result<()> {
        self.run_command(&[
            "worktree",
            "add",
            "-b",
            branch,
            &path.to_string_lossy(),
            base,
        ])?;
        Ok(())
    }

    /// Detach a worktree. `force` discards uncommitted changes.
    pub fn worktree_remove(&self, path: &Path, force: bool) -> anyhow::Result<()> {
        let path_str = path.to_string_lossy();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_str);
        self.run_command(&args)?;
        Ok(())
    }

    // --- working tree ---

    /// Fast-forward the current branch to `reference`, refusing any
    /// integration that would need a real merge.
    pub fn merge_ff_only(&self, reference: &str) -> anyhow::Result<()> {
        self.run_command(&["merge", "--ff-only", reference])?;
        Ok(())
    }

    /// Fetch from `remote` into the shared object store.
    ///
    /// Never prompts for credentials; a remote that wants interaction fails
    /// instead of hanging a non-interactive run.
    pub fn fetch(&self, remote: &str) -> anyhow::Result<()> {
        let args = ["fetch", remote];
        let mut cmd = Command::new("git");
        cmd.args(args);
        cmd.current_dir(&self.path);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        self.run_prepared(cmd, &args)?;
        Ok(())
    }

    // --- tree reads ---

    /// Read a committed blob, e.g. `show_blob("feature", ".arbor/hooks.toml")`.
    ///
    /// `None` means the path does not exist in that tree, so callers that
    /// treat absence as "not applicable" get it without string-matching
    /// git's stderr.
    pub fn show_blob(&self, rev: &str, path: &str) -> Option<String> {
        match self.run_command(&["show", &format!("{}:{}", rev, path)]) {
            Ok(content) => Some(content),
            Err(e) => {
                log::debug!("no blob {}:{} ({})", rev, path, e);
                None
            }
        }
    }
}
