// Not every test crate uses every helper; allow dead_code at the module
// level so the shared harness doesn't warn per-crate.
#![allow(dead_code)]

//! # Test Utilities for arbor
//!
//! The `TestWorkspace` struct builds an isolated workspace in a temporary
//! directory: a bare `project.git` seeded with one commit on `main`, with
//! worktrees landing as siblings of the bare repository. Each test gets a
//! fresh workspace that is cleaned up when the test ends.
//!
//! ## Environment Isolation
//!
//! Git commands are run with isolated environments using `Command::env()`
//! to ensure:
//! - No interference from global git config
//! - Deterministic commit timestamps
//! - Consistent locale settings
//! - No terminal prompts
//! - Thread-safe execution (no global state mutation)
//!
//! `arb` invocations additionally get `ARBOR_CONFIG_PATH` pointed at a
//! per-test file so the user's real config is never read.
//!
//! ## Path Canonicalization
//!
//! Paths are canonicalized to handle platform differences (especially macOS
//! symlinks like /var -> /private/var). On Windows,
//! `std::fs::canonicalize()` returns verbatim paths (`\\?\C:\...`) which
//! git cannot handle, so `dunce` strips the prefix.

use std::path::{Path, PathBuf};
use std::process::Command;

use insta_cmd::get_cargo_bin;
use tempfile::TempDir;

/// Fresh workspace fixture: bare repo, one commit on `main`, no remote.
///
/// Use with `#[rstest]` to inject a new workspace into tests:
/// ```ignore
/// use rstest::rstest;
/// use crate::common::workspace;
///
/// #[rstest]
/// fn test_something(workspace: TestWorkspace) {
///     let wt = workspace.arb_create("feature");
///     // ...
/// }
/// ```
#[rstest::fixture]
pub fn workspace() -> TestWorkspace {
    TestWorkspace::new()
}

/// Workspace with an `origin` remote whose default branch is `main`.
#[rstest::fixture]
pub fn workspace_with_remote() -> TestWorkspace {
    let mut ws = TestWorkspace::new();
    ws.setup_remote("main");
    ws
}

/// Null device path, platform-appropriate.
/// Use this for GIT_CONFIG_SYSTEM to disable system config in tests.
#[cfg(windows)]
const NULL_DEVICE: &str = "NUL";
#[cfg(not(windows))]
const NULL_DEVICE: &str = "/dev/null";

/// Canonicalize a path for comparisons against `arb` output.
///
/// On Windows, `std::fs::canonicalize()` returns verbatim paths like
/// `\\?\C:\...` which git cannot handle. The `dunce` crate strips this
/// prefix when safe. On Unix, this is equivalent to `std::fs::canonicalize()`.
pub fn canonicalize(path: &Path) -> std::io::Result<PathBuf> {
    dunce::canonicalize(path)
}

/// Create an `arb` CLI command with standardized test environment settings.
///
/// The command has the following guarantees:
/// - All host `GIT_*` and `ARBOR_*` variables are cleared
/// - `ARBOR_CONFIG_PATH` points at a non-existent file so the user's real
///   config never loads
#[must_use]
pub fn arb_command() -> Command {
    let mut cmd = Command::new(get_cargo_bin("arb"));
    configure_cli_command(&mut cmd);
    cmd
}

/// Configure an existing command with the standardized arb CLI environment.
///
/// This helper mirrors the environment preparation performed by
/// `arb_command` and is intended for cases where tests need to construct
/// the command manually.
pub fn configure_cli_command(cmd: &mut Command) {
    for (key, _) in std::env::vars() {
        if key.starts_with("GIT_") || key.starts_with("ARBOR_") {
            cmd.env_remove(&key);
        }
    }
    // Set to non-existent path to prevent loading the user's real config.
    // Tests that need config should use TestWorkspace::arb_command(), which
    // overrides this with the per-test file.
    cmd.env("ARBOR_CONFIG_PATH", "/nonexistent/test/config.toml");
    // Enable warn-level logging so diagnostics show up in test failures
    cmd.env("RUST_LOG", "warn");
}

/// Configure a git command with isolated environment for testing.
///
/// Sets environment variables for:
/// - Isolated git config (using provided path or `NULL_DEVICE` for none)
/// - Deterministic commit timestamps
/// - Consistent locale settings
/// - No terminal prompts
pub fn configure_git_cmd(cmd: &mut Command, git_config_path: &Path) {
    cmd.env("GIT_CONFIG_GLOBAL", git_config_path);
    cmd.env("GIT_CONFIG_SYSTEM", NULL_DEVICE);
    cmd.env("GIT_AUTHOR_DATE", "2025-01-01T00:00:00Z");
    cmd.env("GIT_COMMITTER_DATE", "2025-01-01T00:00:00Z");
    cmd.env("LC_ALL", "C");
    cmd.env("LANG", "C");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
}

/// Check that a git command succeeded, panicking with diagnostics if not.
pub fn check_git_status(output: &std::process::Output, cmd_desc: &str) {
    if !output.status.success() {
        panic!(
            "git {} failed:\nstdout: {}\nstderr: {}",
            cmd_desc,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

/// An isolated workspace: a bare `project.git` with one commit on `main`,
/// plus whatever worktrees and remotes the test sets up.
pub struct TestWorkspace {
    temp_dir: TempDir, // Must keep to ensure cleanup on drop
    root: PathBuf,
    bare: PathBuf,
    /// Isolated arbor config for this test. Does not exist until
    /// `write_config` is called; arb treats a missing file as defaults.
    config_path: PathBuf,
    /// Git config file with test settings (identity, default branch)
    git_config_path: PathBuf,
    remote: Option<PathBuf>,
}

impl TestWorkspace {
    /// Create a new workspace with an isolated git environment.
    ///
    /// Layout after setup:
    ///
    /// ```text
    /// <temp>/workspace/project.git    bare repository, one commit on main
    /// ```
    ///
    /// The seed commit is made in a scratch checkout and pushed in, since a
    /// bare repository has no working tree to commit from.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();

        let git_config_path = temp_dir.path().join("test-gitconfig");
        std::fs::write(
            &git_config_path,
            "[user]\n\tname = Test User\n\temail = test@example.com\n\
             [init]\n\tdefaultBranch = main\n\
             [advice]\n\tdetachedHead = false\n",
        )
        .unwrap();

        let root = temp_dir.path().join("workspace");
        std::fs::create_dir(&root).unwrap();

        let mut ws = Self {
            temp_dir,
            bare: root.join("project.git"),
            root,
            config_path: PathBuf::new(),
            git_config_path,
            remote: None,
        };
        ws.config_path = ws.temp_dir.path().join("test-config.toml");

        let bare_str = ws.bare.to_str().unwrap().to_string();
        ws.run_git_in(
            ws.temp_dir.path(),
            &["init", "-q", "--bare", "--initial-branch", "main", &bare_str],
        );

        let seed = ws.temp_dir.path().join("seed");
        ws.run_git_in(
            ws.temp_dir.path(),
            &["init", "-q", "--initial-branch", "main", "seed"],
        );
        std::fs::write(seed.join("README.md"), "# project\n").unwrap();
        ws.run_git_in(&seed, &["add", "README.md"]);
        ws.run_git_in(&seed, &["commit", "-q", "-m", "Initial commit"]);
        ws.run_git_in(&seed, &["push", "-q", &bare_str, "main"]);
        std::fs::remove_dir_all(&seed).unwrap();

        // Canonicalize to resolve symlinks (important on macOS where /var
        // is a symlink to /private/var)
        ws.root = canonicalize(&ws.root).unwrap();
        ws.bare = canonicalize(&ws.bare).unwrap();

        ws
    }

    /// Workspace root: the directory holding `project.git` and the worktrees.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the bare repository.
    pub fn bare_path(&self) -> &Path {
        &self.bare
    }

    /// Path to this test's arbor config file.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Get the temp directory path.
    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path to the bare `origin` remote, if `setup_remote` was called.
    pub fn remote_path(&self) -> &Path {
        self.remote.as_deref().expect("setup_remote not called")
    }

    /// Write this test's arbor config file, replacing previous content.
    pub fn write_config(&self, content: &str) {
        std::fs::write(&self.config_path, content).unwrap();
    }

    /// Configure a git command with isolated environment.
    pub fn configure_git_cmd(&self, cmd: &mut Command) {
        configure_git_cmd(cmd, &self.git_config_path);
    }

    /// Create a git command for the given directory.
    pub fn git_command(&self, dir: &Path) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(dir);
        self.configure_git_cmd(&mut cmd);
        cmd
    }

    /// Run a git command in the bare repository, panicking on failure.
    pub fn run_git(&self, args: &[&str]) {
        self.run_git_in(&self.bare, args);
    }

    /// Run a git command in a specific directory, panicking on failure.
    pub fn run_git_in(&self, dir: &Path, args: &[&str]) {
        let output = self.git_command(dir).args(args).output().unwrap();
        check_git_status(&output, &args.join(" "));
    }

    /// Run a git command in the bare repository and return trimmed stdout.
    pub fn git_output(&self, args: &[&str]) -> String {
        self.git_output_in(&self.bare, args)
    }

    /// Run a git command in a specific directory and return trimmed stdout.
    pub fn git_output_in(&self, dir: &Path, args: &[&str]) -> String {
        let output = self.git_command(dir).args(args).output().unwrap();
        check_git_status(&output, &args.join(" "));
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Create a commit in the given worktree.
    ///
    /// Creates or overwrites `file.txt` with the message content, stages
    /// it, and commits.
    pub fn commit_in(&self, dir: &Path, message: &str) {
        std::fs::write(dir.join("file.txt"), message).unwrap();
        self.run_git_in(dir, &["add", "file.txt"]);
        self.run_git_in(dir, &["commit", "-q", "-m", message]);
    }

    /// Configure an arb command with this workspace's environment: isolated
    /// git config, the per-test arbor config, and the workspace root as the
    /// working directory.
    pub fn configure_arb_cmd(&self, cmd: &mut Command) {
        self.configure_git_cmd(cmd);
        cmd.env("ARBOR_CONFIG_PATH", &self.config_path);
        cmd.current_dir(&self.root);
    }

    /// Create a pre-configured arb command.
    pub fn arb_command(&self) -> Command {
        let mut cmd = arb_command();
        self.configure_arb_cmd(&mut cmd);
        cmd
    }

    /// Create a worktree through `arb create` and return its canonicalized
    /// path, panicking if the command fails.
    pub fn arb_create(&self, branch: &str) -> PathBuf {
        let output = self
            .arb_command()
            .args(["create", branch])
            .output()
            .unwrap();
        if !output.status.success() {
            panic!(
                "arb create {} failed:\nstdout: {}\nstderr: {}",
                branch,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        canonicalize(&self.root.join(branch)).unwrap()
    }

    /// Create a worktree with raw `git worktree add -b`, bypassing arb.
    ///
    /// The result is missing everything arb layers on top: no per-worktree
    /// config override and no hooks wiring. Repair tests start from here.
    pub fn raw_worktree_add(&self, branch: &str) -> PathBuf {
        let path = self.root.join(branch);
        self.run_git(&["worktree", "add", "-q", "-b", branch, path.to_str().unwrap()]);
        canonicalize(&path).unwrap()
    }

    /// Metadata directory inside the bare repository for the worktree at
    /// `path`, resolved through the worktree's own `.git` link file.
    pub fn metadata_dir(&self, worktree: &Path) -> PathBuf {
        let text = std::fs::read_to_string(worktree.join(".git")).unwrap();
        let gitdir = text
            .trim()
            .strip_prefix("gitdir: ")
            .unwrap_or_else(|| panic!("unexpected link file content: {text}"));
        PathBuf::from(gitdir)
    }

    /// Create a bare `origin` remote seeded with the current state of
    /// `default_branch`, and point `origin/HEAD` at it.
    pub fn setup_remote(&mut self, default_branch: &str) {
        let remote_path = self.temp_dir.path().join("origin.git");
        std::fs::create_dir(&remote_path).unwrap();
        self.run_git_in(
            &remote_path,
            &["init", "-q", "--bare", "--initial-branch", default_branch],
        );

        let remote_path = canonicalize(&remote_path).unwrap();
        let remote_str = remote_path.to_str().unwrap().to_string();
        self.run_git(&["remote", "add", "origin", &remote_str]);
        self.run_git(&["push", "-q", "-u", "origin", default_branch]);
        self.run_git(&["remote", "set-head", "origin", default_branch]);

        self.remote = Some(remote_path);
    }

    /// Push `branch` to origin with upstream tracking configured.
    pub fn push_branch(&self, branch: &str) {
        self.run_git(&["push", "-q", "-u", "origin", branch]);
    }

    /// Advance `branch` on the remote by one commit without touching the
    /// local repository. Returns the new remote head SHA.
    ///
    /// The commit is made in a scratch clone of the remote, so the local
    /// repository only learns about it on the next fetch.
    pub fn advance_remote(&self, branch: &str, message: &str) -> String {
        let remote = self.remote_path();
        let scratch = tempfile::tempdir_in(self.temp_dir.path()).unwrap();
        let clone_dir = scratch.path().join("clone");
        self.run_git_in(
            scratch.path(),
            &[
                "clone",
                "-q",
                "--branch",
                branch,
                remote.to_str().unwrap(),
                clone_dir.to_str().unwrap(),
            ],
        );
        self.commit_in(&clone_dir, message);
        self.run_git_in(&clone_dir, &["push", "-q", "origin", branch]);
        self.git_output_in(&clone_dir, &["rev-parse", "HEAD"])
    }

    /// Commit a hook manifest plus scripts onto the branch checked out at
    /// `worktree`.
    ///
    /// `hooks` pairs each script name with its body. An empty slice
    /// declares a version with no scripts.
    pub fn commit_hooks_in(&self, worktree: &Path, version: &str, hooks: &[(&str, &str)]) {
        let script_dir = worktree.join(arbor::hooks::SCRIPT_DIR);
        std::fs::create_dir_all(&script_dir).unwrap();

        let names: Vec<String> = hooks
            .iter()
            .map(|(name, _)| format!("\"{name}\""))
            .collect();
        let manifest = format!(
            "version = \"{version}\"\nhooks = [{}]\n",
            names.join(", ")
        );
        std::fs::write(worktree.join(arbor::hooks::MANIFEST_PATH), manifest).unwrap();

        for (name, body) in hooks {
            std::fs::write(script_dir.join(name), body).unwrap();
        }

        self.run_git_in(worktree, &["add", ".arbor"]);
        self.run_git_in(
            worktree,
            &["commit", "-q", "-m", &format!("Declare hooks {version}")],
        );
    }

    /// Remove the hook manifest and scripts from the branch checked out at
    /// `worktree`.
    pub fn remove_hooks_commit(&self, worktree: &Path) {
        self.run_git_in(worktree, &["rm", "-r", "-q", ".arbor"]);
        self.run_git_in(worktree, &["commit", "-q", "-m", "Remove hooks"]);
    }

    /// Insta settings with this workspace's paths redacted.
    ///
    /// The workspace root becomes `[ROOT]` and the surrounding temp
    /// directory `[TEMP]`, in that order, so nested paths resolve to the
    /// most specific placeholder.
    pub fn snapshot_settings(&self) -> insta::Settings {
        let mut settings = insta::Settings::clone_current();
        settings.add_filter(&regex::escape(self.root.to_str().unwrap()), "[ROOT]");
        settings.add_filter(
            &regex::escape(self.temp_dir.path().to_str().unwrap()),
            "[TEMP]",
        );
        settings.add_filter(r"\\", "/");
        settings
    }
}
