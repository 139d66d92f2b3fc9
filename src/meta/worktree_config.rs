//! The per-worktree override config (`worktrees/<name>/config.worktree`).
//!
//! A linked worktree inherits the bare repository's config, which claims
//! `core.bare = true` and says nothing about hooks. The override file turns
//! the worktree back into a genuine working directory and points hook
//! lookup at that worktree's private hooks directory.

use std::path::{Path, PathBuf};

use super::FormatError;

/// Parsed `config.worktree`. On-disk form is a git-config `[core]` section:
///
/// ```text
/// [core]
///     bare = false
///     hooksPath = /ws/proj.git/worktrees/feature/hooks
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeConfig {
    pub bare: bool,
    pub hooks_path: Option<PathBuf>,
}

impl WorktreeConfig {
    /// The override every healthy worktree carries: not bare, hooks scoped
    /// to its own metadata directory.
    pub fn standard(hooks_path: impl Into<PathBuf>) -> Self {
        Self {
            bare: false,
            hooks_path: Some(hooks_path.into()),
        }
    }

    pub fn parse(content: &str) -> Result<Self, FormatError> {
        let mut section = String::new();
        let mut bare = None;
        let mut hooks_path = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .ok_or_else(|| FormatError::new(format!("unterminated section: {line}")))?;
                section = name.trim().to_ascii_lowercase();
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| FormatError::new(format!("expected key = value, got: {line}")))?;
            if section != "core" {
                continue;
            }
            match key.trim() {
                "bare" => match value.trim() {
                    "true" => bare = Some(true),
                    "false" => bare = Some(false),
                    other => {
                        return Err(FormatError::new(format!("bare must be a bool, got: {other}")));
                    }
                },
                "hooksPath" => hooks_path = Some(PathBuf::from(value.trim())),
                _ => {}
            }
        }

        match bare {
            Some(bare) => Ok(Self { bare, hooks_path }),
            None => Err(FormatError::new("missing core.bare")),
        }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::from("[core]\n");
        out.push_str(&format!("\tbare = {}\n", self.bare));
        if let Some(hooks_path) = &self.hooks_path {
            out.push_str(&format!("\thooksPath = {}\n", hooks_path.display()));
        }
        out
    }

    /// Write the override file atomically.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        super::write_atomic(path, &self.serialize())
    }
}
