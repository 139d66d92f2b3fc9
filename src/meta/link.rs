//! The worktree link file: the `.git` file inside a linked worktree that
//! points at its metadata directory inside the bare repository.

use std::path::{Path, PathBuf};

use super::FormatError;

/// Parsed link file. The on-disk form is a single line:
///
/// ```text
/// gitdir: /ws/proj.git/worktrees/feature
/// ```
///
/// Anything else (extra lines, a missing prefix, an empty path) is
/// malformed and treated by the repair engine as a divergence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFile {
    pub gitdir: PathBuf,
}

impl LinkFile {
    pub fn new(gitdir: impl Into<PathBuf>) -> Self {
        Self {
            gitdir: gitdir.into(),
        }
    }

    pub fn parse(content: &str) -> Result<Self, FormatError> {
        let body = content.strip_suffix('\n').unwrap_or(content);
        if body.contains('\n') {
            return Err(FormatError::new("link file has more than one line"));
        }
        let path = body
            .strip_prefix("gitdir: ")
            .ok_or_else(|| FormatError::new("link file does not start with 'gitdir: '"))?;
        if path.is_empty() {
            return Err(FormatError::new("link file has an empty gitdir path"));
        }
        Ok(Self {
            gitdir: PathBuf::from(path),
        })
    }

    pub fn serialize(&self) -> String {
        format!("gitdir: {}\n", self.gitdir.display())
    }

    /// Write the link file atomically at `path` (the worktree's `.git`).
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        super::write_atomic(path, &self.serialize())
    }
}
