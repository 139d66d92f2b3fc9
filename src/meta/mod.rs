//! Typed codecs for the small metadata files arbor owns.
//!
//! Each format gets a serializer/deserializer pair instead of ad hoc text
//! concatenation, so "malformed" is a parse failure rather than a regex
//! guess. Writers go through a temp-file-and-rename so a reader never sees
//! a half-written file.

mod link;
mod marker;
mod worktree_config;

pub use link::LinkFile;
pub use marker::HookMarker;
pub use worktree_config::WorktreeConfig;

/// Parse failure for one of the metadata formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatError {
    pub message: String,
}

impl FormatError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FormatError {}

/// Atomically replace `path` with `content`.
///
/// Writes a sibling temp file and renames it over the target, so concurrent
/// readers observe either the old or the new content, never a torn write.
pub(crate) fn write_atomic(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    use std::io::Write;

    let parent = path.parent().ok_or_else(|| {
        std::io::Error::other(format!("no parent directory for {}", path.display()))
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
