//! Parsing of `git worktree list --porcelain` output.

use std::path::PathBuf;

use anyhow::bail;

/// One record from `git worktree list --porcelain`, as git reports it.
///
/// This is the raw registry entry; the workspace layer enriches it with an
/// id and metadata-directory mapping.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WorktreeEntry {
    /// Absolute path of the working directory (or of the bare repository
    /// for the `bare` record).
    pub path: PathBuf,
    /// HEAD commit SHA. Empty for the bare record.
    pub head: String,
    /// Checked-out branch, without the `refs/heads/` prefix. `None` when
    /// detached or bare.
    pub branch: Option<String>,
    pub bare: bool,
    pub detached: bool,
    /// Lock reason when the worktree is locked (may be empty).
    pub locked: Option<String>,
    /// Prune reason when git considers the entry prunable (may be empty).
    pub prunable: Option<String>,
}

impl WorktreeEntry {
    fn at(path: PathBuf) -> Self {
        Self {
            path,
            head: String::new(),
            branch: None,
            bare: false,
            detached: false,
            locked: None,
            prunable: None,
        }
    }

    /// Parse the porcelain listing into records, preserving git's order.
    ///
    /// Records are blank-line separated groups of `key [value]` lines; the
    /// final record may lack its trailing blank line.
    pub fn parse_porcelain_list(output: &str) -> anyhow::Result<Vec<Self>> {
        let mut entries = Vec::new();
        let mut current: Option<WorktreeEntry> = None;

        for line in output.lines() {
            if line.is_empty() {
                if let Some(entry) = current.take() {
                    entries.push(entry);
                }
                continue;
            }

            let (key, value) = match line.split_once(' ') {
                Some((k, v)) => (k, Some(v)),
                None => (line, None),
            };

            match key {
                "worktree" => {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                    let path = match value {
                        Some(path) => path,
                        None => bail!("worktree line missing path"),
                    };
                    current = Some(WorktreeEntry::at(PathBuf::from(path)));
                }
                key => match (key, current.as_mut()) {
                    ("HEAD", Some(entry)) => {
                        let head = match value {
                            Some(head) => head,
                            None => bail!("HEAD line missing SHA"),
                        };
                        entry.head = head.to_string();
                    }
                    ("branch", Some(entry)) => {
                        let branch_ref = match value {
                            Some(branch_ref) => branch_ref,
                            None => bail!("branch line missing ref"),
                        };
                        let branch = branch_ref
                            .strip_prefix("refs/heads/")
                            .unwrap_or(branch_ref)
                            .to_string();
                        entry.branch = Some(branch);
                    }
                    ("bare", Some(entry)) => {
                        entry.bare = true;
                    }
                    ("detached", Some(entry)) => {
                        entry.detached = true;
                    }
                    ("locked", Some(entry)) => {
                        entry.locked = Some(value.unwrap_or_default().to_string());
                    }
                    ("prunable", Some(entry)) => {
                        entry.prunable = Some(value.unwrap_or_default().to_string());
                    }
                    _ => {
                        // Ignore unknown attributes or attributes before the
                        // first worktree line.
                    }
                },
            }
        }

        // Push the last record if the output doesn't end with a blank line
        if let Some(entry) = current {
            entries.push(entry);
        }

        Ok(entries)
    }
}
