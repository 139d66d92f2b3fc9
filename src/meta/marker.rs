//! The installed-hooks marker file.
//!
//! Lives inside a worktree's private hooks directory and records which hook
//! set version is currently installed there. Only the installer's
//! idempotence check reads it; the format is internal, not public.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use super::FormatError;

/// Parsed marker. On-disk form is `key=value` lines:
///
/// ```text
/// installed_by=arbor 0.4.0
/// installed_at=2026-03-14T09:26:53Z
/// source_branch=feature/x
/// version=v2
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookMarker {
    pub installed_by: String,
    pub installed_at: DateTime<Utc>,
    pub source_branch: String,
    pub version: String,
}

impl HookMarker {
    /// Marker for an installation happening now, attributed to this build.
    pub fn now(source_branch: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            installed_by: format!("arbor {}", env!("CARGO_PKG_VERSION")),
            installed_at: Utc::now(),
            source_branch: source_branch.into(),
            version: version.into(),
        }
    }

    pub fn parse(content: &str) -> Result<Self, FormatError> {
        let mut fields: HashMap<&str, &str> = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| FormatError::new(format!("expected key=value, got: {line}")))?;
            fields.insert(key.trim(), value.trim());
        }

        let required = |key: &str| {
            fields
                .get(key)
                .map(|v| v.to_string())
                .ok_or_else(|| FormatError::new(format!("missing {key}")))
        };

        let installed_at_raw = required("installed_at")?;
        let installed_at = DateTime::parse_from_rfc3339(&installed_at_raw)
            .map_err(|e| FormatError::new(format!("bad installed_at: {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            installed_by: required("installed_by")?,
            installed_at,
            source_branch: required("source_branch")?,
            version: required("version")?,
        })
    }

    pub fn serialize(&self) -> String {
        format!(
            "installed_by={}\ninstalled_at={}\nsource_branch={}\nversion={}\n",
            self.installed_by,
            self.installed_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.source_branch,
            self.version,
        )
    }

    /// Write the marker atomically.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        super::write_atomic(path, &self.serialize())
    }
}
