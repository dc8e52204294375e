//! Deterministic layout of stored reports and badges.

use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

/// File name of the generated badge in every artifact directory.
pub const BADGE_FILE: &str = "badge.svg";

/// Where the artifacts of one commit live, relative to the host directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    organization: String,
    repository: String,
    branch: String,
    commit: String,
}

impl ArtifactLocation {
    /// Validate the four path segments of a commit's artifact directory.
    pub fn new(
        organization: impl Into<String>,
        repository: impl Into<String>,
        branch: impl Into<String>,
        commit: impl Into<String>,
    ) -> Result<Self> {
        let location = Self {
            organization: organization.into(),
            repository: repository.into(),
            branch: branch.into(),
            commit: commit.into(),
        };
        for segment in location.segments() {
            validate_segment(segment)?;
        }
        Ok(location)
    }

    /// Directory holding this commit's artifacts.
    pub fn dir(&self, host_dir: &Path) -> PathBuf {
        self.segments()
            .iter()
            .fold(host_dir.to_path_buf(), |path, segment| path.join(segment))
    }

    /// Path of a named artifact within the commit directory.
    pub fn file(&self, host_dir: &Path, file_name: &str) -> PathBuf {
        self.dir(host_dir).join(file_name)
    }

    fn segments(&self) -> [&str; 4] {
        [
            &self.organization,
            &self.repository,
            &self.branch,
            &self.commit,
        ]
    }
}

/// Reject segments that are empty, relative, or contain separators.
pub fn validate_segment(segment: &str) -> Result<()> {
    let invalid = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']);
    if invalid {
        return Err(CoreError::InvalidSegment(segment.to_string()));
    }
    Ok(())
}
