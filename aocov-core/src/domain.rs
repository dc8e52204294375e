//! Domain entities for ao-coverage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Format recorded for heads stored before formats were tracked.
pub const LEGACY_HEAD_FORMAT: &str = "tarpaulin";

/// Latest known commit for a branch and the format of its report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadContext {
    /// Commit identifier.
    pub commit: String,
    /// Registry identifier of the stored report format.
    pub format: String,
}

impl HeadContext {
    /// Build a head context.
    pub fn new(commit: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            format: format.into(),
        }
    }
}

/// A branch update: which branch of which repository now points where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadIdentity {
    /// Owning organization.
    pub organization: String,
    /// Repository name.
    pub repository: String,
    /// Branch name.
    pub branch: String,
    /// New head for the branch.
    pub head: HeadContext,
}

/// Head as persisted: a bare commit string (legacy) or a full context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredHead {
    /// Legacy commit-only head.
    Commit(String),
    /// Commit plus report format.
    Context(HeadContext),
}

impl StoredHead {
    /// Normalize into a head context.
    pub fn into_context(self) -> HeadContext {
        match self {
            StoredHead::Commit(commit) => HeadContext::new(commit, LEGACY_HEAD_FORMAT),
            StoredHead::Context(context) => context,
        }
    }
}

impl From<HeadContext> for StoredHead {
    fn from(value: HeadContext) -> Self {
        StoredHead::Context(value)
    }
}

/// Entry of a repository's branch map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchEntry {
    /// Current head of the branch.
    pub head: StoredHead,
}

/// Branch map of a repository document. `null` entries count as absent.
pub type BranchMap = BTreeMap<String, Option<BranchEntry>>;

/// Per-repository metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDocument {
    /// Owning organization.
    pub organization: String,
    /// Repository name.
    pub name: String,
    /// Branch name to head map.
    pub branches: BranchMap,
}

impl RepositoryDocument {
    /// Seed a document holding only the identity's branch.
    pub fn from_identity(identity: &HeadIdentity) -> Self {
        let mut branches = BranchMap::new();
        branches.insert(
            identity.branch.clone(),
            Some(BranchEntry {
                head: identity.head.clone().into(),
            }),
        );
        Self {
            organization: identity.organization.clone(),
            name: identity.repository.clone(),
            branches,
        }
    }

    /// Head of a branch, normalized, if the branch is known.
    pub fn head(&self, branch: &str) -> Option<HeadContext> {
        self.branches
            .get(branch)
            .and_then(|entry| entry.as_ref())
            .map(|entry| entry.head.clone().into_context())
    }
}

/// Outcome of a branch head lookup that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadLookup {
    /// The branch exists; this is its head.
    Found(HeadContext),
    /// No document for the repository, or no entry for the branch.
    BranchNotFound,
}

impl HeadLookup {
    /// Message returned to clients for a missing branch.
    pub const NOT_FOUND_MESSAGE: &'static str = "Branch not found";
}
