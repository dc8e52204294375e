//! Database models for the ao-coverage server.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use aocov_core::{BranchEntry, HeadContext, RepositoryDocument};

use crate::schema::{repositories, settings};

/// Primary key of the single settings row.
pub const SETTINGS_ROW_ID: i32 = 1;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = repositories)]
/// Repository document as stored.
pub struct RepositoryRecord {
    /// Owning organization.
    pub organization: String,
    /// Repository name.
    pub name: String,
    /// Branch map as raw JSON.
    pub branches: serde_json::Value,
}

impl RepositoryRecord {
    /// Decode the head of one branch. Other entries are left untouched.
    pub fn head(&self, branch: &str) -> Result<Option<HeadContext>, serde_json::Error> {
        let Some(entry) = self.branches.get(branch) else {
            return Ok(None);
        };
        let entry: Option<BranchEntry> = serde_json::from_value(entry.clone())?;
        Ok(entry.map(|entry| entry.head.into_context()))
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = repositories)]
/// Insertable repository document.
pub struct NewRepository {
    /// Owning organization.
    pub organization: String,
    /// Repository name.
    pub name: String,
    /// Branch map as raw JSON.
    pub branches: serde_json::Value,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

impl NewRepository {
    /// Encode a repository document for insertion.
    pub fn from_document(
        document: &RepositoryDocument,
        created_at: NaiveDateTime,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            organization: document.organization.clone(),
            name: document.name.clone(),
            branches: serde_json::to_value(&document.branches)?,
            created_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = settings)]
/// Service settings row.
pub struct Settings {
    /// Always [`SETTINGS_ROW_ID`].
    pub id: i32,
    /// Base64 SHA-256 digest of the upload token.
    pub upload_token_digest: String,
    /// Last modification timestamp.
    pub updated_at: NaiveDateTime,
}
