//! Branch head metadata backed by the `repositories` table.
//!
//! Each row is one repository document: an (organization, name) pair and a
//! JSON map of branch name to head. Heads written by older deployments are
//! bare commit strings and decode with the legacy tarpaulin format.

use chrono::Utc;
use diesel::OptionalExtension;
use diesel::prelude::*;
use diesel::sql_types::{Jsonb, Text};

use aocov_core::{HeadIdentity, HeadLookup, RepositoryDocument, StoredHead};

use crate::db::{DbPool, StoreError};
use crate::models::{NewRepository, RepositoryRecord, SETTINGS_ROW_ID, Settings};
use crate::schema::{repositories, settings};

const UPDATE_BRANCH_HEAD: &str = "\
UPDATE repositories \
SET branches = branches || jsonb_build_object(\
    $3::text, \
    CASE WHEN jsonb_typeof(branches -> $3::text) = 'object' \
        THEN branches -> $3::text ELSE '{}'::jsonb END \
    || jsonb_build_object('head', $4::jsonb)) \
WHERE organization = $1 AND name = $2";

/// Persistent store of repository documents and service settings.
#[cfg_attr(test, mockall::automock)]
pub trait MetadataStore: Send + Sync {
    /// Resolve the head of a branch.
    fn get_head_commit(
        &self,
        organization: &str,
        repository: &str,
        branch: &str,
    ) -> Result<HeadLookup, StoreError>;

    /// Point a branch at a new head, creating the repository document when
    /// none exists. Returns whether the write was acknowledged.
    fn update_branch(&self, identity: &HeadIdentity) -> Result<bool, StoreError>;

    /// Insert a repository document holding only the identity's branch.
    fn create_repository(&self, identity: &HeadIdentity) -> Result<bool, StoreError>;

    /// Stored digest of the upload token, if any.
    fn load_token_digest(&self) -> Result<Option<String>, StoreError>;

    /// Replace the stored upload token digest.
    fn store_token_digest(&self, digest: &str) -> Result<(), StoreError>;
}

/// PostgreSQL implementation of [`MetadataStore`].
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: DbPool,
}

impl PgMetadataStore {
    /// Wrap a connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl MetadataStore for PgMetadataStore {
    fn get_head_commit(
        &self,
        organization: &str,
        repository: &str,
        branch: &str,
    ) -> Result<HeadLookup, StoreError> {
        let mut conn = self.pool.get()?;
        let record = repositories::table
            .filter(repositories::organization.eq(organization))
            .filter(repositories::name.eq(repository))
            .select(RepositoryRecord::as_select())
            .first(&mut conn)
            .optional()?;
        let Some(record) = record else {
            return Ok(HeadLookup::BranchNotFound);
        };
        Ok(record
            .head(branch)?
            .map_or(HeadLookup::BranchNotFound, HeadLookup::Found))
    }

    fn update_branch(&self, identity: &HeadIdentity) -> Result<bool, StoreError> {
        let head = serde_json::to_value(StoredHead::from(identity.head.clone()))?;
        let updated = {
            let mut conn = self.pool.get()?;
            diesel::sql_query(UPDATE_BRANCH_HEAD)
                .bind::<Text, _>(&identity.organization)
                .bind::<Text, _>(&identity.repository)
                .bind::<Text, _>(&identity.branch)
                .bind::<Jsonb, _>(&head)
                .execute(&mut conn)?
        };
        if updated > 0 {
            return Ok(true);
        }
        log::debug!(
            "no document for {}/{}, creating one",
            identity.organization,
            identity.repository
        );
        self.create_repository(identity)
    }

    fn create_repository(&self, identity: &HeadIdentity) -> Result<bool, StoreError> {
        let document = RepositoryDocument::from_identity(identity);
        let row = NewRepository::from_document(&document, Utc::now().naive_utc())?;
        let mut conn = self.pool.get()?;
        let inserted = diesel::insert_into(repositories::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(inserted == 1)
    }

    fn load_token_digest(&self) -> Result<Option<String>, StoreError> {
        let mut conn = self.pool.get()?;
        Ok(settings::table
            .find(SETTINGS_ROW_ID)
            .select(settings::upload_token_digest)
            .first::<String>(&mut conn)
            .optional()?)
    }

    fn store_token_digest(&self, digest: &str) -> Result<(), StoreError> {
        let row = Settings {
            id: SETTINGS_ROW_ID,
            upload_token_digest: digest.to_string(),
            updated_at: Utc::now().naive_utc(),
        };
        let mut conn = self.pool.get()?;
        diesel::insert_into(settings::table)
            .values(&row)
            .on_conflict(settings::id)
            .do_update()
            .set(&row)
            .execute(&mut conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TestDatabase;
    use aocov_core::HeadContext;
    use serde_json::json;

    fn identity(branch: &str, commit: &str, format: &str) -> HeadIdentity {
        HeadIdentity {
            organization: "kjhoerr".to_string(),
            repository: "ao-coverage".to_string(),
            branch: branch.to_string(),
            head: HeadContext::new(commit, format),
        }
    }

    fn document_count(pool: &DbPool) -> i64 {
        let mut conn = pool.get().expect("conn");
        repositories::table
            .count()
            .get_result(&mut conn)
            .expect("count")
    }

    fn stored_branches(pool: &DbPool) -> serde_json::Value {
        let mut conn = pool.get().expect("conn");
        repositories::table
            .select(repositories::branches)
            .first(&mut conn)
            .expect("branches")
    }

    #[test]
    #[ignore = "requires TEST_DATABASE_URL"]
    fn absent_repository_is_branch_not_found() {
        let mut db = TestDatabase::new();
        let store = PgMetadataStore::new(db.pool());
        let lookup = store
            .get_head_commit("kjhoerr", "ao-coverage", "trunk")
            .expect("lookup");
        assert_eq!(lookup, HeadLookup::BranchNotFound);
    }

    #[test]
    #[ignore = "requires TEST_DATABASE_URL"]
    fn first_update_creates_a_single_branch_document() {
        let mut db = TestDatabase::new();
        let pool = db.pool();
        let store = PgMetadataStore::new(pool.clone());

        assert!(store.update_branch(&identity("trunk", "abc", "tarpaulin")).expect("update"));

        assert_eq!(document_count(&pool), 1);
        assert_eq!(
            stored_branches(&pool),
            json!({ "trunk": { "head": { "commit": "abc", "format": "tarpaulin" } } })
        );
        assert_eq!(
            store
                .get_head_commit("kjhoerr", "ao-coverage", "trunk")
                .expect("lookup"),
            HeadLookup::Found(HeadContext::new("abc", "tarpaulin"))
        );
        assert_eq!(
            store
                .get_head_commit("kjhoerr", "ao-coverage", "aaaaa")
                .expect("lookup"),
            HeadLookup::BranchNotFound
        );
    }

    #[test]
    #[ignore = "requires TEST_DATABASE_URL"]
    fn later_updates_mutate_the_same_document() {
        let mut db = TestDatabase::new();
        let pool = db.pool();
        let store = PgMetadataStore::new(pool.clone());

        store
            .update_branch(&identity("trunk", "abc", "tarpaulin"))
            .expect("first");
        store
            .update_branch(&identity("feature", "def", "cobertura"))
            .expect("second");
        store
            .update_branch(&identity("trunk", "ghi", "cobertura"))
            .expect("third");

        assert_eq!(document_count(&pool), 1);
        assert_eq!(
            stored_branches(&pool),
            json!({
                "trunk": { "head": { "commit": "ghi", "format": "cobertura" } },
                "feature": { "head": { "commit": "def", "format": "cobertura" } }
            })
        );
    }

    #[test]
    #[ignore = "requires TEST_DATABASE_URL"]
    fn legacy_string_heads_are_read_as_tarpaulin() {
        let mut db = TestDatabase::new();
        let pool = db.pool();
        {
            let mut conn = pool.get().expect("conn");
            diesel::insert_into(repositories::table)
                .values(&NewRepository {
                    organization: "kjhoerr".to_string(),
                    name: "ao-coverage".to_string(),
                    branches: json!({ "trunk": { "head": "yay" }, "gone": null }),
                    created_at: Utc::now().naive_utc(),
                })
                .execute(&mut conn)
                .expect("seed");
        }
        let store = PgMetadataStore::new(pool);

        assert_eq!(
            store
                .get_head_commit("kjhoerr", "ao-coverage", "trunk")
                .expect("lookup"),
            HeadLookup::Found(HeadContext::new("yay", "tarpaulin"))
        );
        assert_eq!(
            store
                .get_head_commit("kjhoerr", "ao-coverage", "gone")
                .expect("lookup"),
            HeadLookup::BranchNotFound
        );
    }

    #[test]
    #[ignore = "requires TEST_DATABASE_URL"]
    fn duplicate_create_is_rejected_by_the_unique_index() {
        let mut db = TestDatabase::new();
        let pool = db.pool();
        let store = PgMetadataStore::new(pool.clone());

        assert!(store.create_repository(&identity("trunk", "abc", "tarpaulin")).expect("create"));
        let err = store
            .create_repository(&identity("feature", "def", "tarpaulin"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
        assert_eq!(document_count(&pool), 1);
    }

    #[test]
    #[ignore = "requires TEST_DATABASE_URL"]
    fn token_digest_is_upserted() {
        let mut db = TestDatabase::new();
        let store = PgMetadataStore::new(db.pool());

        assert_eq!(store.load_token_digest().expect("load"), None);
        store.store_token_digest("first").expect("store");
        store.store_token_digest("second").expect("replace");
        assert_eq!(
            store.load_token_digest().expect("load"),
            Some("second".to_string())
        );
    }
}
