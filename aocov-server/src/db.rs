//! Database connection pool utilities.

#[cfg(test)]
use diesel::RunQueryDsl;
use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager, PoolError};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use thiserror::Error;

/// Pooled PostgreSQL connections for the ao-coverage server.
pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Embedded Diesel migrations.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Failures of the metadata store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No connection could be obtained.
    #[error("database pool error: {0}")]
    Pool(#[from] PoolError),
    /// A statement failed.
    #[error("database query failed: {0}")]
    Query(#[from] diesel::result::Error),
    /// Pending migrations could not be applied.
    #[error("database migration failed: {0}")]
    Migration(String),
    /// A stored document did not have the expected shape.
    #[error("malformed repository document: {0}")]
    Document(#[from] serde_json::Error),
    /// The blocking task running the query was lost.
    #[error("database task failed: {0}")]
    Task(String),
}

/// Build the database pool for `database_url` and apply migrations.
pub fn init_pool(database_url: &str) -> Result<DbPool, StoreError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().build(manager)?;
    run_migrations(&pool)?;
    Ok(pool)
}

/// Run pending Diesel migrations.
pub fn run_migrations(pool: &DbPool) -> Result<(), StoreError> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| StoreError::Migration(err.to_string()))?;
    if !applied.is_empty() {
        log::info!("applied {} database migration(s)", applied.len());
    }
    Ok(())
}

#[cfg(test)]
fn split_database_url(database_url: &str) -> (String, String) {
    let (url_base, query) = database_url.split_once('?').unwrap_or((database_url, ""));
    let (base, _db_name) = url_base
        .rsplit_once('/')
        .expect("TEST_DATABASE_URL must include a database name");
    let query_suffix = if query.is_empty() {
        String::new()
    } else {
        format!("?{query}")
    };
    (base.to_string(), query_suffix)
}

#[cfg(test)]
/// A throwaway PostgreSQL database for tests.
pub(crate) struct TestDatabase {
    database_url: String,
    admin_url: String,
    db_name: String,
    pool: Option<DbPool>,
}

#[cfg(test)]
impl TestDatabase {
    /// Create an isolated database next to `TEST_DATABASE_URL`.
    pub(crate) fn new() -> Self {
        use diesel::Connection;

        let base_url = std::env::var("TEST_DATABASE_URL")
            .expect("set TEST_DATABASE_URL for PostgreSQL tests");
        let (base, query_suffix) = split_database_url(&base_url);
        let db_name = format!("aocov_test_{}", uuid::Uuid::new_v4().simple());
        let admin_url = format!("{}/postgres{}", base, query_suffix);
        let database_url = format!("{}/{}{}", base, db_name, query_suffix);

        let mut admin_conn = PgConnection::establish(&admin_url).expect("connect admin database");
        diesel::sql_query(format!("CREATE DATABASE \"{db_name}\""))
            .execute(&mut admin_conn)
            .expect("create test database");

        Self {
            database_url,
            admin_url,
            db_name,
            pool: None,
        }
    }

    /// Return the test database URL.
    pub(crate) fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Pooled connections to the test database (migrated on first use).
    pub(crate) fn pool(&mut self) -> DbPool {
        if self.pool.is_none() {
            let manager = ConnectionManager::<PgConnection>::new(self.database_url.clone());
            let pool = r2d2::Pool::builder()
                .max_size(2)
                .build(manager)
                .expect("pool");
            run_migrations(&pool).expect("migrations");
            self.pool = Some(pool);
        }
        self.pool.as_ref().expect("pool").clone()
    }
}

#[cfg(test)]
impl Drop for TestDatabase {
    fn drop(&mut self) {
        use diesel::Connection;

        let _ = self.pool.take();
        if let Ok(mut conn) = PgConnection::establish(&self.admin_url) {
            let escaped = self.db_name.replace('\'', "''");
            let _ = diesel::sql_query(format!(
                "SELECT pg_terminate_backend(pid) \
                 FROM pg_stat_activity \
                 WHERE datname = '{escaped}' AND pid <> pg_backend_pid()"
            ))
            .execute(&mut conn);
            let _ = diesel::sql_query(format!("DROP DATABASE IF EXISTS \"{}\"", self.db_name))
                .execute(&mut conn);
        }
    }
}
