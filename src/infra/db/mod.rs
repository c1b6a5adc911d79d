//! SQLite-backed repository implementations.

mod copies;
mod issues;
mod series;
mod util;

pub use util::map_sqlx_error;

use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use sqlx::{
    QueryBuilder, Sqlite,
    query,
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};

use crate::application::{
    pagination::PageRequest,
    repos::{CatalogRepo, RepoError},
};

#[derive(Clone)]
pub struct SqliteRepositories {
    pool: Arc<SqlitePool>,
}

impl SqliteRepositories {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a pool, creating the database file when missing.
    ///
    /// In-memory databases live only as long as their connection, so their
    /// connections are never recycled.
    pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool = SqlitePoolOptions::new().max_connections(max_connections.max(1));
        if url.contains(":memory:") || url.contains("mode=memory") {
            pool = pool
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        pool.connect_with(options).await
    }

    pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    fn push_page<'q>(qb: &mut QueryBuilder<'q, Sqlite>, page: PageRequest) {
        qb.push(" LIMIT ");
        qb.push_bind(page.fetch_limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.sql_offset());
    }

    /// Case-insensitive substring match without LIKE wildcard handling.
    fn push_contains<'q>(qb: &mut QueryBuilder<'q, Sqlite>, column: &str, needle: &'q str) {
        qb.push(" AND instr(lower(coalesce(");
        qb.push(column);
        qb.push(", '')), lower(");
        qb.push_bind(needle);
        qb.push(")) > 0");
    }

    fn affected(rows: u64) -> bool {
        rows > 0
    }
}

#[async_trait]
impl CatalogRepo for SqliteRepositories {
    async fn ping(&self) -> Result<(), RepoError> {
        self.health_check().await.map_err(map_sqlx_error)
    }
}

fn empty_patch() -> RepoError {
    RepoError::InvalidInput {
        message: "no fields to update".to_string(),
    }
}

#[cfg(test)]
pub(crate) async fn test_repositories() -> SqliteRepositories {
    let pool = SqliteRepositories::connect("sqlite::memory:", 1)
        .await
        .expect("connect in-memory sqlite");
    SqliteRepositories::run_migrations(&pool)
        .await
        .expect("run migrations");
    SqliteRepositories::new(pool)
}
