//! Backend row storage for the continuity sync engine.
//!
//! Two implementations of [`RowStore`] live here: [`PgRowStore`] over a
//! Postgres pool, and [`MemoryRowStore`], an in-process backend that also
//! publishes row changes and is used by tests and local demos.

pub mod error;
pub mod memory;
pub mod models;
pub mod pg_store;
pub mod repositories;
pub mod store;

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

pub use error::{classify_sqlx_error, BackendError};
pub use memory::MemoryRowStore;
pub use pg_store::PgRowStore;
pub use store::RowStore;

pub type DbPool = sqlx::PgPool;

/// Open a connection pool against `database_url`.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
}

/// Like [`create_pool`] but connects on first use, so a client can start
/// without the backend reachable.
pub fn create_lazy_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect_lazy(database_url)
}

pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    repositories::ProjectRepo::ping(pool).await
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
