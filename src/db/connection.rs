// SQLite connection pool for the persistent cache tier

use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite, SqlitePool};
use tracing::info;

use crate::db::INIT_SCHEMA;

pub async fn establish_connection(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = database_url.contains(":memory:");

    // Create database if it doesn't exist
    if !in_memory && !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        Sqlite::create_database(database_url).await?;
    }

    // Every connection to an in-memory database sees its own empty schema
    let max_connections = if in_memory { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    if !in_memory {
        // Enable WAL mode for better concurrency
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
    }

    // Initialize schema
    sqlx::query(INIT_SCHEMA).execute(&pool).await?;
    info!("Persistent cache store ready at {}", database_url);

    Ok(pool)
}
