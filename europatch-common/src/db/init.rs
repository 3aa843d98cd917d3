//! Database initialization
//!
//! Opens (creating on first run) the SQLite database and brings the schema up
//! to date. Every `CREATE` is idempotent so this runs on each startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema
///
/// Pinned to a single connection that never expires: every SQLite in-memory
/// connection is its own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every table and index (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_modules_table(pool).await?;
    create_module_connections_table(pool).await?;
    create_module_controls_table(pool).await?;
    create_user_racks_table(pool).await?;
    create_rack_modules_table(pool).await?;
    create_patch_ideas_table(pool).await?;
    create_patch_modules_table(pool).await?;
    create_patch_connections_table(pool).await?;
    create_patch_control_settings_table(pool).await?;
    create_forum_sources_table(pool).await?;

    tracing::debug!("Database schema verified");
    Ok(())
}

async fn create_modules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS modules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            manufacturer TEXT NOT NULL,
            hp_width INTEGER,
            module_type TEXT,
            description TEXT,
            manual_url TEXT,
            manual_content TEXT,
            manual_last_updated TIMESTAMP,
            image_url TEXT,
            modulargrid_url TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (name, manufacturer)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_module_connections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS module_connections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            module_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            connection_type TEXT NOT NULL,
            description TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_module_connections_module ON module_connections(module_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_module_controls_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS module_controls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            module_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
            control_type TEXT NOT NULL,
            control_name TEXT NOT NULL,
            description TEXT,
            min_value REAL,
            max_value REAL,
            default_value REAL,
            is_attenuator INTEGER NOT NULL DEFAULT 0,
            is_attenuverter INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_module_controls_module ON module_controls(module_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// `modulargrid_id` is UNIQUE: lookup-by-identifier is the rack cache check,
/// and a racing second insert of the same rack is rejected here.
async fn create_user_racks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_racks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            modulargrid_url TEXT NOT NULL,
            modulargrid_id TEXT UNIQUE,
            rack_name TEXT,
            provenance TEXT NOT NULL DEFAULT 'extracted',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            last_accessed TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Uniqueness is on (rack, module, position): the same module may sit in a
/// rack twice at different grid positions.
async fn create_rack_modules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rack_modules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rack_id INTEGER NOT NULL REFERENCES user_racks(id) ON DELETE CASCADE,
            module_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
            position_x INTEGER,
            position_y INTEGER,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (rack_id, module_id, position_x, position_y)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_patch_ideas_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patch_ideas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            patch_type TEXT,
            complexity INTEGER,
            source_type TEXT,
            source_url TEXT,
            source_text TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_patch_modules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patch_modules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patch_id INTEGER NOT NULL REFERENCES patch_ideas(id) ON DELETE CASCADE,
            module_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
            role TEXT,
            importance INTEGER,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Jack ids are nullable: scraped modules carry no jack rows, so the jack
/// name is always stored alongside the optional foreign key.
async fn create_patch_connections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patch_connections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patch_id INTEGER NOT NULL REFERENCES patch_ideas(id) ON DELETE CASCADE,
            source_module_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
            source_connection_id INTEGER REFERENCES module_connections(id) ON DELETE SET NULL,
            source_jack TEXT NOT NULL,
            target_module_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
            target_connection_id INTEGER REFERENCES module_connections(id) ON DELETE SET NULL,
            target_jack TEXT NOT NULL,
            cable_color TEXT,
            description TEXT,
            importance INTEGER,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_patch_control_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS patch_control_settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patch_id INTEGER NOT NULL REFERENCES patch_ideas(id) ON DELETE CASCADE,
            module_id INTEGER NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
            control_id INTEGER REFERENCES module_controls(id) ON DELETE SET NULL,
            control_name TEXT NOT NULL,
            value_numeric REAL,
            value_text TEXT,
            description TEXT,
            importance INTEGER,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_forum_sources_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS forum_sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_type TEXT NOT NULL,
            url TEXT NOT NULL,
            title TEXT,
            content TEXT,
            module_id INTEGER REFERENCES modules(id) ON DELETE CASCADE,
            scraped_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            relevance_score REAL,
            UNIQUE (module_id, url)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
