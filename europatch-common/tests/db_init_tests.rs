//! Database initialization and schema constraints

use chrono::Utc;
use europatch_common::db::{create_schema, init_database, init_memory_database};
use europatch_common::Error;
use sqlx::{Row, SqlitePool};
use tempfile::TempDir;

async fn insert_module(pool: &SqlitePool, name: &str, manufacturer: &str) -> Result<i64, Error> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO modules (name, manufacturer, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(name)
    .bind(manufacturer)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

#[tokio::test]
async fn test_file_database_created_with_tables() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("sub").join("europatch.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    let tables: Vec<String> =
        sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

    for expected in [
        "modules",
        "module_connections",
        "module_controls",
        "user_racks",
        "rack_modules",
        "patch_ideas",
        "patch_modules",
        "patch_connections",
        "patch_control_settings",
        "forum_sources",
    ] {
        assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_schema_is_idempotent() {
    let pool = init_memory_database().await.unwrap();
    create_schema(&pool).await.unwrap();
    create_schema(&pool).await.unwrap();
}

#[tokio::test]
async fn test_module_identity_is_unique() {
    let pool = init_memory_database().await.unwrap();

    insert_module(&pool, "Plaits", "Mutable Instruments").await.unwrap();
    let err = insert_module(&pool, "Plaits", "Mutable Instruments")
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());

    // Same name, other maker is a different module
    insert_module(&pool, "Plaits", "Someone Else").await.unwrap();
}

#[tokio::test]
async fn test_rack_identifier_is_unique() {
    let pool = init_memory_database().await.unwrap();
    let now = Utc::now();

    let insert = |id: &'static str| {
        sqlx::query(
            "INSERT INTO user_racks (modulargrid_url, modulargrid_id, rack_name, created_at, last_accessed)
             VALUES (?, ?, 'Rack', ?, ?)",
        )
        .bind(format!("https://www.modulargrid.net/e/racks/view/{}", id))
        .bind(id)
        .bind(now)
        .bind(now)
    };

    insert("42").execute(&pool).await.unwrap();
    let err: Error = insert("42").execute(&pool).await.unwrap_err().into();
    assert!(err.is_unique_violation());
}

#[tokio::test]
async fn test_rack_module_allows_same_module_at_two_positions() {
    let pool = init_memory_database().await.unwrap();
    let now = Utc::now();
    let module_id = insert_module(&pool, "Maths", "Make Noise").await.unwrap();

    let rack_id = sqlx::query(
        "INSERT INTO user_racks (modulargrid_url, modulargrid_id, created_at, last_accessed)
         VALUES ('https://www.modulargrid.net/e/racks/view/7', '7', ?, ?)",
    )
    .bind(now)
    .bind(now)
    .execute(&pool)
    .await
    .unwrap()
    .last_insert_rowid();

    let attach = |x: i64| {
        sqlx::query(
            "INSERT INTO rack_modules (rack_id, module_id, position_x, position_y, created_at)
             VALUES (?, ?, ?, 0, ?)",
        )
        .bind(rack_id)
        .bind(module_id)
        .bind(x)
        .bind(now)
    };

    attach(0).execute(&pool).await.unwrap();
    attach(1).execute(&pool).await.unwrap();
    assert!(attach(1).execute(&pool).await.is_err());
}

#[tokio::test]
async fn test_deleting_module_cascades_to_jacks() {
    let pool = init_memory_database().await.unwrap();
    let module_id = insert_module(&pool, "Rings", "Mutable Instruments").await.unwrap();

    sqlx::query(
        "INSERT INTO module_connections (module_id, name, connection_type) VALUES (?, 'OUT', 'output')",
    )
    .bind(module_id)
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("DELETE FROM modules WHERE id = ?")
        .bind(module_id)
        .execute(&pool)
        .await
        .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM module_connections")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}
