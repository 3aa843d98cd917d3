//! Rack persistence

use chrono::Utc;
use europatch_common::db::{Module, Provenance, UserRack};
use europatch_common::Result;
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};

/// Module placed in a rack, with its grid position
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RackedModule {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub module: Module,
    pub position_x: Option<i64>,
    pub position_y: Option<i64>,
}

/// Cache check: rack previously imported under this source identifier
pub async fn find_rack_by_source_id(
    conn: &mut SqliteConnection,
    modulargrid_id: &str,
) -> Result<Option<UserRack>> {
    let rack = sqlx::query_as::<_, UserRack>("SELECT * FROM user_racks WHERE modulargrid_id = ?")
        .bind(modulargrid_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(rack)
}

pub async fn get_rack(conn: &mut SqliteConnection, id: i64) -> Result<Option<UserRack>> {
    let rack = sqlx::query_as::<_, UserRack>("SELECT * FROM user_racks WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(rack)
}

pub async fn list_racks(conn: &mut SqliteConnection) -> Result<Vec<UserRack>> {
    let racks = sqlx::query_as::<_, UserRack>("SELECT * FROM user_racks ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;

    Ok(racks)
}

/// Insert a rack row
///
/// A second insert for the same `modulargrid_id` fails with a UNIQUE
/// violation (see [`europatch_common::Error::is_unique_violation`]).
pub async fn insert_rack(
    conn: &mut SqliteConnection,
    modulargrid_url: &str,
    modulargrid_id: &str,
    rack_name: &str,
    provenance: Provenance,
) -> Result<UserRack> {
    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO user_racks (modulargrid_url, modulargrid_id, rack_name, provenance, created_at, last_accessed)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(modulargrid_url)
    .bind(modulargrid_id)
    .bind(rack_name)
    .bind(provenance.as_str())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    get_rack(conn, id)
        .await?
        .ok_or_else(|| europatch_common::Error::Internal(format!("Rack {} vanished after insert", id)))
}

/// Stamp the rack as accessed now
pub async fn touch_rack(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    sqlx::query("UPDATE user_racks SET last_accessed = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Place a module in a rack; an identical placement is ignored
pub async fn attach_module(
    conn: &mut SqliteConnection,
    rack_id: i64,
    module_id: i64,
    position_x: i64,
    position_y: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO rack_modules (rack_id, module_id, position_x, position_y, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (rack_id, module_id, position_x, position_y) DO NOTHING
        "#,
    )
    .bind(rack_id)
    .bind(module_id)
    .bind(position_x)
    .bind(position_y)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Modules in a rack in grid order
pub async fn rack_modules(conn: &mut SqliteConnection, rack_id: i64) -> Result<Vec<RackedModule>> {
    let modules = sqlx::query_as::<_, RackedModule>(
        r#"
        SELECT m.*, rm.position_x, rm.position_y
        FROM rack_modules rm
        JOIN modules m ON m.id = rm.module_id
        WHERE rm.rack_id = ?
        ORDER BY rm.position_y, rm.position_x, rm.id
        "#,
    )
    .bind(rack_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(modules)
}

/// Number of racks referencing a module
pub async fn rack_count_for_module(conn: &mut SqliteConnection, module_id: i64) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT rack_id) FROM rack_modules WHERE module_id = ?")
            .bind(module_id)
            .fetch_one(&mut *conn)
            .await?;

    Ok(count)
}
