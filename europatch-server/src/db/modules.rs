//! Module persistence
//!
//! Modules are identified by (name, manufacturer). Callers look up before
//! inserting; the UNIQUE constraint rejects any duplicate that slips through.

use chrono::Utc;
use europatch_common::db::{Module, ModuleConnection, ModuleControl};
use europatch_common::Result;
use sqlx::SqliteConnection;

use crate::scraper::ModuleAttributes;

/// Attributes for a new or refreshed module row
#[derive(Debug, Clone, Default)]
pub struct NewModule {
    pub name: String,
    pub manufacturer: String,
    pub hp_width: Option<i64>,
    pub module_type: Option<String>,
    pub description: Option<String>,
    pub manual_url: Option<String>,
    pub image_url: Option<String>,
    pub modulargrid_url: Option<String>,
}

impl From<ModuleAttributes> for NewModule {
    fn from(attrs: ModuleAttributes) -> Self {
        Self {
            name: attrs.name,
            manufacturer: attrs.manufacturer,
            hp_width: attrs.hp_width,
            module_type: Some(attrs.module_type),
            description: attrs.description,
            manual_url: attrs.manual_url,
            image_url: attrs.image_url,
            modulargrid_url: attrs.modulargrid_url,
        }
    }
}

/// Jack definition for catalog seeding
#[derive(Debug, Clone)]
pub struct NewConnection<'a> {
    pub name: &'a str,
    pub connection_type: &'a str,
    pub description: &'a str,
}

/// Control definition for catalog seeding
#[derive(Debug, Clone)]
pub struct NewControl<'a> {
    pub control_type: &'a str,
    pub control_name: &'a str,
    pub description: &'a str,
    pub min_value: f64,
    pub max_value: f64,
    pub default_value: f64,
    pub is_attenuator: bool,
    pub is_attenuverter: bool,
}

pub async fn find_module(
    conn: &mut SqliteConnection,
    name: &str,
    manufacturer: &str,
) -> Result<Option<Module>> {
    let module = sqlx::query_as::<_, Module>(
        "SELECT * FROM modules WHERE name = ? AND manufacturer = ?",
    )
    .bind(name)
    .bind(manufacturer)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(module)
}

pub async fn get_module(conn: &mut SqliteConnection, id: i64) -> Result<Option<Module>> {
    let module = sqlx::query_as::<_, Module>("SELECT * FROM modules WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(module)
}

/// Existing rows for the given ids, in the order given; unknown ids are skipped
pub async fn get_modules(conn: &mut SqliteConnection, ids: &[i64]) -> Result<Vec<Module>> {
    let mut modules = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(module) = get_module(conn, *id).await? {
            modules.push(module);
        }
    }
    Ok(modules)
}

pub async fn list_modules(conn: &mut SqliteConnection) -> Result<Vec<Module>> {
    let modules = sqlx::query_as::<_, Module>("SELECT * FROM modules ORDER BY manufacturer, name")
        .fetch_all(&mut *conn)
        .await?;

    Ok(modules)
}

/// Insert a module row and return it
pub async fn insert_module(conn: &mut SqliteConnection, module: &NewModule) -> Result<Module> {
    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO modules (
            name, manufacturer, hp_width, module_type, description,
            manual_url, image_url, modulargrid_url, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&module.name)
    .bind(&module.manufacturer)
    .bind(module.hp_width)
    .bind(&module.module_type)
    .bind(&module.description)
    .bind(&module.manual_url)
    .bind(&module.image_url)
    .bind(&module.modulargrid_url)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    get_module(conn, id)
        .await?
        .ok_or_else(|| europatch_common::Error::Internal(format!("Module {} vanished after insert", id)))
}

/// Overwrite descriptive attributes with freshly scraped values
///
/// Identity (name, manufacturer) is left alone; absent values keep the
/// stored ones.
pub async fn update_module_details(
    conn: &mut SqliteConnection,
    id: i64,
    details: &NewModule,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE modules SET
            hp_width = COALESCE(?, hp_width),
            module_type = COALESCE(?, module_type),
            description = COALESCE(?, description),
            manual_url = COALESCE(?, manual_url),
            image_url = COALESCE(?, image_url),
            modulargrid_url = COALESCE(?, modulargrid_url),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(details.hp_width)
    .bind(&details.module_type)
    .bind(&details.description)
    .bind(&details.manual_url)
    .bind(&details.image_url)
    .bind(&details.modulargrid_url)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Store fetched manual text and stamp its refresh time
pub async fn update_manual_content(
    conn: &mut SqliteConnection,
    id: i64,
    content: &str,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE modules SET manual_content = ?, manual_last_updated = ?, updated_at = ? WHERE id = ?",
    )
    .bind(content)
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn connections_for_module(
    conn: &mut SqliteConnection,
    module_id: i64,
) -> Result<Vec<ModuleConnection>> {
    let connections = sqlx::query_as::<_, ModuleConnection>(
        r#"
        SELECT id, module_id, name, connection_type, description
        FROM module_connections
        WHERE module_id = ?
        ORDER BY id
        "#,
    )
    .bind(module_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(connections)
}

pub async fn controls_for_module(
    conn: &mut SqliteConnection,
    module_id: i64,
) -> Result<Vec<ModuleControl>> {
    let controls = sqlx::query_as::<_, ModuleControl>(
        r#"
        SELECT id, module_id, control_type, control_name, description,
               min_value, max_value, default_value, is_attenuator, is_attenuverter
        FROM module_controls
        WHERE module_id = ?
        ORDER BY id
        "#,
    )
    .bind(module_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(controls)
}

pub async fn insert_connection(
    conn: &mut SqliteConnection,
    module_id: i64,
    jack: &NewConnection<'_>,
) -> Result<i64> {
    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO module_connections (module_id, name, connection_type, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(module_id)
    .bind(jack.name)
    .bind(jack.connection_type)
    .bind(jack.description)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(id)
}

pub async fn insert_control(
    conn: &mut SqliteConnection,
    module_id: i64,
    control: &NewControl<'_>,
) -> Result<i64> {
    let now = Utc::now();
    let id = sqlx::query(
        r#"
        INSERT INTO module_controls (
            module_id, control_type, control_name, description,
            min_value, max_value, default_value, is_attenuator, is_attenuverter,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(module_id)
    .bind(control.control_type)
    .bind(control.control_name)
    .bind(control.description)
    .bind(control.min_value)
    .bind(control.max_value)
    .bind(control.default_value)
    .bind(control.is_attenuator)
    .bind(control.is_attenuverter)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    Ok(id)
}
