//! Patch idea persistence

use chrono::Utc;
use europatch_common::db::{PatchConnection, PatchControlSetting, PatchIdea, PatchModule};
use europatch_common::Result;
use serde::Serialize;
use sqlx::{FromRow, SqliteConnection};

/// Patch idea with its modules, cables and knob settings, ready to insert
#[derive(Debug, Clone, Default)]
pub struct NewPatchIdea {
    pub title: String,
    pub description: String,
    pub patch_type: String,
    pub complexity: i64,
    pub source_type: String,
    pub source_url: Option<String>,
    pub source_text: Option<String>,
    pub modules: Vec<NewPatchModule>,
    pub connections: Vec<NewPatchConnection>,
    pub settings: Vec<NewControlSetting>,
}

#[derive(Debug, Clone)]
pub struct NewPatchModule {
    pub module_id: i64,
    pub role: String,
    pub importance: i64,
}

#[derive(Debug, Clone)]
pub struct NewPatchConnection {
    pub source_module_id: i64,
    pub source_connection_id: Option<i64>,
    pub source_jack: String,
    pub target_module_id: i64,
    pub target_connection_id: Option<i64>,
    pub target_jack: String,
    pub cable_color: String,
    pub description: String,
    pub importance: i64,
}

#[derive(Debug, Clone)]
pub struct NewControlSetting {
    pub module_id: i64,
    pub control_id: Option<i64>,
    pub control_name: String,
    pub value_numeric: Option<f64>,
    pub value_text: String,
    pub description: String,
    pub importance: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PatchModuleEntry {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub patch_module: PatchModule,
    pub module_name: String,
    pub manufacturer: String,
    pub module_type: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PatchConnectionEntry {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub connection: PatchConnection,
    pub source_module_name: String,
    pub target_module_name: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ControlSettingEntry {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub setting: PatchControlSetting,
    pub module_name: String,
}

/// Full patch idea
#[derive(Debug, Clone, Serialize)]
pub struct PatchIdeaDetail {
    #[serde(flatten)]
    pub idea: PatchIdea,
    pub modules: Vec<PatchModuleEntry>,
    pub connections: Vec<PatchConnectionEntry>,
    pub control_settings: Vec<ControlSettingEntry>,
}

/// Insert an idea and all of its children; returns the idea id
///
/// Run inside a transaction so a partial tree is never visible.
pub async fn insert_patch_idea(conn: &mut SqliteConnection, patch: &NewPatchIdea) -> Result<i64> {
    let now = Utc::now();
    let patch_id = sqlx::query(
        r#"
        INSERT INTO patch_ideas (
            title, description, patch_type, complexity, source_type, source_url, source_text,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&patch.title)
    .bind(&patch.description)
    .bind(&patch.patch_type)
    .bind(patch.complexity)
    .bind(&patch.source_type)
    .bind(&patch.source_url)
    .bind(&patch.source_text)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    for module in &patch.modules {
        sqlx::query(
            "INSERT INTO patch_modules (patch_id, module_id, role, importance, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(patch_id)
        .bind(module.module_id)
        .bind(&module.role)
        .bind(module.importance)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    for cable in &patch.connections {
        sqlx::query(
            r#"
            INSERT INTO patch_connections (
                patch_id, source_module_id, source_connection_id, source_jack,
                target_module_id, target_connection_id, target_jack,
                cable_color, description, importance, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(patch_id)
        .bind(cable.source_module_id)
        .bind(cable.source_connection_id)
        .bind(&cable.source_jack)
        .bind(cable.target_module_id)
        .bind(cable.target_connection_id)
        .bind(&cable.target_jack)
        .bind(&cable.cable_color)
        .bind(&cable.description)
        .bind(cable.importance)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    for setting in &patch.settings {
        sqlx::query(
            r#"
            INSERT INTO patch_control_settings (
                patch_id, module_id, control_id, control_name,
                value_numeric, value_text, description, importance, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(patch_id)
        .bind(setting.module_id)
        .bind(setting.control_id)
        .bind(&setting.control_name)
        .bind(setting.value_numeric)
        .bind(&setting.value_text)
        .bind(&setting.description)
        .bind(setting.importance)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    Ok(patch_id)
}

/// Idea summaries, newest first, optionally filtered by type and complexity
pub async fn list_patch_ideas(
    conn: &mut SqliteConnection,
    patch_type: Option<&str>,
    complexity: Option<i64>,
) -> Result<Vec<PatchIdea>> {
    let ideas = sqlx::query_as::<_, PatchIdea>(
        r#"
        SELECT * FROM patch_ideas
        WHERE (? IS NULL OR patch_type = ?)
          AND (? IS NULL OR complexity = ?)
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(patch_type)
    .bind(patch_type)
    .bind(complexity)
    .bind(complexity)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ideas)
}

pub async fn get_patch_idea(conn: &mut SqliteConnection, id: i64) -> Result<Option<PatchIdeaDetail>> {
    let idea = sqlx::query_as::<_, PatchIdea>("SELECT * FROM patch_ideas WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(idea) = idea else {
        return Ok(None);
    };

    let modules = sqlx::query_as::<_, PatchModuleEntry>(
        r#"
        SELECT pm.id, pm.patch_id, pm.module_id, pm.role, pm.importance,
               m.name AS module_name, m.manufacturer, m.module_type
        FROM patch_modules pm
        JOIN modules m ON m.id = pm.module_id
        WHERE pm.patch_id = ?
        ORDER BY pm.id
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let connections = sqlx::query_as::<_, PatchConnectionEntry>(
        r#"
        SELECT pc.id, pc.patch_id, pc.source_module_id, pc.source_connection_id, pc.source_jack,
               pc.target_module_id, pc.target_connection_id, pc.target_jack,
               pc.cable_color, pc.description, pc.importance,
               src.name AS source_module_name, dst.name AS target_module_name
        FROM patch_connections pc
        JOIN modules src ON src.id = pc.source_module_id
        JOIN modules dst ON dst.id = pc.target_module_id
        WHERE pc.patch_id = ?
        ORDER BY pc.id
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let control_settings = sqlx::query_as::<_, ControlSettingEntry>(
        r#"
        SELECT ps.id, ps.patch_id, ps.module_id, ps.control_id, ps.control_name,
               ps.value_numeric, ps.value_text, ps.description, ps.importance,
               m.name AS module_name
        FROM patch_control_settings ps
        JOIN modules m ON m.id = ps.module_id
        WHERE ps.patch_id = ?
        ORDER BY ps.id
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(PatchIdeaDetail {
        idea,
        modules,
        connections,
        control_settings,
    }))
}
