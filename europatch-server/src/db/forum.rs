//! Forum source persistence

use chrono::{DateTime, Utc};
use europatch_common::db::ForumSource;
use europatch_common::Result;
use sqlx::SqliteConnection;

/// Scraped forum thread ready to store
#[derive(Debug, Clone, PartialEq)]
pub struct NewForumSource {
    pub source_type: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub relevance_score: f64,
}

/// Stored rows for a module, best first; `source_type` None means every kind
pub async fn forum_sources_for_module(
    conn: &mut SqliteConnection,
    module_id: i64,
    source_type: Option<&str>,
) -> Result<Vec<ForumSource>> {
    let sources = sqlx::query_as::<_, ForumSource>(
        r#"
        SELECT * FROM forum_sources
        WHERE module_id = ? AND (? IS NULL OR source_type = ?)
        ORDER BY relevance_score DESC, id
        "#,
    )
    .bind(module_id)
    .bind(source_type)
    .bind(source_type)
    .fetch_all(&mut *conn)
    .await?;

    Ok(sources)
}

/// Insert or refresh a row keyed on (module, url)
pub async fn upsert_forum_source(
    conn: &mut SqliteConnection,
    module_id: i64,
    source: &NewForumSource,
    scraped_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO forum_sources (source_type, url, title, content, module_id, scraped_at, relevance_score)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (module_id, url) DO UPDATE SET
            source_type = excluded.source_type,
            title = excluded.title,
            content = excluded.content,
            scraped_at = excluded.scraped_at,
            relevance_score = excluded.relevance_score
        "#,
    )
    .bind(&source.source_type)
    .bind(&source.url)
    .bind(&source.title)
    .bind(&source.content)
    .bind(module_id)
    .bind(scraped_at)
    .bind(source.relevance_score)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::modules::{insert_module, NewModule};
    use europatch_common::db::init_memory_database;

    #[tokio::test]
    async fn test_upsert_and_filter() {
        let pool = init_memory_database().await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let module_id = insert_module(
            &mut conn,
            &NewModule {
                name: "Rings".to_string(),
                manufacturer: "Mutable Instruments".to_string(),
                ..NewModule::default()
            },
        )
        .await
        .unwrap()
        .id;

        let thread = NewForumSource {
            source_type: "modwiggler".to_string(),
            url: "https://modwiggler.com/forum/viewtopic.php?t=1".to_string(),
            title: "Rings tips".to_string(),
            content: "Rings in eurorack".to_string(),
            relevance_score: 0.8,
        };
        upsert_forum_source(&mut conn, module_id, &thread, Utc::now()).await.unwrap();

        let rescored = NewForumSource { relevance_score: 1.0, ..thread.clone() };
        upsert_forum_source(&mut conn, module_id, &rescored, Utc::now()).await.unwrap();

        let all = forum_sources_for_module(&mut conn, module_id, None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].relevance_score, Some(1.0));

        let reddit = forum_sources_for_module(&mut conn, module_id, Some("reddit")).await.unwrap();
        assert!(reddit.is_empty());
    }
}
