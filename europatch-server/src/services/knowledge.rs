//! Manual and forum knowledge cache
//!
//! Both caches are read-through with a freshness window from `[cache]` in the
//! bootstrap config. A failed refresh never fails the request: stale rows (or
//! an explanatory string for manuals) are returned instead.

use chrono::{DateTime, Duration, Utc};
use europatch_common::config::CacheConfig;
use europatch_common::db::{ForumSource, Module};
use europatch_common::Error;
use scraper::Html;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::forum::{self, NewForumSource};
use crate::db::modules;
use crate::scraper::forum_page::{
    modwiggler_search_url, parse_modwiggler_results, parse_reddit_post, parse_reddit_results,
    reddit_search_url,
};
use crate::scraper::selectors::visible_text;
use crate::scraper::PageFetcher;

/// Rows scoring at or below this are discarded
pub const MIN_RELEVANCE: f64 = 0.5;

const EURORACK_KEYWORDS: &[&str] = &["eurorack", "modular", "patch", "synth"];
const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx"];

/// Which forums to consult
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForumKind {
    #[default]
    All,
    Reddit,
    Modwiggler,
}

impl ForumKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForumKind::All => "all",
            ForumKind::Reddit => "reddit",
            ForumKind::Modwiggler => "modwiggler",
        }
    }

    /// Stored `source_type` filter; None for every kind
    fn filter(&self) -> Option<&'static str> {
        match self {
            ForumKind::All => None,
            kind => Some(kind.as_str()),
        }
    }

    fn includes(&self, other: ForumKind) -> bool {
        *self == ForumKind::All || *self == other
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualView {
    pub module_id: i64,
    pub module_name: String,
    pub manual_url: String,
    pub manual_content: String,
    pub last_updated: Option<DateTime<Utc>>,
    /// True when served from the store without a fetch
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForumView {
    pub module_id: i64,
    pub module_name: String,
    pub source_type: ForumKind,
    pub forum_data: Vec<ForumSource>,
    pub cached: bool,
}

/// Read-through cache over manual pages and forum searches
pub struct KnowledgeCache {
    fetcher: Arc<dyn PageFetcher>,
    config: CacheConfig,
}

/// 0.5 for the name in the title, 0.3 in the content, 0.2 for a eurorack keyword; max 1.0
pub fn relevance_score(title: &str, content: &str, module_name: &str) -> f64 {
    let name = module_name.to_lowercase();
    let title = title.to_lowercase();
    let content = content.to_lowercase();

    let mut score = 0.0;
    if !name.is_empty() && title.contains(&name) {
        score += 0.5;
    }
    if !name.is_empty() && content.contains(&name) {
        score += 0.3;
    }
    if EURORACK_KEYWORDS
        .iter()
        .any(|kw| title.contains(kw) || content.contains(kw))
    {
        score += 0.2;
    }
    f64::min(score, 1.0)
}

/// Manual links that cannot be reduced to text
pub fn is_document_url(url: &str) -> bool {
    let path = url
        .split(&['?', '#'][..])
        .next()
        .unwrap_or_default()
        .to_lowercase();
    DOCUMENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Visible manual text with scripts and styles removed, whitespace collapsed
pub fn manual_text(html: &str) -> String {
    visible_text(&Html::parse_document(html))
}

fn is_fresh(stamp: Option<DateTime<Utc>>, ttl_days: i64) -> bool {
    stamp.is_some_and(|at| at > Utc::now() - Duration::days(ttl_days))
}

async fn load_module(conn: &mut SqliteConnection, module_id: i64) -> Result<Module, Error> {
    modules::get_module(conn, module_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Module with ID {} not found", module_id)))
}

impl KnowledgeCache {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: CacheConfig) -> Self {
        Self { fetcher, config }
    }

    /// Manual text for a module
    pub async fn manual(&self, pool: &SqlitePool, module_id: i64, force_refresh: bool) -> Result<ManualView, Error> {
        let mut conn = pool.acquire().await?;
        let module = load_module(&mut conn, module_id).await?;
        drop(conn);

        let manual_url = module
            .manual_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::NotFound(format!("No manual URL available for module {}", module_id)))?;

        let view = |content: String, last_updated, cached| ManualView {
            module_id,
            module_name: module.name.clone(),
            manual_url: manual_url.clone(),
            manual_content: content,
            last_updated,
            cached,
        };

        if !force_refresh && is_fresh(module.manual_last_updated, self.config.manual_ttl_days) {
            if let Some(content) = module.manual_content.clone() {
                info!(module_id, "Using cached manual content");
                return Ok(view(content, module.manual_last_updated, true));
            }
        }

        info!(module_id, url = %manual_url, "Fetching manual content");
        let fetched = if is_document_url(&manual_url) {
            Ok(format!("Manual available at: {}", manual_url))
        } else {
            self.fetcher.fetch(&manual_url).await.map(|html| manual_text(&html))
        };

        match fetched {
            Ok(content) => {
                let mut conn = pool.acquire().await?;
                modules::update_manual_content(&mut conn, module_id, &content).await?;
                let refreshed = load_module(&mut conn, module_id).await?;
                Ok(view(content, refreshed.manual_last_updated, false))
            }
            Err(e) => {
                warn!(module_id, error = %e, "Manual fetch failed");
                match module.manual_content.clone() {
                    Some(stale) => Ok(view(stale, module.manual_last_updated, true)),
                    None => Ok(view(
                        format!("Error fetching manual content: {}", e),
                        module.manual_last_updated,
                        false,
                    )),
                }
            }
        }
    }

    /// Forum threads discussing a module
    pub async fn forum_data(
        &self,
        pool: &SqlitePool,
        module_id: i64,
        kind: ForumKind,
        force_refresh: bool,
    ) -> Result<ForumView, Error> {
        let mut conn = pool.acquire().await?;
        let module = load_module(&mut conn, module_id).await?;
        let existing = forum::forum_sources_for_module(&mut conn, module_id, kind.filter()).await?;
        drop(conn);

        let view = |forum_data, cached| ForumView {
            module_id,
            module_name: module.name.clone(),
            source_type: kind,
            forum_data,
            cached,
        };

        let recent = existing
            .iter()
            .any(|row| is_fresh(Some(row.scraped_at), self.config.forum_ttl_days));
        if !force_refresh && recent {
            info!(module_id, "Using cached forum data");
            return Ok(view(existing, true));
        }

        info!(module_id, module = %module.name, kind = kind.as_str(), "Fetching forum data");
        let mut found = Vec::new();
        if kind.includes(ForumKind::Reddit) {
            found.extend(self.search_reddit(&module.name).await);
        }
        if kind.includes(ForumKind::Modwiggler) {
            found.extend(self.search_modwiggler(&module.name).await);
        }
        found.retain(|source| source.relevance_score > MIN_RELEVANCE);

        if found.is_empty() {
            return Ok(view(existing, true));
        }

        let now = Utc::now();
        let mut tx = pool.begin().await?;
        for source in &found {
            forum::upsert_forum_source(&mut tx, module_id, source, now).await?;
        }
        tx.commit().await?;
        info!(module_id, stored = found.len(), "Forum sources stored");

        let mut conn = pool.acquire().await?;
        let rows = forum::forum_sources_for_module(&mut conn, module_id, kind.filter()).await?;
        Ok(view(rows, false))
    }

    async fn search_modwiggler(&self, module_name: &str) -> Vec<NewForumSource> {
        let url = modwiggler_search_url(module_name);
        let html = match self.fetcher.fetch(&url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "ModWiggler search failed");
                return Vec::new();
            }
        };

        parse_modwiggler_results(&html)
            .into_iter()
            .map(|hit| NewForumSource {
                relevance_score: relevance_score(&hit.title, &hit.snippet, module_name),
                source_type: ForumKind::Modwiggler.as_str().to_string(),
                url: hit.url,
                title: hit.title,
                content: hit.snippet,
            })
            .collect()
    }

    async fn search_reddit(&self, module_name: &str) -> Vec<NewForumSource> {
        let url = reddit_search_url(module_name);
        let hits = match self.fetcher.fetch(&url).await {
            Ok(html) => parse_reddit_results(&html),
            Err(e) => {
                warn!(error = %e, "Reddit search failed");
                return Vec::new();
            }
        };

        let mut sources = Vec::with_capacity(hits.len());
        for hit in hits {
            // Post body is optional; a failed fetch scores on the title alone
            let content = match self.fetcher.fetch(&hit.url).await {
                Ok(html) => parse_reddit_post(&html),
                Err(e) => {
                    warn!(url = %hit.url, error = %e, "Reddit post fetch failed");
                    String::new()
                }
            };
            sources.push(NewForumSource {
                relevance_score: relevance_score(&hit.title, &content, module_name),
                source_type: ForumKind::Reddit.as_str().to_string(),
                url: hit.url,
                title: hit.title,
                content,
            });
        }
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_score() {
        assert_eq!(relevance_score("Plaits tips", "", "Plaits"), 0.5);
        assert_eq!(relevance_score("Plaits tips", "more on plaits", "Plaits"), 0.8);
        assert_eq!(relevance_score("Plaits in my eurorack", "plaits", "Plaits"), 1.0);
        assert_eq!(relevance_score("Unrelated", "modular talk", "Plaits"), 0.2);
        assert_eq!(relevance_score("", "", "Plaits"), 0.0);
    }

    #[test]
    fn test_document_urls() {
        assert!(is_document_url("https://mutable-instruments.net/plaits.PDF"));
        assert!(is_document_url("https://example.com/manual.docx?download=1"));
        assert!(!is_document_url("https://pichenettes.github.io/mutable-instruments-documentation/modules/plaits/manual/"));
    }

    #[test]
    fn test_manual_text_strips_scripts() {
        let html = r#"<html><head><style>body{}</style><script>var x = 1;</script></head>
            <body><h1>Plaits</h1>
            <p>Macro   oscillator</p></body></html>"#;
        assert_eq!(manual_text(html), "Plaits Macro oscillator");
    }

    #[test]
    fn test_forum_kind_filter() {
        assert_eq!(ForumKind::All.filter(), None);
        assert_eq!(ForumKind::Reddit.filter(), Some("reddit"));
        assert!(ForumKind::All.includes(ForumKind::Modwiggler));
        assert!(!ForumKind::Reddit.includes(ForumKind::Modwiggler));
    }
}
