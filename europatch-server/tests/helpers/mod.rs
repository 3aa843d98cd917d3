//! Shared fixtures for europatch-server integration tests
//!
//! `StubFetcher` serves canned HTML per URL and records every call so tests
//! can assert on network access.

#![allow(dead_code)]

use async_trait::async_trait;
use europatch_common::config::{CacheConfig, ScraperConfig};
use europatch_common::db::init_memory_database;
use europatch_server::scraper::{FetchError, PageFetcher};
use europatch_server::AppState;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const BASE_URL: &str = "https://www.modulargrid.net";
pub const RACK_URL: &str = "https://www.modulargrid.net/e/racks/view/12345";
pub const PLAITS_URL: &str = "https://www.modulargrid.net/e/mutable-instruments-plaits";

/// Recording page source; unknown URLs answer 404
#[derive(Default)]
pub struct StubFetcher {
    pages: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.set_page(url, html);
        self
    }

    pub fn set_page(&self, url: &str, html: &str) {
        self.pages.lock().unwrap().insert(url.to_string(), html.to_string());
    }

    pub fn remove_page(&self, url: &str) {
        self.pages.lock().unwrap().remove(url);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        // Give concurrent callers a chance to interleave
        tokio::task::yield_now().await;
        let page = self.pages.lock().unwrap().get(url).cloned();
        page.ok_or(FetchError::Status(404))
    }
}

/// Rack page listing the given (name, manufacturer, href) modules
pub fn rack_page(title: &str, modules: &[(&str, &str, &str)]) -> String {
    let blocks: String = modules
        .iter()
        .map(|(name, manufacturer, href)| {
            format!(
                r#"<div class="module"><div class="module_name"><a href="{}">{}</a></div><div class="manufacturer">{}</div></div>"#,
                href, name, manufacturer
            )
        })
        .collect();
    format!(
        r#"<html><head><title>{} - ModularGrid</title></head><body><h1 class="rack_title">{}</h1>{}</body></html>"#,
        title, title, blocks
    )
}

/// Rack page with a single Plaits block
pub fn plaits_rack_page() -> String {
    rack_page(
        "Test Rack",
        &[("Plaits", "Mutable Instruments", "/e/mutable-instruments-plaits")],
    )
}

/// Detail page for Plaits
pub fn plaits_detail_page() -> String {
    r#"<html><body>
        <h1 class="module_name">Plaits</h1>
        <div class="manufacturer">Mutable Instruments</div>
        <div class="module_type">Oscillator</div>
        <dl><dt>Width</dt><dd>12 HP</dd></dl>
        <div class="description">Macro-oscillator with multiple synthesis models</div>
        <a href="https://mutable-instruments.net/modules/plaits/manual/">Manual</a>
    </body></html>"#
        .to_string()
}

/// In-memory pool plus app state wired to the stub
pub async fn test_state(fetcher: Arc<StubFetcher>) -> (AppState, SqlitePool) {
    let pool = init_memory_database().await.expect("Failed to create in-memory database");
    let scraper = ScraperConfig {
        base_url: BASE_URL.to_string(),
        ..ScraperConfig::default()
    };
    let state = AppState::new(pool.clone(), fetcher, &scraper, CacheConfig::default());
    (state, pool)
}
