//! Rack parser integration tests against a recording stub fetcher

mod helpers;

use europatch_common::db::{init_database, Provenance};
use europatch_server::db::{modules, racks};
use europatch_server::services::{ParseError, RackParser};
use helpers::{
    plaits_detail_page, plaits_rack_page, rack_page, StubFetcher, BASE_URL, PLAITS_URL, RACK_URL,
};
use std::sync::Arc;

async fn parser_with(fetcher: Arc<StubFetcher>) -> (RackParser, sqlx::SqlitePool) {
    let pool = europatch_common::db::init_memory_database().await.unwrap();
    (RackParser::new(fetcher, BASE_URL), pool)
}

#[tokio::test]
async fn test_single_plaits_rack() {
    let fetcher = Arc::new(
        StubFetcher::new()
            .with_page(RACK_URL, &plaits_rack_page())
            .with_page(PLAITS_URL, &plaits_detail_page()),
    );
    let (parser, pool) = parser_with(fetcher.clone()).await;

    let result = parser.parse_rack_url(&pool, RACK_URL).await.unwrap();

    assert_eq!(result.modulargrid_id.as_deref(), Some("12345"));
    assert_eq!(result.rack_name, "Test Rack");
    assert_eq!(result.provenance, Provenance::Extracted);
    assert!(!result.cached);
    assert_eq!(result.modules.len(), 1);

    let plaits = &result.modules[0].module;
    assert_eq!(plaits.name, "Plaits");
    assert_eq!(plaits.manufacturer, "Mutable Instruments");
    assert_eq!(plaits.module_type.as_deref(), Some("Oscillator"));
    assert_eq!(plaits.hp_width, Some(12));
    assert_eq!(plaits.modulargrid_url.as_deref(), Some(PLAITS_URL));
    assert_eq!(fetcher.calls_to(PLAITS_URL), 1);
}

#[tokio::test]
async fn test_second_parse_is_served_from_store() {
    let fetcher = Arc::new(
        StubFetcher::new()
            .with_page(RACK_URL, &plaits_rack_page())
            .with_page(PLAITS_URL, &plaits_detail_page()),
    );
    let (parser, pool) = parser_with(fetcher.clone()).await;

    let first = parser.parse_rack_url(&pool, RACK_URL).await.unwrap();
    let calls = fetcher.call_count();

    let second = parser.parse_rack_url(&pool, RACK_URL).await.unwrap();
    assert_eq!(fetcher.call_count(), calls);
    assert!(second.cached);
    assert_eq!(second.rack_id, first.rack_id);

    let first_ids: Vec<i64> = first.modules.iter().map(|m| m.module.id).collect();
    let second_ids: Vec<i64> = second.modules.iter().map(|m| m.module.id).collect();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn test_invalid_urls_rejected_without_network() {
    let fetcher = Arc::new(StubFetcher::new());
    let (parser, pool) = parser_with(fetcher.clone()).await;

    for url in [
        "https://www.modulargrid.net/e/modules/view/1",
        "https://www.modulargrid.net/e/racks/view/",
        "not a url",
    ] {
        let err = parser.parse_rack_url(&pool, url).await.unwrap_err();
        assert!(matches!(err, ParseError::InvalidUrl(_)), "{} should be rejected", url);
    }
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_modules_deduplicated_across_racks() {
    let second_rack = "https://www.modulargrid.net/e/racks/view/67890";
    let fetcher = Arc::new(
        StubFetcher::new()
            .with_page(RACK_URL, &plaits_rack_page())
            .with_page(
                second_rack,
                &rack_page(
                    "Second Rack",
                    &[
                        ("Plaits", "Mutable Instruments", "/e/mutable-instruments-plaits"),
                        ("Rings", "Mutable Instruments", "/e/mutable-instruments-rings"),
                    ],
                ),
            )
            .with_page(PLAITS_URL, &plaits_detail_page()),
    );
    let (parser, pool) = parser_with(fetcher.clone()).await;

    let first = parser.parse_rack_url(&pool, RACK_URL).await.unwrap();
    let second = parser.parse_rack_url(&pool, second_rack).await.unwrap();
    assert_ne!(first.rack_id, second.rack_id);
    assert_eq!(second.modules.len(), 2);

    let mut conn = pool.acquire().await.unwrap();
    assert_eq!(modules::list_modules(&mut conn).await.unwrap().len(), 2);

    let plaits = modules::find_module(&mut conn, "Plaits", "Mutable Instruments")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(racks::rack_count_for_module(&mut conn, plaits.id).await.unwrap(), 2);

    // Known module: its detail page is not fetched again
    assert_eq!(fetcher.calls_to(PLAITS_URL), 1);
}

#[tokio::test]
async fn test_unrecognized_page_gives_placeholder_rack() {
    let fetcher = Arc::new(
        StubFetcher::new().with_page(RACK_URL, "<html><body><p>Nothing to see</p></body></html>"),
    );
    let (parser, pool) = parser_with(fetcher.clone()).await;

    let result = parser.parse_rack_url(&pool, RACK_URL).await.unwrap();
    assert_eq!(result.provenance, Provenance::Fallback);
    assert_eq!(result.rack_name, "Fallback Rack");

    let names: Vec<&str> = result.modules.iter().map(|m| m.module.name.as_str()).collect();
    assert_eq!(names, vec!["Plaits", "Rings", "Clouds"]);
    assert!(result
        .modules
        .iter()
        .all(|m| m.module.manufacturer == "Mutable Instruments"));

    // Placeholders carry fixed metadata and need no detail fetch
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(result.modules[0].module.hp_width, Some(12));
}

#[tokio::test]
async fn test_fetch_failure_gives_placeholder_rack_and_is_cached() {
    let fetcher = Arc::new(StubFetcher::new());
    let (parser, pool) = parser_with(fetcher.clone()).await;

    let first = parser.parse_rack_url(&pool, RACK_URL).await.unwrap();
    assert_eq!(first.provenance, Provenance::Fallback);
    assert_eq!(first.modules.len(), 3);

    // Provenance survives the cache hit
    let second = parser.parse_rack_url(&pool, RACK_URL).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.provenance, Provenance::Fallback);
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_detail_page_failure_keeps_listing_data() {
    let fetcher = Arc::new(StubFetcher::new().with_page(
        RACK_URL,
        &rack_page("Sparse", &[("Maths", "Make Noise", "/e/make-noise-maths")]),
    ));
    let (parser, pool) = parser_with(fetcher.clone()).await;

    let result = parser.parse_rack_url(&pool, RACK_URL).await.unwrap();
    assert_eq!(result.provenance, Provenance::Extracted);
    assert_eq!(result.modules.len(), 1);

    let maths = &result.modules[0].module;
    assert_eq!(maths.name, "Maths");
    assert_eq!(maths.manufacturer, "Make Noise");
    assert_eq!(
        maths.modulargrid_url.as_deref(),
        Some("https://www.modulargrid.net/e/make-noise-maths")
    );
    // Placeholder text from the unreadable detail page is not stored
    assert_eq!(maths.description, None);
}

#[tokio::test]
async fn test_listing_class_types_module_without_detail_page() {
    let fetcher = Arc::new(StubFetcher::new().with_page(
        RACK_URL,
        r#"<html><body><h1 class="rack_title">Typed</h1>
            <div class="module vco"><span class="module_name"><a href="/e/acme-thing">Thing</a></span><span class="manufacturer">Acme</span></div>
        </body></html>"#,
    ));
    let (parser, pool) = parser_with(fetcher).await;

    let result = parser.parse_rack_url(&pool, RACK_URL).await.unwrap();
    let thing = &result.modules[0].module;
    assert_eq!(thing.name, "Thing");
    assert_eq!(thing.module_type.as_deref(), Some("Oscillator"));
}

#[tokio::test]
async fn test_repeated_module_fetched_once_per_import() {
    let thing_url = "https://www.modulargrid.net/e/acme-thing";
    let fetcher = Arc::new(StubFetcher::new().with_page(
        RACK_URL,
        &rack_page(
            "Twins",
            &[
                ("Thing", "Acme", "/e/acme-thing"),
                ("Thing", "Acme", "/e/acme-thing"),
            ],
        ),
    ));
    let (parser, pool) = parser_with(fetcher.clone()).await;

    let result = parser.parse_rack_url(&pool, RACK_URL).await.unwrap();
    assert_eq!(result.modules.len(), 2);
    assert_eq!(result.modules[0].module.id, result.modules[1].module.id);
    assert_eq!(fetcher.calls_to(thing_url), 1);
}

#[tokio::test]
async fn test_titled_page_without_modules_keeps_title() {
    let fetcher = Arc::new(StubFetcher::new().with_page(
        RACK_URL,
        r#"<html><body><h1 class="rack_title">My Empty Case</h1><p>No modules yet</p></body></html>"#,
    ));
    let (parser, pool) = parser_with(fetcher).await;

    let result = parser.parse_rack_url(&pool, RACK_URL).await.unwrap();
    assert_eq!(result.provenance, Provenance::Fallback);
    assert_eq!(result.rack_name, "My Empty Case");
    assert_eq!(result.modules.len(), 3);
}

#[tokio::test]
async fn test_positions_are_sequential_without_grid_data() {
    let fetcher = Arc::new(StubFetcher::new().with_page(
        RACK_URL,
        &rack_page(
            "Row",
            &[
                ("Maths", "Make Noise", "/e/make-noise-maths"),
                ("Morphagene", "Make Noise", "/e/make-noise-morphagene"),
            ],
        ),
    ));
    let (parser, pool) = parser_with(fetcher).await;

    let result = parser.parse_rack_url(&pool, RACK_URL).await.unwrap();
    let positions: Vec<(Option<i64>, Option<i64>)> = result
        .modules
        .iter()
        .map(|m| (m.position_x, m.position_y))
        .collect();
    assert_eq!(positions, vec![(Some(0), Some(0)), (Some(1), Some(0))]);
}

#[tokio::test]
async fn test_concurrent_imports_store_one_rack() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("race.db")).await.unwrap();
    let fetcher = Arc::new(
        StubFetcher::new()
            .with_page(RACK_URL, &plaits_rack_page())
            .with_page(PLAITS_URL, &plaits_detail_page()),
    );
    let parser = RackParser::new(fetcher, BASE_URL);

    let (a, b) = tokio::join!(
        parser.parse_rack_url(&pool, RACK_URL),
        parser.parse_rack_url(&pool, RACK_URL)
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.rack_id, b.rack_id);

    let mut conn = pool.acquire().await.unwrap();
    assert_eq!(racks::list_racks(&mut conn).await.unwrap().len(), 1);
    assert_eq!(modules::list_modules(&mut conn).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_refresh_module_updates_only_on_real_data() {
    let fetcher = Arc::new(
        StubFetcher::new()
            .with_page(RACK_URL, &plaits_rack_page())
            .with_page(PLAITS_URL, &plaits_detail_page()),
    );
    let (parser, pool) = parser_with(fetcher.clone()).await;
    let rack = parser.parse_rack_url(&pool, RACK_URL).await.unwrap();
    let module_id = rack.modules[0].module.id;

    let refreshed = parser.refresh_module(&pool, module_id).await.unwrap();
    assert_eq!(refreshed.provenance, Provenance::Extracted);
    assert_eq!(refreshed.module.hp_width, Some(12));

    fetcher.remove_page(PLAITS_URL);
    let unreadable = parser.refresh_module(&pool, module_id).await.unwrap();
    assert_eq!(unreadable.provenance, Provenance::Fallback);
    assert_eq!(unreadable.module.module_type.as_deref(), Some("Oscillator"));
    assert_eq!(unreadable.module.hp_width, Some(12));

    let missing = parser.refresh_module(&pool, module_id + 100).await.unwrap_err();
    assert!(matches!(missing, europatch_common::Error::NotFound(_)));
}
