//! Module detail page extraction
//!
//! Each attribute is an ordered selector chain evaluated first-success-wins.
//! Extraction never fails: missing fields get literal defaults, and a page
//! that could not be fetched at all becomes the all-defaults record.

use europatch_common::db::Provenance;
use europatch_common::ModuleCategory;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, warn};

use super::defaults::{
    DEFAULT_DESCRIPTION, DEFAULT_HP_WIDTH, UNKNOWN_MANUFACTURER, UNKNOWN_MODULE, UNKNOWN_TYPE,
};
use super::fetch::PageFetcher;
use super::selectors::{
    absolutize, clean_text, compile, element_text, find_hp, first_attr, first_text, split_combined,
    visible_text,
};

/// Link text marking a manual link
const MANUAL_KEYWORDS: &[&str] = &["manual", "documentation", "guide", "instructions", "pdf"];

static NAME: Lazy<Vec<Selector>> =
    Lazy::new(|| compile(&["h1.module_name", ".module_name", ".module-title", "h1"]));

static PAGE_TITLE: Lazy<Vec<Selector>> = Lazy::new(|| compile(&["title"]));

static MANUFACTURER: Lazy<Vec<Selector>> = Lazy::new(|| {
    compile(&[
        ".manufacturer",
        ".brand",
        ".module-manufacturer",
        r#"a[href*="/manufacturers/"]"#,
        ".vendor",
    ])
});

static SPEC_KEYS: Lazy<Vec<Selector>> = Lazy::new(|| compile(&["dt", "th"]));

static SPEC_ITEMS: Lazy<Vec<Selector>> = Lazy::new(|| compile(&["li", "tr"]));

static MODULE_TYPE: Lazy<Vec<Selector>> =
    Lazy::new(|| compile(&[".module_type", ".module-type", ".category", ".type"]));

static DESCRIPTION: Lazy<Vec<Selector>> = Lazy::new(|| {
    compile(&[".description", ".module-description", ".module_description", "#description"])
});

static META_DESCRIPTION: Lazy<Vec<Selector>> =
    Lazy::new(|| compile(&[r#"meta[name="description"]"#]));

static LINKS: Lazy<Vec<Selector>> = Lazy::new(|| compile(&["a[href]"]));

static IMAGE: Lazy<Vec<Selector>> = Lazy::new(|| {
    compile(&[
        ".module-image img",
        ".product-image img",
        "img.module_image",
        ".module_image img",
    ])
});

static META_IMAGE: Lazy<Vec<Selector>> =
    Lazy::new(|| compile(&[r#"meta[property="og:image"]"#]));

/// Attributes recovered from a module detail page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleAttributes {
    pub name: String,
    pub manufacturer: String,
    pub hp_width: Option<i64>,
    pub module_type: String,
    pub description: Option<String>,
    pub manual_url: Option<String>,
    pub image_url: Option<String>,
    pub modulargrid_url: Option<String>,
    pub provenance: Provenance,
}

impl ModuleAttributes {
    /// All-defaults record for a page that could not be read
    pub fn defaults(page_url: Option<&str>) -> Self {
        Self {
            name: UNKNOWN_MODULE.to_string(),
            manufacturer: UNKNOWN_MANUFACTURER.to_string(),
            hp_width: Some(DEFAULT_HP_WIDTH),
            module_type: UNKNOWN_TYPE.to_string(),
            description: Some(DEFAULT_DESCRIPTION.to_string()),
            manual_url: None,
            image_url: None,
            modulargrid_url: page_url.map(str::to_string),
            provenance: Provenance::Fallback,
        }
    }
}

/// Fetch a module page and extract its attributes
///
/// Fetch failures are logged and turned into [`ModuleAttributes::defaults`].
pub async fn fetch_module_details(
    fetcher: &dyn PageFetcher,
    page_url: &str,
    base_url: &str,
) -> ModuleAttributes {
    match fetcher.fetch(page_url).await {
        Ok(html) => extract_module_details(&html, page_url, base_url),
        Err(e) => {
            warn!(url = %page_url, error = %e, "Module detail fetch failed, using defaults");
            ModuleAttributes::defaults(Some(page_url))
        }
    }
}

/// Extract module attributes from detail page HTML
pub fn extract_module_details(html: &str, page_url: &str, base_url: &str) -> ModuleAttributes {
    let document = Html::parse_document(html);
    let text = visible_text(&document);

    let found_name = extract_name(&document);
    let found_manufacturer = first_text(&document, &MANUFACTURER);

    let provenance = if found_name.is_some() {
        Provenance::Extracted
    } else {
        Provenance::Fallback
    };

    let (name, manufacturer) = match (found_name, found_manufacturer) {
        (Some(name), Some(manufacturer)) => (name, manufacturer),
        (Some(name), None) => {
            split_combined(&name).unwrap_or((name, UNKNOWN_MANUFACTURER.to_string()))
        }
        (None, Some(manufacturer)) => (UNKNOWN_MODULE.to_string(), manufacturer),
        (None, None) => (UNKNOWN_MODULE.to_string(), UNKNOWN_MANUFACTURER.to_string()),
    };

    let module_type = first_text(&document, &MODULE_TYPE).unwrap_or_else(|| {
        let category = ModuleCategory::classify(&text);
        debug!(category = %category, "Module type classified from page text");
        category.as_str().to_string()
    });

    let attributes = ModuleAttributes {
        name,
        manufacturer,
        hp_width: extract_width(&document).or_else(|| find_hp(&text)),
        module_type,
        description: first_text(&document, &DESCRIPTION)
            .or_else(|| first_attr(&document, &META_DESCRIPTION, "content").map(|d| clean_text(&d))),
        manual_url: extract_manual_url(&document, base_url),
        image_url: first_attr(&document, &IMAGE, "src")
            .or_else(|| first_attr(&document, &META_IMAGE, "content"))
            .and_then(|src| absolutize(base_url, &src)),
        modulargrid_url: Some(page_url.to_string()),
        provenance,
    };

    debug!(
        name = %attributes.name,
        manufacturer = %attributes.manufacturer,
        provenance = %attributes.provenance,
        "Module details extracted"
    );
    attributes
}

fn extract_name(document: &Html) -> Option<String> {
    first_text(document, &NAME).or_else(|| {
        first_text(document, &PAGE_TITLE)
            .map(|title| {
                title
                    .replace(" - ModularGrid", "")
                    .replace("ModularGrid", "")
                    .trim()
                    .to_string()
            })
            .filter(|title| !title.is_empty())
    })
}

/// Width from specification key/value pairs (`dt`/`dd`, `th`/`td`, `Width: 8HP` items)
fn extract_width(document: &Html) -> Option<i64> {
    let is_width_key = |key: &str| {
        let key = key.to_lowercase();
        key.contains("width") || key.contains("hp")
    };

    let from_pairs = SPEC_KEYS
        .iter()
        .flat_map(|selector| document.select(selector))
        .filter(|key| is_width_key(&element_text(*key)))
        .filter_map(next_element_sibling)
        .find_map(|value| parse_width_value(&element_text(value)));
    if from_pairs.is_some() {
        return from_pairs;
    }

    SPEC_ITEMS
        .iter()
        .flat_map(|selector| document.select(selector))
        .map(element_text)
        .filter(|item| is_width_key(item))
        .find_map(|item| find_hp(&item))
}

fn next_element_sibling(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

/// `12HP`, `12 HP` or a bare `12`
fn parse_width_value(value: &str) -> Option<i64> {
    find_hp(value).or_else(|| value.trim().parse().ok())
}

/// First link whose text names a manual, resolved to an absolute URL
fn extract_manual_url(document: &Html, base_url: &str) -> Option<String> {
    LINKS
        .iter()
        .flat_map(|selector| document.select(selector))
        .filter(|link| {
            let text = element_text(*link).to_lowercase();
            MANUAL_KEYWORDS.iter().any(|kw| text.contains(kw))
        })
        .filter_map(|link| link.value().attr("href"))
        .find_map(|href| absolutize(base_url, href))
}
