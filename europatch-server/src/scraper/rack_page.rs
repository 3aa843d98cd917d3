//! Rack page extraction
//!
//! Locates the rack title and the per-module blocks on a ModularGrid rack page.
//! Module blocks come from the first selector in [`MODULE_BLOCK_CSS`] that
//! yields at least one usable module; results are never merged across
//! selectors. When every selector comes up empty a generic scan picks any
//! block element whose class mentions "module". A page with no recognizable
//! module at all becomes the fixed placeholder rack.

use europatch_common::db::Provenance;
use europatch_common::ModuleCategory;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, warn};

use super::defaults::{DEFAULT_RACK_TITLE, FALLBACK_MODULES, FALLBACK_RACK_NAME, UNKNOWN_MANUFACTURER};
use super::selectors::{absolutize, compile, element_text, find_hp, first_text_within, one, split_combined};

/// Module block selectors, most specific first
pub const MODULE_BLOCK_CSS: &[&str] = &[
    "[data-module-id]",
    ".rack-modules .module",
    ".modules-list .module-item",
    ".module-list .module",
    ".module",
    ".module-item",
    "li.module",
    r#"div[class*="module"]"#,
];

const GENERIC_BLOCK_TAGS: &[&str] = &["div", "li", "article", "section", "span"];

static MODULE_BLOCKS: Lazy<Vec<(&'static str, Selector)>> = Lazy::new(|| {
    MODULE_BLOCK_CSS
        .iter()
        .filter_map(|css| one(css).map(|selector| (*css, selector)))
        .collect()
});

static GENERIC_BLOCKS: Lazy<Selector> = Lazy::new(|| {
    one(&GENERIC_BLOCK_TAGS.join(", ")).unwrap_or_else(|| Selector::parse("div").expect("Invalid selector"))
});

static RACK_TITLE: Lazy<Vec<Selector>> = Lazy::new(|| {
    compile(&["h1.rack_title", ".rack_title", ".rack-title", ".rack-name", "h1", "title"])
});

static FRAGMENT_NAME: Lazy<Vec<Selector>> =
    Lazy::new(|| compile(&[".module_name", ".module-name", ".name", "h3", "h4", "a"]));

static FRAGMENT_MANUFACTURER: Lazy<Vec<Selector>> = Lazy::new(|| {
    compile(&[".manufacturer", ".brand", ".module-manufacturer", ".vendor"])
});

static FRAGMENT_LINK: Lazy<Vec<Selector>> =
    Lazy::new(|| compile(&["a.module_url", ".module_name a[href]", "a[href]"]));

static FRAGMENT_IMAGE: Lazy<Vec<Selector>> = Lazy::new(|| compile(&["img"]));

/// One module block found on a rack page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleFragment {
    pub name: String,
    pub manufacturer: String,
    /// Absolute URL of the module's own detail page
    pub module_url: Option<String>,
    pub hp_width: Option<i64>,
    /// Category named by the block's own class tokens
    pub module_type: Option<String>,
    pub image_url: Option<String>,
    /// Grid position when the block carries one
    pub position: Option<(i64, i64)>,
}

/// Extracted rack page
#[derive(Debug, Clone, Serialize)]
pub struct RackPage {
    pub rack_name: String,
    pub modules: Vec<ModuleFragment>,
    pub provenance: Provenance,
}

impl RackPage {
    /// Fixed placeholder rack substituted when nothing usable was extracted
    pub fn fallback() -> Self {
        let modules = FALLBACK_MODULES
            .iter()
            .map(|placeholder| ModuleFragment {
                name: placeholder.name.to_string(),
                manufacturer: placeholder.manufacturer.to_string(),
                module_url: None,
                hp_width: Some(placeholder.hp_width),
                module_type: Some(placeholder.module_type.to_string()),
                image_url: None,
                position: None,
            })
            .collect();

        Self {
            rack_name: FALLBACK_RACK_NAME.to_string(),
            modules,
            provenance: Provenance::Fallback,
        }
    }
}

/// Extract the rack title and module list from rack page HTML
///
/// Never fails: a page without module blocks keeps its title but gets the
/// placeholder modules of [`RackPage::fallback`].
pub fn scrape_rack_page(html: &str, base_url: &str) -> RackPage {
    let document = Html::parse_document(html);
    let rack_name = extract_rack_title(&document);

    let modules = extract_module_blocks(&document, base_url);
    if modules.is_empty() {
        warn!("No module blocks found on rack page, substituting placeholder modules");
        return match rack_name {
            Some(rack_name) => RackPage {
                rack_name,
                ..RackPage::fallback()
            },
            None => RackPage::fallback(),
        };
    }

    RackPage {
        rack_name: rack_name.unwrap_or_else(|| DEFAULT_RACK_TITLE.to_string()),
        modules,
        provenance: Provenance::Extracted,
    }
}

/// Rack title with the site name stripped
pub fn extract_rack_title(document: &Html) -> Option<String> {
    RACK_TITLE
        .iter()
        .flat_map(|selector| document.select(selector))
        .map(|el| strip_site_name(&element_text(el)))
        .find(|title| !title.is_empty())
}

fn strip_site_name(title: &str) -> String {
    title
        .replace("ModularGrid", "")
        .trim()
        .trim_matches(|c: char| c == '-' || c == '|' || c == '–' || c == '—' || c == ':')
        .trim()
        .to_string()
}

fn extract_module_blocks(document: &Html, base_url: &str) -> Vec<ModuleFragment> {
    for (css, selector) in MODULE_BLOCKS.iter() {
        let fragments = parse_blocks(document.select(selector), base_url);
        if !fragments.is_empty() {
            debug!(selector = %css, count = fragments.len(), "Module block selector matched");
            return fragments;
        }
    }

    let generic = document.select(&GENERIC_BLOCKS).filter(|el| {
        el.value()
            .attr("class")
            .map(|class| class.to_lowercase().contains("module"))
            .unwrap_or(false)
    });
    let fragments = parse_blocks(generic, base_url);
    if !fragments.is_empty() {
        debug!(count = fragments.len(), "Generic module scan matched");
    }
    fragments
}

/// Parse matched blocks, ignoring blocks nested inside an accepted block
fn parse_blocks<'a>(
    elements: impl Iterator<Item = ElementRef<'a>>,
    base_url: &str,
) -> Vec<ModuleFragment> {
    let mut accepted = Vec::new();
    let mut fragments = Vec::new();

    for element in elements {
        if element.ancestors().any(|ancestor| accepted.contains(&ancestor.id())) {
            continue;
        }
        if element_text(element).is_empty() {
            continue;
        }
        if let Some(fragment) = parse_fragment(element, base_url) {
            accepted.push(element.id());
            fragments.push(fragment);
        }
    }

    fragments
}

/// Name, manufacturer, link, width, image and position of one block
pub fn parse_fragment(element: ElementRef<'_>, base_url: &str) -> Option<ModuleFragment> {
    let manufacturer = first_text_within(element, &FRAGMENT_MANUFACTURER);

    let name = match first_text_within(element, &FRAGMENT_NAME) {
        Some(name) => name,
        None => {
            // No name element: whole block text minus the manufacturer
            let text = element_text(element);
            match &manufacturer {
                Some(m) => text.replacen(m.as_str(), "", 1).trim().to_string(),
                None => text,
            }
        }
    };
    if name.is_empty() {
        return None;
    }

    let (name, manufacturer) = match manufacturer {
        Some(manufacturer) => (name, manufacturer),
        None => split_combined(&name).unwrap_or((name, UNKNOWN_MANUFACTURER.to_string())),
    };

    let module_url = FRAGMENT_LINK
        .iter()
        .flat_map(|selector| element.select(selector))
        .filter_map(|link| link.value().attr("href"))
        .find_map(|href| absolutize(base_url, href));

    let hp_width = element
        .value()
        .attr("data-hp")
        .and_then(|hp| hp.trim().parse().ok())
        .or_else(|| find_hp(&element_text(element)));

    let image_url = FRAGMENT_IMAGE
        .iter()
        .flat_map(|selector| element.select(selector))
        .filter_map(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
        .find_map(|src| absolutize(base_url, src));

    let module_type = element
        .value()
        .attr("class")
        .and_then(ModuleCategory::from_class_tokens)
        .map(|category| category.as_str().to_string());

    Some(ModuleFragment {
        name,
        manufacturer,
        module_url,
        hp_width,
        module_type,
        image_url,
        position: grid_position(element),
    })
}

fn grid_position(element: ElementRef<'_>) -> Option<(i64, i64)> {
    let attr = |names: [&str; 2]| {
        names
            .iter()
            .find_map(|name| element.value().attr(name))
            .and_then(|value| value.trim().parse::<i64>().ok())
    };

    let x = attr(["data-col", "data-x"])?;
    let y = attr(["data-row", "data-y"]).unwrap_or(0);
    Some((x, y))
}
