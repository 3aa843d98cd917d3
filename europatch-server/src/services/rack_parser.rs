//! Rack parser
//!
//! Turns a ModularGrid rack URL into a stored rack:
//!
//! 1. Validate the URL and extract the numeric rack id (no network on failure)
//! 2. Return the stored rack when that id was imported before (cache hit)
//! 3. Fetch and extract the rack page; an unreadable page becomes the
//!    placeholder rack
//! 4. Reuse known modules by (name, manufacturer); fetch detail pages for new
//!    ones, tolerating per-module failures
//! 5. Insert the rack, new modules and placements in one transaction
//!
//! A failed write is rolled back and the placeholder rack is stored instead.
//! A concurrent import of the same rack loses on the UNIQUE rack id and
//! returns the winner's rack as cached.

use europatch_common::db::{Module, Provenance, UserRack};
use europatch_common::{Error, ModuleCategory};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::modules::{self, NewModule};
use crate::db::racks::{self, RackedModule};
use crate::scraper::defaults::{DEFAULT_RACK_TITLE, FALLBACK_MODULES};
use crate::scraper::{
    fetch_module_details, scrape_rack_page, ModuleAttributes, ModuleFragment, PageFetcher, RackPage,
};

/// Accepted rack URL shape, named in validation errors
pub const EXPECTED_URL_FORMAT: &str = "https://www.modulargrid.net/e/racks/view/123456";

static RACK_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/racks/view/(\d+)").expect("Invalid regex pattern"));

/// Rack parse errors
#[derive(Debug, Error)]
pub enum ParseError {
    /// URL carries no rack id; rejected before any network access
    #[error("Invalid ModularGrid URL format. Expected format: {0}")]
    InvalidUrl(String),

    /// Store failure, including failure to persist the placeholder rack
    #[error(transparent)]
    Database(#[from] Error),
}

/// Rack returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct RackResult {
    pub rack_id: i64,
    pub modulargrid_id: Option<String>,
    pub modulargrid_url: String,
    pub rack_name: String,
    /// "extracted" for real page content, "fallback" for placeholder modules
    pub provenance: Provenance,
    /// True when served from the store without scraping
    pub cached: bool,
    pub modules: Vec<RackedModule>,
}

/// Outcome of re-scraping one module's detail page
#[derive(Debug, Clone, Serialize)]
pub struct ModuleRefresh {
    pub module: Module,
    pub provenance: Provenance,
}

/// Numeric rack id from a rack URL
pub fn extract_rack_id(url: &str) -> Result<String, ParseError> {
    RACK_ID_PATTERN
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ParseError::InvalidUrl(EXPECTED_URL_FORMAT.to_string()))
}

/// Rack import orchestrator
pub struct RackParser {
    fetcher: Arc<dyn PageFetcher>,
    base_url: String,
}

/// New module row plus where it will sit in the rack
struct Placement {
    fragment: ModuleFragment,
    details: Option<NewModule>,
    position: (i64, i64),
}

impl RackParser {
    pub fn new(fetcher: Arc<dyn PageFetcher>, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into(),
        }
    }

    /// Import (or return the stored copy of) the rack behind `url`
    pub async fn parse_rack_url(&self, pool: &SqlitePool, url: &str) -> Result<RackResult, ParseError> {
        info!(url = %url, "Parsing ModularGrid rack URL");
        let rack_id = extract_rack_id(url)?;

        if let Some(result) = self.cached_rack(pool, &rack_id).await? {
            info!(rack_id = %rack_id, "Rack already imported, returning cached data");
            return Ok(result);
        }

        let page = match self.fetcher.fetch(url).await {
            Ok(html) => scrape_rack_page(&html, &self.base_url),
            Err(e) => {
                warn!(url = %url, error = %e, "Rack page fetch failed, substituting placeholder modules");
                RackPage::fallback()
            }
        };

        let placements = self.prepare_placements(pool, &page).await?;

        match self.persist(pool, url, &rack_id, &page, &placements).await {
            Ok(result) => Ok(result),
            Err(e) => {
                if let Some(result) = self.cached_rack(pool, &rack_id).await? {
                    info!(rack_id = %rack_id, "Rack imported concurrently, returning stored copy");
                    return Ok(result);
                }
                if page.provenance == Provenance::Fallback {
                    return Err(e.into());
                }

                warn!(rack_id = %rack_id, error = %e, "Storing rack failed, substituting placeholder modules");
                let fallback = RackPage::fallback();
                let placements = self.prepare_placements(pool, &fallback).await?;
                match self.persist(pool, url, &rack_id, &fallback, &placements).await {
                    Ok(result) => Ok(result),
                    Err(e) => match self.cached_rack(pool, &rack_id).await? {
                        Some(result) => Ok(result),
                        None => Err(e.into()),
                    },
                }
            }
        }
    }

    /// Re-scrape a module's detail page and update its stored attributes
    ///
    /// A fetch failure leaves the row untouched and reports `fallback`.
    pub async fn refresh_module(&self, pool: &SqlitePool, module_id: i64) -> Result<ModuleRefresh, Error> {
        let mut conn = pool.acquire().await?;
        let module = modules::get_module(&mut conn, module_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Module {} not found", module_id)))?;
        let page_url = module
            .modulargrid_url
            .clone()
            .ok_or_else(|| Error::InvalidInput(format!("Module {} has no ModularGrid URL", module_id)))?;
        drop(conn);

        let details = fetch_module_details(self.fetcher.as_ref(), &page_url, &self.base_url).await;
        let provenance = details.provenance;

        let mut conn = pool.acquire().await?;
        if provenance == Provenance::Extracted {
            let update = NewModule {
                name: module.name.clone(),
                manufacturer: module.manufacturer.clone(),
                ..NewModule::from(details)
            };
            modules::update_module_details(&mut conn, module_id, &update).await?;
            info!(module_id, "Module details refreshed");
        } else {
            warn!(module_id, "Module detail page unreadable, keeping stored attributes");
        }

        let module = modules::get_module(&mut conn, module_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Module {} not found", module_id)))?;
        Ok(ModuleRefresh { module, provenance })
    }

    async fn cached_rack(&self, pool: &SqlitePool, rack_id: &str) -> Result<Option<RackResult>, Error> {
        let mut conn = pool.acquire().await?;
        match racks::find_rack_by_source_id(&mut conn, rack_id).await? {
            Some(rack) => {
                racks::touch_rack(&mut conn, rack.id).await?;
                Ok(Some(rack_result(&mut conn, rack, true).await?))
            }
            None => Ok(None),
        }
    }

    /// Resolve grid positions and fetch detail pages for modules not yet stored
    ///
    /// Runs before the write transaction so no lock is held across a fetch.
    /// A module listed more than once on the page is fetched once.
    async fn prepare_placements(&self, pool: &SqlitePool, page: &RackPage) -> Result<Vec<Placement>, Error> {
        let mut placements = Vec::with_capacity(page.modules.len());
        let mut seen: HashMap<(String, String), Option<NewModule>> = HashMap::new();

        for (index, fragment) in page.modules.iter().enumerate() {
            let position = fragment.position.unwrap_or((index as i64, 0));
            let key = (fragment.name.clone(), fragment.manufacturer.clone());

            let details = match seen.get(&key) {
                Some(details) => details.clone(),
                None => {
                    let known = {
                        let mut conn = pool.acquire().await?;
                        modules::find_module(&mut conn, &fragment.name, &fragment.manufacturer)
                            .await?
                            .is_some()
                    };

                    let details = if known {
                        debug!(name = %fragment.name, "Module already stored, reusing");
                        None
                    } else {
                        Some(self.new_module_for(fragment).await)
                    };
                    seen.insert(key, details.clone());
                    details
                }
            };

            placements.push(Placement {
                fragment: fragment.clone(),
                details,
                position,
            });
        }

        Ok(placements)
    }

    /// Row for a module seen for the first time
    async fn new_module_for(&self, fragment: &ModuleFragment) -> NewModule {
        if let Some(placeholder) = FALLBACK_MODULES
            .iter()
            .find(|p| p.name == fragment.name && p.manufacturer == fragment.manufacturer)
            .filter(|_| fragment.module_url.is_none())
        {
            return NewModule {
                name: placeholder.name.to_string(),
                manufacturer: placeholder.manufacturer.to_string(),
                hp_width: Some(placeholder.hp_width),
                module_type: Some(placeholder.module_type.to_string()),
                description: Some(placeholder.description.to_string()),
                ..NewModule::default()
            };
        }

        let details = match &fragment.module_url {
            Some(url) => Some(fetch_module_details(self.fetcher.as_ref(), url, &self.base_url).await),
            None => None,
        };
        merge_details(fragment, details)
    }

    async fn persist(
        &self,
        pool: &SqlitePool,
        url: &str,
        rack_id: &str,
        page: &RackPage,
        placements: &[Placement],
    ) -> Result<RackResult, Error> {
        let mut tx = pool.begin().await?;

        let rack = racks::insert_rack(&mut tx, url, rack_id, &page.rack_name, page.provenance).await?;

        for placement in placements {
            let module_id = resolve_module(&mut tx, placement).await?;
            let (x, y) = placement.position;
            racks::attach_module(&mut tx, rack.id, module_id, x, y).await?;
        }

        let result = rack_result(&mut tx, rack, false).await?;
        tx.commit().await?;

        info!(
            rack_id = %rack_id,
            modules = result.modules.len(),
            provenance = %result.provenance,
            "Rack stored"
        );
        Ok(result)
    }
}

/// Existing row id, or the id of a freshly inserted row
async fn resolve_module(conn: &mut SqliteConnection, placement: &Placement) -> Result<i64, Error> {
    let fragment = &placement.fragment;
    if let Some(existing) = modules::find_module(conn, &fragment.name, &fragment.manufacturer).await? {
        return Ok(existing.id);
    }

    let new_module = match &placement.details {
        Some(details) => details.clone(),
        None => merge_details(fragment, None),
    };
    Ok(modules::insert_module(conn, &new_module).await?.id)
}

/// Listing identity plus whatever the detail page added
///
/// The rack listing's name and manufacturer stay the module identity; detail
/// attributes fill in the rest. Defaults from an unreadable detail page are
/// never stored: listing values win and the description stays empty.
fn merge_details(fragment: &ModuleFragment, details: Option<ModuleAttributes>) -> NewModule {
    let listing_type = || {
        fragment
            .module_type
            .clone()
            .unwrap_or_else(|| ModuleCategory::classify(&fragment.name).as_str().to_string())
    };

    match details {
        Some(details) if details.provenance == Provenance::Extracted => NewModule {
            name: fragment.name.clone(),
            manufacturer: fragment.manufacturer.clone(),
            hp_width: details.hp_width.or(fragment.hp_width),
            module_type: Some(details.module_type),
            description: details.description,
            manual_url: details.manual_url,
            image_url: details.image_url.or_else(|| fragment.image_url.clone()),
            modulargrid_url: fragment.module_url.clone().or(details.modulargrid_url),
        },
        Some(defaults) => NewModule {
            name: fragment.name.clone(),
            manufacturer: fragment.manufacturer.clone(),
            hp_width: fragment.hp_width.or(defaults.hp_width),
            module_type: Some(listing_type()),
            description: None,
            manual_url: None,
            image_url: fragment.image_url.clone(),
            modulargrid_url: fragment.module_url.clone(),
        },
        None => NewModule {
            name: fragment.name.clone(),
            manufacturer: fragment.manufacturer.clone(),
            hp_width: fragment.hp_width,
            module_type: Some(listing_type()),
            description: None,
            manual_url: None,
            image_url: fragment.image_url.clone(),
            modulargrid_url: fragment.module_url.clone(),
        },
    }
}

/// Stored rack with its modules
pub async fn rack_result(conn: &mut SqliteConnection, rack: UserRack, cached: bool) -> Result<RackResult, Error> {
    let modules = racks::rack_modules(conn, rack.id).await?;
    let provenance = rack.provenance();

    Ok(RackResult {
        rack_id: rack.id,
        modulargrid_id: rack.modulargrid_id,
        modulargrid_url: rack.modulargrid_url,
        rack_name: rack.rack_name.unwrap_or_else(|| DEFAULT_RACK_TITLE.to_string()),
        provenance,
        cached,
        modules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_rack_id() {
        assert_eq!(
            extract_rack_id("https://www.modulargrid.net/e/racks/view/12345").unwrap(),
            "12345"
        );
        assert_eq!(
            extract_rack_id("https://www.modulargrid.net/e/racks/view/987?tab=list").unwrap(),
            "987"
        );
    }

    #[test]
    fn test_invalid_url_names_expected_shape() {
        for url in [
            "https://www.modulargrid.net/e/racks/12345",
            "https://www.modulargrid.net/e/racks/view/abc",
            "not a url",
            "",
        ] {
            let err = extract_rack_id(url).unwrap_err();
            assert!(matches!(err, ParseError::InvalidUrl(_)), "{}", url);
            assert!(err.to_string().contains(EXPECTED_URL_FORMAT));
        }
    }

    fn fragment() -> ModuleFragment {
        ModuleFragment {
            name: "Quad VCA".to_string(),
            manufacturer: "Intellijel".to_string(),
            module_url: Some("https://www.modulargrid.net/e/intellijel-quad-vca".to_string()),
            hp_width: Some(12),
            module_type: None,
            image_url: None,
            position: None,
        }
    }

    #[test]
    fn test_merge_keeps_listing_identity() {
        let details = ModuleAttributes {
            name: "Quad VCA (2020)".to_string(),
            manufacturer: "Intellijel Designs".to_string(),
            hp_width: Some(12),
            module_type: "VCA".to_string(),
            description: Some("Four VCAs".to_string()),
            manual_url: None,
            image_url: None,
            modulargrid_url: None,
            provenance: Provenance::Extracted,
        };

        let merged = merge_details(&fragment(), Some(details));
        assert_eq!(merged.name, "Quad VCA");
        assert_eq!(merged.manufacturer, "Intellijel");
        assert_eq!(merged.module_type.as_deref(), Some("VCA"));
        assert_eq!(merged.description.as_deref(), Some("Four VCAs"));
    }

    #[test]
    fn test_merge_prefers_listing_over_defaults() {
        let merged = merge_details(&fragment(), Some(ModuleAttributes::defaults(None)));
        assert_eq!(merged.hp_width, Some(12));
        assert_eq!(merged.module_type.as_deref(), Some("VCA"));
        assert_eq!(merged.description, None);
    }

    #[test]
    fn test_listing_class_type_beats_name_guess() {
        let listed = ModuleFragment {
            name: "Thing".to_string(),
            manufacturer: "Acme".to_string(),
            module_type: Some("Oscillator".to_string()),
            ..fragment()
        };

        let merged = merge_details(&listed, Some(ModuleAttributes::defaults(None)));
        assert_eq!(merged.module_type.as_deref(), Some("Oscillator"));

        let unlisted = merge_details(&listed, None);
        assert_eq!(unlisted.module_type.as_deref(), Some("Oscillator"));
    }
}
