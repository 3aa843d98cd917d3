//! ModularGrid scraper
//!
//! - `fetch`: outbound page fetch seam and the reqwest client
//! - `rack_page`: rack title and module block extraction
//! - `module_page`: module detail page extraction
//! - `forum_page`: forum search result extraction
//! - `selectors`: selector chains and text helpers
//! - `defaults`: literal values substituted on failure
//!
//! Parsing is synchronous and returns owned data; `scraper::Html` never lives
//! across an await point.

pub mod defaults;
pub mod fetch;
pub mod forum_page;
pub mod module_page;
pub mod rack_page;
pub mod selectors;

pub use fetch::{FetchError, HttpFetcher, PageFetcher};
pub use module_page::{extract_module_details, fetch_module_details, ModuleAttributes};
pub use rack_page::{scrape_rack_page, ModuleFragment, RackPage};
