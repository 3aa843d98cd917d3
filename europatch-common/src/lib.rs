//! # Europatch Common Library
//!
//! Shared code for the Europatch service:
//! - Bootstrap configuration loading and root folder resolution
//! - Database initialization, schema and row models
//! - Module category table used by the scraper and the patch generator
//! - Common error type

pub mod category;
pub mod config;
pub mod db;
pub mod error;

pub use category::ModuleCategory;
pub use error::{Error, Result};
