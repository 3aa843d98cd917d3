//! HTTP API handlers
//!
//! JSON in and out under `/api`; `/health` is also served at the root.

pub mod health;
pub mod modules;
pub mod patches;
pub mod racks;

pub use health::health_routes;
pub use modules::module_routes;
pub use patches::patch_routes;
pub use racks::rack_routes;
