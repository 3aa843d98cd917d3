//! Repository functions over the Europatch store
//!
//! Every function takes `&mut SqliteConnection`, so it runs the same on a
//! pooled connection (`&mut *pool.acquire().await?`) or inside a transaction
//! (`&mut *tx`).

pub mod forum;
pub mod modules;
pub mod patches;
pub mod racks;
