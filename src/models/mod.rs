//! Data models for the directory core.
//!
//! Field names serialize in camelCase to match the remote document store.

mod cache;
mod record;
mod unit;

pub use cache::*;
pub use record::*;
pub use unit::*;
