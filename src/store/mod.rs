//! Result store module.
//!
//! Holds the typed model and the shared in-memory store.

mod models;
mod store;

pub use models::*;
pub use store::*;
