//! Database models and repositories.

mod context;
pub mod legal_cases;
pub mod models;
pub mod patents;
pub mod regulatory_updates;

pub use context::DbContext;
