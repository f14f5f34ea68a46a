//! Databases, their collections and the catalog that owns both.
mod catalog;
mod database;

pub use catalog::Catalog;
pub use database::{CollectionSpec, Database};
