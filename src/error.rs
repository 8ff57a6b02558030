// ⚠️ Catalog Errors
// Typed failures for the category store, the training flag and configuration.
// Data-access helpers in db.rs stay on anyhow like the rest of the I/O code.

use crate::category::CategoryId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Category not found: {0}")]
    CategoryNotFound(CategoryId),

    /// Category is a placeholder created from a parent reference and was never fed
    #[error("Category {0} has no row of its own")]
    CategoryNotFed(CategoryId),

    #[error("Cycle detected in parent chain of category {0}")]
    HierarchyCycle(CategoryId),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;
