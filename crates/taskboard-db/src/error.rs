//! Store error types

use thiserror::Error;

/// Errors surfaced by the store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("No updatable fields supplied")]
    EmptyUpdate,

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
