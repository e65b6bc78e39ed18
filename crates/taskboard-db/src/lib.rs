//! SQLite persistence for Taskboard
//!
//! Owns the projects and tasks tables, including the task -> project
//! cascade. Argument validation happens in the MCP layer; this crate
//! enforces referential integrity and rejects empty partial updates.

pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{Database, PriorityCounts, ProjectSummary, ProjectWithCounts, StatusCounts};
