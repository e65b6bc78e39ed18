//! Taskboard Core - Shared domain model for the Taskboard tools
//!
//! Holds the project/task entities, their enumerated field values, and the
//! patch/filter types exchanged between the MCP server and the store.

pub mod model;
pub mod paths;

pub use model::{NewTask, Priority, Project, ProjectPatch, Status, Task, TaskFilter, TaskPatch};
pub use paths::Paths;
