//! Tool Handler
//!
//! Validates tool arguments and executes them against the store. Failures
//! come back as plain messages; the server wraps them in JSON-RPC error
//! envelopes.

use serde_json::{json, Map, Value};

use taskboard_core::{NewTask, Priority, ProjectPatch, Status, TaskFilter, TaskPatch};
use taskboard_db::Database;

/// A required string argument: present, a string, non-empty after trimming.
/// Returns the trimmed value, which is what gets stored.
fn require_text(args: &Map<String, Value>, key: &str) -> Result<String, String> {
    match optional_text(args, key)? {
        Some(value) => nonempty(value, key),
        None => Err(format!("Missing required argument: {}", key)),
    }
}

/// An optional string argument. JSON null counts as absent.
fn optional_text(args: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("Argument '{}' must be a string", key)),
    }
}

/// An optional string argument that, when present, must not be blank.
/// Used for patch fields that are required on the entity itself.
fn optional_nonempty_text(args: &Map<String, Value>, key: &str) -> Result<Option<String>, String> {
    match optional_text(args, key)? {
        Some(value) => nonempty(value, key).map(Some),
        None => Ok(None),
    }
}

fn nonempty(value: String, key: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("Argument '{}' must not be empty", key));
    }
    Ok(trimmed.to_string())
}

/// A required positive integer id
fn require_id(args: &Map<String, Value>, key: &str) -> Result<i64, String> {
    match optional_id(args, key)? {
        Some(id) => Ok(id),
        None => Err(format!("Missing required argument: {}", key)),
    }
}

fn optional_id(args: &Map<String, Value>, key: &str) -> Result<Option<i64>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_i64() {
            Some(id) if id > 0 => Ok(Some(id)),
            _ => Err(format!("Argument '{}' must be a positive integer", key)),
        },
    }
}

fn optional_priority(args: &Map<String, Value>) -> Result<Option<Priority>, String> {
    match optional_text(args, "priority")? {
        Some(value) => match Priority::parse(&value) {
            Some(priority) => Ok(Some(priority)),
            None => Err(format!(
                "Invalid priority '{}' (allowed: {})",
                value,
                Priority::ALL.map(|p| p.as_str()).join(", ")
            )),
        },
        None => Ok(None),
    }
}

fn optional_status(args: &Map<String, Value>) -> Result<Option<Status>, String> {
    match optional_text(args, "status")? {
        Some(value) => match Status::parse(&value) {
            Some(status) => Ok(Some(status)),
            None => Err(format!(
                "Invalid status '{}' (allowed: {})",
                value,
                Status::ALL.map(|s| s.as_str()).join(", ")
            )),
        },
        None => Ok(None),
    }
}

/// Execute one tool call. Ok carries the success payload that the server
/// JSON-encodes into the tool result; Err carries a human-readable message.
pub fn handle_tool(
    db: &mut Database,
    name: &str,
    arguments: &Map<String, Value>,
) -> Result<Value, String> {
    match name {
        "create_project" => {
            let name = require_text(arguments, "name")?;
            let client = optional_text(arguments, "client")?;
            let description = optional_text(arguments, "description")?;

            let project_id = db
                .create_project(&name, client.as_deref(), description.as_deref())
                .map_err(|e| e.to_string())?;

            Ok(json!({
                "success": true,
                "project_id": project_id,
                "message": format!("Created project '{}' (id {})", name, project_id),
            }))
        }
        "update_project" => {
            let id = require_id(arguments, "id")?;
            let patch = ProjectPatch {
                name: optional_nonempty_text(arguments, "name")?,
                client: optional_text(arguments, "client")?,
                description: optional_text(arguments, "description")?,
            };

            db.update_project(id, &patch).map_err(|e| e.to_string())?;

            Ok(json!({
                "success": true,
                "message": format!("Updated project {}", id),
            }))
        }
        "list_projects" => {
            let client = optional_text(arguments, "client")?;
            let projects = db
                .get_projects(client.as_deref())
                .map_err(|e| e.to_string())?;

            Ok(json!({ "projects": projects }))
        }
        "delete_project" => {
            let id = require_id(arguments, "id")?;
            db.delete_project(id).map_err(|e| e.to_string())?;

            Ok(json!({
                "success": true,
                "message": format!("Deleted project {} and its tasks", id),
            }))
        }
        "add_task" => {
            let project_id = require_id(arguments, "project_id")?;
            let description = require_text(arguments, "description")?;

            // Resolve the project first so the caller gets a named error
            // instead of a foreign key violation
            if db
                .get_project(project_id)
                .map_err(|e| e.to_string())?
                .is_none()
            {
                return Err(format!("Project {} not found", project_id));
            }

            let task = NewTask {
                project_id,
                description,
                priority: optional_priority(arguments)?.unwrap_or_default(),
                category: optional_text(arguments, "category")?,
                assignee: optional_text(arguments, "assignee")?,
                due_date: optional_text(arguments, "due_date")?,
                notes: optional_text(arguments, "notes")?,
            };
            let task_id = db.add_task(&task).map_err(|e| e.to_string())?;

            Ok(json!({
                "success": true,
                "task_id": task_id,
                "message": format!("Added task {} to project {}", task_id, project_id),
            }))
        }
        "update_task" => {
            let id = require_id(arguments, "id")?;
            let patch = TaskPatch {
                description: optional_nonempty_text(arguments, "description")?,
                priority: optional_priority(arguments)?,
                status: optional_status(arguments)?,
                category: optional_text(arguments, "category")?,
                assignee: optional_text(arguments, "assignee")?,
                due_date: optional_text(arguments, "due_date")?,
                notes: optional_text(arguments, "notes")?,
            };

            db.update_task(id, &patch).map_err(|e| e.to_string())?;

            Ok(json!({
                "success": true,
                "message": format!("Updated task {}", id),
            }))
        }
        "get_tasks" => {
            let filter = TaskFilter {
                project_id: optional_id(arguments, "project_id")?,
                status: optional_status(arguments)?,
                priority: optional_priority(arguments)?,
                category: optional_text(arguments, "category")?,
                assignee: optional_text(arguments, "assignee")?,
                search: optional_text(arguments, "search")?,
            };
            let tasks = db.get_tasks(&filter).map_err(|e| e.to_string())?;

            Ok(json!({ "tasks": tasks }))
        }
        "delete_task" => {
            let id = require_id(arguments, "id")?;
            db.delete_task(id).map_err(|e| e.to_string())?;

            Ok(json!({
                "success": true,
                "message": format!("Deleted task {}", id),
            }))
        }
        "get_project_summary" => {
            let project_id = require_id(arguments, "project_id")?;
            let summary = db
                .get_project_summary(project_id)
                .map_err(|e| e.to_string())?;

            Ok(json!({
                "project_id": summary.project_id,
                "project_name": summary.project_name,
                "summary": {
                    "total": summary.total,
                    "by_status": summary.by_status,
                    "by_priority": summary.by_priority,
                    "completion_percentage": summary.completion_percentage,
                    "progress_percentage": summary.progress_percentage,
                },
            }))
        }
        "get_assignees" => {
            let project_id = optional_id(arguments, "project_id")?;
            let assignees = db.get_assignees(project_id).map_err(|e| e.to_string())?;

            Ok(json!({ "assignees": assignees }))
        }
        _ => Err(format!("Unknown tool: {}", name)),
    }
}
