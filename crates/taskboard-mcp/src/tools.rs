//! Tool Catalog
//!
//! Definitions of the tools advertised by tools/list. Argument validation
//! lives in the handler; the schemas here are what clients see.

use serde_json::{json, Value};

use crate::protocol::{InputSchema, Tool};

/// Create a tool definition with the given name, description, and schema properties
fn tool(name: &str, description: &str, properties: Value, required: Vec<&str>) -> Tool {
    let props = properties.as_object().cloned().unwrap_or_default();
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: InputSchema {
            schema_type: "object".to_string(),
            properties: props,
            required: required.into_iter().map(|s| s.to_string()).collect(),
        },
    }
}

/// Every tool the server exposes, in the order clients list them
pub fn all_tools() -> Vec<Tool> {
    vec![
        tool(
            "create_project",
            "Create a new project, optionally recording the client it is for",
            json!({
                "name": {
                    "type": "string",
                    "description": "Project name"
                },
                "client": {
                    "type": "string",
                    "description": "Client or organization the project is for"
                },
                "description": {
                    "type": "string",
                    "description": "What the project is about"
                }
            }),
            vec!["name"],
        ),
        tool(
            "update_project",
            "Update a project's name, client or description. Only supplied fields change",
            json!({
                "id": {
                    "type": "integer",
                    "description": "Project id"
                },
                "name": {
                    "type": "string",
                    "description": "New project name"
                },
                "client": {
                    "type": "string",
                    "description": "New client or organization"
                },
                "description": {
                    "type": "string",
                    "description": "New project description"
                }
            }),
            vec!["id"],
        ),
        tool(
            "list_projects",
            "List projects with per-status task counts, most recently updated first",
            json!({
                "client": {
                    "type": "string",
                    "description": "Only projects for this client"
                }
            }),
            vec![],
        ),
        tool(
            "delete_project",
            "Delete a project and every task in it",
            json!({
                "id": {
                    "type": "integer",
                    "description": "Project id"
                }
            }),
            vec!["id"],
        ),
        tool(
            "add_task",
            "Add a task to a project",
            json!({
                "project_id": {
                    "type": "integer",
                    "description": "Project to add the task to"
                },
                "description": {
                    "type": "string",
                    "description": "What needs to be done"
                },
                "priority": {
                    "type": "string",
                    "enum": ["low", "medium", "high", "critical"],
                    "description": "Task priority (default medium)"
                },
                "category": {
                    "type": "string",
                    "description": "Free-form grouping label, e.g. frontend"
                },
                "assignee": {
                    "type": "string",
                    "description": "Who the task is assigned to"
                },
                "due_date": {
                    "type": "string",
                    "description": "Due date, YYYY-MM-DD"
                },
                "notes": {
                    "type": "string",
                    "description": "Additional context"
                }
            }),
            vec!["project_id", "description"],
        ),
        tool(
            "update_task",
            "Update fields of an existing task. Only supplied fields change",
            json!({
                "id": {
                    "type": "integer",
                    "description": "Task id"
                },
                "status": {
                    "type": "string",
                    "enum": ["pending", "in-progress", "developed", "tested", "deployed", "blocked"],
                    "description": "New status"
                },
                "notes": {
                    "type": "string",
                    "description": "New notes"
                },
                "priority": {
                    "type": "string",
                    "enum": ["low", "medium", "high", "critical"],
                    "description": "New priority"
                },
                "category": {
                    "type": "string",
                    "description": "New category"
                },
                "description": {
                    "type": "string",
                    "description": "New description"
                },
                "assignee": {
                    "type": "string",
                    "description": "New assignee"
                },
                "due_date": {
                    "type": "string",
                    "description": "New due date, YYYY-MM-DD"
                }
            }),
            vec!["id"],
        ),
        tool(
            "get_tasks",
            "Query tasks, newest first. Filters are optional and combined with AND",
            json!({
                "project_id": {
                    "type": "integer",
                    "description": "Only tasks in this project"
                },
                "status": {
                    "type": "string",
                    "enum": ["pending", "in-progress", "developed", "tested", "deployed", "blocked"],
                    "description": "Only tasks with this status"
                },
                "priority": {
                    "type": "string",
                    "enum": ["low", "medium", "high", "critical"],
                    "description": "Only tasks with this priority"
                },
                "category": {
                    "type": "string",
                    "description": "Only tasks in this category"
                },
                "assignee": {
                    "type": "string",
                    "description": "Only tasks assigned to this person"
                },
                "search": {
                    "type": "string",
                    "description": "Substring match against description and notes"
                }
            }),
            vec![],
        ),
        tool(
            "delete_task",
            "Delete a task",
            json!({
                "id": {
                    "type": "integer",
                    "description": "Task id"
                }
            }),
            vec!["id"],
        ),
        tool(
            "get_project_summary",
            "Task counts by status and priority for a project, with completion and progress percentages",
            json!({
                "project_id": {
                    "type": "integer",
                    "description": "Project id"
                }
            }),
            vec!["project_id"],
        ),
        tool(
            "get_assignees",
            "List distinct assignees across tasks, optionally within one project",
            json!({
                "project_id": {
                    "type": "integer",
                    "description": "Only assignees with tasks in this project"
                }
            }),
            vec![],
        ),
    ]
}
