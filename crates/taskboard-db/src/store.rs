//! SQLite database operations for projects and tasks

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::{Deserialize, Serialize};

use taskboard_core::{NewTask, Priority, Project, ProjectPatch, Status, Task, TaskFilter, TaskPatch};

use crate::error::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    client TEXT,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    description TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'medium',
    status TEXT NOT NULL DEFAULT 'pending',
    category TEXT,
    assignee TEXT,
    due_date TEXT,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_priority ON tasks(priority);
CREATE INDEX IF NOT EXISTS idx_tasks_category ON tasks(category);
CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON tasks(assignee);
CREATE INDEX IF NOT EXISTS idx_tasks_due_date ON tasks(due_date);
"#;

/// Timestamp format for the created_at/updated_at columns. UTC, millisecond
/// precision, sorts lexically in creation order.
const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S%.3f";

fn now() -> String {
    Utc::now().format(TIMESTAMP_FMT).to_string()
}

/// Per-status task counts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: i64,
    #[serde(rename = "in-progress")]
    pub in_progress: i64,
    pub developed: i64,
    pub tested: i64,
    pub deployed: i64,
    pub blocked: i64,
}

impl StatusCounts {
    fn add(&mut self, status: Status, count: i64) {
        match status {
            Status::Pending => self.pending += count,
            Status::InProgress => self.in_progress += count,
            Status::Developed => self.developed += count,
            Status::Tested => self.tested += count,
            Status::Deployed => self.deployed += count,
            Status::Blocked => self.blocked += count,
        }
    }
}

/// Per-priority task counts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub low: i64,
    pub medium: i64,
    pub high: i64,
    pub critical: i64,
}

impl PriorityCounts {
    fn add(&mut self, priority: Priority, count: i64) {
        match priority {
            Priority::Low => self.low += count,
            Priority::Medium => self.medium += count,
            Priority::High => self.high += count,
            Priority::Critical => self.critical += count,
        }
    }
}

/// A project with its task counts, as returned by project listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectWithCounts {
    pub id: i64,
    pub name: String,
    pub client: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub total_tasks: i64,
    pub task_counts: StatusCounts,
}

/// Aggregate summary for a single project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_id: i64,
    pub project_name: String,
    pub total: i64,
    pub by_status: StatusCounts,
    pub by_priority: PriorityCounts,
    pub completion_percentage: i64,
    pub progress_percentage: i64,
}

/// Store for projects and tasks
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        // WAL for durability under concurrent readers; foreign_keys is off
        // by default in SQLite and the task -> project cascade needs it
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self { conn })
    }

    /// Insert a project and return its id
    pub fn create_project(
        &mut self,
        name: &str,
        client: Option<&str>,
        description: Option<&str>,
    ) -> Result<i64, StoreError> {
        let ts = now();
        self.conn.execute(
            "INSERT INTO projects (name, client, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![name, client, description, ts],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Fetch a single project by id
    pub fn get_project(&self, id: i64) -> Result<Option<Project>, StoreError> {
        let project = self
            .conn
            .query_row(
                "SELECT id, name, client, description, created_at, updated_at
                 FROM projects WHERE id = ?1",
                params![id],
                row_to_project,
            )
            .optional()?;
        Ok(project)
    }

    /// List projects with per-status task counts, newest-updated first
    pub fn get_projects(&self, client: Option<&str>) -> Result<Vec<ProjectWithCounts>, StoreError> {
        let mut sql = String::from(
            "SELECT p.id, p.name, p.client, p.description, p.created_at, p.updated_at,
                    COUNT(t.id),
                    SUM(CASE WHEN t.status = 'pending' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN t.status = 'in-progress' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN t.status = 'developed' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN t.status = 'tested' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN t.status = 'deployed' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN t.status = 'blocked' THEN 1 ELSE 0 END)
             FROM projects p
             LEFT JOIN tasks t ON t.project_id = p.id",
        );

        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(client) = client {
            sql.push_str(" WHERE p.client = ?1");
            values.push(Box::new(client.to_string()));
        }
        sql.push_str(" GROUP BY p.id ORDER BY p.updated_at DESC, p.id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), row_to_project_with_counts)?;

        let mut projects = Vec::new();
        for row in rows {
            projects.push(row?);
        }
        Ok(projects)
    }

    /// Patch project fields. Only name, client and description are writable.
    pub fn update_project(&mut self, id: i64, patch: &ProjectPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Err(StoreError::EmptyUpdate);
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(name) = &patch.name {
            sets.push("name = ?");
            values.push(Box::new(name.clone()));
        }
        if let Some(client) = &patch.client {
            sets.push("client = ?");
            values.push(Box::new(client.clone()));
        }
        if let Some(description) = &patch.description {
            sets.push("description = ?");
            values.push(Box::new(description.clone()));
        }
        sets.push("updated_at = ?");
        values.push(Box::new(now()));
        values.push(Box::new(id));

        let sql = format!("UPDATE projects SET {} WHERE id = ?", sets.join(", "));
        let params_refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let affected = self.conn.execute(&sql, params_refs.as_slice())?;

        if affected == 0 {
            return Err(StoreError::NotFound {
                entity: "Project",
                id,
            });
        }
        Ok(())
    }

    /// Delete a project. Its tasks go with it via the foreign-key cascade.
    pub fn delete_project(&mut self, id: i64) -> Result<(), StoreError> {
        let affected = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", params![id])?;

        if affected == 0 {
            return Err(StoreError::NotFound {
                entity: "Project",
                id,
            });
        }
        Ok(())
    }

    /// Insert a task and return its id. Touches the parent project's
    /// updated_at in the same transaction.
    pub fn add_task(&mut self, task: &NewTask) -> Result<i64, StoreError> {
        let ts = now();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO tasks (project_id, description, priority, status, category,
                                assignee, due_date, notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                task.project_id,
                task.description,
                task.priority.as_str(),
                Status::Pending.as_str(),
                task.category,
                task.assignee,
                task.due_date,
                task.notes,
                ts,
            ],
        )?;
        let task_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
            params![ts, task.project_id],
        )?;

        tx.commit()?;
        Ok(task_id)
    }

    /// Patch task fields from the allowed set. Touches both the task's and
    /// the parent project's updated_at.
    pub fn update_task(&mut self, id: i64, patch: &TaskPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Err(StoreError::EmptyUpdate);
        }

        let tx = self.conn.transaction()?;

        let project_id: Option<i64> = tx
            .query_row(
                "SELECT project_id FROM tasks WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let project_id = match project_id {
            Some(pid) => pid,
            None => return Err(StoreError::NotFound { entity: "Task", id }),
        };

        let ts = now();
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(description) = &patch.description {
            sets.push("description = ?");
            values.push(Box::new(description.clone()));
        }
        if let Some(priority) = patch.priority {
            sets.push("priority = ?");
            values.push(Box::new(priority.as_str()));
        }
        if let Some(status) = patch.status {
            sets.push("status = ?");
            values.push(Box::new(status.as_str()));
        }
        if let Some(category) = &patch.category {
            sets.push("category = ?");
            values.push(Box::new(category.clone()));
        }
        if let Some(assignee) = &patch.assignee {
            sets.push("assignee = ?");
            values.push(Box::new(assignee.clone()));
        }
        if let Some(due_date) = &patch.due_date {
            sets.push("due_date = ?");
            values.push(Box::new(due_date.clone()));
        }
        if let Some(notes) = &patch.notes {
            sets.push("notes = ?");
            values.push(Box::new(notes.clone()));
        }
        sets.push("updated_at = ?");
        values.push(Box::new(ts.clone()));
        values.push(Box::new(id));

        let sql = format!("UPDATE tasks SET {} WHERE id = ?", sets.join(", "));
        let params_refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        tx.execute(&sql, params_refs.as_slice())?;

        tx.execute(
            "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
            params![ts, project_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Delete a task. Touches the parent project's updated_at.
    pub fn delete_task(&mut self, id: i64) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;

        let project_id: Option<i64> = tx
            .query_row(
                "SELECT project_id FROM tasks WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let project_id = match project_id {
            Some(pid) => pid,
            None => return Err(StoreError::NotFound { entity: "Task", id }),
        };

        tx.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        tx.execute(
            "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
            params![now(), project_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Query tasks with optional filters, newest-created first
    pub fn get_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut sql = String::from(
            "SELECT id, project_id, description, priority, status, category,
                    assignee, due_date, notes, created_at, updated_at
             FROM tasks",
        );

        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(project_id) = filter.project_id {
            clauses.push("project_id = ?");
            values.push(Box::new(project_id));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(Box::new(status.as_str()));
        }
        if let Some(priority) = filter.priority {
            clauses.push("priority = ?");
            values.push(Box::new(priority.as_str()));
        }
        if let Some(category) = &filter.category {
            clauses.push("category = ?");
            values.push(Box::new(category.clone()));
        }
        if let Some(assignee) = &filter.assignee {
            clauses.push("assignee = ?");
            values.push(Box::new(assignee.clone()));
        }
        if let Some(search) = &filter.search {
            clauses.push("(description LIKE ? OR notes LIKE ?)");
            let pattern = format!("%{}%", search);
            values.push(Box::new(pattern.clone()));
            values.push(Box::new(pattern));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), row_to_task)?;

        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// Aggregate per-status and per-priority counts plus derived percentages
    pub fn get_project_summary(&self, project_id: i64) -> Result<ProjectSummary, StoreError> {
        let name: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM projects WHERE id = ?1",
                params![project_id],
                |row| row.get(0),
            )
            .optional()?;
        let project_name = match name {
            Some(n) => n,
            None => {
                return Err(StoreError::NotFound {
                    entity: "Project",
                    id: project_id,
                })
            }
        };

        let mut stmt = self.conn.prepare(
            "SELECT status, priority, COUNT(*) FROM tasks
             WHERE project_id = ?1 GROUP BY status, priority",
        )?;
        let rows = stmt.query_map(params![project_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut total = 0i64;
        let mut by_status = StatusCounts::default();
        let mut by_priority = PriorityCounts::default();
        for row in rows {
            let (status, priority, count) = row?;
            total += count;
            if let Some(status) = Status::parse(&status) {
                by_status.add(status, count);
            }
            if let Some(priority) = Priority::parse(&priority) {
                by_priority.add(priority, count);
            }
        }

        let completion_percentage = percentage(by_status.deployed, total);
        let progress_percentage = percentage(
            by_status.developed + by_status.tested + by_status.deployed,
            total,
        );

        Ok(ProjectSummary {
            project_id,
            project_name,
            total,
            by_status,
            by_priority,
            completion_percentage,
            progress_percentage,
        })
    }

    /// Distinct non-empty assignees, sorted, optionally limited to one project
    pub fn get_assignees(&self, project_id: Option<i64>) -> Result<Vec<String>, StoreError> {
        let mut sql = String::from(
            "SELECT DISTINCT assignee FROM tasks
             WHERE assignee IS NOT NULL AND assignee != ''",
        );

        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(project_id) = project_id {
            sql.push_str(" AND project_id = ?1");
            values.push(Box::new(project_id));
        }
        sql.push_str(" ORDER BY assignee");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), |row| row.get::<_, String>(0))?;

        let mut assignees = Vec::new();
        for row in rows {
            assignees.push(row?);
        }
        Ok(assignees)
    }
}

fn percentage(part: i64, total: i64) -> i64 {
    if total == 0 {
        return 0;
    }
    (part as f64 / total as f64 * 100.0).round() as i64
}

fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        client: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn row_to_project_with_counts(row: &rusqlite::Row) -> rusqlite::Result<ProjectWithCounts> {
    // SUM over an empty LEFT JOIN group is NULL
    Ok(ProjectWithCounts {
        id: row.get(0)?,
        name: row.get(1)?,
        client: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        total_tasks: row.get(6)?,
        task_counts: StatusCounts {
            pending: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
            in_progress: row.get::<_, Option<i64>>(8)?.unwrap_or(0),
            developed: row.get::<_, Option<i64>>(9)?.unwrap_or(0),
            tested: row.get::<_, Option<i64>>(10)?.unwrap_or(0),
            deployed: row.get::<_, Option<i64>>(11)?.unwrap_or(0),
            blocked: row.get::<_, Option<i64>>(12)?.unwrap_or(0),
        },
    })
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let priority: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        description: row.get(2)?,
        priority: Priority::parse(&priority).unwrap_or_default(),
        status: Status::parse(&status).unwrap_or_default(),
        category: row.get(5)?,
        assignee: row.get(6)?,
        due_date: row.get(7)?,
        notes: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
