//! Project and task entities

use serde::{Deserialize, Serialize};

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task status, tracking progress through the delivery pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Developed,
    Tested,
    Deployed,
    Blocked,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Pending,
        Status::InProgress,
        Status::Developed,
        Status::Tested,
        Status::Deployed,
        Status::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Developed => "developed",
            Self::Tested => "tested",
            Self::Deployed => "deployed",
            Self::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in-progress" => Some(Self::InProgress),
            "developed" => Some(Self::Developed),
            "tested" => Some(Self::Tested),
            "deployed" => Some(Self::Deployed),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A project row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub client: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A task row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub project_id: i64,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    pub category: Option<String>,
    pub assignee: Option<String>,
    pub due_date: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields for creating a task. Status always starts at pending.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub project_id: i64,
    pub description: String,
    pub priority: Priority,
    pub category: Option<String>,
    pub assignee: Option<String>,
    pub due_date: Option<String>,
    pub notes: Option<String>,
}

impl NewTask {
    pub fn new(project_id: i64, description: impl Into<String>) -> Self {
        Self {
            project_id,
            description: description.into(),
            priority: Priority::default(),
            category: None,
            assignee: None,
            due_date: None,
            notes: None,
        }
    }
}

/// Partial update for a task. Only these fields are writable after creation;
/// a patch with every field unset is rejected by the store.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub category: Option<String>,
    pub assignee: Option<String>,
    pub due_date: Option<String>,
    pub notes: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.category.is_none()
            && self.assignee.is_none()
            && self.due_date.is_none()
            && self.notes.is_none()
    }
}

/// Partial update for a project
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub client: Option<String>,
    pub description: Option<String>,
}

impl ProjectPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.client.is_none() && self.description.is_none()
    }
}

/// Filters for task queries. All fields are optional and AND'd together.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<i64>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub assignee: Option<String>,
    /// Substring match against description or notes
    pub search: Option<String>,
}
