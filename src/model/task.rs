use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::date_util::parse_instant;
use crate::error::{Error, Result};

/// Workflow status of a task.
///
/// Overdue is not a status; see [`is_overdue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    /// Display/storage string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
        }
    }

    /// Classify a stored status string.
    ///
    /// Empty means `Pending`. Returns `None` for anything unrecognized,
    /// including the legacy persisted "Overdue".
    pub fn classify(raw: &str) -> Option<Self> {
        let s = raw.trim().to_lowercase();
        match s.as_str() {
            "" | "pending" => Some(TaskStatus::Pending),
            "in progress" | "in-progress" | "in_progress" | "inprogress" => {
                Some(TaskStatus::InProgress)
            }
            "completed" | "complete" | "done" => Some(TaskStatus::Completed),
            _ => None,
        }
    }

    /// Parse user input into a status. Unlike [`TaskStatus::classify`],
    /// unknown and empty values are rejected.
    pub fn parse(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(Error::Validation("status must not be empty".into()));
        }
        if s.trim().eq_ignore_ascii_case("overdue") {
            return Err(Error::Validation(
                "overdue is derived from the due date and cannot be set".into(),
            ));
        }
        Self::classify(s).ok_or_else(|| {
            Error::Validation(format!(
                "unknown status '{s}' (expected: pending, in progress, completed)"
            ))
        })
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task is overdue when its due instant has passed and it is not completed.
pub fn is_overdue(due_at: DateTime<Utc>, status: Option<TaskStatus>, now: DateTime<Utc>) -> bool {
    due_at < now && status != Some(TaskStatus::Completed)
}

/// A normalized task snapshot, as consumed by the stats aggregator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    /// `None` when the stored status was not recognized.
    pub status: Option<TaskStatus>,
    pub due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub assignee_id: String,
    pub assigner_id: String,
}

impl TaskRecord {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        is_overdue(self.due_at, self.status, now)
    }

    pub fn is_completed(&self) -> bool {
        self.status == Some(TaskStatus::Completed)
    }

    /// Status label for display; unrecognized statuses show as "Unknown".
    pub fn status_label(&self) -> &'static str {
        self.status.map_or("Unknown", |s| s.as_str())
    }
}

/// A task row as stored, before default substitution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTask {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub due_at: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub assignee_id: Option<String>,
    pub assigner_id: Option<String>,
}

impl RawTask {
    /// Apply default substitution: unparseable or missing instants become
    /// `now`, a missing status becomes `Pending`. Never fails.
    pub fn normalize(self, now: DateTime<Utc>) -> TaskRecord {
        let due_at = instant_or_now(&self.id, "due_at", self.due_at.as_deref(), now);
        let created_at = instant_or_now(&self.id, "created_at", self.created_at.as_deref(), now);
        let updated_at = instant_or_now(&self.id, "updated_at", self.updated_at.as_deref(), now);

        let status = TaskStatus::classify(self.status.as_deref().unwrap_or(""));
        if status.is_none() {
            log::debug!(
                "task {}: unrecognized status {:?}, leaving unclassified",
                self.id,
                self.status
            );
        }

        TaskRecord {
            id: self.id,
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            category: self.category.unwrap_or_default(),
            status,
            due_at,
            created_at,
            updated_at,
            assignee_id: self.assignee_id.unwrap_or_default(),
            assigner_id: self.assigner_id.unwrap_or_default(),
        }
    }
}

fn instant_or_now(
    task_id: &str,
    field: &str,
    raw: Option<&str>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match raw.and_then(parse_instant) {
        Some(dt) => dt,
        None => {
            log::debug!("task {task_id}: {field} {raw:?} missing or unparseable, using now");
            now
        }
    }
}

/// Fields for creating a task.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub assignee_id: String,
    pub due_at: DateTime<Utc>,
    #[serde(default = "default_status")]
    pub status: TaskStatus,
}

fn default_status() -> TaskStatus {
    TaskStatus::Pending
}

/// A lead's edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub assignee_id: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub status: Option<TaskStatus>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.assignee_id.is_none()
            && self.due_at.is_none()
            && self.status.is_none()
    }

    /// Apply to a record in place.
    pub fn apply(&self, task: &mut TaskRecord) {
        if let Some(ref v) = self.title {
            task.title = v.clone();
        }
        if let Some(ref v) = self.description {
            task.description = v.clone();
        }
        if let Some(ref v) = self.category {
            task.category = v.clone();
        }
        if let Some(ref v) = self.assignee_id {
            task.assignee_id = v.clone();
        }
        if let Some(v) = self.due_at {
            task.due_at = v;
        }
        if let Some(v) = self.status {
            task.status = Some(v);
        }
    }
}
