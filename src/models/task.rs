use std::{fmt, str::FromStr};

use jiff::{Timestamp, civil::Date};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{RecordId, wire};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Millisecond timestamp id assigned at creation
    pub id: RecordId,
    /// Title of the task
    #[serde(deserialize_with = "wire::text")]
    pub title: String,
    /// Free text instructions
    #[serde(default, deserialize_with = "wire::text")]
    pub description: String,
    /// Day the task is due
    #[serde(deserialize_with = "wire::deadline")]
    pub deadline: Date,
    pub priority: Priority,
    /// User the task was assigned to
    pub assigned_to: RecordId,
    /// User who assigned the task
    pub assigned_by: RecordId,
    pub status: TaskStatus,
    /// When the task was created
    pub created_at: Timestamp,
    /// When the task was completed, set iff `status` is completed
    #[serde(
        default,
        deserialize_with = "wire::optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<Timestamp>,
    /// Link to the uploaded work file
    #[serde(
        default,
        deserialize_with = "wire::optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_link: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown priority '{0}'. Expected one of: high, medium, low")]
pub struct UnknownPriority(String);

impl FromStr for Priority {
    type Err = UnknownPriority;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(UnknownPriority(s.to_string())),
        }
    }
}

/// Stored lifecycle. Only ever moves forward one step at a time.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    fn next(self) -> Option<TaskStatus> {
        match self {
            TaskStatus::Pending => Some(TaskStatus::InProgress),
            TaskStatus::InProgress => Some(TaskStatus::Completed),
            TaskStatus::Completed => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a task shows as. Overdue is never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisplayStatus {
    Pending,
    InProgress,
    Completed,
    Overdue,
}

impl DisplayStatus {
    pub fn label(self) -> &'static str {
        match self {
            DisplayStatus::Pending => "Pending",
            DisplayStatus::InProgress => "In progress",
            DisplayStatus::Completed => "Completed",
            DisplayStatus::Overdue => "Overdue",
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown status '{0}'. Expected one of: pending, in_progress, completed, overdue")]
pub struct UnknownStatus(String);

impl FromStr for DisplayStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(DisplayStatus::Pending),
            "in_progress" => Ok(DisplayStatus::InProgress),
            "completed" | "done" => Ok(DisplayStatus::Completed),
            "overdue" => Ok(DisplayStatus::Overdue),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("Task '{title}' is {from} and cannot move to {to}")]
    OutOfOrder {
        title: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

impl Task {
    /// Past its deadline and not completed. A task due today is not overdue
    /// until the day is over.
    pub fn is_overdue(&self, today: Date) -> bool {
        self.status != TaskStatus::Completed && self.deadline < today
    }

    pub fn display_status(&self, today: Date) -> DisplayStatus {
        match self.status {
            TaskStatus::Completed => DisplayStatus::Completed,
            _ if self.is_overdue(today) => DisplayStatus::Overdue,
            TaskStatus::InProgress => DisplayStatus::InProgress,
            TaskStatus::Pending => DisplayStatus::Pending,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status != TaskStatus::Completed
    }

    /// Returns the task moved one step forward to `to`, stamping
    /// `completed_at` when it reaches completed.
    pub fn advance(&self, to: TaskStatus, now: Timestamp) -> Result<Task, TransitionError> {
        if self.status.next() != Some(to) {
            return Err(TransitionError::OutOfOrder {
                title: self.title.clone(),
                from: self.status,
                to,
            });
        }
        let mut updated = self.clone();
        updated.status = to;
        updated.completed_at = (to == TaskStatus::Completed).then_some(now);
        Ok(updated)
    }

    /// Whether `completed_at` agrees with `status`.
    pub fn is_consistent(&self) -> bool {
        self.completed_at.is_some() == (self.status == TaskStatus::Completed)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::task;
    use super::*;

    fn date(raw: &str) -> Date {
        raw.parse().unwrap()
    }

    #[test]
    fn test_past_deadline_open_task_is_overdue() {
        let today = date("2025-03-10");
        for status in [TaskStatus::Pending, TaskStatus::InProgress] {
            let t = task("1", "2025-03-09", status);
            assert!(t.is_overdue(today));
            assert_eq!(t.display_status(today), DisplayStatus::Overdue);
        }
    }

    #[test]
    fn test_completed_task_is_never_overdue() {
        let t = task("1", "2025-01-01", TaskStatus::Completed);
        let today = date("2025-03-10");
        assert!(!t.is_overdue(today));
        assert_eq!(t.display_status(today), DisplayStatus::Completed);
    }

    #[test]
    fn test_due_today_is_not_overdue() {
        let t = task("1", "2025-03-10", TaskStatus::InProgress);
        assert_eq!(t.display_status(date("2025-03-10")), DisplayStatus::InProgress);
        assert_eq!(t.display_status(date("2025-03-11")), DisplayStatus::Overdue);
    }

    #[test]
    fn test_advance_walks_the_lifecycle() {
        let now: Timestamp = "2025-03-05T08:00:00Z".parse().unwrap();
        let pending = task("1", "2025-03-09", TaskStatus::Pending);
        assert!(pending.is_consistent());

        let started = pending.advance(TaskStatus::InProgress, now).unwrap();
        assert_eq!(started.status, TaskStatus::InProgress);
        assert!(started.completed_at.is_none());
        assert!(started.is_consistent());

        let done = started.advance(TaskStatus::Completed, now).unwrap();
        assert_eq!(done.completed_at, Some(now));
        assert!(done.is_consistent());
    }

    #[test]
    fn test_advance_rejects_skips_and_regressions() {
        let now = Timestamp::UNIX_EPOCH;
        let pending = task("1", "2025-03-09", TaskStatus::Pending);
        assert!(matches!(
            pending.advance(TaskStatus::Completed, now),
            Err(TransitionError::OutOfOrder { .. })
        ));
        let done = task("2", "2025-03-09", TaskStatus::Completed);
        assert!(done.advance(TaskStatus::InProgress, now).is_err());
        assert!(done.advance(TaskStatus::Completed, now).is_err());
    }

    #[test]
    fn test_reads_sheet_row() {
        let json = r#"{
            "id": 1741000000000,
            "title": "Budget plan",
            "description": "Draft the 2025 plan",
            "deadline": "2025-03-20",
            "priority": "high",
            "assignedTo": 1733900000000,
            "assignedBy": "1733800000000",
            "status": "in_progress",
            "createdAt": "2025-03-03T04:00:00.000Z",
            "completedAt": "",
            "fileLink": ""
        }"#;
        let t: Task = serde_json::from_str(json).unwrap();
        assert_eq!(t.assigned_to.as_str(), "1733900000000");
        assert_eq!(t.status, TaskStatus::InProgress);
        assert_eq!(t.priority, Priority::High);
        assert!(t.completed_at.is_none());
        assert!(t.file_link.is_none());
    }

    #[test]
    fn test_new_task_serializes_without_completion() {
        let t = task("1", "2025-03-09", TaskStatus::Pending);
        let value = serde_json::to_value(&t).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["deadline"], "2025-03-09");
        assert!(value.get("completedAt").is_none());
    }
}
