use jiff::Timestamp;
use serde_json::Value;
use tracing::warn;

use crate::models::{
    RecordId,
    announcement::Announcement,
    problem::Problem,
    record::{Record, RecordKind},
    task::Task,
    user::User,
};

/// Most rows the sheet accepts per record kind.
pub const RECORD_LIMIT: usize = 999;

/// Every record from one `getAll`, in sheet order. Replaced wholesale after
/// each mutation, never patched.
#[derive(Debug, Clone, Default)]
pub struct Store {
    records: Vec<Record>,
}

impl Store {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Builds a store from raw rows, skipping the ones that do not parse.
    pub fn from_rows(rows: Vec<Value>) -> Self {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.get("id").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<Record>(row) {
                Ok(record) => {
                    if let Record::Task(task) = &record
                        && !task.is_consistent()
                    {
                        warn!(id = %task.id, status = %task.status, "task completion timestamp disagrees with status");
                    }
                    records.push(record);
                }
                Err(e) => warn!(%id, error = %e, "skipping unreadable record"),
            }
        }
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.records.iter().filter_map(|record| match record {
            Record::User(user) => Some(user),
            _ => None,
        })
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.records.iter().filter_map(|record| match record {
            Record::Task(task) => Some(task),
            _ => None,
        })
    }

    pub fn announcements(&self) -> impl Iterator<Item = &Announcement> {
        self.records.iter().filter_map(|record| match record {
            Record::Announcement(announcement) => Some(announcement),
            _ => None,
        })
    }

    pub fn problems(&self) -> impl Iterator<Item = &Problem> {
        self.records.iter().filter_map(|record| match record {
            Record::Problem(problem) => Some(problem),
            _ => None,
        })
    }

    pub fn get_user(&self, id: &RecordId) -> Option<&User> {
        self.users().find(|user| &user.id == id)
    }

    pub fn find_user_by_username(&self, username: &str) -> Option<&User> {
        self.users().find(|user| user.username == username)
    }

    pub fn get_task(&self, id: &RecordId) -> Option<&Task> {
        self.tasks().find(|task| &task.id == id)
    }

    pub fn get_announcement(&self, id: &RecordId) -> Option<&Announcement> {
        self.announcements()
            .find(|announcement| &announcement.id == id)
    }

    pub fn get_problem(&self, id: &RecordId) -> Option<&Problem> {
        self.problems().find(|problem| &problem.id == id)
    }

    pub fn count(&self, kind: RecordKind) -> usize {
        self.records
            .iter()
            .filter(|record| record.kind() == kind)
            .count()
    }

    pub fn is_full(&self, kind: RecordKind) -> bool {
        self.count(kind) >= RECORD_LIMIT
    }

    /// Timestamp id that no record in this store uses yet.
    pub fn next_id(&self, now: Timestamp) -> RecordId {
        RecordId::generate(now, |candidate| {
            self.records.iter().any(|record| record.id() == candidate)
        })
    }

    /// Full name of a user, or a placeholder for ids no longer in the sheet.
    pub fn user_name(&self, id: &RecordId) -> &str {
        self.get_user(id)
            .map(|user| user.full_name.as_str())
            .unwrap_or("Unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Value> {
        vec![
            json!({"type": "user", "id": 1, "username": "dir", "password": "pw",
                   "fullName": "Director Dee", "role": "director", "department": "all",
                   "createdAt": "2025-01-01T00:00:00Z"}),
            json!({"type": "task", "id": "2", "title": "Plan", "description": "",
                   "deadline": "2025-04-01", "priority": "low", "assignedTo": "1",
                   "assignedBy": "1", "status": "pending",
                   "createdAt": "2025-03-01T00:00:00Z"}),
            json!({"type": "memo", "id": "3"}),
            json!({"type": "task", "id": "4", "title": "Broken", "deadline": "soon"}),
        ]
    }

    #[test]
    fn test_from_rows_skips_unreadable_rows() {
        let store = Store::from_rows(rows());
        assert_eq!(store.records().len(), 2);
        assert_eq!(store.users().count(), 1);
        assert_eq!(store.tasks().count(), 1);
        assert_eq!(store.count(RecordKind::Announcement), 0);
    }

    #[test]
    fn test_lookup_by_string_id_matches_numeric_cell() {
        let store = Store::from_rows(rows());
        let user = store.get_user(&RecordId::from("1")).unwrap();
        assert_eq!(user.full_name, "Director Dee");
        assert_eq!(store.user_name(&RecordId::from("99")), "Unknown");
        assert!(store.find_user_by_username("dir").is_some());
    }

    #[test]
    fn test_next_id_avoids_existing_ids() {
        let store = Store::from_rows(vec![json!({
            "type": "user", "id": "1735689600000", "username": "a", "password": "b",
            "fullName": "A", "role": "admin", "createdAt": "2025-01-01T00:00:00Z"
        })]);
        let now: Timestamp = "2025-01-01T00:00:00Z".parse().unwrap();
        assert_eq!(store.next_id(now).as_str(), "1735689600001");
    }
}
