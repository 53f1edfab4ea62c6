use tracing::debug;

use crate::{
    backend::{Backend, BackendError},
    models::store::Store,
};

pub mod announcements;
pub mod auth;
pub mod problems;
pub mod tasks;
pub mod uploads;
pub mod users;

/// Replaces the store with a fresh read of the sheet. Mutations call it before
/// checking anything against the store and again after the submit is
/// accepted; a failed read leaves the old store in place.
pub fn refresh(store: &mut Store, backend: &dyn Backend) -> Result<(), BackendError> {
    let fresh = Store::from_rows(backend.get_all()?);
    debug!(records = fresh.records().len(), "store refreshed");
    *store = fresh;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::sheet_with;
    use crate::{
        models::{
            RecordId,
            announcement::Announcement,
            problem::{Problem, ProblemCategory},
            record::{Record, RecordKind},
            role::Role,
            store::RECORD_LIMIT,
            task::{Priority, TaskStatus, fixtures::task},
            user::User,
        },
        services::{
            announcements::{PostAnnouncementError, PostAnnouncementParameters, post_announcement},
            problems::{ReportProblemError, ReportProblemParameters, report_problem},
            tasks::{AssignTaskError, AssignTaskParameters, assign_task},
            users::{AddUserError, AddUserParameters, add_user},
        },
        views::fixtures::{school, user},
    };

    /// The school fixture topped up with fillers until `kind` hits the cap.
    fn school_full_of(kind: RecordKind) -> Vec<Record> {
        let mut records = school().records().to_vec();
        let existing = records.iter().filter(|r| r.kind() == kind).count();
        for n in existing..RECORD_LIMIT {
            let id = RecordId::new(format!("fill-{n}"));
            let created_at = "2025-03-01T00:00:00Z".parse().unwrap();
            records.push(match kind {
                RecordKind::User => Record::User(User::new(
                    id,
                    format!("filler{n}"),
                    "pw".to_string(),
                    format!("Filler {n}"),
                    Role::parse("teacher_general"),
                    created_at,
                )),
                RecordKind::Task => {
                    Record::Task(task(id.as_str(), "2025-04-01", TaskStatus::Pending))
                }
                RecordKind::Announcement => Record::Announcement(Announcement {
                    id,
                    title: format!("Notice {n}"),
                    message: String::new(),
                    author: RecordId::from("dir"),
                    created_at,
                }),
                RecordKind::Problem => Record::Problem(Problem {
                    id,
                    category: ProblemCategory::Other,
                    message: format!("Problem {n}"),
                    reporter: RecordId::from("tb"),
                    created_at,
                }),
            });
        }
        records
    }

    #[test]
    fn test_record_cap_blocks_every_create() {
        let director = user("dir", "director");

        let (backend, mut store, dir) = sheet_with(&school_full_of(RecordKind::Task));
        assert_eq!(store.count(RecordKind::Task), RECORD_LIMIT);
        let assignment = AssignTaskParameters {
            title: "One too many".to_string(),
            description: String::new(),
            deadline: "2025-04-01".to_string(),
            priority: Priority::Low,
            department: None,
            assignee: "tb".to_string(),
        };
        assert!(matches!(
            assign_task(&mut store, &backend, &director, assignment),
            Err(AssignTaskError::LimitReached)
        ));
        std::fs::remove_dir_all(dir).unwrap();

        let (backend, mut store, dir) = sheet_with(&school_full_of(RecordKind::Announcement));
        let notice = PostAnnouncementParameters {
            title: "One too many".to_string(),
            message: String::new(),
        };
        assert!(matches!(
            post_announcement(&mut store, &backend, &director, notice),
            Err(PostAnnouncementError::LimitReached)
        ));
        std::fs::remove_dir_all(dir).unwrap();

        let (backend, mut store, dir) = sheet_with(&school_full_of(RecordKind::Problem));
        let report = ReportProblemParameters {
            category: ProblemCategory::System,
            message: "One too many".to_string(),
        };
        assert!(matches!(
            report_problem(&mut store, &backend, &user("tb", "teacher_budget"), report),
            Err(ReportProblemError::LimitReached)
        ));
        std::fs::remove_dir_all(dir).unwrap();

        let (backend, mut store, dir) = sheet_with(&school_full_of(RecordKind::User));
        let newcomer = AddUserParameters {
            username: "newbie".to_string(),
            password: "secret".to_string(),
            full_name: "New Teacher".to_string(),
            role: Role::parse("teacher_budget"),
        };
        assert!(matches!(
            add_user(&mut store, &backend, &user("adm", "admin"), newcomer),
            Err(AddUserError::LimitReached)
        ));
        assert_eq!(store.count(RecordKind::User), RECORD_LIMIT);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_store_one_below_cap_still_accepts() {
        let mut records = school_full_of(RecordKind::Announcement);
        records.pop();
        let (backend, mut store, dir) = sheet_with(&records);
        post_announcement(
            &mut store,
            &backend,
            &user("dir", "director"),
            PostAnnouncementParameters {
                title: "Last one".to_string(),
                message: String::new(),
            },
        )
        .unwrap();
        assert!(store.is_full(RecordKind::Announcement));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
