//! Pure projections of a [`Store`] for one viewer.
//!
//! Nothing here talks to the endpoint or caches anything: each view is
//! recomputed from the latest store on every command.

use std::collections::HashSet;

use jiff::{ToSpan, civil::Date};
use thiserror::Error;

use crate::{
    models::{
        RecordId,
        announcement::Announcement,
        problem::Problem,
        role::{Department, DepartmentScope, Role},
        store::Store,
        task::{DisplayStatus, Task, TaskStatus},
        user::User,
    },
    policy::{self, ProblemScope, TaskScope},
};

/// Tasks the viewer is allowed to see, in sheet order.
pub fn visible_tasks<'a>(store: &'a Store, viewer: &User) -> Vec<&'a Task> {
    match policy::task_scope(&viewer.role) {
        TaskScope::All => store.tasks().collect(),
        TaskScope::AssignedToSelf => store
            .tasks()
            .filter(|task| task.assigned_to == viewer.id)
            .collect(),
        TaskScope::Department(department) => {
            let members = department_member_ids(store, department);
            store
                .tasks()
                .filter(|task| {
                    members.contains(&task.assigned_to) || task.assigned_by == viewer.id
                })
                .collect()
        }
    }
}

fn department_member_ids(store: &Store, department: Department) -> HashSet<&RecordId> {
    store
        .users()
        .filter(|user| user.department() == DepartmentScope::Only(department))
        .map(|user| &user.id)
        .collect()
}

pub fn my_tasks<'a>(store: &'a Store, viewer: &User) -> Vec<&'a Task> {
    tasks_assigned_to(store, &viewer.id)
}

pub fn tasks_assigned_to<'a>(store: &'a Store, user_id: &RecordId) -> Vec<&'a Task> {
    store
        .tasks()
        .filter(|task| &task.assigned_to == user_id)
        .collect()
}

pub fn visible_problems<'a>(store: &'a Store, viewer: &User) -> Vec<&'a Problem> {
    match policy::problem_scope(&viewer.role) {
        ProblemScope::All => store.problems().collect(),
        ProblemScope::OwnReports => store
            .problems()
            .filter(|problem| problem.reporter == viewer.id)
            .collect(),
    }
}

/// Narrowing picked on the command line on top of the role scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<DisplayStatus>,
    /// Department of the assignee
    pub department: Option<Department>,
}

pub fn filter_tasks<'a>(
    store: &Store,
    tasks: Vec<&'a Task>,
    filter: TaskFilter,
    today: Date,
) -> Vec<&'a Task> {
    tasks
        .into_iter()
        .filter(|task| {
            filter
                .status
                .is_none_or(|status| task.display_status(today) == status)
        })
        .filter(|task| {
            filter.department.is_none_or(|department| {
                store
                    .get_user(&task.assigned_to)
                    .is_some_and(|user| user.department() == DepartmentScope::Only(department))
            })
        })
        .collect()
}

/// Announcements newest first, at most `limit` of them.
pub fn latest_announcements(store: &Store, limit: usize) -> Vec<&Announcement> {
    let mut announcements: Vec<_> = store.announcements().collect();
    announcements.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    announcements.truncate(limit);
    announcements
}

/// Counters shown next to the track entry of the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Badge {
    pub pending: usize,
    pub overdue: usize,
}

impl Badge {
    pub fn is_empty(&self) -> bool {
        self.pending == 0 && self.overdue == 0
    }
}

pub fn badge(store: &Store, viewer: &User, today: Date) -> Badge {
    let mine = my_tasks(store, viewer);
    Badge {
        pending: mine
            .iter()
            .filter(|task| task.status == TaskStatus::Pending)
            .count(),
        overdue: mine.iter().filter(|task| task.is_overdue(today)).count(),
    }
}

/// Users the actor may assign work to for `department`.
pub fn assignable_users<'a>(store: &'a Store, actor: &User, department: Department) -> Vec<&'a User> {
    store
        .users()
        .filter(|user| policy::can_assign_to(actor, user, department))
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct WorkloadRow<'a> {
    pub user: &'a User,
    /// Tasks not yet completed
    pub open: usize,
    pub total: usize,
}

/// Heads first, then teachers of `department`, with the task counts the
/// viewer is allowed to see.
pub fn department_workload<'a>(
    store: &'a Store,
    viewer: &User,
    department: Department,
) -> Vec<WorkloadRow<'a>> {
    let visible = visible_tasks(store, viewer);
    let heads = store
        .users()
        .filter(|user| user.role == Role::Head(department));
    let teachers = store
        .users()
        .filter(|user| user.role == Role::Teacher(department));

    heads
        .chain(teachers)
        .map(|user| {
            let assigned: Vec<_> = visible
                .iter()
                .filter(|task| task.assigned_to == user.id)
                .collect();
            WorkloadRow {
                user,
                open: assigned.iter().filter(|task| task.is_open()).count(),
                total: assigned.len(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct UpcomingTask<'a> {
    pub task: &'a Task,
    pub assignee: Option<&'a User>,
    /// 0 is today, 1 is tomorrow
    pub days_left: i32,
}

/// Open visible tasks due within the next seven days, soonest first.
pub fn upcoming_week<'a>(store: &'a Store, viewer: &User, today: Date) -> Vec<UpcomingTask<'a>> {
    let horizon = today.checked_add(7.days()).unwrap_or(today);
    let mut upcoming: Vec<_> = visible_tasks(store, viewer)
        .into_iter()
        .filter(|task| task.is_open() && task.deadline >= today && task.deadline <= horizon)
        .map(|task| UpcomingTask {
            task,
            assignee: store.get_user(&task.assigned_to),
            days_left: days_between(today, task.deadline),
        })
        .collect();
    upcoming.sort_by_key(|item| item.task.deadline);
    upcoming
}

#[derive(Debug, Clone, Copy)]
pub struct OverdueTask<'a> {
    pub task: &'a Task,
    pub assignee: Option<&'a User>,
    pub days_overdue: i32,
}

pub fn overdue_tasks<'a>(store: &'a Store, viewer: &User, today: Date) -> Vec<OverdueTask<'a>> {
    visible_tasks(store, viewer)
        .into_iter()
        .filter(|task| task.is_overdue(today))
        .map(|task| OverdueTask {
            task,
            assignee: store.get_user(&task.assigned_to),
            days_overdue: days_between(task.deadline, today),
        })
        .collect()
}

/// Whole days from `from` to `to`; negative when `to` is earlier.
pub fn days_between(from: Date, to: Date) -> i32 {
    from.until(to).map(|span| span.get_days()).unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct CalendarDay {
    pub date: Date,
    /// False for the padding days borrowed from the neighbouring months
    pub in_month: bool,
    pub is_today: bool,
    /// One flag per task due that day, true when it is overdue
    pub markers: Vec<bool>,
}

#[derive(Debug, Clone)]
pub struct MonthGrid {
    pub first: Date,
    /// Rows of seven days, Sunday first
    pub weeks: Vec<Vec<CalendarDay>>,
}

/// Lays out the month containing `month` with the viewer's task deadlines.
pub fn month_grid(
    store: &Store,
    viewer: &User,
    month: Date,
    today: Date,
) -> Result<MonthGrid, jiff::Error> {
    let first = month.first_of_month();
    let leading = i64::from(first.weekday().to_sunday_zero_offset());
    let days_in_month = i64::from(first.days_in_month());
    let cells = (leading + days_in_month + 6) / 7 * 7;
    let start = first.checked_sub(leading.days())?;
    let tasks = visible_tasks(store, viewer);

    let mut days = Vec::with_capacity(cells as usize);
    for offset in 0..cells {
        let date = start.checked_add(offset.days())?;
        let in_month = date.year() == first.year() && date.month() == first.month();
        let markers = if in_month {
            tasks
                .iter()
                .filter(|task| task.deadline == date)
                .map(|task| task.is_overdue(today))
                .collect()
        } else {
            Vec::new()
        };
        days.push(CalendarDay {
            date,
            in_month,
            is_today: date == today,
            markers,
        });
    }

    let weeks = days.chunks(7).map(<[CalendarDay]>::to_vec).collect();
    Ok(MonthGrid { first, weeks })
}

#[derive(Debug, Error)]
#[error("Unknown month '{0}'. Use YYYY-MM, prev, next or today")]
pub struct UnknownMonth(String);

/// First day of the month a calendar argument points at, relative to today.
pub fn resolve_month(raw: Option<&str>, today: Date) -> Result<Date, UnknownMonth> {
    let this_month = today.first_of_month();
    let unknown = || UnknownMonth(raw.unwrap_or_default().to_string());
    match raw.map(str::trim) {
        None | Some("today") => Ok(this_month),
        Some("prev") => this_month.checked_sub(1.month()).map_err(|_| unknown()),
        Some("next") => this_month.checked_add(1.month()).map_err(|_| unknown()),
        Some(month) => format!("{month}-01").parse::<Date>().map_err(|_| unknown()),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{school, user};
    use super::*;

    fn ids(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|task| task.id.to_string()).collect()
    }

    fn today() -> Date {
        "2025-03-10".parse().unwrap()
    }

    #[test]
    fn test_visible_tasks_per_scope() {
        let store = school();
        let director = user("dir", "director");
        let head = user("hb", "head_budget");
        let teacher = user("tb", "teacher_budget");

        assert_eq!(ids(&visible_tasks(&store, &director)), ["t1", "t2", "t3", "t4"]);
        // department members' tasks plus the one the head assigned to academic
        assert_eq!(ids(&visible_tasks(&store, &head)), ["t1", "t2", "t4"]);
        assert_eq!(ids(&visible_tasks(&store, &teacher)), ["t1", "t2"]);
    }

    #[test]
    fn test_visible_tasks_is_deterministic_and_idempotent() {
        let store = school();
        let head = user("hb", "head_budget");
        let first = ids(&visible_tasks(&store, &head));
        let second = ids(&visible_tasks(&store, &head));
        assert_eq!(first, second);

        let narrowed = Store::new(
            visible_tasks(&store, &head)
                .into_iter()
                .cloned()
                .map(crate::models::record::Record::Task)
                .chain(store.users().cloned().map(crate::models::record::Record::User))
                .collect(),
        );
        assert_eq!(ids(&visible_tasks(&narrowed, &head)), first);
    }

    #[test]
    fn test_visible_problems() {
        let store = school();
        assert_eq!(visible_problems(&store, &user("dir", "director")).len(), 2);
        let own = visible_problems(&store, &user("tb", "teacher_budget"));
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].id.as_str(), "p1");
    }

    #[test]
    fn test_latest_announcements_newest_five() {
        let days = [4, 9, 1, 7, 3, 8, 6];
        let records = days
            .iter()
            .map(|day| {
                crate::models::record::Record::Announcement(Announcement {
                    id: RecordId::new(format!("a{day}")),
                    title: format!("Notice {day}"),
                    message: String::new(),
                    author: RecordId::from("dir"),
                    created_at: format!("2025-03-0{day}T08:00:00Z").parse().unwrap(),
                })
            })
            .collect();
        let store = Store::new(records);

        let titles: Vec<_> = latest_announcements(&store, 5)
            .into_iter()
            .map(|a| a.title.as_str())
            .collect();
        assert_eq!(
            titles,
            ["Notice 9", "Notice 8", "Notice 7", "Notice 6", "Notice 4"]
        );
        assert_eq!(latest_announcements(&store, usize::MAX).len(), 7);
    }

    #[test]
    fn test_badge_counts_pending_and_overdue() {
        let store = school();
        let badge = badge(&store, &user("tb", "teacher_budget"), today());
        assert_eq!(badge, Badge { pending: 1, overdue: 1 });
        assert!(super::badge(&store, &user("dir", "director"), today()).is_empty());
    }

    #[test]
    fn test_assignable_users_follow_direction() {
        let store = school();
        let director_view: Vec<_> = assignable_users(&store, &user("dir", "director"), Department::Budget)
            .into_iter()
            .map(|u| u.id.to_string())
            .collect();
        assert_eq!(director_view, ["hb", "tb"]);
        let head_view: Vec<_> = assignable_users(&store, &user("hb", "head_budget"), Department::Budget)
            .into_iter()
            .map(|u| u.id.to_string())
            .collect();
        assert_eq!(head_view, ["tb"]);
        assert!(assignable_users(&store, &user("tb", "teacher_budget"), Department::Budget).is_empty());
    }

    #[test]
    fn test_department_workload_lists_heads_first() {
        let store = school();
        let rows = department_workload(&store, &user("dir", "director"), Department::Budget);
        let summary: Vec<_> = rows
            .iter()
            .map(|row| (row.user.id.to_string(), row.open, row.total))
            .collect();
        assert_eq!(
            summary,
            [("hb".to_string(), 0, 0), ("tb".to_string(), 2, 2)]
        );
    }

    #[test]
    fn test_upcoming_week_is_sorted_and_filtered() {
        let store = school();
        let upcoming = upcoming_week(&store, &user("dir", "director"), today());
        let summary: Vec<_> = upcoming
            .iter()
            .map(|item| (item.task.id.to_string(), item.days_left))
            .collect();
        assert_eq!(summary, [("t2".to_string(), 2), ("t4".to_string(), 4)]);

        let teacher_view = upcoming_week(&store, &user("ta", "teacher_academic"), today());
        assert_eq!(teacher_view.len(), 1);
        assert_eq!(teacher_view[0].assignee.unwrap().id.as_str(), "ta");
    }

    #[test]
    fn test_overdue_tasks_report_days() {
        let store = school();
        let overdue = overdue_tasks(&store, &user("dir", "director"), today());
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].task.id.as_str(), "t1");
        assert_eq!(overdue[0].days_overdue, 5);
    }

    #[test]
    fn test_filter_tasks_by_status_and_department() {
        let store = school();
        let all = visible_tasks(&store, &user("dir", "director"));

        let overdue = TaskFilter {
            status: Some(DisplayStatus::Overdue),
            ..TaskFilter::default()
        };
        assert_eq!(ids(&filter_tasks(&store, all.clone(), overdue, today())), ["t1"]);

        let academic = TaskFilter {
            department: Some(Department::Academic),
            ..TaskFilter::default()
        };
        assert_eq!(
            ids(&filter_tasks(&store, all.clone(), academic, today())),
            ["t3", "t4"]
        );
        assert_eq!(
            filter_tasks(&store, all, TaskFilter::default(), today()).len(),
            4
        );
    }

    #[test]
    fn test_resolve_month_navigation() {
        let first = |raw: &str| raw.parse::<Date>().unwrap();
        assert_eq!(resolve_month(None, today()).unwrap(), first("2025-03-01"));
        assert_eq!(resolve_month(Some("prev"), today()).unwrap(), first("2025-02-01"));
        assert_eq!(resolve_month(Some("next"), today()).unwrap(), first("2025-04-01"));
        assert_eq!(
            resolve_month(Some("2024-12"), today()).unwrap(),
            first("2024-12-01")
        );
        assert!(resolve_month(Some("december"), today()).is_err());
    }

    #[test]
    fn test_month_grid_layout() {
        let store = school();
        let grid = month_grid(&store, &user("dir", "director"), today(), today()).unwrap();
        // March 2025 starts on a Saturday: six leading days, 31 days, five trailing
        assert_eq!(grid.weeks.len(), 6);
        assert!(grid.weeks.iter().all(|week| week.len() == 7));
        let first_row = &grid.weeks[0];
        assert!(!first_row[0].in_month);
        assert_eq!(first_row[6].date, "2025-03-01".parse::<Date>().unwrap());
        assert_eq!(first_row[6].markers, vec![false]);

        let fifth = grid
            .weeks
            .iter()
            .flatten()
            .find(|day| day.date == "2025-03-05".parse::<Date>().unwrap())
            .unwrap();
        assert_eq!(fifth.markers, vec![true]);
        assert!(grid.weeks.iter().flatten().filter(|day| day.is_today).count() == 1);
    }
}
