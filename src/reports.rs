//! Aggregates over the tasks a viewer can see.

use jiff::Zoned;

use crate::{
    models::{
        role::{Department, DepartmentScope},
        store::Store,
        task::{Task, TaskStatus},
        user::User,
    },
    views::{self, OverdueTask},
};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusTotals {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    /// Counted on top of pending/in progress, not instead of them
    pub overdue: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepartmentRate {
    pub department: Department,
    pub completed: usize,
    pub total: usize,
    /// Percent, rounded
    pub rate: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthlyPerformance {
    /// Tasks created since the first of the current month
    pub created: usize,
    pub completed: usize,
    pub rate: u32,
}

#[derive(Debug, Clone)]
pub struct Report<'a> {
    pub totals: StatusTotals,
    pub departments: Vec<DepartmentRate>,
    pub this_month: MonthlyPerformance,
    /// Mean days from creation to completion
    pub average_completion_days: i64,
    pub overdue: Vec<OverdueTask<'a>>,
}

/// `completed / total` as a rounded percentage, 0 for an empty set.
pub fn completion_rate(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (completed as f64 / total as f64 * 100.0).round() as u32
}

/// Mean of the whole days, rounded up per task, that completed tasks took.
pub fn average_completion_days(tasks: &[&Task]) -> i64 {
    let durations: Vec<i64> = tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Completed)
        .filter_map(|task| {
            let completed_at = task.completed_at?;
            let seconds = completed_at.duration_since(task.created_at).as_secs();
            Some((seconds + SECONDS_PER_DAY - 1).div_euclid(SECONDS_PER_DAY))
        })
        .collect();
    if durations.is_empty() {
        return 0;
    }
    let sum: i64 = durations.iter().sum();
    (sum as f64 / durations.len() as f64).round() as i64
}

pub fn status_totals(tasks: &[&Task], today: jiff::civil::Date) -> StatusTotals {
    let count = |status: TaskStatus| tasks.iter().filter(|task| task.status == status).count();
    StatusTotals {
        total: tasks.len(),
        pending: count(TaskStatus::Pending),
        in_progress: count(TaskStatus::InProgress),
        completed: count(TaskStatus::Completed),
        overdue: tasks.iter().filter(|task| task.is_overdue(today)).count(),
    }
}

pub fn department_rates(store: &Store, tasks: &[&Task]) -> Vec<DepartmentRate> {
    Department::ALL
        .into_iter()
        .map(|department| {
            let in_department: Vec<_> = tasks
                .iter()
                .filter(|task| {
                    store
                        .get_user(&task.assigned_to)
                        .is_some_and(|user| user.department() == DepartmentScope::Only(department))
                })
                .collect();
            let completed = in_department
                .iter()
                .filter(|task| task.status == TaskStatus::Completed)
                .count();
            DepartmentRate {
                department,
                completed,
                total: in_department.len(),
                rate: completion_rate(completed, in_department.len()),
            }
        })
        .collect()
}

pub fn build<'a>(store: &'a Store, viewer: &User, now: &Zoned) -> Result<Report<'a>, jiff::Error> {
    let today = now.date();
    let tasks = views::visible_tasks(store, viewer);

    let month_start = today
        .first_of_month()
        .to_zoned(now.time_zone().clone())?
        .timestamp();
    let created_this_month: Vec<_> = tasks
        .iter()
        .filter(|task| task.created_at >= month_start)
        .collect();
    let completed_this_month = created_this_month
        .iter()
        .filter(|task| task.status == TaskStatus::Completed)
        .count();

    Ok(Report {
        totals: status_totals(&tasks, today),
        departments: department_rates(store, &tasks),
        this_month: MonthlyPerformance {
            created: created_this_month.len(),
            completed: completed_this_month,
            rate: completion_rate(completed_this_month, created_this_month.len()),
        },
        average_completion_days: average_completion_days(&tasks),
        overdue: views::overdue_tasks(store, viewer, today),
    })
}
