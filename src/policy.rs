//! What each role may see and do.
//!
//! The whole table is a set of exhaustive matches over [`Role`], so adding a
//! role family is a compile error until every rule has an answer for it.

use crate::models::{
    announcement::Announcement,
    problem::Problem,
    role::{Department, Role},
    task::Task,
    user::User,
};

/// Entry points shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DashboardAction {
    Assign,
    Track,
    Calendar,
    Announcements,
    Reports,
    Problems,
    Users,
}

impl DashboardAction {
    pub const ALL: [DashboardAction; 7] = [
        DashboardAction::Assign,
        DashboardAction::Track,
        DashboardAction::Calendar,
        DashboardAction::Announcements,
        DashboardAction::Reports,
        DashboardAction::Problems,
        DashboardAction::Users,
    ];

    pub fn title(self) -> &'static str {
        match self {
            DashboardAction::Assign => "Assign tasks",
            DashboardAction::Track => "Track tasks",
            DashboardAction::Calendar => "Calendar",
            DashboardAction::Announcements => "Announcements",
            DashboardAction::Reports => "Reports",
            DashboardAction::Problems => "Report a problem",
            DashboardAction::Users => "Manage users",
        }
    }

    pub fn command(self) -> &'static str {
        match self {
            DashboardAction::Assign => "msmart task assign",
            DashboardAction::Track => "msmart track",
            DashboardAction::Calendar => "msmart calendar",
            DashboardAction::Announcements => "msmart announce list",
            DashboardAction::Reports => "msmart report",
            DashboardAction::Problems => "msmart problem list",
            DashboardAction::Users => "msmart user list",
        }
    }
}

pub fn dashboard_actions(role: &Role) -> Vec<DashboardAction> {
    DashboardAction::ALL
        .into_iter()
        .filter(|action| is_action_allowed(role, *action))
        .collect()
}

pub fn is_action_allowed(role: &Role, action: DashboardAction) -> bool {
    match role {
        Role::Admin => true,
        Role::Director | Role::Head(_) => action != DashboardAction::Users,
        Role::Teacher(_) | Role::Unrecognized(_) => matches!(
            action,
            DashboardAction::Track | DashboardAction::Calendar | DashboardAction::Problems
        ),
    }
}

/// Which tasks a role sees in lists, calendar and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskScope {
    All,
    /// Tasks assigned to anyone in the department, plus tasks the viewer
    /// assigned elsewhere
    Department(Department),
    AssignedToSelf,
}

pub fn task_scope(role: &Role) -> TaskScope {
    match role {
        Role::Admin | Role::Director => TaskScope::All,
        Role::Head(department) => TaskScope::Department(*department),
        Role::Teacher(_) | Role::Unrecognized(_) => TaskScope::AssignedToSelf,
    }
}

/// Which problem reports a role sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemScope {
    All,
    OwnReports,
}

pub fn problem_scope(role: &Role) -> ProblemScope {
    match role {
        Role::Admin | Role::Director => ProblemScope::All,
        Role::Head(_) | Role::Teacher(_) | Role::Unrecognized(_) => ProblemScope::OwnReports,
    }
}

/// Only the assignee moves a task forward, and only while it is open.
pub fn can_work_on_task(actor: &User, task: &Task) -> bool {
    task.assigned_to == actor.id && task.is_open()
}

pub fn can_delete_task(actor: &User, task: &Task) -> bool {
    task.assigned_by == actor.id || actor.role.is_elevated()
}

pub fn can_delete_announcement(actor: &User, announcement: &Announcement) -> bool {
    announcement.author == actor.id || actor.role.is_elevated()
}

pub fn can_delete_problem(actor: &User, problem: &Problem) -> bool {
    problem.reporter == actor.id || actor.role.is_elevated()
}

pub fn can_post_announcement(actor: &User) -> bool {
    is_action_allowed(&actor.role, DashboardAction::Announcements)
}

pub fn can_manage_users(actor: &User) -> bool {
    actor.role == Role::Admin
}

/// Admins remove anyone but themselves.
pub fn can_delete_user(actor: &User, target: &User) -> bool {
    can_manage_users(actor) && actor.id != target.id
}

/// Whether `actor` may hand a task to `assignee` while assigning for
/// `department`.
pub fn can_assign_to(actor: &User, assignee: &User, department: Department) -> bool {
    let in_department = match &assignee.role {
        Role::Head(d) | Role::Teacher(d) => *d == department,
        Role::Admin | Role::Director | Role::Unrecognized(_) => false,
    };
    if !in_department {
        return false;
    }
    match &actor.role {
        Role::Admin | Role::Director => true,
        Role::Head(_) => assignee.role.is_teacher(),
        Role::Teacher(_) | Role::Unrecognized(_) => false,
    }
}
