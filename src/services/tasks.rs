use jiff::{Timestamp, civil::Date};
use thiserror::Error;
use tracing::info;

use crate::{
    backend::{Backend, BackendError, Request},
    models::{
        RecordId,
        record::{Record, RecordKind},
        role::Department,
        store::{RECORD_LIMIT, Store},
        task::{Priority, Task, TaskStatus, TransitionError},
        user::User,
    },
    policy::{self, DashboardAction},
    services::refresh,
};

#[derive(Debug, Error)]
pub enum AssignTaskError {
    #[error("Your role cannot assign tasks")]
    NotPermitted,

    #[error("Task title cannot be empty")]
    EmptyTitle,

    #[error("Invalid deadline '{0}': {1}")]
    InvalidDeadline(String, String),

    #[error("User '{0}' not found")]
    AssigneeNotFound(String),

    #[error("{0} cannot be assigned tasks by you")]
    AssigneeNotAllowed(String),

    #[error("The sheet already holds {limit} tasks", limit = RECORD_LIMIT)]
    LimitReached,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct AssignTaskParameters {
    pub title: String,
    pub description: String,
    pub deadline: String,
    pub priority: Priority,
    /// Department the task is assigned for; the assignee's own when absent
    pub department: Option<Department>,
    /// User id or username
    pub assignee: String,
}

/// Finds a user by id first, then by username.
pub fn find_user<'a>(store: &'a Store, key: &str) -> Option<&'a User> {
    let key = key.trim();
    store
        .users()
        .find(|user| user.id.as_str() == key)
        .or_else(|| store.find_user_by_username(key))
}

pub fn assign_task(
    store: &mut Store,
    backend: &dyn Backend,
    actor: &User,
    parameters: AssignTaskParameters,
) -> Result<Task, AssignTaskError> {
    if !policy::is_action_allowed(&actor.role, DashboardAction::Assign) {
        return Err(AssignTaskError::NotPermitted);
    }

    let title = parameters.title.trim();
    if title.is_empty() {
        return Err(AssignTaskError::EmptyTitle);
    }

    let deadline = parameters
        .deadline
        .trim()
        .parse::<Date>()
        .map_err(|e| AssignTaskError::InvalidDeadline(parameters.deadline.clone(), e.to_string()))?;

    refresh(store, backend)?;

    let assignee = find_user(store, &parameters.assignee)
        .ok_or_else(|| AssignTaskError::AssigneeNotFound(parameters.assignee.clone()))?;
    let allowed = parameters
        .department
        .or_else(|| assignee.department().department())
        .is_some_and(|department| policy::can_assign_to(actor, assignee, department));
    if !allowed {
        return Err(AssignTaskError::AssigneeNotAllowed(assignee.full_name.clone()));
    }

    if store.is_full(RecordKind::Task) {
        return Err(AssignTaskError::LimitReached);
    }

    let now = Timestamp::now();
    let task = Task {
        id: store.next_id(now),
        title: title.to_string(),
        description: parameters.description.trim().to_string(),
        deadline,
        priority: parameters.priority,
        assigned_to: assignee.id.clone(),
        assigned_by: actor.id.clone(),
        status: TaskStatus::Pending,
        created_at: now,
        completed_at: None,
        file_link: None,
    };

    backend.submit(&Request::create(&Record::Task(task.clone())))?;
    refresh(store, backend)?;
    info!(task = %task.id, assignee = %task.assigned_to, "task assigned");

    Ok(store.get_task(&task.id).cloned().unwrap_or(task))
}

#[derive(Debug, Error)]
pub enum AdvanceTaskError {
    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Only the assignee can update '{0}' while it is open")]
    NotAssignee(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct AdvanceTaskParameters {
    pub task_id: String,
}

fn advance_task(
    store: &mut Store,
    backend: &dyn Backend,
    actor: &User,
    parameters: AdvanceTaskParameters,
    to: TaskStatus,
) -> Result<Task, AdvanceTaskError> {
    refresh(store, backend)?;
    let id = RecordId::new(parameters.task_id.trim());
    let task = store
        .get_task(&id)
        .ok_or_else(|| AdvanceTaskError::TaskNotFound(parameters.task_id.clone()))?;

    // The transition error is more useful than "not the assignee" for a
    // task that is already done
    let updated = task.advance(to, Timestamp::now())?;
    if !policy::can_work_on_task(actor, task) {
        return Err(AdvanceTaskError::NotAssignee(task.title.clone()));
    }

    backend.submit(&Request::update(&Record::Task(updated.clone())))?;
    refresh(store, backend)?;
    info!(task = %updated.id, status = %updated.status, "task status changed");

    Ok(store.get_task(&updated.id).cloned().unwrap_or(updated))
}

/// Pending to in progress.
pub fn start_task(
    store: &mut Store,
    backend: &dyn Backend,
    actor: &User,
    parameters: AdvanceTaskParameters,
) -> Result<Task, AdvanceTaskError> {
    advance_task(store, backend, actor, parameters, TaskStatus::InProgress)
}

/// In progress to completed, stamping the completion time.
pub fn complete_task(
    store: &mut Store,
    backend: &dyn Backend,
    actor: &User,
    parameters: AdvanceTaskParameters,
) -> Result<Task, AdvanceTaskError> {
    advance_task(store, backend, actor, parameters, TaskStatus::Completed)
}

#[derive(Debug, Error)]
pub enum DeleteTaskError {
    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Only the assigner, the director or the admin can delete '{0}'")]
    NotPermitted(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct DeleteTaskParameters {
    pub task_id: String,
}

/// Looks the task up and checks the actor may delete it, without deleting.
pub fn check_delete_task<'a>(
    store: &'a Store,
    actor: &User,
    task_id: &str,
) -> Result<&'a Task, DeleteTaskError> {
    let task = store
        .get_task(&RecordId::new(task_id.trim()))
        .ok_or_else(|| DeleteTaskError::TaskNotFound(task_id.to_string()))?;
    if !policy::can_delete_task(actor, task) {
        return Err(DeleteTaskError::NotPermitted(task.title.clone()));
    }
    Ok(task)
}

pub fn delete_task(
    store: &mut Store,
    backend: &dyn Backend,
    actor: &User,
    parameters: DeleteTaskParameters,
) -> Result<Task, DeleteTaskError> {
    refresh(store, backend)?;
    let task = check_delete_task(store, actor, &parameters.task_id)?.clone();

    backend.submit(&Request::delete(RecordKind::Task, task.id.clone()))?;
    refresh(store, backend)?;
    info!(task = %task.id, "task deleted");

    Ok(task)
}
