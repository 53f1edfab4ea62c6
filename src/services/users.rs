use jiff::Timestamp;
use thiserror::Error;
use tracing::info;

use crate::{
    backend::{Backend, BackendError, Request},
    models::{
        record::{Record, RecordKind},
        role::Role,
        store::{RECORD_LIMIT, Store},
        user::User,
    },
    policy,
    services::refresh,
};

#[derive(Debug, Error)]
pub enum AddUserError {
    #[error("Only the admin can manage users")]
    NotPermitted,

    #[error("The {0} cannot be empty")]
    MissingField(&'static str),

    #[error("Unknown role '{0}'. Expected admin, director, head_<department> or teacher_<department>")]
    UnknownRole(String),

    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("The sheet already holds {limit} users", limit = RECORD_LIMIT)]
    LimitReached,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct AddUserParameters {
    pub username: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
}

pub fn add_user(
    store: &mut Store,
    backend: &dyn Backend,
    actor: &User,
    parameters: AddUserParameters,
) -> Result<User, AddUserError> {
    if !policy::can_manage_users(actor) {
        return Err(AddUserError::NotPermitted);
    }

    let username = parameters.username.trim();
    let full_name = parameters.full_name.trim();
    for (field, value) in [
        ("username", username),
        ("password", parameters.password.as_str()),
        ("full name", full_name),
    ] {
        if value.is_empty() {
            return Err(AddUserError::MissingField(field));
        }
    }

    if let Role::Unrecognized(raw) = &parameters.role {
        return Err(AddUserError::UnknownRole(raw.clone()));
    }
    refresh(store, backend)?;
    if store.find_user_by_username(username).is_some() {
        return Err(AddUserError::UsernameTaken(username.to_string()));
    }
    if store.is_full(RecordKind::User) {
        return Err(AddUserError::LimitReached);
    }

    let now = Timestamp::now();
    let user = User::new(
        store.next_id(now),
        username.to_string(),
        parameters.password,
        full_name.to_string(),
        parameters.role,
        now,
    );

    backend.submit(&Request::create(&Record::User(user.clone())))?;
    refresh(store, backend)?;
    info!(user = %user.id, role = %user.role, "user added");

    Ok(user)
}

#[derive(Debug, Error)]
pub enum DeleteUserError {
    #[error("Only the admin can manage users")]
    NotPermitted,

    #[error("User '{0}' not found")]
    NotFound(String),

    #[error("You cannot delete your own account")]
    CannotDeleteSelf,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct DeleteUserParameters {
    /// User id or username
    pub user: String,
}

pub fn check_delete_user<'a>(
    store: &'a Store,
    actor: &User,
    key: &str,
) -> Result<&'a User, DeleteUserError> {
    if !policy::can_manage_users(actor) {
        return Err(DeleteUserError::NotPermitted);
    }
    let target = crate::services::tasks::find_user(store, key)
        .ok_or_else(|| DeleteUserError::NotFound(key.to_string()))?;
    if !policy::can_delete_user(actor, target) {
        return Err(DeleteUserError::CannotDeleteSelf);
    }
    Ok(target)
}

/// Removes the account. Tasks it was assigned stay in the sheet and show an
/// unknown assignee.
pub fn delete_user(
    store: &mut Store,
    backend: &dyn Backend,
    actor: &User,
    parameters: DeleteUserParameters,
) -> Result<User, DeleteUserError> {
    refresh(store, backend)?;
    let user = check_delete_user(store, actor, &parameters.user)?.clone();

    backend.submit(&Request::delete(RecordKind::User, user.id.clone()))?;
    refresh(store, backend)?;
    info!(user = %user.id, "user deleted");

    Ok(user)
}

/// Users sorted for the admin list: by role family, then name.
pub fn sorted_users(store: &Store) -> Vec<&User> {
    let rank = |user: &User| match user.role {
        Role::Admin => 0,
        Role::Director => 1,
        Role::Head(_) => 2,
        Role::Teacher(_) => 3,
        Role::Unrecognized(_) => 4,
    };
    let mut users: Vec<_> = store.users().collect();
    users.sort_by(|a, b| {
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.role.department().as_str().cmp(b.role.department().as_str()))
            .then_with(|| a.full_name.cmp(&b.full_name))
    });
    users
}
