use jiff::Timestamp;
use thiserror::Error;
use tracing::info;

use crate::{
    backend::{Backend, BackendError, Request},
    config::SeedAccount,
    models::{
        record::{Record, RecordKind},
        role::Role,
        store::{RECORD_LIMIT, Store},
        user::User,
    },
    services::refresh,
};

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Username or password is incorrect")]
    InvalidCredentials,

    #[error("The sheet already holds {limit} users; the account for '{0}' cannot be created", limit = RECORD_LIMIT)]
    LimitReached(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct LoginParameters {
    pub username: String,
    pub password: String,
}

/// Checks the credentials against the freshly read sheet.
///
/// A seed account is created in the sheet on first use. When the sheet
/// already has a user with that username, that user is logged in.
pub fn login(
    store: &mut Store,
    backend: &dyn Backend,
    seeds: &[SeedAccount],
    parameters: LoginParameters,
) -> Result<User, LoginError> {
    refresh(store, backend)?;

    let username = parameters.username.trim();
    let password = parameters.password.trim();
    let seed = seeds
        .iter()
        .find(|seed| seed.username == username && seed.password == password);

    if let Some(seed) = seed {
        if let Some(existing) = store.find_user_by_username(username) {
            info!(user = %existing.id, "logged in with seed account");
            return Ok(existing.clone());
        }
        if store.is_full(RecordKind::User) {
            return Err(LoginError::LimitReached(username.to_string()));
        }

        let now = Timestamp::now();
        let user = User::new(
            store.next_id(now),
            seed.username.clone(),
            seed.password.clone(),
            seed.full_name.clone(),
            Role::parse(&seed.role),
            now,
        );
        let id = user.id.clone();
        backend.submit(&Request::create(&Record::User(user.clone())))?;
        refresh(store, backend)?;
        info!(user = %id, "created seed account");
        return Ok(store.get_user(&id).cloned().unwrap_or(user));
    }

    let user = store
        .users()
        .find(|user| user.username == username && user.password_matches(password))
        .ok_or(LoginError::InvalidCredentials)?;
    info!(user = %user.id, "logged in");
    Ok(user.clone())
}
