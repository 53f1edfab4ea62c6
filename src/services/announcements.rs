use jiff::Timestamp;
use thiserror::Error;
use tracing::info;

use crate::{
    backend::{Backend, BackendError, Request},
    models::{
        RecordId,
        announcement::Announcement,
        record::{Record, RecordKind},
        store::{RECORD_LIMIT, Store},
        user::User,
    },
    policy,
    services::refresh,
};

#[derive(Debug, Error)]
pub enum PostAnnouncementError {
    #[error("Your role cannot post announcements")]
    NotPermitted,

    #[error("Announcement title cannot be empty")]
    EmptyTitle,

    #[error("The sheet already holds {limit} announcements", limit = RECORD_LIMIT)]
    LimitReached,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct PostAnnouncementParameters {
    pub title: String,
    pub message: String,
}

pub fn post_announcement(
    store: &mut Store,
    backend: &dyn Backend,
    actor: &User,
    parameters: PostAnnouncementParameters,
) -> Result<Announcement, PostAnnouncementError> {
    if !policy::can_post_announcement(actor) {
        return Err(PostAnnouncementError::NotPermitted);
    }
    let title = parameters.title.trim();
    if title.is_empty() {
        return Err(PostAnnouncementError::EmptyTitle);
    }
    refresh(store, backend)?;
    if store.is_full(RecordKind::Announcement) {
        return Err(PostAnnouncementError::LimitReached);
    }

    let now = Timestamp::now();
    let announcement = Announcement {
        id: store.next_id(now),
        title: title.to_string(),
        message: parameters.message.trim().to_string(),
        author: actor.id.clone(),
        created_at: now,
    };

    backend.submit(&Request::create(&Record::Announcement(
        announcement.clone(),
    )))?;
    refresh(store, backend)?;
    info!(announcement = %announcement.id, "announcement posted");

    Ok(announcement)
}

#[derive(Debug, Error)]
pub enum DeleteAnnouncementError {
    #[error("Announcement '{0}' not found")]
    NotFound(String),

    #[error("Only the author, the director or the admin can delete '{0}'")]
    NotPermitted(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct DeleteAnnouncementParameters {
    pub announcement_id: String,
}

pub fn check_delete_announcement<'a>(
    store: &'a Store,
    actor: &User,
    announcement_id: &str,
) -> Result<&'a Announcement, DeleteAnnouncementError> {
    let announcement = store
        .get_announcement(&RecordId::new(announcement_id.trim()))
        .ok_or_else(|| DeleteAnnouncementError::NotFound(announcement_id.to_string()))?;
    if !policy::can_delete_announcement(actor, announcement) {
        return Err(DeleteAnnouncementError::NotPermitted(
            announcement.title.clone(),
        ));
    }
    Ok(announcement)
}

pub fn delete_announcement(
    store: &mut Store,
    backend: &dyn Backend,
    actor: &User,
    parameters: DeleteAnnouncementParameters,
) -> Result<Announcement, DeleteAnnouncementError> {
    refresh(store, backend)?;
    let announcement =
        check_delete_announcement(store, actor, &parameters.announcement_id)?.clone();

    backend.submit(&Request::delete(
        RecordKind::Announcement,
        announcement.id.clone(),
    ))?;
    refresh(store, backend)?;
    info!(announcement = %announcement.id, "announcement deleted");

    Ok(announcement)
}
