use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use fs2::FileExt;
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::user::User;

const SESSION_FILE: &str = "session.json";
const CONFIRMATIONS_FILE: &str = "confirmations.json";
const BUSY_FILE: &str = "busy.lock";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Not logged in. Run 'msmart login <username>' first")]
    NotLoggedIn,

    #[error("Another msmart command is still talking to the endpoint. Try again in a moment")]
    Busy,

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read '{path}': {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize session state: {source}")]
    SerializeFailed {
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SessionFile {
    current_user: User,
}

/// Local state kept between commands: the logged-in user, the busy lock and
/// armed delete confirmations. All of it lives in one directory.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<(), SessionError> {
        fs::create_dir_all(&self.dir).map_err(|source| SessionError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    pub fn load(&self) -> Result<Option<User>, SessionError> {
        let path = self.session_path();
        match fs::read_to_string(&path) {
            Ok(content) => {
                let file: SessionFile = serde_json::from_str(&content)
                    .map_err(|source| SessionError::Corrupt { path, source })?;
                Ok(Some(file.current_user))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SessionError::Io { path, source }),
        }
    }

    /// The logged-in user, or `NotLoggedIn`.
    pub fn current_user(&self) -> Result<User, SessionError> {
        self.load()?.ok_or(SessionError::NotLoggedIn)
    }

    pub fn save(&self, user: &User) -> Result<(), SessionError> {
        self.ensure_dir()?;
        let json = serde_json::to_string_pretty(&SessionFile {
            current_user: user.clone(),
        })
        .map_err(|source| SessionError::SerializeFailed { source })?;
        write_atomically(&self.session_path(), json)
    }

    /// Forgets the logged-in user. Returns whether anyone was logged in.
    pub fn clear(&self) -> Result<bool, SessionError> {
        let path = self.session_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SessionError::Io { path, source }),
        }
    }

    /// Takes the busy lock without waiting. A second mutating command gets
    /// `Busy` until the guard is dropped.
    pub fn acquire_busy(&self) -> Result<BusyGuard, SessionError> {
        self.ensure_dir()?;
        let path = self.dir.join(BUSY_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| SessionError::Io {
                path: path.clone(),
                source,
            })?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(BusyGuard { file }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Err(SessionError::Busy),
            Err(source) => Err(SessionError::Io { path, source }),
        }
    }

    pub fn confirmations(&self) -> PendingConfirmations {
        PendingConfirmations {
            path: self.dir.join(CONFIRMATIONS_FILE),
        }
    }

    /// Takes the busy lock, then checks the delete confirmation for `key`.
    /// When the lock is held elsewhere an armed confirmation stays armed.
    pub fn confirm_delete(
        &self,
        key: &str,
        now: Timestamp,
        window: SignedDuration,
    ) -> Result<(BusyGuard, Confirmation), SessionError> {
        let busy = self.acquire_busy()?;
        let outcome = self.confirmations().check(key, now, window)?;
        Ok((busy, outcome))
    }
}

fn write_atomically(path: &Path, content: String) -> Result<(), SessionError> {
    let temp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    fs::write(&temp_path, content).map_err(|source| SessionError::Io {
        path: temp_path.clone(),
        source,
    })?;
    fs::rename(&temp_path, path).map_err(|source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Held while a mutation is in flight.
#[derive(Debug)]
pub struct BusyGuard {
    file: File,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        // Closing the file releases the lock as well
        let _ = FileExt::unlock(&self.file);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// First request; repeat it within the window to go ahead
    Armed,
    Confirmed,
}

/// Delete requests waiting for their second invocation, keyed by record.
pub struct PendingConfirmations {
    path: PathBuf,
}

impl PendingConfirmations {
    fn load(&self) -> Result<BTreeMap<String, Timestamp>, SessionError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| SessionError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(SessionError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn save(&self, pending: &BTreeMap<String, Timestamp>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| SessionError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(pending)
            .map_err(|source| SessionError::SerializeFailed { source })?;
        write_atomically(&self.path, json)
    }

    /// Arms `key` on the first call and confirms it on a second call made
    /// within `window`. Expired entries are dropped on every call.
    pub fn check(
        &self,
        key: &str,
        now: Timestamp,
        window: SignedDuration,
    ) -> Result<Confirmation, SessionError> {
        let mut pending = self.load()?;
        pending.retain(|_, armed_at| now.duration_since(*armed_at) <= window);

        let outcome = if pending.remove(key).is_some() {
            Confirmation::Confirmed
        } else {
            pending.insert(key.to_string(), now);
            Confirmation::Armed
        };
        debug!(key, ?outcome, "delete confirmation");
        self.save(&pending)?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordId, role::Role};

    fn scratch() -> SessionStore {
        SessionStore::new(PathBuf::from(format!(
            "/tmp/msmart_session_{}",
            uuid::Uuid::new_v4().simple()
        )))
    }

    fn teacher() -> User {
        User::new(
            RecordId::from("1733900000000"),
            "somchai".to_string(),
            "1234".to_string(),
            "Somchai Jaidee".to_string(),
            Role::parse("teacher_budget"),
            "2025-01-10T03:00:00Z".parse().unwrap(),
        )
    }

    #[test]
    fn test_session_round_trip_and_clear() {
        let session = scratch();
        assert!(session.load().unwrap().is_none());
        assert!(matches!(
            session.current_user(),
            Err(SessionError::NotLoggedIn)
        ));

        session.save(&teacher()).unwrap();
        assert_eq!(session.current_user().unwrap(), teacher());

        let raw = fs::read_to_string(session.dir().join(SESSION_FILE)).unwrap();
        assert!(raw.contains("currentUser"));

        assert!(session.clear().unwrap());
        assert!(!session.clear().unwrap());
        fs::remove_dir_all(session.dir()).unwrap();
    }

    #[test]
    fn test_busy_lock_is_exclusive_until_dropped() {
        let session = scratch();
        let guard = session.acquire_busy().unwrap();
        assert!(matches!(session.acquire_busy(), Err(SessionError::Busy)));
        drop(guard);
        assert!(session.acquire_busy().is_ok());
        fs::remove_dir_all(session.dir()).unwrap();
    }

    #[test]
    fn test_confirmation_needs_second_call_within_window() {
        let session = scratch();
        let confirmations = session.confirmations();
        let window = SignedDuration::from_secs(10);
        let start: Timestamp = "2025-03-10T09:00:00Z".parse().unwrap();

        assert_eq!(
            confirmations.check("task:1", start, window).unwrap(),
            Confirmation::Armed
        );
        let soon = start + SignedDuration::from_secs(4);
        assert_eq!(
            confirmations.check("task:1", soon, window).unwrap(),
            Confirmation::Confirmed
        );
        // consumed: the next call arms again
        assert_eq!(
            confirmations.check("task:1", soon, window).unwrap(),
            Confirmation::Armed
        );
        fs::remove_dir_all(session.dir()).unwrap();
    }

    #[test]
    fn test_busy_confirming_run_keeps_the_delete_armed() {
        let session = scratch();
        let window = SignedDuration::from_secs(10);
        let start: Timestamp = "2025-03-10T09:00:00Z".parse().unwrap();

        let (guard, outcome) = session.confirm_delete("task:5", start, window).unwrap();
        assert_eq!(outcome, Confirmation::Armed);
        drop(guard);

        let other = session.acquire_busy().unwrap();
        let soon = start + SignedDuration::from_secs(2);
        assert!(matches!(
            session.confirm_delete("task:5", soon, window),
            Err(SessionError::Busy)
        ));
        drop(other);

        let later = start + SignedDuration::from_secs(5);
        let (_guard, outcome) = session.confirm_delete("task:5", later, window).unwrap();
        assert_eq!(outcome, Confirmation::Confirmed);
        fs::remove_dir_all(session.dir()).unwrap();
    }

    #[test]
    fn test_confirmation_expires() {
        let session = scratch();
        let confirmations = session.confirmations();
        let window = SignedDuration::from_secs(10);
        let start: Timestamp = "2025-03-10T09:00:00Z".parse().unwrap();

        confirmations.check("user:7", start, window).unwrap();
        confirmations.check("task:2", start, window).unwrap();
        let late = start + SignedDuration::from_secs(11);
        assert_eq!(
            confirmations.check("user:7", late, window).unwrap(),
            Confirmation::Armed
        );
        let pending = confirmations.load().unwrap();
        assert!(!pending.contains_key("task:2"));
        fs::remove_dir_all(session.dir()).unwrap();
    }
}
