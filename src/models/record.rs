use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    RecordId, announcement::Announcement, problem::Problem, task::Task, user::User,
};

/// One row of the sheet. The `type` column picks the variant.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Record {
    User(User),
    Task(Task),
    Announcement(Announcement),
    Problem(Problem),
}

impl Record {
    pub fn id(&self) -> &RecordId {
        match self {
            Record::User(user) => &user.id,
            Record::Task(task) => &task.id,
            Record::Announcement(announcement) => &announcement.id,
            Record::Problem(problem) => &problem.id,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::User(_) => RecordKind::User,
            Record::Task(_) => RecordKind::Task,
            Record::Announcement(_) => RecordKind::Announcement,
            Record::Problem(_) => RecordKind::Problem,
        }
    }
}

/// Entity name used on the wire for each record kind.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    User,
    Task,
    Announcement,
    Problem,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::User => "user",
            RecordKind::Task => "task",
            RecordKind::Announcement => "announcement",
            RecordKind::Problem => "problem",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown record kind '{0}'")]
pub struct UnknownKind(String);

impl FromStr for RecordKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(RecordKind::User),
            "task" => Ok(RecordKind::Task),
            "announcement" => Ok(RecordKind::Announcement),
            "problem" => Ok(RecordKind::Problem),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

/// Just enough of a record to address it for deletion.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RecordRef {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub kind: RecordKind,
}
