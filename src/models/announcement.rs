use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::models::{RecordId, wire};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: RecordId,
    #[serde(deserialize_with = "wire::text")]
    pub title: String,
    #[serde(default, deserialize_with = "wire::text")]
    pub message: String,
    /// Author of the announcement. The sheet shares the column with tasks.
    #[serde(rename = "assignedBy")]
    pub author: RecordId,
    pub created_at: Timestamp,
}
