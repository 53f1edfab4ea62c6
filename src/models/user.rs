use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::models::{
    RecordId,
    role::{DepartmentScope, Role},
    wire,
};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: RecordId,
    #[serde(deserialize_with = "wire::text")]
    pub username: String,
    /// Stored in clear text by the sheet; compared as a string
    #[serde(deserialize_with = "wire::text")]
    pub password: String,
    #[serde(default, deserialize_with = "wire::text")]
    pub full_name: String,
    pub role: Role,
    /// Written for the sheet's benefit, always derived from `role`
    #[serde(default)]
    pub department: DepartmentScope,
    pub created_at: Timestamp,
}

impl User {
    pub fn new(
        id: RecordId,
        username: String,
        password: String,
        full_name: String,
        role: Role,
        created_at: Timestamp,
    ) -> Self {
        let department = role.department();
        Self {
            id,
            username,
            password,
            full_name,
            role,
            department,
            created_at,
        }
    }

    pub fn password_matches(&self, candidate: &str) -> bool {
        self.password == candidate
    }

    /// Department as derived from the role, never the stored column.
    pub fn department(&self) -> DepartmentScope {
        self.role.department()
    }

    pub fn initial(&self) -> char {
        self.full_name.chars().next().unwrap_or('?')
    }
}
