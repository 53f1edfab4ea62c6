use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{RecordId, wire};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProblemCategory {
    System,
    Work,
    Equipment,
    #[default]
    #[serde(other)]
    Other,
}

impl ProblemCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ProblemCategory::System => "system",
            ProblemCategory::Work => "work",
            ProblemCategory::Equipment => "equipment",
            ProblemCategory::Other => "other",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProblemCategory::System => "System",
            ProblemCategory::Work => "Work",
            ProblemCategory::Equipment => "Equipment",
            ProblemCategory::Other => "Other",
        }
    }
}

impl fmt::Display for ProblemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown problem category '{0}'. Expected one of: system, work, equipment, other")]
pub struct UnknownCategory(String);

impl FromStr for ProblemCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(ProblemCategory::System),
            "work" => Ok(ProblemCategory::Work),
            "equipment" => Ok(ProblemCategory::Equipment),
            "other" => Ok(ProblemCategory::Other),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: RecordId,
    pub category: ProblemCategory,
    #[serde(default, deserialize_with = "wire::text")]
    pub message: String,
    /// Who filed the report
    #[serde(rename = "assignedBy")]
    pub reporter: RecordId,
    pub created_at: Timestamp,
}
