use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the four administrative units of the school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Department {
    Budget,
    General,
    Academic,
    Personnel,
}

impl Department {
    pub const ALL: [Department; 4] = [
        Department::Budget,
        Department::General,
        Department::Academic,
        Department::Personnel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Department::Budget => "budget",
            Department::General => "general",
            Department::Academic => "academic",
            Department::Personnel => "personnel",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Department::Budget => "Budget",
            Department::General => "General Administration",
            Department::Academic => "Academic Affairs",
            Department::Personnel => "Personnel",
        }
    }

    /// Substring rule used for role names outside the known table.
    fn from_role_name(role: &str) -> Option<Department> {
        Department::ALL
            .into_iter()
            .find(|department| role.contains(department.as_str()))
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown department '{0}'. Expected one of: budget, general, academic, personnel")]
pub struct UnknownDepartment(String);

impl FromStr for Department {
    type Err = UnknownDepartment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Department::ALL
            .into_iter()
            .find(|department| department.as_str() == needle)
            .ok_or_else(|| UnknownDepartment(s.to_string()))
    }
}

/// Which department a user belongs to. Elevated roles belong to all of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DepartmentScope {
    #[default]
    All,
    Only(Department),
}

impl DepartmentScope {
    pub fn as_str(self) -> &'static str {
        match self {
            DepartmentScope::All => "all",
            DepartmentScope::Only(department) => department.as_str(),
        }
    }

    pub fn department(self) -> Option<Department> {
        match self {
            DepartmentScope::All => None,
            DepartmentScope::Only(department) => Some(department),
        }
    }
}

impl Serialize for DepartmentScope {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DepartmentScope {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw
            .parse::<Department>()
            .map(DepartmentScope::Only)
            .unwrap_or(DepartmentScope::All))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Director,
    Head(Department),
    Teacher(Department),
    /// A role string the sheet holds but this client does not know.
    Unrecognized(String),
}

impl Role {
    pub fn parse(raw: &str) -> Role {
        let raw = raw.trim();
        match raw {
            "admin" => return Role::Admin,
            "director" => return Role::Director,
            _ => {}
        }
        if let Some(rest) = raw.strip_prefix("head_")
            && let Ok(department) = rest.parse()
        {
            return Role::Head(department);
        }
        if let Some(rest) = raw.strip_prefix("teacher_")
            && let Ok(department) = rest.parse()
        {
            return Role::Teacher(department);
        }
        Role::Unrecognized(raw.to_string())
    }

    pub fn as_wire(&self) -> String {
        match self {
            Role::Admin => "admin".to_string(),
            Role::Director => "director".to_string(),
            Role::Head(department) => format!("head_{department}"),
            Role::Teacher(department) => format!("teacher_{department}"),
            Role::Unrecognized(raw) => raw.clone(),
        }
    }

    /// Total: every role lands in exactly one scope.
    pub fn department(&self) -> DepartmentScope {
        match self {
            Role::Admin | Role::Director => DepartmentScope::All,
            Role::Head(department) | Role::Teacher(department) => {
                DepartmentScope::Only(*department)
            }
            Role::Unrecognized(raw) => Department::from_role_name(raw)
                .map(DepartmentScope::Only)
                .unwrap_or(DepartmentScope::All),
        }
    }

    /// Admin and director see and manage across every department.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::Director)
    }

    pub fn is_teacher(&self) -> bool {
        matches!(self, Role::Teacher(_))
    }

    pub fn display_name(&self) -> String {
        match self {
            Role::Admin => "Administrator".to_string(),
            Role::Director => "Director".to_string(),
            Role::Head(department) => format!("Head of {}", department.display_name()),
            Role::Teacher(department) => format!("Teacher, {}", department.display_name()),
            Role::Unrecognized(raw) => raw.clone(),
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::parse(&value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_wire()
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Role::parse(s))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_roles_parse_to_families() {
        assert_eq!(Role::parse("admin"), Role::Admin);
        assert_eq!(Role::parse("director"), Role::Director);
        assert_eq!(Role::parse("head_budget"), Role::Head(Department::Budget));
        assert_eq!(
            Role::parse("teacher_personnel"),
            Role::Teacher(Department::Personnel)
        );
    }

    #[test]
    fn test_wire_form_round_trips_for_the_role_table() {
        for raw in [
            "admin",
            "director",
            "head_general",
            "teacher_academic",
            "librarian",
        ] {
            assert_eq!(Role::parse(raw).as_wire(), raw);
        }
    }

    #[test]
    fn test_department_is_total() {
        assert_eq!(Role::Admin.department(), DepartmentScope::All);
        assert_eq!(Role::Director.department(), DepartmentScope::All);
        assert_eq!(
            Role::parse("head_academic").department(),
            DepartmentScope::Only(Department::Academic)
        );
        assert_eq!(
            Role::parse("clerk_budget").department(),
            DepartmentScope::Only(Department::Budget)
        );
        assert_eq!(Role::parse("").department(), DepartmentScope::All);
        assert_eq!(Role::parse("janitor").department(), DepartmentScope::All);
    }

    #[test]
    fn test_unknown_department_scope_reads_as_all() {
        let scope: DepartmentScope = serde_json::from_str(r#""everything""#).unwrap();
        assert_eq!(scope, DepartmentScope::All);
        let scope: DepartmentScope = serde_json::from_str(r#""personnel""#).unwrap();
        assert_eq!(scope, DepartmentScope::Only(Department::Personnel));
    }

    #[test]
    fn test_department_from_str_rejects_unknown() {
        assert!("finance".parse::<Department>().is_err());
        assert_eq!(" Budget ".parse::<Department>().unwrap(), Department::Budget);
    }
}
