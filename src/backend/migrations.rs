use serde_json::{Value, json};

use crate::backend::BackendError;

type SheetMigration = fn(Value) -> Result<Value, BackendError>;

/// Indexed by source version: entry 0 lifts v0 to v1.
fn sheet_migrations() -> Vec<SheetMigration> {
    vec![wrap_bare_records]
}

/// v0 is a bare record array, as saved from a `getAll` response.
fn wrap_bare_records(data: Value) -> Result<Value, BackendError> {
    match data {
        Value::Array(records) => Ok(json!({ "records": records })),
        _ => Err(BackendError::InvalidVersion),
    }
}

/// A bare array is v0. An object without a version field is v1.
pub fn detect_version(data: &Value) -> Result<u32, BackendError> {
    if data.is_array() {
        return Ok(0);
    }
    match data.get("version") {
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(BackendError::InvalidVersion),
        None => Ok(1),
    }
}

/// Runs every migration between the two versions in order.
pub fn apply_migrations(
    mut data: Value,
    from_version: u32,
    to_version: u32,
) -> Result<Value, BackendError> {
    if from_version == to_version {
        return Ok(data);
    }

    if from_version > to_version {
        return Err(BackendError::FutureVersion(from_version));
    }

    let migrations = sheet_migrations();
    for version in from_version..to_version {
        let migrate = migrations
            .get(version as usize)
            .ok_or(BackendError::UnsupportedVersion(version))?;
        data = migrate(data)?;
    }

    Ok(data)
}
