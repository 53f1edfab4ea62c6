use std::{
    fs::{self, File, OpenOptions, rename, write},
    path::{Path, PathBuf},
};

use base64::{Engine, engine::general_purpose::STANDARD};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json, to_string_pretty};
use slug::slugify;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    backend::{Backend, BackendError, Request},
    models::{RecordId, record::RecordKind},
};

/// Current schema version
pub const CURRENT_VERSION: u32 = 1;

const BACKUPS_TO_KEEP: usize = 5;

/// On-disk stand-in for the spreadsheet: the same untyped rows the web app
/// keeps, in one JSON file.
#[derive(Serialize, Deserialize, Debug)]
pub struct SheetFile {
    pub version: u32,
    #[serde(default)]
    pub records: Vec<Value>,
}

impl Default for SheetFile {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            records: vec![],
        }
    }
}

/// Serves the endpoint contract from a local JSON file. Uploaded files are
/// written to a `files` directory next to it.
pub struct LocalSheetBackend {
    path: PathBuf,
}

impl LocalSheetBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn parent_dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
    }

    fn lock(&self) -> Result<File, BackendError> {
        let lock_file_path = self.path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_file_path)
            .map_err(|e| BackendError::SaveFailed {
                path: lock_file_path.clone(),
                source: e,
            })?;
        lock_file
            .lock_exclusive()
            .map_err(|e| BackendError::SaveFailed {
                path: lock_file_path,
                source: e,
            })?;
        Ok(lock_file)
    }

    fn load(&self) -> Result<SheetFile, BackendError> {
        use crate::backend::migrations::{apply_migrations, detect_version};

        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let mut data: Value =
                    serde_json::from_str(&content).map_err(|e| BackendError::ParseFailed {
                        path: self.path.clone(),
                        source: e,
                    })?;

                let file_version = detect_version(&data)?;
                if file_version > CURRENT_VERSION {
                    return Err(BackendError::FutureVersion(file_version));
                }
                if file_version < CURRENT_VERSION {
                    data = apply_migrations(data, file_version, CURRENT_VERSION)?;
                }
                if let Some(obj) = data.as_object_mut() {
                    obj.insert("version".to_string(), json!(CURRENT_VERSION));
                }

                serde_json::from_value(data).map_err(|e| BackendError::ParseFailed {
                    path: self.path.clone(),
                    source: e,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SheetFile::default()),
            Err(e) => Err(BackendError::LoadFailed {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Atomic replace; the caller holds the lock.
    fn save(&self, sheet: &SheetFile) -> Result<(), BackendError> {
        let json =
            to_string_pretty(sheet).map_err(|e| BackendError::SerializeFailed { source: e })?;

        let unique_temp = format!("{}.tmp.{}", self.path.display(), Uuid::new_v4());
        let temp_path = PathBuf::from(&unique_temp);
        write(&temp_path, json).map_err(|e| BackendError::SaveFailed {
            path: temp_path.clone(),
            source: e,
        })?;

        self.create_backup()?;
        self.cleanup_old_backups()?;

        rename(&temp_path, &self.path).map_err(|e| BackendError::SaveFailed {
            path: self.path.clone(),
            source: e,
        })
    }

    fn create_backup(&self) -> Result<u64, BackendError> {
        let file_exists = fs::exists(&self.path).map_err(|e| BackendError::BackupFailed {
            path: self.path.clone(),
            source: e,
        })?;
        if !file_exists {
            return Ok(0);
        }

        let backups_dir = self.get_backup_dir();
        fs::create_dir_all(&backups_dir).map_err(|e| BackendError::BackupFailed {
            path: backups_dir.clone(),
            source: e,
        })?;

        let backup_path = self.get_backup_path();
        fs::copy(&self.path, &backup_path).map_err(|e| BackendError::BackupFailed {
            path: backup_path,
            source: e,
        })
    }

    fn cleanup_old_backups(&self) -> Result<(), BackendError> {
        let backup_dir = self.get_backup_dir();
        let backup_dir_exists =
            fs::exists(&backup_dir).map_err(|e| BackendError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?;
        if !backup_dir_exists {
            return Ok(());
        }

        let mut file_entries = fs::read_dir(&backup_dir)
            .map_err(|e| BackendError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?
            .flatten()
            .filter(|entry| entry.metadata().map(|m| m.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect::<Vec<_>>();

        file_entries.sort();

        let number_of_files_to_delete = file_entries.len().saturating_sub(BACKUPS_TO_KEEP);
        for file_path in &file_entries[0..number_of_files_to_delete] {
            fs::remove_file(file_path).map_err(|e| BackendError::CleanupFailed {
                dir: backup_dir.clone(),
                source: e,
            })?;
        }

        Ok(())
    }

    fn get_backup_dir(&self) -> PathBuf {
        self.parent_dir().join("backups")
    }

    fn get_backup_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sheet".to_string());
        // Sortable by name, unique within a millisecond
        let timestamp = jiff::Timestamp::now().strftime("%Y%m%dT%H%M%S%.f");
        self.get_backup_dir()
            .join(format!("{stem}-{timestamp}-{}.json", Uuid::new_v4().simple()))
    }

    fn files_dir(&self) -> PathBuf {
        self.parent_dir().join("files")
    }

    fn apply(&self, sheet: &mut SheetFile, request: &Request<'_>) -> Result<Value, BackendError> {
        match request {
            Request::Create { entity, item } => {
                let id = item.id();
                if position(&sheet.records, *entity, id).is_some() {
                    return Err(BackendError::Rejected(format!(
                        "{entity} {id} already exists"
                    )));
                }
                let row = serde_json::to_value(item)
                    .map_err(|source| BackendError::SerializeFailed { source })?;
                sheet.records.push(row.clone());
                Ok(row)
            }
            Request::Update { entity, item } => {
                let index = position(&sheet.records, *entity, item.id())
                    .ok_or_else(|| not_found(*entity, item.id()))?;
                let row = serde_json::to_value(item)
                    .map_err(|source| BackendError::SerializeFailed { source })?;
                sheet.records[index] = row.clone();
                Ok(row)
            }
            Request::Delete { entity, item } => {
                let index = position(&sheet.records, *entity, &item.id)
                    .ok_or_else(|| not_found(*entity, &item.id))?;
                sheet.records.remove(index);
                Ok(json!({ "id": item.id }))
            }
            Request::UploadFile {
                task_id,
                file_name,
                file_data,
                ..
            } => {
                let index = position(&sheet.records, RecordKind::Task, task_id)
                    .ok_or_else(|| not_found(RecordKind::Task, task_id))?;
                let bytes = STANDARD.decode(file_data).map_err(|e| {
                    BackendError::Rejected(format!("file data is not valid base64: {e}"))
                })?;

                let files_dir = self.files_dir();
                fs::create_dir_all(&files_dir).map_err(|e| BackendError::SaveFailed {
                    path: files_dir.clone(),
                    source: e,
                })?;
                let stem = Path::new(file_name)
                    .file_stem()
                    .map(|s| slugify(s.to_string_lossy()))
                    .unwrap_or_default();
                let stored = files_dir.join(format!("{task_id}-{stem}.pdf"));
                write(&stored, bytes).map_err(|e| BackendError::SaveFailed {
                    path: stored.clone(),
                    source: e,
                })?;

                let row = &mut sheet.records[index];
                if let Some(obj) = row.as_object_mut() {
                    obj.insert(
                        "fileLink".to_string(),
                        json!(format!("file://{}", stored.display())),
                    );
                }
                Ok(row.clone())
            }
        }
    }
}

fn cell_matches(cell: Option<&Value>, expected: &str) -> bool {
    match cell {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        _ => false,
    }
}

fn position(rows: &[Value], kind: RecordKind, id: &RecordId) -> Option<usize> {
    rows.iter().position(|row| {
        cell_matches(row.get("type"), kind.as_str()) && cell_matches(row.get("id"), id.as_str())
    })
}

fn not_found(kind: RecordKind, id: &RecordId) -> BackendError {
    BackendError::Rejected(format!("{kind} {id} not found"))
}

impl Backend for LocalSheetBackend {
    fn get_all(&self) -> Result<Vec<Value>, BackendError> {
        Ok(self.load()?.records)
    }

    #[instrument(skip_all, fields(action = request.action(), path = %self.path.display()))]
    fn submit(&self, request: &Request<'_>) -> Result<Value, BackendError> {
        let lock_file = self.lock()?;

        let mut sheet = self.load()?;
        let result = self.apply(&mut sheet, request)?;
        self.save(&sheet)?;

        lock_file.unlock().map_err(|e| BackendError::SaveFailed {
            path: self.path.clone(),
            source: e,
        })?;
        debug!(rows = sheet.records.len(), "sheet saved");

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        announcement::Announcement,
        record::Record,
        task::{TaskStatus, fixtures::task},
    };

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = PathBuf::from(format!("/tmp/msmart_{name}_{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn announcement(id: &str) -> Record {
        Record::Announcement(Announcement {
            id: RecordId::from(id),
            title: format!("Notice {id}"),
            message: String::new(),
            author: RecordId::from("1"),
            created_at: "2025-03-01T00:00:00Z".parse().unwrap(),
        })
    }

    #[test]
    fn test_create_then_get_all() {
        let dir = scratch_dir("create");
        let backend = LocalSheetBackend::new(dir.join("sheet.json"));
        let record = announcement("10");

        backend.submit(&Request::create(&record)).unwrap();

        let rows = backend.get_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["type"], "announcement");
        assert_eq!(rows[0]["id"], "10");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_an_empty_sheet() {
        let backend = LocalSheetBackend::new(PathBuf::from("/tmp/msmart_does_not_exist.json"));
        assert!(backend.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_create_is_rejected() {
        let dir = scratch_dir("duplicate");
        let backend = LocalSheetBackend::new(dir.join("sheet.json"));
        let record = announcement("10");
        backend.submit(&Request::create(&record)).unwrap();
        assert!(matches!(
            backend.submit(&Request::create(&record)),
            Err(BackendError::Rejected(_))
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_update_and_delete_match_numeric_ids() {
        let dir = scratch_dir("numeric");
        let path = dir.join("sheet.json");
        fs::write(
            &path,
            r#"{"version": 1, "records": [{"type": "announcement", "id": 10,
                "title": "Old", "message": "", "assignedBy": "1",
                "createdAt": "2025-03-01T00:00:00Z"}]}"#,
        )
        .unwrap();
        let backend = LocalSheetBackend::new(path);

        backend.submit(&Request::update(&announcement("10"))).unwrap();
        assert_eq!(backend.get_all().unwrap()[0]["title"], "Notice 10");

        backend
            .submit(&Request::delete(RecordKind::Announcement, RecordId::from("10")))
            .unwrap();
        assert!(backend.get_all().unwrap().is_empty());

        assert!(matches!(
            backend.submit(&Request::delete(RecordKind::Announcement, RecordId::from("10"))),
            Err(BackendError::Rejected(_))
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_upload_stores_file_and_sets_link() {
        let dir = scratch_dir("upload");
        let backend = LocalSheetBackend::new(dir.join("sheet.json"));
        let record = Record::Task(task("77", "2025-03-20", TaskStatus::InProgress));
        backend.submit(&Request::create(&record)).unwrap();

        let id = RecordId::from("77");
        let result = backend
            .submit(&Request::UploadFile {
                task_id: &id,
                file_name: "Final Report.pdf",
                mime_type: "application/pdf",
                file_data: STANDARD.encode(b"%PDF-1.4 test"),
            })
            .unwrap();

        let link = result["fileLink"].as_str().unwrap();
        assert!(link.ends_with("77-final-report.pdf"));
        let stored = dir.join("files").join("77-final-report.pdf");
        assert_eq!(fs::read(stored).unwrap(), b"%PDF-1.4 test");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = scratch_dir("invalid");
        let path = dir.join("sheet.json");
        fs::write(&path, "{ this is not valid json }").unwrap();

        match LocalSheetBackend::new(path).get_all() {
            Err(BackendError::ParseFailed { .. }) => {}
            _ => panic!("Expected ParseFailed error, got something else"),
        }
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_v1_without_version_field() {
        let dir = scratch_dir("v1");
        let path = dir.join("sheet.json");
        fs::write(&path, r#"{"records": []}"#).unwrap();

        let backend = LocalSheetBackend::new(path);
        assert_eq!(backend.load().unwrap().version, CURRENT_VERSION);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_bare_get_all_dump() {
        let dir = scratch_dir("v0");
        let path = dir.join("sheet.json");
        fs::write(&path, r#"[{"type": "announcement", "id": 7, "title": "Hi"}]"#).unwrap();

        let backend = LocalSheetBackend::new(path);
        let rows = backend.get_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], 7);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_future_version() {
        let dir = scratch_dir("future");
        let path = dir.join("sheet.json");
        fs::write(&path, r#"{"version": 999, "records": []}"#).unwrap();

        match LocalSheetBackend::new(path).get_all() {
            Err(BackendError::FutureVersion(999)) => {}
            _ => panic!("Expected FutureVersion(999) error"),
        }
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_backup_creation_and_cleanup() {
        let dir = scratch_dir("backups");
        let backend = LocalSheetBackend::new(dir.join("sheet.json"));

        for i in 1..=7 {
            let record = announcement(&i.to_string());
            backend.submit(&Request::create(&record)).unwrap();
        }

        let backup_count = fs::read_dir(dir.join("backups"))
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.metadata().map(|m| m.is_file()).unwrap_or(false))
            .count();

        assert_eq!(backup_count, BACKUPS_TO_KEEP, "Should keep exactly 5 backups");
        assert_eq!(backend.get_all().unwrap().len(), 7);
        fs::remove_dir_all(&dir).unwrap();
    }
}
