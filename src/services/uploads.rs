use std::path::{Path, PathBuf};

use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;
use tracing::info;

use crate::{
    backend::{Backend, BackendError, Request},
    models::{RecordId, store::Store, task::Task, user::User},
    policy,
    services::refresh,
};

/// Largest file the web app accepts in one request.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const PDF_MAGIC: &[u8] = b"%PDF";
const PDF_MIME: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum UploadTaskFileError {
    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Only the assignee can upload work for '{0}' while it is open")]
    NotPermitted(String),

    #[error("'{0}' is not a .pdf file")]
    NotPdfName(String),

    #[error("'{0}' does not look like a PDF document")]
    NotPdfContent(String),

    #[error("'{name}' is {size} bytes; the limit is {limit} bytes", limit = MAX_UPLOAD_BYTES)]
    TooLarge { name: String, size: u64 },

    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct UploadTaskFileParameters {
    pub task_id: String,
    pub path: PathBuf,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Reads and checks the file, returning its name and bytes.
fn read_pdf(path: &Path) -> Result<(String, Vec<u8>), UploadTaskFileError> {
    let name = file_name(path);
    if !has_pdf_extension(path) {
        return Err(UploadTaskFileError::NotPdfName(name));
    }

    let size = std::fs::metadata(path)
        .map_err(|source| UploadTaskFileError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if size > MAX_UPLOAD_BYTES {
        return Err(UploadTaskFileError::TooLarge { name, size });
    }

    let bytes = std::fs::read(path).map_err(|source| UploadTaskFileError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(UploadTaskFileError::NotPdfContent(name));
    }
    Ok((name, bytes))
}

/// Sends a PDF of the finished work for a task and refetches the store so the
/// new file link shows up.
pub fn upload_task_file(
    store: &mut Store,
    backend: &dyn Backend,
    actor: &User,
    parameters: UploadTaskFileParameters,
) -> Result<Task, UploadTaskFileError> {
    refresh(store, backend)?;
    let id = RecordId::new(parameters.task_id.trim());
    let task = store
        .get_task(&id)
        .ok_or_else(|| UploadTaskFileError::TaskNotFound(parameters.task_id.clone()))?;
    if !policy::can_work_on_task(actor, task) {
        return Err(UploadTaskFileError::NotPermitted(task.title.clone()));
    }

    let (name, bytes) = read_pdf(&parameters.path)?;
    let size = bytes.len();
    backend.submit(&Request::UploadFile {
        task_id: &id,
        file_name: &name,
        mime_type: PDF_MIME,
        file_data: STANDARD.encode(bytes),
    })?;
    refresh(store, backend)?;
    info!(task = %id, file = %name, size, "task file uploaded");

    store
        .get_task(&id)
        .cloned()
        .ok_or(UploadTaskFileError::TaskNotFound(parameters.task_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::testing::sheet_with,
        views::fixtures::{school, user},
    };

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_upload_sets_file_link() {
        let (backend, mut store, dir) = sheet_with(school().records());
        let path = write_file(&dir, "Budget Plan.pdf", b"%PDF-1.7\n...");

        let task = upload_task_file(
            &mut store,
            &backend,
            &user("tb", "teacher_budget"),
            UploadTaskFileParameters {
                task_id: "t2".to_string(),
                path,
            },
        )
        .unwrap();

        let link = task.file_link.expect("file link is set");
        assert!(link.ends_with("t2-budget-plan.pdf"));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_upload_rejects_non_pdf() {
        let (backend, mut store, dir) = sheet_with(school().records());
        let teacher = user("tb", "teacher_budget");
        let text = write_file(&dir, "notes.txt", b"%PDF pretending");
        let fake = write_file(&dir, "fake.pdf", b"PK\x03\x04 zip");

        assert!(matches!(
            upload_task_file(
                &mut store,
                &backend,
                &teacher,
                UploadTaskFileParameters { task_id: "t2".to_string(), path: text }
            ),
            Err(UploadTaskFileError::NotPdfName(_))
        ));
        assert!(matches!(
            upload_task_file(
                &mut store,
                &backend,
                &teacher,
                UploadTaskFileParameters { task_id: "t2".to_string(), path: fake }
            ),
            Err(UploadTaskFileError::NotPdfContent(_))
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_upload_needs_open_own_task() {
        let (backend, mut store, dir) = sheet_with(school().records());
        let path = write_file(&dir, "work.pdf", b"%PDF-1.4");

        // t3 is completed, t1 belongs to someone else
        for (task_id, who) in [("t3", user("ta", "teacher_academic")), ("t1", user("ta", "teacher_academic"))] {
            assert!(matches!(
                upload_task_file(
                    &mut store,
                    &backend,
                    &who,
                    UploadTaskFileParameters {
                        task_id: task_id.to_string(),
                        path: path.clone()
                    }
                ),
                Err(UploadTaskFileError::NotPermitted(_))
            ));
        }
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_size_limit() {
        let dir = PathBuf::from(format!("/tmp/msmart_upload_{}", uuid::Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("huge.pdf");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(MAX_UPLOAD_BYTES + 1).unwrap();

        assert!(matches!(
            read_pdf(&path),
            Err(UploadTaskFileError::TooLarge { .. })
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
