use std::{path::PathBuf, time::Duration};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::{
    RecordId,
    record::{Record, RecordKind, RecordRef},
};

pub mod http;
pub mod local;
pub mod migrations;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Unsupported endpoint '{0}'. Use an http(s) URL or file:<path>")]
    InvalidEndpoint(String),

    #[error("Failed to reach the endpoint: {source}")]
    Transport {
        #[source]
        source: reqwest::Error,
    },

    #[error("Endpoint answered HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Endpoint rejected the request: {0}")]
    Rejected(String),

    #[error("Endpoint sent an unreadable response: {source}")]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },

    #[error("Endpoint sent {0}")]
    UnexpectedShape(&'static str),

    #[error("Failed to load sheet from '{path}': {source}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON from '{path}': {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to save sheet to '{path}': {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize request to JSON: {source}")]
    SerializeFailed {
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to create backup at '{path}': {source}")]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to cleanup old backups in '{dir}': {source}")]
    CleanupFailed {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Sheet file has a malformed version field")]
    InvalidVersion,

    #[error(
        "Sheet file was created by a newer version of msmart (version {0}). Please upgrade msmart to open this file."
    )]
    FutureVersion(u32),

    #[error("Sheet file has unsupported version {0}. This version of msmart cannot read this file.")]
    UnsupportedVersion(u32),
}

/// A mutation sent to the endpoint as the `payload` form field.
#[derive(Serialize, Debug)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request<'a> {
    Create {
        entity: RecordKind,
        item: &'a Record,
    },
    Update {
        entity: RecordKind,
        item: &'a Record,
    },
    Delete {
        entity: RecordKind,
        item: RecordRef,
    },
    UploadFile {
        #[serde(rename = "taskId")]
        task_id: &'a RecordId,
        #[serde(rename = "fileName")]
        file_name: &'a str,
        #[serde(rename = "mimeType")]
        mime_type: &'a str,
        /// Base64 without a data URL prefix
        #[serde(rename = "fileData")]
        file_data: String,
    },
}

impl<'a> Request<'a> {
    pub fn create(item: &'a Record) -> Self {
        Request::Create {
            entity: item.kind(),
            item,
        }
    }

    pub fn update(item: &'a Record) -> Self {
        Request::Update {
            entity: item.kind(),
            item,
        }
    }

    pub fn delete(kind: RecordKind, id: RecordId) -> Self {
        Request::Delete {
            entity: kind,
            item: RecordRef { id, kind },
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Request::Create { .. } => "create",
            Request::Update { .. } => "update",
            Request::Delete { .. } => "delete",
            Request::UploadFile { .. } => "uploadFile",
        }
    }
}

/// The remote record service: one bulk read, one mutation entry point.
pub trait Backend {
    /// Every row of the sheet, unparsed.
    fn get_all(&self) -> Result<Vec<Value>, BackendError>;

    /// Runs one mutation and returns the endpoint's `result`.
    fn submit(&self, request: &Request<'_>) -> Result<Value, BackendError>;
}

/// Picks the backend for an endpoint string: `file:<path>` for a local sheet,
/// an http(s) URL for the web app.
pub fn open(endpoint: &str, timeout: Duration) -> Result<Box<dyn Backend>, BackendError> {
    let endpoint = endpoint.trim();
    if let Some(path) = endpoint.strip_prefix("file:") {
        return Ok(Box::new(local::LocalSheetBackend::new(PathBuf::from(path))));
    }
    if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
        return Ok(Box::new(http::HttpBackend::new(endpoint, timeout)?));
    }
    Err(BackendError::InvalidEndpoint(endpoint.to_string()))
}
