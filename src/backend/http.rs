use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::backend::{Backend, BackendError, Request};

/// The spreadsheet web app, reached over HTTP.
pub struct HttpBackend {
    url: String,
    client: Client,
}

/// `{ok, data|result, error}` wrapper around every answer.
#[derive(Deserialize, Debug, Default)]
struct Envelope {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpBackend {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| BackendError::Transport { source })?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    fn read(response: reqwest::blocking::Response) -> Result<Envelope, BackendError> {
        let status = response.status();
        let body = response
            .text()
            .map_err(|source| BackendError::Transport { source })?;
        decode(status.as_u16(), status.is_success(), &body)
    }
}

fn decode(status: u16, success: bool, body: &str) -> Result<Envelope, BackendError> {
    let envelope: Envelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(source) if success => return Err(BackendError::InvalidResponse { source }),
        Err(_) => {
            return Err(BackendError::Status {
                status,
                message: body.chars().take(200).collect(),
            });
        }
    };
    if !success {
        return Err(BackendError::Status {
            status,
            message: envelope
                .error
                .unwrap_or_else(|| "request failed".to_string()),
        });
    }
    if !envelope.ok {
        return Err(BackendError::Rejected(
            envelope.error.unwrap_or_else(|| "API error".to_string()),
        ));
    }
    Ok(envelope)
}

fn rows(envelope: Envelope) -> Result<Vec<Value>, BackendError> {
    match envelope.data {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(rows)) => Ok(rows),
        Some(_) => Err(BackendError::UnexpectedShape("a record list that is not a list")),
    }
}

impl Backend for HttpBackend {
    #[instrument(skip(self), fields(url = %self.url))]
    fn get_all(&self) -> Result<Vec<Value>, BackendError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("action", "getAll")])
            .send()
            .map_err(|source| BackendError::Transport { source })?;
        let rows = rows(Self::read(response)?)?;
        debug!(count = rows.len(), "fetched records");
        Ok(rows)
    }

    #[instrument(skip_all, fields(action = request.action()))]
    fn submit(&self, request: &Request<'_>) -> Result<Value, BackendError> {
        let payload = serde_json::to_string(request)
            .map_err(|source| BackendError::SerializeFailed { source })?;
        // A plain form post keeps the web app free of CORS preflight handling
        let response = self
            .client
            .post(&self.url)
            .form(&[("payload", payload)])
            .send()
            .map_err(|source| BackendError::Transport { source })?;
        let envelope = Self::read(response)?;
        debug!("request accepted");
        Ok(envelope
            .result
            .unwrap_or_else(|| Value::Object(Default::default())))
    }
}
