//! Cabinet public API façade.
//!
//! Frontends (HTTP, CLI) depend on the `CabinetApi` trait only. `InProcApi`
//! drives a `LogService` directly; `MockApi` serves canned sessions for tests.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use std::time::Instant;

use cabinet_core::{CabinetError, Manifest, Session, SessionId};
use cabinet_ingest::{LogService, UploadParts};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// API errors suitable for transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ApiError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<CabinetError> for ApiError {
    fn from(e: CabinetError) -> Self {
        match e {
            CabinetError::ClientInput(m) => ApiError::Validation(m),
            CabinetError::NotFound(id) => ApiError::NotFound(format!("log {}", id)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// One upload as received from a client, before validation.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Raw `date` query value: epoch seconds.
    pub date: Option<String>,
    pub log: Option<Vec<u8>>,
    pub stats: Option<Vec<u8>>,
    pub stats_map: Option<Vec<u8>>,
}

impl UploadRequest {
    /// Check presence and shape of every part. Nothing is written on failure.
    pub fn validate(self) -> Result<(DateTime<Utc>, UploadParts), CabinetError> {
        let date = self.date.ok_or_else(|| client("The 'date' parameter has not been set."))?;
        let created_at = parse_epoch(&date)?;
        let log = self.log.ok_or_else(|| client("The 'log' file has not been attached."))?;
        let stats = match (self.stats, self.stats_map) {
            (Some(s), Some(m)) => Some((s, m)),
            (None, None) => None,
            (Some(_), None) => return Err(client("The 'stats' file was attached, but the 'stats_map' file is missing.")),
            (None, Some(_)) => return Err(client("The 'stats_map' file was attached, but the 'stats' file is missing.")),
        };
        Ok((created_at, UploadParts::from_bytes(log, stats)))
    }
}

fn client(msg: &str) -> CabinetError { CabinetError::ClientInput(msg.to_string()) }

fn parse_epoch(raw: &str) -> Result<DateTime<Utc>, CabinetError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| CabinetError::ClientInput(format!("The 'date' parameter '{}' is not a valid epoch timestamp.", raw)))
}

/// Parse a path segment as a session id.
pub fn parse_id(raw: &str) -> ApiResult<SessionId> {
    raw.parse::<SessionId>().map_err(|_| ApiError::Validation(format!("'{}' is not a log id", raw)))
}

#[async_trait::async_trait]
pub trait CabinetApi: Send + Sync {
    /// Accept an upload; returns the session's stable identity immediately.
    async fn upload(&self, req: UploadRequest) -> ApiResult<Manifest>;

    async fn get(&self, id: SessionId) -> ApiResult<Session>;

    /// All published sessions, newest first.
    async fn list(&self) -> ApiResult<Vec<Session>>;
}

// ----------------- In-process implementation -----------------

pub struct InProcApi {
    service: Arc<LogService>,
}

impl InProcApi {
    pub fn new(service: Arc<LogService>) -> Self { Self { service } }
    pub fn service(&self) -> &Arc<LogService> { &self.service }
}

#[async_trait::async_trait]
impl CabinetApi for InProcApi {
    async fn upload(&self, req: UploadRequest) -> ApiResult<Manifest> {
        let t0 = Instant::now();
        let (created_at, parts) = req.validate().map_err(|e| {
            metrics::counter!("api_upload_rejected_total", 1u64);
            ApiError::from(e)
        })?;
        let session = self.service.post_new_log(created_at, parts)?;
        info!(id = session.id, took_ms = %t0.elapsed().as_millis(), "api: upload queued");
        Ok(session.manifest())
    }

    async fn get(&self, id: SessionId) -> ApiResult<Session> {
        self.service.get(id).map(|s| s.as_ref().clone()).ok_or_else(|| CabinetError::NotFound(id).into())
    }

    async fn list(&self) -> ApiResult<Vec<Session>> {
        Ok(self.service.list().iter().map(|s| s.as_ref().clone()).collect())
    }
}

// ----------------- Mock implementation -----------------

/// Simple in-memory mock implementation for tests.
#[derive(Default)]
pub struct MockApi {
    pub sessions: Vec<Session>,
    /// Validated uploads, in arrival order.
    pub uploads: Mutex<Vec<Manifest>>,
}

impl MockApi {
    pub fn new() -> Self { Self::default() }
    pub fn with_sessions(sessions: Vec<Session>) -> Self { Self { sessions, ..Self::default() } }
}

#[async_trait::async_trait]
impl CabinetApi for MockApi {
    async fn upload(&self, req: UploadRequest) -> ApiResult<Manifest> {
        let (created_at, _parts) = req.validate()?;
        let mut uploads = self.uploads.lock().unwrap_or_else(|e| e.into_inner());
        let id = self.sessions.iter().map(|s| s.id + 1).max().unwrap_or(0) + uploads.len() as SessionId;
        let manifest = Session::provisional(id, created_at, cabinet_core::now_utc()).manifest();
        uploads.push(manifest);
        Ok(manifest)
    }

    async fn get(&self, id: SessionId) -> ApiResult<Session> {
        self.sessions.iter().find(|s| s.id == id).cloned().ok_or_else(|| CabinetError::NotFound(id).into())
    }

    async fn list(&self) -> ApiResult<Vec<Session>> {
        let mut out = self.sessions.clone();
        out.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(out)
    }
}
