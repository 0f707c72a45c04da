//! Cabinet core types: sessions, their manifests, and the shared error taxonomy.

#![forbid(unsafe_code)]

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

pub mod size;

pub use size::human_readable_bytes;

/// Decimal id of a session; also the name of its directory under the storage root.
pub type SessionId = u32;

/// One uploaded telemetry run and its derived artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    /// When the telemetry was recorded (supplied by the uploader).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    /// When the server accepted the upload.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub uploaded_at: DateTime<Utc>,
    /// Size of the session archive, recomputed whenever the archive is (re)built.
    pub size_human: String,
    pub has_report: bool,
}

impl Session {
    /// A freshly accepted session: zero-byte size placeholder, no report yet.
    pub fn provisional(id: SessionId, created_at: DateTime<Utc>, uploaded_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: created_at.trunc_subsecs(0),
            uploaded_at: uploaded_at.trunc_subsecs(0),
            size_human: human_readable_bytes(0),
            has_report: false,
        }
    }

    pub fn manifest(&self) -> Manifest {
        Manifest { id: self.id, created_at: self.created_at, uploaded_at: self.uploaded_at }
    }
}

impl From<Manifest> for Session {
    fn from(m: Manifest) -> Self {
        Session::provisional(m.id, m.created_at, m.uploaded_at)
    }
}

/// Persisted identity of a session (`manifest.json`). Derived fields are
/// never written; they are recomputed from the directory on every load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: SessionId,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub uploaded_at: DateTime<Utc>,
}

/// Current time at second precision, the resolution manifests keep.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Error taxonomy shared by the pipeline and the public façade.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CabinetError {
    /// Missing upload part or malformed parameter; the pipeline never starts.
    #[error("client input: {0}")]
    ClientInput(String),
    /// Malformed statistics record or unreadable tag map.
    #[error("parse: {0}")]
    Parse(String),
    /// Disk read/write failure at some pipeline step.
    #[error("storage: {0}")]
    Storage(String),
    #[error("log {0} not found")]
    NotFound(SessionId),
    /// The scheduler no longer accepts work.
    #[error("shutting down")]
    ShuttingDown,
}

impl CabinetError {
    pub fn storage(e: impl std::fmt::Display) -> Self { CabinetError::Storage(format!("{:#}", e)) }
    pub fn parse(e: impl std::fmt::Display) -> Self { CabinetError::Parse(e.to_string()) }
}

pub mod prelude {
    pub use super::{human_readable_bytes, now_utc, CabinetError, Manifest, Session, SessionId};
}
